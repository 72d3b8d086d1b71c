use serde::{Deserialize, Serialize};

const FILLER_WORDS: &[&str] = &["and", "the", "for", "with", "of", "to", "in", "on"];

/// A simulated interviewer identity. Built once when the roster is loaded and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub role: String,
    pub focus: String,
    pub behavior: String,
    pub voice: String,
}

impl Persona {
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("")
    }

    /// Lowercased words of the focus label, without filler words.
    pub fn focus_keywords(&self) -> Vec<String> {
        keywords(&self.focus)
    }

    /// True when any focus keyword shares a stem with a word of `topic`.
    pub fn focus_overlaps(&self, topic: &str) -> bool {
        let topic_words = keywords(topic);
        self.focus_keywords()
            .iter()
            .any(|focus| topic_words.iter().any(|word| same_stem(focus, word)))
    }
}

pub(crate) fn keywords(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1)
        .map(str::to_lowercase)
        .filter(|w| !FILLER_WORDS.contains(&w.as_str()))
        .collect()
}

// "leader" and "leadership" count as the same keyword.
fn same_stem(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    short.len() >= 5 && long.starts_with(short)
}

/// The panel used when no roster directory is configured.
pub fn default_roster() -> Vec<Persona> {
    vec![
        Persona {
            id: "priya".to_string(),
            name: "Priya Sharma".to_string(),
            role: "Engineering Manager".to_string(),
            focus: "technical design, debugging, code quality, performance".to_string(),
            behavior: "Direct and precise. Pushes for specifics and tradeoffs.".to_string(),
            voice: "Kore".to_string(),
        },
        Persona {
            id: "marcus".to_string(),
            name: "Marcus Lee".to_string(),
            role: "Senior Recruiter".to_string(),
            focus: "teamwork, leadership, conflict, communication, motivation".to_string(),
            behavior: "Warm and conversational. Listens for concrete stories.".to_string(),
            voice: "Puck".to_string(),
        },
        Persona {
            id: "elena".to_string(),
            name: "Elena Rossi".to_string(),
            role: "Product Director".to_string(),
            focus: "product strategy, prioritization, stakeholders, metrics, industry".to_string(),
            behavior: "Curious and big-picture. Connects answers to business impact.".to_string(),
            voice: "Charon".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_name_is_leading_word() {
        let roster = default_roster();
        assert_eq!(roster[0].first_name(), "Priya");
    }

    #[test]
    fn test_focus_overlap_matches_stems() {
        let roster = default_roster();
        let marcus = &roster[1];
        assert!(marcus.focus_overlaps("Leadership"));
        assert!(marcus.focus_overlaps("Conflict Resolution"));
        assert!(!marcus.focus_overlaps("System Design"));
        assert!(roster[0].focus_overlaps("Technical Tradeoffs"));
    }
}
