use crate::persona::Persona;
use regex::Regex;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

static PASS_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\[\s*pass\s*:\s*([^\]]*)\]").expect("pass directive pattern is valid")
});

const DIRECTIVE_OPENER: &str = "[pass:";

/// Where the floor should go once the current persona stops talking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffTarget {
    Persona(usize),
    /// A directive named someone not on the panel.
    Unresolved(String),
}

/// Finds `[PASS: name]` directives in persona speech, hides them from the
/// transcript, and holds at most one pending target until it is consumed.
#[derive(Debug)]
pub struct HandoffDetector {
    pending: Option<HandoffTarget>,
    last_rotation: Option<Instant>,
    rotation_cooldown: Duration,
    min_questions_before_rotation: u32,
}

impl HandoffDetector {
    pub fn new(rotation_cooldown: Duration, min_questions_before_rotation: u32) -> Self {
        Self {
            pending: None,
            last_rotation: None,
            rotation_cooldown,
            min_questions_before_rotation,
        }
    }

    pub fn pending(&self) -> Option<&HandoffTarget> {
        self.pending.as_ref()
    }

    /// Latches `target` unless one is already pending. Returns whether it was taken.
    pub fn latch(&mut self, target: HandoffTarget) -> bool {
        if self.pending.is_some() {
            return false;
        }
        tracing::debug!(?target, "handoff target latched");
        self.pending = Some(target);
        true
    }

    /// Latches the first directive in `text` naming someone other than
    /// `current`, unless a target is already pending.
    pub fn scan(&mut self, text: &str, personas: &[Persona], current: usize) {
        for capture in PASS_DIRECTIVE.captures_iter(text) {
            if self.pending.is_some() {
                break;
            }
            let name = capture.get(1).map_or("", |m| m.as_str()).trim();
            let target = match resolve_persona(name, personas) {
                Some(index) if index == current => continue,
                Some(index) => HandoffTarget::Persona(index),
                None => HandoffTarget::Unresolved(name.to_string()),
            };
            self.latch(target);
        }
    }

    /// Consumes the pending target and decides who speaks next.
    ///
    /// A resolved name always wins. An unresolved one falls back to
    /// round-robin, but only after the current persona has asked enough
    /// questions and the rotation cooldown has passed.
    pub fn take_decision(
        &mut self,
        current: usize,
        persona_count: usize,
        questions_by_current: u32,
        now: Instant,
    ) -> Option<usize> {
        let next = match self.pending.take()? {
            HandoffTarget::Persona(index) if index != current && index < persona_count => {
                Some(index)
            }
            HandoffTarget::Persona(_) => None,
            HandoffTarget::Unresolved(name) => {
                let cooled_down = self
                    .last_rotation
                    .is_none_or(|at| now.saturating_duration_since(at) >= self.rotation_cooldown);
                if persona_count > 1
                    && questions_by_current >= self.min_questions_before_rotation
                    && cooled_down
                {
                    tracing::info!(%name, "handoff target not on panel, rotating");
                    Some((current + 1) % persona_count)
                } else {
                    tracing::debug!(%name, "handoff target not on panel, staying put");
                    None
                }
            }
        };
        if next.is_some() {
            self.last_rotation = Some(now);
        }
        next
    }

    /// Forgets a pending target, used when the call ends or a handoff fails.
    pub fn clear(&mut self) {
        self.pending = None;
    }
}

/// Removes every directive without latching anything. A trailing `[P`,
/// `[PAS` or `[PASS: Ma` that is still streaming is hidden too; a lone `[`
/// is left alone.
pub fn strip_directives(text: &str) -> String {
    let mut cleaned = PASS_DIRECTIVE.replace_all(text, "").into_owned();
    if let Some(open) = cleaned.rfind('[') {
        let tail: String = cleaned[open..]
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        let partial = tail.len() > 1
            && !tail.contains(']')
            && (DIRECTIVE_OPENER.starts_with(&tail) || tail.starts_with(DIRECTIVE_OPENER));
        if partial {
            cleaned.truncate(open);
        }
    }
    cleaned.trim_end().to_string()
}

/// Exact full-name match first, then a first-name prefix match.
pub fn resolve_persona(name: &str, personas: &[Persona]) -> Option<usize> {
    let wanted = name.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    if let Some(index) = personas
        .iter()
        .position(|p| p.name.to_lowercase() == wanted)
    {
        return Some(index);
    }
    let wanted_first = wanted.split_whitespace().next().unwrap_or("");
    personas.iter().position(|p| {
        let first = p.first_name().to_lowercase();
        !first.is_empty() && (first.starts_with(&wanted) || first == wanted_first)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::default_roster;

    fn detector() -> HandoffDetector {
        HandoffDetector::new(Duration::from_secs(5), 2)
    }

    fn scan_and_strip(d: &mut HandoffDetector, text: &str, roster: &[Persona], current: usize) -> String {
        d.scan(text, roster, current);
        strip_directives(text)
    }

    #[test]
    fn test_directive_is_stripped_and_latched() {
        let roster = default_roster();
        let mut d = detector();
        let shown = scan_and_strip(&mut d, "...great point. [PASS: Priya]", &roster, 1);
        assert_eq!(shown, "...great point.");
        assert_eq!(d.pending(), Some(&HandoffTarget::Persona(0)));
    }

    #[test]
    fn test_only_first_directive_in_a_turn_is_latched() {
        let roster = default_roster();
        let mut d = detector();
        scan_and_strip(&mut d, "Thanks. [pass: elena rossi]", &roster, 0);
        let shown = scan_and_strip(&mut d, "Thanks. [PASS: Marcus] [PASS: Priya]", &roster, 0);
        assert_eq!(shown, "Thanks.");
        assert_eq!(d.pending(), Some(&HandoffTarget::Persona(2)));
    }

    #[test]
    fn test_partial_directive_is_hidden_while_streaming() {
        let roster = default_roster();
        let mut d = detector();
        assert_eq!(scan_and_strip(&mut d, "Nice answer. [PA", &roster, 0), "Nice answer.");
        assert_eq!(scan_and_strip(&mut d, "Nice answer. [PASS: Mar", &roster, 0), "Nice answer.");
        assert!(d.pending().is_none());
        assert_eq!(scan_and_strip(&mut d, "Use [brackets] freely", &roster, 0), "Use [brackets] freely");
    }

    #[test]
    fn test_lone_bracket_is_not_treated_as_a_directive() {
        assert_eq!(strip_directives("Options are ["), "Options are [");
        assert_eq!(strip_directives("See [note"), "See [note");
        assert_eq!(strip_directives("Good. [p"), "Good.");
    }

    #[test]
    fn test_resolution_prefers_full_name_then_first_name_prefix() {
        let roster = default_roster();
        assert_eq!(resolve_persona("MARCUS LEE", &roster), Some(1));
        assert_eq!(resolve_persona("Ele", &roster), Some(2));
        assert_eq!(resolve_persona("Priya S.", &roster), Some(0));
        assert_eq!(resolve_persona("Bob", &roster), None);
        assert_eq!(resolve_persona("", &roster), None);
    }

    #[test]
    fn test_self_directive_is_ignored() {
        let roster = default_roster();
        let mut d = detector();
        scan_and_strip(&mut d, "Let me continue. [PASS: Priya]", &roster, 0);
        assert!(d.pending().is_none());
    }

    #[test]
    fn test_unresolved_target_rotates_only_after_questions_and_cooldown() {
        let roster = default_roster();
        let mut d = detector();
        let t0 = Instant::now();

        scan_and_strip(&mut d, "Over to... [PASS: Zed]", &roster, 0);
        assert_eq!(d.take_decision(0, 3, 1, t0), None, "too few questions");
        assert!(d.pending().is_none(), "decision consumes the target");

        scan_and_strip(&mut d, "[PASS: Zed]", &roster, 0);
        assert_eq!(d.take_decision(0, 3, 2, t0), Some(1));

        scan_and_strip(&mut d, "[PASS: Zed]", &roster, 1);
        assert_eq!(d.take_decision(1, 3, 3, t0 + Duration::from_secs(2)), None, "cooling down");

        scan_and_strip(&mut d, "[PASS: Zed]", &roster, 1);
        assert_eq!(d.take_decision(1, 3, 3, t0 + Duration::from_secs(6)), Some(2));
    }

    #[test]
    fn test_resolved_target_ignores_rotation_guard() {
        let roster = default_roster();
        let mut d = detector();
        d.latch(HandoffTarget::Persona(2));
        assert_eq!(d.take_decision(0, roster.len(), 0, Instant::now()), Some(2));
    }
}
