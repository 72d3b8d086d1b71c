use crate::error::SessionError;
use crate::persona::Persona;
use crate::reviewer::ReviewIssue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

pub const MIN_DEPTH: u8 = 1;
pub const MAX_DEPTH: u8 = 5;

/// Who produced a transcript line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Participant,
    Persona(String),
}

impl Speaker {
    pub fn is_participant(&self) -> bool {
        matches!(self, Speaker::Participant)
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Participant => f.write_str("participant"),
            Speaker::Persona(id) => f.write_str(id),
        }
    }
}

/// One finalized utterance. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// What the reviewer flagged about a question a persona asked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfCorrectionEntry {
    pub question: String,
    pub topic: String,
    pub depth: u8,
    pub issues: Vec<ReviewIssue>,
    pub at: DateTime<Utc>,
}

/// Reference to the parsed candidate profile; parsing itself happens elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSummary {
    pub name: String,
    pub target_role: String,
    #[serde(default)]
    pub summary: String,
}

/// Shared record of one live interview: who is on the panel, what has been
/// said, and how far each topic has been probed.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub session_id: String,
    pub candidate: CandidateSummary,
    personas: Vec<Persona>,
    pub active_persona_index: usize,
    pub question_count: u32,
    questions_by_persona: Vec<u32>,
    topics_covered: BTreeSet<String>,
    pub current_topic: Option<String>,
    depth_level: u8,
    transcript: Vec<TurnRecord>,
    pub session_start: DateTime<Utc>,
    pub target_duration: Duration,
    self_correction_log: Vec<SelfCorrectionEntry>,
}

/// Serializable snapshot handed to the report renderer at call end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExport {
    pub session_id: String,
    pub candidate: CandidateSummary,
    pub personas: Vec<Persona>,
    pub transcript: Vec<TurnRecord>,
    pub topics_covered: Vec<String>,
    pub question_count: u32,
    pub questions_by_persona: Vec<u32>,
    pub final_depth: u8,
    pub self_corrections: Vec<SelfCorrectionEntry>,
    pub duration_seconds: u64,
}

impl ConversationState {
    pub fn new(
        candidate: CandidateSummary,
        personas: Vec<Persona>,
        target_duration: Duration,
    ) -> Result<Self, SessionError> {
        if personas.is_empty() {
            return Err(SessionError::NoPersonas);
        }
        let questions_by_persona = vec![0; personas.len()];
        Ok(Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            candidate,
            personas,
            active_persona_index: 0,
            question_count: 0,
            questions_by_persona,
            topics_covered: BTreeSet::new(),
            current_topic: None,
            depth_level: MIN_DEPTH,
            transcript: Vec::new(),
            session_start: Utc::now(),
            target_duration,
            self_correction_log: Vec::new(),
        })
    }

    pub fn personas(&self) -> &[Persona] {
        &self.personas
    }

    pub fn active_persona(&self) -> &Persona {
        // `new` rejects empty rosters and the index is only set from roster positions.
        &self.personas[self.active_persona_index.min(self.personas.len() - 1)]
    }

    pub fn persona_by_id(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    pub fn depth_level(&self) -> u8 {
        self.depth_level
    }

    /// Stores `depth` clamped into the valid range.
    pub fn set_depth(&mut self, depth: u8) {
        self.depth_level = depth.clamp(MIN_DEPTH, MAX_DEPTH);
    }

    pub fn topics_covered(&self) -> &BTreeSet<String> {
        &self.topics_covered
    }

    /// Marks a topic as covered. The set only ever grows.
    pub fn cover_topic(&mut self, topic: &str) {
        if !self.topics_covered.contains(topic) {
            self.topics_covered.insert(topic.to_string());
        }
    }

    pub fn transcript(&self) -> &[TurnRecord] {
        &self.transcript
    }

    pub fn append_turn(&mut self, record: TurnRecord) {
        self.transcript.push(record);
    }

    pub fn last_participant_turn(&self) -> Option<&TurnRecord> {
        self.transcript.iter().rev().find(|r| r.speaker.is_participant())
    }

    pub fn questions_asked_by(&self, index: usize) -> u32 {
        self.questions_by_persona.get(index).copied().unwrap_or(0)
    }

    pub fn questions_by_persona(&self) -> &[u32] {
        &self.questions_by_persona
    }

    pub fn record_question(&mut self, persona_index: usize) {
        self.question_count += 1;
        if let Some(count) = self.questions_by_persona.get_mut(persona_index) {
            *count += 1;
        }
    }

    pub fn record_self_correction(&mut self, entry: SelfCorrectionEntry) {
        self.self_correction_log.push(entry);
    }

    pub fn self_correction_log(&self) -> &[SelfCorrectionEntry] {
        &self.self_correction_log
    }

    pub fn elapsed(&self) -> Duration {
        (Utc::now() - self.session_start).to_std().unwrap_or_default()
    }

    pub fn export(&self) -> SessionExport {
        SessionExport {
            session_id: self.session_id.clone(),
            candidate: self.candidate.clone(),
            personas: self.personas.clone(),
            transcript: self.transcript.clone(),
            topics_covered: self.topics_covered.iter().cloned().collect(),
            question_count: self.question_count,
            questions_by_persona: self.questions_by_persona.clone(),
            final_depth: self.depth_level,
            self_corrections: self.self_correction_log.clone(),
            duration_seconds: self.elapsed().as_secs(),
        }
    }

    /// Drops the per-session history while keeping the panel and candidate.
    pub fn clear(&mut self) {
        self.active_persona_index = 0;
        self.question_count = 0;
        self.questions_by_persona.iter_mut().for_each(|c| *c = 0);
        self.topics_covered.clear();
        self.current_topic = None;
        self.depth_level = MIN_DEPTH;
        self.transcript.clear();
        self.self_correction_log.clear();
        self.session_start = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::default_roster;

    fn state() -> ConversationState {
        ConversationState::new(
            CandidateSummary {
                name: "Sam".to_string(),
                target_role: "Software Engineer".to_string(),
                summary: String::new(),
            },
            default_roster(),
            Duration::from_secs(1800),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_roster_is_rejected() {
        let result = ConversationState::new(CandidateSummary::default(), vec![], Duration::ZERO);
        assert!(matches!(result, Err(SessionError::NoPersonas)));
    }

    #[test]
    fn test_depth_is_clamped() {
        let mut state = state();
        state.set_depth(0);
        assert_eq!(state.depth_level(), 1);
        state.set_depth(9);
        assert_eq!(state.depth_level(), 5);
    }

    #[test]
    fn test_export_then_clear() {
        let mut state = state();
        state.append_turn(TurnRecord {
            speaker: Speaker::Participant,
            text: "Hello".to_string(),
            at: Utc::now(),
        });
        state.cover_topic("Teamwork");
        state.record_question(1);

        let export = state.export();
        assert_eq!(export.transcript.len(), 1);
        assert_eq!(export.topics_covered, vec!["Teamwork".to_string()]);
        assert_eq!(export.questions_by_persona, vec![0, 1, 0]);

        state.clear();
        assert!(state.transcript().is_empty());
        assert!(state.topics_covered().is_empty());
        assert_eq!(state.question_count, 0);
        assert_eq!(state.personas().len(), 3);
    }

    #[test]
    fn test_last_participant_turn_skips_personas() {
        let mut state = state();
        for (speaker, text) in [
            (Speaker::Participant, "first"),
            (Speaker::Persona("priya".into()), "question?"),
        ] {
            state.append_turn(TurnRecord {
                speaker,
                text: text.to_string(),
                at: Utc::now(),
            });
        }
        assert_eq!(state.last_participant_turn().unwrap().text, "first");
    }
}
