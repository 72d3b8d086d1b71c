use chrono::{DateTime, Utc};
use rehearse_core::advisory::{ClientMessage, Hint, ServerMessage};
use rehearse_core::conversation::{CandidateSummary, ConversationState, Speaker, TurnRecord};
use rehearse_core::persona::Persona;
use rehearse_core::phase::{Phase, PhaseConfig, PhaseTimer};
use rehearse_core::turn_selector::{AnswerAnalysis, NextQuestion, TurnSelector, analyze_answer};
use std::time::{Duration, Instant};

struct Interview {
    state: ConversationState,
    selector: TurnSelector,
    phase: PhaseTimer,
    started: Instant,
    complete: bool,
}

/// Per-connection advisor: mirrors the transcript and answers with hints and
/// clock messages.
pub struct AdvisorSession {
    target: Duration,
    interview: Option<Interview>,
}

impl AdvisorSession {
    pub fn new(target: Duration) -> Self {
        Self {
            target,
            interview: None,
        }
    }

    pub fn handle(&mut self, message: ClientMessage, now: Instant) -> Vec<ServerMessage> {
        match message {
            ClientMessage::Init { candidate, personas } => self.init(candidate, personas, now),
            ClientMessage::TranscriptUpdate {
                speaker,
                text,
                timestamp,
                ..
            } => {
                let Some(interview) = self.interview.as_mut() else {
                    return vec![error("transcript_update received before init")];
                };
                interview.observe(speaker, text, timestamp).into_iter().collect()
            }
        }
    }

    fn init(&mut self, candidate: CandidateSummary, personas: Vec<Persona>, now: Instant) -> Vec<ServerMessage> {
        let selector = TurnSelector::for_role(&candidate.target_role, None);
        match ConversationState::new(candidate, personas, self.target) {
            Ok(state) => {
                tracing::info!(
                    session = %state.session_id,
                    candidate = %state.candidate.name,
                    personas = state.personas().len(),
                    "advisor session initialized"
                );
                self.interview = Some(Interview {
                    state,
                    selector,
                    phase: PhaseTimer::new(PhaseConfig::new(self.target)),
                    started: now,
                    complete: false,
                });
                vec![ServerMessage::Initialized]
            }
            Err(e) => vec![error(&e.to_string())],
        }
    }

    /// Clock messages for this poll: always a `time_update`, plus the one-shot
    /// closing notice and the completion summary when those happen.
    pub fn tick(&mut self, now: Instant) -> Vec<ServerMessage> {
        let Some(interview) = self.interview.as_mut().filter(|i| !i.complete) else {
            return Vec::new();
        };
        let elapsed = now.saturating_duration_since(interview.started);
        let tick = interview.phase.poll(elapsed);
        let remaining_seconds = tick.remaining.as_secs();

        let mut out = vec![ServerMessage::TimeUpdate {
            remaining_seconds,
            phase: tick.phase,
        }];
        match tick.transition {
            Some(Phase::Closing) => out.push(ServerMessage::InterviewPhaseChange {
                phase: Phase::Closing,
                remaining_seconds,
                should_start_closing: true,
            }),
            Some(Phase::Completed) => {
                interview.complete = true;
                let state = &interview.state;
                out.push(ServerMessage::InterviewComplete {
                    total_duration: elapsed.as_secs(),
                    question_count: state.question_count,
                    topics_covered: state.topics_covered().iter().cloned().collect(),
                });
            }
            _ => {}
        }
        out
    }
}

impl Interview {
    fn observe(&mut self, speaker: String, text: String, timestamp: i64) -> Option<ServerMessage> {
        let speaker = if speaker == "participant" {
            Speaker::Participant
        } else {
            Speaker::Persona(speaker)
        };
        if let Speaker::Persona(id) = &speaker {
            match self.state.personas().iter().position(|p| &p.id == id) {
                Some(index) => self.state.active_persona_index = index,
                None => tracing::debug!(%id, "transcript line from unknown persona"),
            }
        }
        let participant = speaker.is_participant();
        self.state.append_turn(TurnRecord {
            speaker,
            text,
            at: DateTime::from_timestamp_millis(timestamp).unwrap_or_else(Utc::now),
        });

        if !participant || self.complete {
            return None;
        }
        self.phase.mark_engaged();
        let answer = self.state.last_participant_turn().map(|t| t.text.clone());
        let analysis = analyze_answer(answer.as_deref(), self.state.depth_level());
        let closing = self.phase.phase() == Phase::Closing;
        let next = self.selector.determine_next_question(&mut self.state, None, closing);
        let reasoning = reasoning(&analysis, &next, &self.state.personas()[next.persona_index]);
        Some(ServerMessage::OrchestrationHint(Hint {
            suggested_topic: next.topic,
            suggested_depth: next.depth,
            should_follow_up: next.follow_up,
            reasoning,
            confidence: analysis.confidence,
            suggested_persona_index: Some(next.persona_index),
        }))
    }
}

fn reasoning(analysis: &AnswerAnalysis, next: &NextQuestion, persona: &Persona) -> String {
    if next.follow_up {
        let why = if analysis.completeness < 0.6 {
            "the answer was short"
        } else if analysis.has_probeable_content {
            "the answer mentions something worth probing"
        } else {
            "the answer is strong enough to go deeper"
        };
        format!("Stay on {} with {}: {}.", next.topic, persona.first_name(), why)
    } else {
        format!("Move on: {} can open {}.", persona.first_name(), next.topic)
    }
}

fn error(message: &str) -> ServerMessage {
    ServerMessage::Error {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rehearse_core::persona::default_roster;

    fn init_message() -> ClientMessage {
        ClientMessage::Init {
            candidate: CandidateSummary {
                name: "Sam".into(),
                target_role: "Software Engineer".into(),
                summary: String::new(),
            },
            personas: default_roster(),
        }
    }

    fn line(speaker: &str, text: &str) -> ClientMessage {
        ClientMessage::TranscriptUpdate {
            speaker: speaker.into(),
            text: text.into(),
            timestamp: 1_700_000_000_000,
            persona_name: None,
        }
    }

    #[test]
    fn test_updates_before_init_are_errors() {
        let mut advisor = AdvisorSession::new(Duration::from_secs(600));
        let out = advisor.handle(line("participant", "Hello"), Instant::now());
        assert!(matches!(out.as_slice(), [ServerMessage::Error { .. }]));
        assert!(advisor.tick(Instant::now()).is_empty());
    }

    #[test]
    fn test_init_rejects_empty_panel() {
        let mut advisor = AdvisorSession::new(Duration::from_secs(600));
        let out = advisor.handle(
            ClientMessage::Init {
                candidate: CandidateSummary::default(),
                personas: Vec::new(),
            },
            Instant::now(),
        );
        assert!(matches!(out.as_slice(), [ServerMessage::Error { .. }]));
        assert!(advisor.tick(Instant::now()).is_empty());
    }

    #[test]
    fn test_hint_only_after_participant_lines() {
        let mut advisor = AdvisorSession::new(Duration::from_secs(600));
        let now = Instant::now();
        assert_eq!(advisor.handle(init_message(), now), vec![ServerMessage::Initialized]);

        assert!(advisor.handle(line("priya", "Tell me about a project?"), now).is_empty());
        let opening = advisor.handle(line("participant", "Hello, happy to be here."), now);
        assert!(matches!(opening.as_slice(), [ServerMessage::OrchestrationHint(h)] if !h.should_follow_up));

        let out = advisor.handle(line("participant", "I don't know, maybe something like that"), now);
        let [ServerMessage::OrchestrationHint(hint)] = out.as_slice() else {
            panic!("expected a single hint, got {out:?}");
        };
        assert!(hint.should_follow_up);
        assert!((1..=5).contains(&hint.suggested_depth));
        assert!(hint.suggested_persona_index.is_some_and(|i| i < 3));
        assert!(!hint.reasoning.is_empty());
    }

    #[test]
    fn test_tick_sends_closing_once_then_completes() {
        let mut advisor = AdvisorSession::new(Duration::from_secs(600));
        let start = Instant::now();
        advisor.handle(init_message(), start);

        let mut closing_notices = 0;
        let mut completions = 0;
        for i in 0..=61 {
            for message in advisor.tick(start + Duration::from_secs(i * 10)) {
                match message {
                    ServerMessage::InterviewPhaseChange {
                        should_start_closing: true,
                        ..
                    } => closing_notices += 1,
                    ServerMessage::InterviewComplete { total_duration, .. } => {
                        assert_eq!(total_duration, 600);
                        completions += 1;
                    }
                    _ => {}
                }
            }
        }
        assert_eq!(closing_notices, 1);
        assert_eq!(completions, 1);
        assert!(advisor.tick(start + Duration::from_secs(700)).is_empty());
    }

    #[test]
    fn test_tick_reports_remaining_time() {
        let mut advisor = AdvisorSession::new(Duration::from_secs(600));
        let start = Instant::now();
        advisor.handle(init_message(), start);
        let out = advisor.tick(start + Duration::from_secs(100));
        assert_eq!(
            out,
            vec![ServerMessage::TimeUpdate {
                remaining_seconds: 500,
                phase: Phase::Active,
            }]
        );
    }
}
