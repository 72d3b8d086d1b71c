use crate::conversation::{CandidateSummary, TurnRecord};
use crate::persona::Persona;
use crate::phase::Phase;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Messages the interview sends to the advisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Init {
        candidate: CandidateSummary,
        personas: Vec<Persona>,
    },
    #[serde(rename_all = "camelCase")]
    TranscriptUpdate {
        speaker: String,
        text: String,
        /// Milliseconds since the Unix epoch.
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        persona_name: Option<String>,
    },
}

/// A non-binding suggestion for the next question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub suggested_topic: String,
    pub suggested_depth: u8,
    pub should_follow_up: bool,
    #[serde(default)]
    pub reasoning: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_persona_index: Option<usize>,
}

/// Messages the advisor sends back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Initialized,
    OrchestrationHint(Hint),
    #[serde(rename_all = "camelCase")]
    InterviewPhaseChange {
        phase: Phase,
        remaining_seconds: u64,
        should_start_closing: bool,
    },
    #[serde(rename_all = "camelCase")]
    InterviewComplete {
        total_duration: u64,
        question_count: u32,
        topics_covered: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    TimeUpdate {
        remaining_seconds: u64,
        phase: Phase,
    },
    Error {
        message: String,
    },
}

/// Holds the latest hint. Newer hints overwrite older ones, stale hints are
/// dropped, and reads are rate-limited.
#[derive(Debug)]
pub struct HintSlot {
    latest: Option<(Hint, Instant)>,
    last_consumed: Option<Instant>,
    ttl: Duration,
    min_interval: Duration,
}

impl HintSlot {
    pub fn new(ttl: Duration, min_interval: Duration) -> Self {
        Self {
            latest: None,
            last_consumed: None,
            ttl,
            min_interval,
        }
    }

    pub fn store(&mut self, hint: Hint, now: Instant) {
        self.latest = Some((hint, now));
    }

    /// Takes the stored hint if it is still fresh and the consumption
    /// interval has passed. A throttled hint stays stored.
    pub fn take_fresh(&mut self, now: Instant) -> Option<Hint> {
        let (_, received) = self.latest.as_ref()?;
        if now.saturating_duration_since(*received) > self.ttl {
            tracing::debug!("discarding expired hint");
            self.latest = None;
            return None;
        }
        if let Some(at) = self.last_consumed {
            if now.saturating_duration_since(at) < self.min_interval {
                return None;
            }
        }
        self.last_consumed = Some(now);
        self.latest.take().map(|(hint, _)| hint)
    }
}

/// Both halves of a connected advisor, as handed over by the transport.
#[derive(Debug)]
pub struct AdvisoryLink {
    pub outbound: mpsc::Sender<ClientMessage>,
    pub inbound: mpsc::Receiver<ServerMessage>,
}

/// Outbound side of the advisory connection.
///
/// Sends never wait: a full buffer drops the message and a closed one marks
/// the channel disconnected, after which the interview runs without hints.
#[derive(Debug, Default)]
pub struct AdvisoryChannel {
    outbound: Option<mpsc::Sender<ClientMessage>>,
}

impl AdvisoryChannel {
    pub fn new(outbound: mpsc::Sender<ClientMessage>) -> Self {
        Self {
            outbound: Some(outbound),
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.outbound.is_some()
    }

    pub fn send(&mut self, message: ClientMessage) {
        let Some(outbound) = &self.outbound else {
            return;
        };
        match outbound.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => tracing::warn!("advisory channel backed up, dropping message"),
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("advisory channel closed, continuing without hints");
                self.outbound = None;
            }
        }
    }

    pub fn init(&mut self, candidate: &CandidateSummary, personas: &[Persona]) {
        self.send(ClientMessage::Init {
            candidate: candidate.clone(),
            personas: personas.to_vec(),
        });
    }

    /// Mirrors one finalized transcript line.
    pub fn mirror(&mut self, record: &TurnRecord, persona_name: Option<&str>) {
        self.send(ClientMessage::TranscriptUpdate {
            speaker: record.speaker.to_string(),
            text: record.text.clone(),
            timestamp: record.at.timestamp_millis(),
            persona_name: persona_name.map(str::to_string),
        });
    }

    pub fn disconnect(&mut self) {
        self.outbound = None;
    }
}
