use crate::conversation::{Speaker, TurnRecord};
use chrono::{DateTime, Utc};

#[derive(Debug)]
struct PendingTurn {
    speaker: Speaker,
    text: String,
    started_at: DateTime<Utc>,
}

/// Merges streamed text fragments into finished transcript lines.
///
/// Providers resend the whole utterance so far with each fragment, so a
/// fragment that extends the buffer replaces it, an unseen fragment is
/// appended, and a repeat is dropped. A buffered turn is only finalized once a
/// different speaker starts talking.
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    pending: Option<PendingTurn>,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one fragment. Returns the previous speaker's finished turn when
    /// this fragment comes from someone else.
    pub fn push(&mut self, speaker: Speaker, delta: &str, at: DateTime<Utc>) -> Option<TurnRecord> {
        let delta = delta.trim();
        if delta.is_empty() {
            return None;
        }

        if let Some(pending) = self.pending.as_mut() {
            if pending.speaker == speaker {
                merge(&mut pending.text, delta);
                return None;
            }
        }

        let finished = self.flush();
        self.pending = Some(PendingTurn {
            speaker,
            text: delta.to_string(),
            started_at: at,
        });
        finished
    }

    /// Text buffered so far for `speaker`, if they hold the current turn.
    pub fn pending_text(&self, speaker: &Speaker) -> Option<&str> {
        self.pending
            .as_ref()
            .filter(|p| &p.speaker == speaker)
            .map(|p| p.text.as_str())
    }

    /// Finalizes whatever is buffered, regardless of speaker.
    pub fn flush(&mut self) -> Option<TurnRecord> {
        self.pending.take().and_then(|p| {
            let text = p.text.trim().to_string();
            (!text.is_empty()).then(|| TurnRecord {
                speaker: p.speaker,
                text,
                at: p.started_at,
            })
        })
    }
}

fn merge(buffer: &mut String, delta: &str) {
    if delta.starts_with(buffer.as_str()) && delta.len() > buffer.len() {
        buffer.clear();
        buffer.push_str(delta);
    } else if !buffer.contains(delta) {
        if !buffer.is_empty() {
            buffer.push(' ');
        }
        buffer.push_str(delta);
    } else {
        tracing::trace!("dropping duplicate transcript fragment");
    }
}
