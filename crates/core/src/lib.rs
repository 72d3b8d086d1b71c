pub mod advisory;
pub mod conversation;
pub mod error;
pub mod generic_types;
pub mod handoff;
pub mod instructions;
pub mod orchestrator;
pub mod persona;
pub mod phase;
pub mod playback;
pub mod realtime_api;
pub mod reviewer;
pub mod session;
pub mod topic;
pub mod transcript;
pub mod turn_selector;

use conversation::{SessionExport, Speaker};
use phase::Phase;

/// Represents commands that the orchestrator issues to the presentation layer.
///
/// The core never renders anything itself; the runtime decides how each
/// command is shown.
#[derive(Debug, Clone)]
pub enum Command {
    /// A finalized transcript line, directives already removed.
    TranscriptLine {
        speaker: Speaker,
        display_name: String,
        text: String,
    },
    /// The turn still being spoken, as far as it has arrived. Complete and
    /// half-streamed `[PASS: ...]` directives are already hidden.
    InterimLine {
        speaker: Speaker,
        display_name: String,
        text: String,
    },
    /// A different persona now holds the floor.
    ActiveSpeaker { index: usize, name: String },
    /// Whether persona audio is currently playing.
    Speaking(bool),
    PhaseChanged { phase: Phase, remaining_secs: u64 },
    TimeUpdate { phase: Phase, remaining_secs: u64 },
    /// The call is over; the export is final.
    SessionEnded(Box<SessionExport>),
}
