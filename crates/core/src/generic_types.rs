use crate::playback::AudioChunk;

/// Provider-agnostic settings for opening one persona's live session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSessionConfig {
    pub voice: String,
    pub instructions: String,
    /// Ask the provider to transcribe the participant's speech.
    pub transcribe_input: bool,
    /// Ask the provider to transcribe the persona's own speech.
    pub transcribe_output: bool,
}

impl LiveSessionConfig {
    pub fn new(voice: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            voice: voice.into(),
            instructions: instructions.into(),
            transcribe_input: true,
            transcribe_output: true,
        }
    }
}

/// Events any live speech provider can emit back to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// Transcript fragment of the persona's speech.
    TextDelta(String),
    /// Transcript fragment of the participant's speech.
    InputTranscript(String),
    Audio(AudioChunk),
    /// The participant barged in; drop whatever is still queued.
    Interrupted,
    TurnComplete,
    Error(String),
    Closed,
}

/// One piece of captured media on its way to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaChunk {
    pub data: Vec<u8>,
    pub mime_type: String,
}
