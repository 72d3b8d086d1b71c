use thiserror::Error;

/// Failures surfaced by the live interview session.
///
/// Only `MediaUnavailable` is fatal to a call; everything else is logged and
/// the conversation carries on.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The microphone or camera could not be opened or permission was denied.
    #[error("media capture unavailable: {0}")]
    MediaUnavailable(String),

    /// The provider did not complete its setup handshake.
    #[error("session handshake failed: {0}")]
    Handshake(String),

    /// Another persona activation is still connecting.
    #[error("a persona activation is already in flight")]
    ActivationInFlight,

    #[error("a roster needs at least one persona")]
    NoPersonas,

    #[error("the call has already ended")]
    Ended,
}
