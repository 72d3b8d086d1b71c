use crate::error::SessionError;
use crate::generic_types::{LiveSessionConfig, MediaChunk, ProviderEvent};
use crate::session::MediaSender;
use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One open connection to the speech provider, bound to a single persona.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LiveSession: Send + Sync {
    /// Queues captured media for the provider. Must not block.
    fn send_realtime_input(&self, media: MediaChunk) -> Result<()>;

    /// Steers the running persona without reconnecting.
    fn send_guidance(&self, text: &str) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// A freshly opened session and the events it will produce.
pub struct LiveConnection {
    pub session: Arc<dyn LiveSession>,
    pub events: mpsc::Receiver<ProviderEvent>,
}

/// A trait abstracting the live speech provider, so the orchestrator can run
/// against Gemini or an in-memory fake through the same interface.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Opens a session and resolves once the provider has acknowledged setup.
    async fn connect(&self, config: LiveSessionConfig) -> Result<LiveConnection>;
}

/// Continuous inbound media (microphone, camera, or a recording).
///
/// Capture runs on its own and pushes into the sender without waiting on
/// anything the orchestrator does.
pub trait MediaCapture: Send {
    fn start(&mut self, sink: MediaSender) -> Result<(), SessionError>;
    fn stop(&mut self);
}
