use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use gemini_realtime::types::{ServerEvent, Setup};
use gemini_realtime::{Client, ServerRx};
#[cfg(test)]
use mockall::automock;
use rehearse_core::generic_types::{LiveSessionConfig, MediaChunk, ProviderEvent};
use rehearse_core::playback::AudioChunk;
use rehearse_core::realtime_api::{LiveConnection, LiveSession, SpeechProvider};
use rehearse_native_utils::audio::decode_base64;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

const CHANNEL_CAPACITY: usize = 1024;

/// The slice of the Gemini client the session adapter relies on.
#[cfg_attr(test, automock)]
pub trait LiveClient: Send {
    fn send_media(&self, mime_type: &str, bytes: &[u8]) -> Result<()>;
    fn send_context(&self, text: &str) -> Result<()>;
    fn close(&mut self);
}

impl LiveClient for Client {
    fn send_media(&self, mime_type: &str, bytes: &[u8]) -> Result<()> {
        Client::send_media(self, mime_type, bytes)
    }

    fn send_context(&self, text: &str) -> Result<()> {
        Client::send_context(self, text)
    }

    fn close(&mut self) {
        Client::close(self)
    }
}

/// Maps one Gemini event onto the provider-neutral vocabulary.
/// Returns `None` for events the orchestrator has no use for.
pub fn translate(event: ServerEvent) -> Option<ProviderEvent> {
    match event {
        ServerEvent::Audio { mime_type, data } => match decode_base64(&data) {
            Ok(bytes) => Some(ProviderEvent::Audio(AudioChunk(bytes))),
            Err(e) => {
                tracing::warn!(%mime_type, "skipping audio fragment: {}", e);
                None
            }
        },
        ServerEvent::OutputTranscription(text) | ServerEvent::Text(text) => Some(ProviderEvent::TextDelta(text)),
        ServerEvent::InputTranscription(text) => Some(ProviderEvent::InputTranscript(text)),
        ServerEvent::Interrupted => Some(ProviderEvent::Interrupted),
        ServerEvent::TurnComplete => Some(ProviderEvent::TurnComplete),
        ServerEvent::GoAway { time_left } => {
            tracing::warn!(?time_left, "provider is about to drop the session");
            None
        }
        ServerEvent::Close { reason } => {
            if let Some(reason) = reason {
                tracing::info!(%reason, "live session closed");
            }
            Some(ProviderEvent::Closed)
        }
        ServerEvent::SetupComplete => None,
    }
}

/// Forwards translated events until either side goes away.
async fn forward_events(mut server_rx: ServerRx, tx: mpsc::Sender<ProviderEvent>) {
    while let Some(event) = server_rx.recv().await {
        let Some(event) = translate(event) else {
            continue;
        };
        let closed = event == ProviderEvent::Closed;
        if tx.send(event).await.is_err() {
            tracing::debug!("provider event receiver dropped, stopping adapter task");
            return;
        }
        if closed {
            return;
        }
    }
    let _ = tx.send(ProviderEvent::Closed).await;
}

/// A persona's live Gemini session seen through the `LiveSession` trait.
pub struct GeminiSession<C: LiveClient> {
    client: Mutex<C>,
}

impl<C: LiveClient> GeminiSession<C> {
    pub fn new(client: C) -> Self {
        Self {
            client: Mutex::new(client),
        }
    }

    fn client(&self) -> Result<std::sync::MutexGuard<'_, C>> {
        self.client.lock().map_err(|_| anyhow!("live client lock poisoned"))
    }
}

#[async_trait]
impl<C: LiveClient + 'static> LiveSession for GeminiSession<C> {
    fn send_realtime_input(&self, media: MediaChunk) -> Result<()> {
        self.client()?.send_media(&media.mime_type, &media.data)
    }

    fn send_guidance(&self, text: &str) -> Result<()> {
        self.client()?.send_context(text)
    }

    async fn close(&self) -> Result<()> {
        self.client()?.close();
        Ok(())
    }
}

/// An adapter that implements the generic `SpeechProvider` trait on top of
/// `gemini_realtime`, opening one socket per persona activation.
pub struct GeminiProvider {
    api_key: String,
    model: Option<String>,
}

impl GeminiProvider {
    pub fn new(api_key: &str, model: Option<String>) -> Self {
        Self {
            api_key: api_key.to_string(),
            model,
        }
    }

    fn client_config(&self) -> gemini_realtime::Config {
        let builder = gemini_realtime::Config::builder().with_api_key(&self.api_key);
        match &self.model {
            Some(model) => builder.with_model(model).build(),
            None => builder.build(),
        }
    }
}

#[async_trait]
impl SpeechProvider for GeminiProvider {
    async fn connect(&self, config: LiveSessionConfig) -> Result<LiveConnection> {
        let client_config = self.client_config();
        let setup = Setup::voice(client_config.model(), &config.voice, &config.instructions)
            .with_transcription(config.transcribe_input, config.transcribe_output);
        let (client, server_rx) = gemini_realtime::connect_with_config(CHANNEL_CAPACITY, client_config, setup)
            .await
            .with_context(|| format!("Failed to open live session with voice {}", config.voice))?;

        let (tx, events) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(forward_events(server_rx, tx));

        Ok(LiveConnection {
            session: Arc::new(GeminiSession::new(client)),
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_maps_server_events() {
        assert_eq!(
            translate(ServerEvent::OutputTranscription("Hello".into())),
            Some(ProviderEvent::TextDelta("Hello".into()))
        );
        assert_eq!(
            translate(ServerEvent::InputTranscription("Hi".into())),
            Some(ProviderEvent::InputTranscript("Hi".into()))
        );
        assert_eq!(
            translate(ServerEvent::Audio {
                mime_type: "audio/pcm;rate=24000".into(),
                data: "AAABAA==".into(),
            }),
            Some(ProviderEvent::Audio(AudioChunk(vec![0, 0, 1, 0])))
        );
        assert_eq!(translate(ServerEvent::Interrupted), Some(ProviderEvent::Interrupted));
        assert_eq!(translate(ServerEvent::SetupComplete), None);
    }

    #[test]
    fn test_translate_skips_undecodable_audio() {
        let event = ServerEvent::Audio {
            mime_type: "audio/pcm".into(),
            data: "***".into(),
        };
        assert_eq!(translate(event), None);
    }

    #[tokio::test]
    async fn test_forward_events_ends_with_closed() {
        let (server_tx, server_rx) = mpsc::channel(8);
        let (tx, mut rx) = mpsc::channel(8);
        let task = tokio::spawn(forward_events(server_rx, tx));

        server_tx.send(ServerEvent::SetupComplete).await.unwrap();
        server_tx.send(ServerEvent::TurnComplete).await.unwrap();
        drop(server_tx);

        assert_eq!(rx.recv().await, Some(ProviderEvent::TurnComplete));
        assert_eq!(rx.recv().await, Some(ProviderEvent::Closed));
        task.await.unwrap();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_session_routes_calls_to_client() {
        let mut client = MockLiveClient::new();
        client
            .expect_send_media()
            .withf(|mime, bytes| mime == "audio/pcm;rate=16000" && bytes == &[1u8, 2][..])
            .times(1)
            .returning(|_, _| Ok(()));
        client
            .expect_send_context()
            .withf(|text| text == "Go deeper on caching.")
            .times(1)
            .returning(|_| Ok(()));
        client.expect_close().times(1).return_const(());

        let session = GeminiSession::new(client);
        session
            .send_realtime_input(MediaChunk {
                data: vec![1, 2],
                mime_type: "audio/pcm;rate=16000".into(),
            })
            .unwrap();
        session.send_guidance("Go deeper on caching.").unwrap();
        session.close().await.unwrap();
    }
}
