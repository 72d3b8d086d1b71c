use crate::types::{self, ClientMessage, RealtimeInput, ServerEvent, ServerMessage, Setup};
use anyhow::{Context, Result, anyhow, bail};
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub mod config;
mod consts;

pub type ClientTx = mpsc::Sender<ClientMessage>;
pub type ServerRx = mpsc::Receiver<ServerEvent>;
type WsReader = futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Parses one frame. The Live endpoint sends JSON in both text and binary frames.
fn parse_frame(bytes: &[u8]) -> Result<Vec<ServerEvent>> {
    let message: ServerMessage =
        serde_json::from_slice(bytes).context("failed to deserialize server message")?;
    Ok(message.into_events())
}

async fn await_setup_complete(read: &mut WsReader) -> Result<()> {
    while let Some(message) = read.next().await {
        let bytes = match message.context("failed to read setup response")? {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(bin) => bin,
            Message::Close(reason) => bail!("connection closed during setup: {:?}", reason),
            _ => continue,
        };
        if parse_frame(&bytes)?.contains(&ServerEvent::SetupComplete) {
            return Ok(());
        }
    }
    bail!("connection ended before setup completed")
}

// Holds the outbound channel once connected.
pub struct Client {
    capacity: usize,
    config: config::Config,
    c_tx: Option<ClientTx>,
}

impl Client {
    fn new(capacity: usize, config: config::Config) -> Self {
        Self {
            capacity,
            config,
            c_tx: None,
        }
    }

    /// Opens the socket, sends `setup`, and waits for `setupComplete` before
    /// any other traffic is allowed.
    async fn connect(&mut self, setup: Setup) -> Result<ServerRx> {
        if self.c_tx.is_some() {
            return Err(anyhow!("already connected"));
        }

        let request = self.config.build_request()?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .context("failed to connect to the Live endpoint")?;
        let (mut write, mut read) = ws_stream.split();

        let setup = serde_json::to_string(&ClientMessage::Setup(setup))?;
        write
            .send(Message::Text(setup))
            .await
            .context("failed to send setup message")?;

        tokio::time::timeout(self.config.setup_timeout(), await_setup_complete(&mut read))
            .await
            .context("timed out waiting for setup to complete")??;
        tracing::info!(model = %self.config.model(), "live session setup complete");

        let (c_tx, mut c_rx) = mpsc::channel::<ClientMessage>(self.capacity);
        let (s_tx, s_rx) = mpsc::channel(self.capacity);
        self.c_tx = Some(c_tx);

        // Writer: forwards outbound messages until every sender is gone, then closes.
        tokio::spawn(async move {
            while let Some(message) = c_rx.recv().await {
                match serde_json::to_string(&message) {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("failed to send message: {}", e);
                            break;
                        }
                    }
                    Err(e) => tracing::error!("failed to serialize message: {}", e),
                }
            }
            if let Err(e) = write.close().await {
                tracing::debug!("close after writer shutdown failed: {}", e);
            }
        });

        // Reader: flattens server messages into events.
        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        break;
                    }
                    Ok(message) => message,
                };
                let bytes = match message {
                    Message::Text(text) => text.into_bytes(),
                    Message::Binary(bin) => bin,
                    Message::Close(reason) => {
                        tracing::info!("connection closed: {:?}", reason);
                        let _ = s_tx
                            .send(ServerEvent::Close {
                                reason: reason.map(|r| r.reason.to_string()),
                            })
                            .await;
                        break;
                    }
                    _ => continue,
                };
                match parse_frame(&bytes) {
                    Ok(events) => {
                        for event in events {
                            if s_tx.send(event).await.is_err() {
                                tracing::debug!("server event receiver dropped");
                                return;
                            }
                        }
                    }
                    Err(e) => tracing::warn!("{:#}", e),
                }
            }
            let _ = s_tx.send(ServerEvent::Close { reason: None }).await;
        });

        Ok(s_rx)
    }

    fn sender(&self) -> Result<&ClientTx> {
        self.c_tx.as_ref().ok_or_else(|| anyhow!("not connected"))
    }

    /// Queues a message without waiting. Fails if the outbound buffer is full.
    pub fn try_send(&self, message: ClientMessage) -> Result<()> {
        self.sender()?
            .try_send(message)
            .map_err(|e| anyhow!("failed to queue message: {}", e))
    }

    /// Streams raw media. Audio MIME types go out as audio, everything else as video frames.
    pub fn send_media(&self, mime_type: &str, bytes: &[u8]) -> Result<()> {
        let blob = types::Blob {
            mime_type: mime_type.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        };
        let input = if mime_type.starts_with("audio/") {
            RealtimeInput {
                audio: Some(blob),
                ..Default::default()
            }
        } else {
            RealtimeInput {
                video: Some(blob),
                ..Default::default()
            }
        };
        self.try_send(ClientMessage::RealtimeInput(input))
    }

    /// Adds a user-role text turn without asking for an immediate reply.
    pub fn send_context(&self, text: &str) -> Result<()> {
        self.try_send(ClientMessage::ClientContent(types::ClientContent {
            turns: vec![types::Content::text(Some("user"), text)],
            turn_complete: false,
        }))
    }

    /// Drops the outbound channel; the writer closes the socket once drained.
    pub fn close(&mut self) {
        self.c_tx = None;
    }
}

pub async fn connect_with_config(
    capacity: usize,
    config: config::Config,
    setup: Setup,
) -> Result<(Client, ServerRx)> {
    let mut client = Client::new(capacity, config);
    let events = client.connect(setup).await?;
    Ok((client, events))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_accepts_binary_json() {
        let events = parse_frame(br#"{"serverContent":{"turnComplete":true}}"#).unwrap();
        assert_eq!(events, vec![ServerEvent::TurnComplete]);
        assert!(parse_frame(b"not json").is_err());
    }

    #[test]
    fn test_unconnected_client_refuses_to_send() {
        let client = Client::new(4, config::Config::builder().with_api_key("k").build());
        assert!(client.send_media("audio/pcm;rate=16000", &[0, 0]).is_err());
        assert!(client.send_context("hello").is_err());
    }
}
