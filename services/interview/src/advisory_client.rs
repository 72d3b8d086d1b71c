use anyhow::{Context, Result};
use futures_util::{SinkExt, Stream, StreamExt};
use rehearse_core::advisory::{AdvisoryLink, ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

const CHANNEL_CAPACITY: usize = 64;

fn parse_server_message(text: &str) -> Option<ServerMessage> {
    match serde_json::from_str(text) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::warn!("ignoring malformed advisor message: {}", e);
            None
        }
    }
}

/// Relays advisor frames into `tx` until the socket or the receiver goes away.
async fn pump_inbound<S>(mut read: S, tx: mpsc::Sender<ServerMessage>)
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(message) = read.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(reason)) => {
                tracing::info!("advisor closed the connection: {:?}", reason);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!("advisor connection error: {}", e);
                break;
            }
        };
        if let Some(message) = parse_server_message(&text) {
            if tx.send(message).await.is_err() {
                break;
            }
        }
    }
}

/// Connects to the advisor and bridges the socket onto an `AdvisoryLink`.
///
/// Dropping either end of the link shuts the bridge down.
pub async fn connect(url: &str) -> Result<AdvisoryLink> {
    let (ws_stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to advisor at {url}"))?;
    let (mut write, read) = ws_stream.split();
    tracing::info!(%url, "connected to advisor");

    let (out_tx, mut out_rx) = mpsc::channel::<ClientMessage>(CHANNEL_CAPACITY);
    let (in_tx, in_rx) = mpsc::channel::<ServerMessage>(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("failed to serialize advisory message: {}", e);
                    continue;
                }
            };
            if let Err(e) = write.send(Message::Text(text)).await {
                tracing::warn!("advisor send failed: {}", e);
                break;
            }
        }
        let _ = write.close().await;
    });

    tokio::spawn(pump_inbound(read, in_tx));

    Ok(AdvisoryLink {
        outbound: out_tx,
        inbound: in_rx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[test]
    fn test_parse_server_message() {
        assert!(matches!(
            parse_server_message(r#"{"type":"initialized"}"#),
            Some(ServerMessage::Initialized)
        ));
        assert!(parse_server_message(r#"{"type":"unknown"}"#).is_none());
        assert!(parse_server_message("not json").is_none());
    }

    #[tokio::test]
    async fn test_pump_skips_bad_frames_and_stops_at_close() {
        let frames = vec![
            Ok(Message::Text("garbage".to_string())),
            Ok(Message::Ping(vec![1])),
            Ok(Message::Text(r#"{"type":"time_update","remainingSeconds":120,"phase":"active"}"#.to_string())),
            Ok(Message::Close(None)),
            Ok(Message::Text(r#"{"type":"initialized"}"#.to_string())),
        ];
        let (tx, mut rx) = mpsc::channel(8);
        pump_inbound(stream::iter(frames), tx).await;

        assert!(matches!(
            rx.recv().await,
            Some(ServerMessage::TimeUpdate {
                remaining_seconds: 120,
                ..
            })
        ));
        assert!(rx.recv().await.is_none());
    }
}
