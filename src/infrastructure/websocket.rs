//! WebSocket transport for server-pushed balance changes.

use crate::domain::balance::{BalanceSource, WalletBalance};
use crate::domain::ports::PushTransport;
use crate::error::RemoteFault;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Frame sent by the server whenever the wallet total changes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceFrame {
    balance: Decimal,
    as_of_sequence: u64,
}

fn parse_frame(text: &str) -> Option<WalletBalance> {
    let frame: BalanceFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed push frame");
            return None;
        }
    };
    match WalletBalance::new(frame.balance, frame.as_of_sequence, BalanceSource::Push) {
        Ok(balance) => Some(balance),
        Err(e) => {
            tracing::warn!(error = %e, "skipping invalid push frame");
            None
        }
    }
}

pub struct WebSocketPushTransport {
    url: String,
}

impl WebSocketPushTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl PushTransport for WebSocketPushTransport {
    async fn connect(&self) -> Result<mpsc::Receiver<WalletBalance>, RemoteFault> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| RemoteFault::unreachable(format!("{}: {e}", self.url)))?;
        tracing::debug!(url = %self.url, "push socket open");

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let (mut write, mut read) = stream.split();
            loop {
                let message = tokio::select! {
                    _ = tx.closed() => break,
                    message = read.next() => message,
                };
                let Some(message) = message else { break };
                match message {
                    Ok(Message::Text(text)) => {
                        if let Some(balance) = parse_frame(&text) {
                            if tx.send(balance).await.is_err() {
                                // Receiver gone: the channel was disconnected.
                                break;
                            }
                        }
                    }
                    Ok(Message::Ping(data)) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "push socket error");
                        break;
                    }
                }
            }
            let _ = write.close().await;
        });

        Ok(rx)
    }
}
