//! Broadcast Transport (spec §4.9): a single persistent duplex channel. At
//! most one client is ever live — a new connection preempts any prior one
//! ("last-connection-wins"). No back-pressure: a full or absent outbound
//! channel silently drops the frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};

pub struct Transport {
    generation: AtomicU64,
    preempt: watch::Sender<u64>,
    outbound: Mutex<Option<mpsc::Sender<Message>>>,
}

impl Transport {
    pub fn new() -> Arc<Self> {
        let (preempt, _) = watch::channel(0);
        Arc::new(Self {
            generation: AtomicU64::new(0),
            preempt,
            outbound: Mutex::new(None),
        })
    }

    /// Registers `socket` as the sole active client, preempting whatever
    /// connection held that slot before it, and drives its send/receive loop
    /// until disconnect or preemption.
    pub async fn handle_connection(self: Arc<Self>, socket: WebSocket) {
        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.preempt.send(my_generation);

        let (mut sink, mut stream) = socket.split();
        let (tx, mut rx) = mpsc::channel::<Message>(64);
        *self.outbound.lock().await = Some(tx);

        let mut preempt_rx = self.preempt.subscribe();
        loop {
            tokio::select! {
                maybe_msg = rx.recv() => {
                    match maybe_msg {
                        Some(msg) => {
                            if sink.send(msg).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                Ok(()) = preempt_rx.changed() => {
                    if *preempt_rx.borrow() != my_generation {
                        tracing::debug!("transport: connection preempted by a newer client");
                        break;
                    }
                }
                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            tracing::warn!("transport: read error: {e}");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        let mut outbound = self.outbound.lock().await;
        if self.generation.load(Ordering::SeqCst) == my_generation {
            *outbound = None;
        }
    }

    /// Broadcasts a JSON envelope to the sole connected client, if any (spec
    /// §4.9). Returns whether a client was present to accept the frame — the
    /// scheduler treats this as delivery success/failure for retry purposes.
    pub async fn broadcast(&self, envelope: &impl Serialize) -> bool {
        let text = match serde_json::to_string(envelope) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("transport: failed to serialize envelope: {e}");
                return false;
            }
        };
        let outbound = self.outbound.lock().await;
        match outbound.as_ref() {
            Some(tx) => tx.try_send(Message::Text(text)).is_ok(),
            None => false,
        }
    }

    pub async fn has_client(&self) -> bool {
        self.outbound.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_without_a_client_reports_no_delivery() {
        let transport = Transport::new();
        let delivered = transport.broadcast(&serde_json::json!({"type": "notification"})).await;
        assert!(!delivered);
    }
}
