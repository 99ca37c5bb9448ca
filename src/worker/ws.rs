//! Client WebSocket Listener
//!
//! Players connect here to join a game and receive lifecycle notices.
//! Text frames carry JSON and binary frames carry bincode; replies use the
//! encoding of the client's most recent frame.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use super::registry::{RegistryError, SessionRegistry};
use super::session::ClientSender;
use crate::core::id::{ClientId, GameId};
use crate::core::now_ms;
use crate::network::protocol::{ClientMessage, ErrorCode, JoinRequest, ServerError, ServerMessage};

/// Outbound queue depth per connection.
const OUTBOUND_QUEUE: usize = 64;

/// Listener errors.
#[derive(Debug, Error)]
pub enum ClientServerError {
    /// Socket failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Game and identity a connection joined as.
#[derive(Debug, Clone)]
struct Membership {
    game_id: GameId,
    client_id: ClientId,
}

/// Accepts client connections for one worker.
pub struct ClientServer {
    registry: Arc<RwLock<SessionRegistry>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ClientServer {
    /// Create a listener over a worker's registry.
    pub fn new(registry: Arc<RwLock<SessionRegistry>>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { registry, shutdown_tx }
    }

    /// Accept connections until [`shutdown`](Self::shutdown).
    #[instrument(skip_all, fields(addr = ?listener.local_addr().ok()))]
    pub async fn run(&self, listener: TcpListener) -> Result<(), ClientServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Client listener shutting down");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Stop accepting and close every connection.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let registry = self.registry.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_QUEUE);
            let binary = Arc::new(AtomicBool::new(false));

            let sender_binary = binary.clone();
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let Some(frame) = encode(&msg, sender_binary.load(Ordering::Relaxed)) else {
                        continue;
                    };
                    if ws_sender.send(frame).await.is_err() {
                        break;
                    }
                }
            });

            let mut membership: Option<Membership> = None;

            loop {
                tokio::select! {
                    frame = ws_receiver.next() => {
                        let decoded = match frame {
                            Some(Ok(Message::Text(text))) => {
                                binary.store(false, Ordering::Relaxed);
                                ClientMessage::from_json(&text).map_err(|e| e.to_string())
                            }
                            Some(Ok(Message::Binary(data))) => {
                                binary.store(true, Ordering::Relaxed);
                                ClientMessage::from_bytes(&data).map_err(|e| e.to_string())
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                debug!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            Some(Ok(_)) => continue,
                        };

                        match decoded {
                            Ok(msg) => {
                                handle_client_message(msg, &mut membership, &registry, &msg_tx).await;
                            }
                            Err(e) => {
                                debug!("Invalid message from {}: {}", addr, e);
                                reply_error(&msg_tx, ErrorCode::InvalidMessage, "Invalid message format").await;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            if let Some(m) = membership {
                registry.write().await.release(&m.game_id, &m.client_id, &msg_tx, now_ms());
            }
            // Let queued notices flush before the socket drops
            drop(msg_tx);
            let _ = sender_task.await;
            debug!("Client {} cleaned up", addr);
        });
    }
}

/// Wire frame for a message in the requested encoding.
fn encode(msg: &ServerMessage, binary: bool) -> Option<Message> {
    let frame = if binary {
        msg.to_bytes().map(Message::Binary).map_err(|e| e.to_string())
    } else {
        msg.to_json().map(Message::Text).map_err(|e| e.to_string())
    };
    match frame {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!("Failed to serialize message: {}", e);
            None
        }
    }
}

/// Client-facing code for a registry failure.
fn error_code(e: &RegistryError) -> ErrorCode {
    match e {
        RegistryError::GameNotFound(_) | RegistryError::WrongShard { .. } => ErrorCode::GameNotFound,
        RegistryError::Session(e) => e.code(),
        RegistryError::Config(_) => ErrorCode::InternalError,
    }
}

async fn reply_error(sender: &ClientSender, code: ErrorCode, message: impl Into<String>) {
    let _ = sender.send(ServerMessage::Error(ServerError::new(code, message))).await;
}

async fn handle_client_message(
    msg: ClientMessage,
    membership: &mut Option<Membership>,
    registry: &Arc<RwLock<SessionRegistry>>,
    sender: &ClientSender,
) {
    match msg {
        ClientMessage::Join(request) => {
            handle_join(request, membership, registry, sender).await;
        }
        ClientMessage::StartGame => {
            let Some(m) = membership.as_ref() else {
                reply_error(sender, ErrorCode::NotInGame, "join a game first").await;
                return;
            };
            let result = registry.write().await.request_start(&m.game_id, &m.client_id);
            if let Err(e) = result {
                reply_error(sender, error_code(&e), e.to_string()).await;
            }
        }
        ClientMessage::Ping { timestamp } => {
            let _ = sender
                .send(ServerMessage::Pong {
                    timestamp,
                    server_time: now_ms(),
                })
                .await;
        }
        ClientMessage::Leave => {
            if let Some(m) = membership.take() {
                registry.write().await.leave(&m.game_id, &m.client_id, now_ms());
                debug!(game_id = %m.game_id, client_id = %m.client_id, "client left");
            }
        }
    }
}

async fn handle_join(
    request: JoinRequest,
    membership: &mut Option<Membership>,
    registry: &Arc<RwLock<SessionRegistry>>,
    sender: &ClientSender,
) {
    let now = now_ms();
    let mut registry = registry.write().await;

    // One game per connection
    if let Some(previous) = membership.take() {
        registry.release(&previous.game_id, &previous.client_id, sender, now);
    }

    let result = registry.add_client(
        &request.game_id,
        request.client_id.clone(),
        request.username,
        request.last_turn,
        sender.clone(),
        now,
    );
    drop(registry);

    match result {
        Ok(_) => {
            *membership = Some(Membership {
                game_id: request.game_id,
                client_id: request.client_id,
            });
        }
        Err(e) => {
            debug!(game_id = %request.game_id, client_id = %request.client_id, "join refused: {}", e);
            reply_error(sender, error_code(&e), e.to_string()).await;
        }
    }
}
