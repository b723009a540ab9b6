//! Per-connection protocol handler
//!
//! Each websocket connection runs one reader task plus a writer task and,
//! once authenticated, two forwarder tasks (document broadcasts, presence
//! events). The state machine is `Unauthenticated -> Authenticated`; the
//! auth gate, permission checks and routing to the document and presence
//! managers all live here, behind the framing the transport provides.
//!
//! Outbound delivery is a bounded buffer: a consumer that cannot keep up
//! is disconnected rather than allowed to stall a document's broadcast.

use crate::auth::{AuthGrant, AuthService};
use crate::core::config::Config;
use crate::protocol::{ClientMessage, PresenceEntry, ServerMessage};
use crate::server::manager::DocumentManager;
use crate::server::presence::{PresenceEvent, PresenceManager};
use crate::system::metrics::{Metrics, Timer};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// Everything a connection needs, injected by the server
pub struct ConnectionContext {
    /// The document this connection is attached to
    pub document_id: String,
    /// Document table
    pub manager: Arc<DocumentManager>,
    /// Presence channel
    pub presence: Arc<PresenceManager>,
    /// Authentication capability
    pub auth: Arc<dyn AuthService>,
    /// Engine configuration
    pub config: Arc<Config>,
}

struct Connection {
    id: String,
    ctx: ConnectionContext,
    grant: Option<AuthGrant>,
    outbound: mpsc::Sender<ServerMessage>,
    close: watch::Sender<bool>,
    forwarders: Vec<JoinHandle<()>>,
}

/// Drive one websocket connection to completion
pub async fn run_connection(socket: WebSocket, ctx: ConnectionContext) {
    let metrics = Metrics::global();
    metrics.connections.total.inc();
    metrics.connections.active.inc();
    let duration = Timer::start(metrics.connections.duration.clone());

    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(ctx.config.server.outbound_buffer);
    let (close_tx, mut close_rx) = watch::channel(false);

    let writer: JoinHandle<()> = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if sink.send(Message::Text(message.encode())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut conn = Connection {
        id: uuid::Uuid::new_v4().to_string(),
        ctx,
        grant: None,
        outbound: out_tx,
        close: close_tx,
        forwarders: Vec::new(),
    };

    let mut liveness = tokio::time::interval(conn.ctx.config.ping_interval());
    liveness.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let timeout = conn.ctx.config.connection_timeout();
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    last_seen = Instant::now();
                    if conn.handle_frame(&text).await.is_break() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {
                    // Binary frames are not part of the protocol; transport
                    // pings already refresh liveness.
                    last_seen = Instant::now();
                }
                Some(Err(err)) => {
                    metrics.connections.errors.inc();
                    tracing::debug!(connection = %conn.id, %err, "transport error");
                    break;
                }
            },
            _ = close_rx.changed() => break,
            _ = liveness.tick() => {
                if last_seen.elapsed() > timeout {
                    tracing::debug!(connection = %conn.id, "liveness timeout");
                    break;
                }
            }
        }
    }

    conn.shutdown().await;
    // The writer drains and exits once every sender is gone
    drop(conn);
    let _ = writer.await;
    metrics.connections.active.dec();
    duration.finish();
}

impl Connection {
    /// Handle one decoded frame; `Break` closes the connection
    async fn handle_frame(&mut self, text: &str) -> ControlFlow<()> {
        let message = match ClientMessage::decode(text) {
            Ok(message) => message,
            Err(err) => {
                Metrics::global().connections.errors.inc();
                tracing::warn!(connection = %self.id, %err, "malformed frame, closing");
                return ControlFlow::Break(());
            }
        };

        match message {
            ClientMessage::Ping => self.send(ServerMessage::Pong),
            ClientMessage::Auth { token } => self.handle_auth(&token).await,
            ClientMessage::Submit { transaction } => self.handle_submit(transaction).await,
            ClientMessage::RequestSnapshot => {
                if self.grant.is_some() {
                    let doc = self.ctx.manager.document(&self.ctx.document_id).await;
                    let snapshot = doc.snapshot().await;
                    self.send(snapshot)
                } else {
                    ControlFlow::Continue(())
                }
            }
            ClientMessage::PresenceSet { data } => {
                if let Some(grant) = &self.grant {
                    if self.ctx.config.presence.enabled {
                        self.ctx.presence.set(
                            &self.ctx.document_id,
                            &self.id,
                            PresenceEntry { data, user_id: Some(grant.user_id.clone()) },
                        );
                    }
                }
                ControlFlow::Continue(())
            }
            ClientMessage::PresenceClear => {
                if self.grant.is_some() {
                    self.ctx.presence.remove(&self.ctx.document_id, &self.id);
                }
                ControlFlow::Continue(())
            }
        }
    }

    async fn handle_auth(&mut self, token: &str) -> ControlFlow<()> {
        match self.ctx.auth.authenticate(token, &self.ctx.document_id).await {
            Ok(grant) => {
                let result = ServerMessage::AuthResult {
                    success: true,
                    user_id: Some(grant.user_id.clone()),
                    permission: Some(grant.permission),
                    error: None,
                };
                let first_auth = self.grant.is_none();
                self.grant = Some(grant);
                if self.send(result).is_break() {
                    return ControlFlow::Break(());
                }
                if first_auth {
                    self.start_subscriptions().await;
                    if self.ctx.config.presence.enabled {
                        let presences = self.ctx.presence.snapshot(&self.ctx.document_id);
                        let snapshot = ServerMessage::PresenceSnapshot {
                            self_id: self.id.clone(),
                            presences: presences
                                .into_iter()
                                .filter(|(id, _)| *id != self.id)
                                .collect(),
                        };
                        if self.send(snapshot).is_break() {
                            return ControlFlow::Break(());
                        }
                    }
                }
                ControlFlow::Continue(())
            }
            Err(err) => {
                // The connection stays open for another attempt
                self.send(ServerMessage::AuthResult {
                    success: false,
                    user_id: None,
                    permission: None,
                    error: Some(err.to_string()),
                })
            }
        }
    }

    async fn handle_submit(&mut self, transaction: crate::core::operation::Transaction) -> ControlFlow<()> {
        let transaction_id = transaction.id.clone();
        match &self.grant {
            None => self.send(ServerMessage::Error {
                transaction_id: Some(transaction_id),
                reason: "Not authenticated".to_string(),
            }),
            Some(grant) if !grant.permission.can_write() => self.send(ServerMessage::Error {
                transaction_id: Some(transaction_id),
                reason: "permission denied".to_string(),
            }),
            Some(_) => {
                let doc = self.ctx.manager.document(&self.ctx.document_id).await;
                match doc.submit(transaction).await {
                    // The accepted transaction reaches this connection
                    // through its subscription like everyone else's.
                    Ok(_version) => ControlFlow::Continue(()),
                    Err(err) => self.send(ServerMessage::Error {
                        transaction_id: Some(transaction_id),
                        reason: err.reason(),
                    }),
                }
            }
        }
    }

    /// Start the document and presence forwarders; their lifetimes are tied
    /// to this connection.
    async fn start_subscriptions(&mut self) {
        let doc = self.ctx.manager.document(&self.ctx.document_id).await;
        let mut doc_rx = doc.subscribe();
        let outbound = self.outbound.clone();
        let close = self.close.clone();
        let conn_id = self.id.clone();
        self.forwarders.push(tokio::spawn(async move {
            loop {
                match doc_rx.recv().await {
                    Ok(message) => {
                        if outbound.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(connection = %conn_id, skipped, "subscriber too slow, disconnecting");
                        let _ = close.send(true);
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));

        if self.ctx.config.presence.enabled {
            let mut presence_rx = self.ctx.presence.subscribe(&self.ctx.document_id);
            let outbound = self.outbound.clone();
            let close = self.close.clone();
            let conn_id = self.id.clone();
            self.forwarders.push(tokio::spawn(async move {
                loop {
                    match presence_rx.recv().await {
                        Ok(event) => {
                            // No echo: skip events this connection originated
                            let message = match event {
                                PresenceEvent::Update { id, entry } if id != conn_id => {
                                    ServerMessage::PresenceUpdate {
                                        id,
                                        data: entry.data,
                                        user_id: entry.user_id,
                                    }
                                }
                                PresenceEvent::Remove { id } if id != conn_id => {
                                    ServerMessage::PresenceRemove { id }
                                }
                                _ => continue,
                            };
                            if outbound.send(message).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            let _ = close.send(true);
                            break;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }));
        }
    }

    /// Enqueue one outbound frame; a full buffer closes the connection
    fn send(&self, message: ServerMessage) -> ControlFlow<()> {
        match self.outbound.try_send(message) {
            Ok(()) => ControlFlow::Continue(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(connection = %self.id, "outbound buffer full, disconnecting");
                ControlFlow::Break(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => ControlFlow::Break(()),
        }
    }

    /// Finalizers: subscriptions unregistered, presence cleared (with
    /// removal broadcasts), writer released.
    async fn shutdown(&mut self) {
        for task in self.forwarders.drain(..) {
            task.abort();
        }
        self.ctx.presence.remove(&self.ctx.document_id, &self.id);
    }
}
