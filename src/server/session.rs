//! Per-connection event handling for the hosting server.

use std::{net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, watch},
};
use tracing::{debug, info, warn};

use super::{
    cli::AppConfig,
    relay::{ConnectionId, Delivery, Relay, valid_filter},
};
use crate::{
    codec::ConnectReturnCode,
    connection::{ConnectAck, ConnectContext, Connection, ConnectionError, Event, PublishOptions},
};

/// Credential check applied to every CONNECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPolicy {
    username: Option<String>,
    password: Option<String>,
    allow_anonymous: bool,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            allow_anonymous: true,
        }
    }
}

impl ConnectPolicy {
    /// Build the policy from the configured credentials.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            username: config.username.clone(),
            password: config.password.clone(),
            allow_anonymous: config.allow_anonymous,
        }
    }

    /// Decide how to answer `ctx`.
    ///
    /// A client without a username is accepted only when anonymous access is
    /// allowed. When credentials are configured, a username or password that
    /// does not match them is refused as bad credentials.
    #[must_use]
    pub fn decide(&self, ctx: &ConnectContext) -> ConnectAck {
        let ack = ctx.ack();
        let auth = ctx.auth();
        let Some(username) = auth.username.as_deref() else {
            return if self.allow_anonymous { ack } else { ack.unauthorized() };
        };
        let Some(expected) = self.username.as_deref() else {
            return ack;
        };
        let password_ok = match (self.password.as_deref(), auth.password.as_deref()) {
            (None, _) => true,
            (Some(expected), Some(given)) => constant_time_eq(expected.as_bytes(), given),
            (Some(_), None) => false,
        };
        if username == expected && password_ok {
            ack
        } else {
            ack.with_bad_credentials()
        }
    }
}

/// Compare secrets without short-circuiting on the first differing byte.
///
/// Only the length comparison returns early.
fn constant_time_eq(expected: &[u8], given: &[u8]) -> bool {
    if expected.len() != given.len() {
        return false;
    }
    expected
        .iter()
        .zip(given)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

/// State shared by every connection of one server.
#[derive(Debug)]
pub(crate) struct ServerContext {
    pub(crate) relay: Relay,
    pub(crate) policy: ConnectPolicy,
    pub(crate) max_packet_size: usize,
}

impl ServerContext {
    pub(crate) fn from_config(config: &AppConfig) -> Self {
        Self {
            relay: Relay::default(),
            policy: ConnectPolicy::from_config(config),
            max_packet_size: config.max_packet_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// One client connection attached to the relay.
pub(crate) struct ConnectionSession<T> {
    conn: Connection<T>,
    peer: SocketAddr,
    id: ConnectionId,
    inbox: mpsc::Receiver<Delivery>,
    context: Arc<ServerContext>,
    connected: bool,
}

impl<T> ConnectionSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Register `conn` with the relay.
    pub(crate) fn new(conn: Connection<T>, peer: SocketAddr, context: Arc<ServerContext>) -> Self {
        let (id, inbox) = context.relay.register();
        Self {
            conn,
            peer,
            id,
            inbox,
            context,
            connected: false,
        }
    }

    /// Serve the connection until it ends or `shutdown` fires.
    ///
    /// The connection is removed from the relay on every exit path.
    pub(crate) async fn run(
        mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), ConnectionError> {
        let result = self.serve(shutdown).await;
        self.context.relay.unregister(self.id);
        info!(peer = %self.peer, client_id = ?self.conn.client_id(), "connection closed");
        result
    }

    async fn serve(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<(), ConnectionError> {
        loop {
            tokio::select! {
                event = self.conn.next_event() => {
                    let Some(event) = event else { break };
                    if self.handle_event(event).await? == Flow::Stop {
                        break;
                    }
                }
                Some(delivery) = self.inbox.recv() => {
                    self.conn
                        .publish(
                            delivery.topic,
                            delivery.message,
                            PublishOptions::with_qos(delivery.qos),
                        )
                        .await?;
                }
                _ = shutdown.changed() => break,
            }
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: Event) -> Result<Flow, ConnectionError> {
        match event {
            Event::Error(e) => {
                warn!(peer = %self.peer, error = %e, "protocol error");
                return Ok(Flow::Stop);
            }
            Event::Connect(ctx) => return self.handle_connect(&ctx).await,
            _ if !self.connected => {
                warn!(peer = %self.peer, "packet received before connect");
                return Ok(Flow::Stop);
            }
            Event::Publish(ctx) => {
                let delivered =
                    self.context
                        .relay
                        .route(ctx.topic(), ctx.message(), ctx.options().qos);
                debug!(topic = ctx.topic(), delivered, "publish routed");
                self.conn.ack(ctx.ack()).await?;
            }
            Event::Subscribe(ctx) => {
                for (filter, options) in ctx.subscriptions() {
                    if valid_filter(filter) {
                        self.context.relay.subscribe(self.id, filter, options.qos);
                    } else {
                        warn!(peer = %self.peer, filter = filter.as_str(), "malformed topic filter refused");
                    }
                }
                self.conn.ack(ctx.ack_where(valid_filter)).await?;
            }
            Event::Unsubscribe(ctx) => {
                for filter in ctx.unsubscriptions() {
                    self.context.relay.unsubscribe(self.id, filter);
                }
                self.conn.ack(ctx.ack()).await?;
            }
        }
        Ok(Flow::Continue)
    }

    async fn handle_connect(&mut self, ctx: &ConnectContext) -> Result<Flow, ConnectionError> {
        if self.connected {
            warn!(peer = %self.peer, client_id = ctx.client_id(), "second connect on one connection");
            return Ok(Flow::Stop);
        }
        let ack = self.context.policy.decide(ctx);
        let return_code = ack.return_code();
        self.conn.ack(ack.into()).await?;
        if return_code != ConnectReturnCode::Accepted {
            warn!(
                peer = %self.peer,
                client_id = ctx.client_id(),
                ?return_code,
                "connect refused"
            );
            return Ok(Flow::Stop);
        }
        info!(peer = %self.peer, client_id = ctx.client_id(), "client connected");
        self.connected = true;
        Ok(Flow::Continue)
    }
}
