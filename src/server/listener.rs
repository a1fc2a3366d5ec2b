//! TCP listener hosting MQTT connections.
//!
//! Each accepted socket is upgraded into a [`Connection`] and served on its
//! own task. Shutdown is broadcast to those tasks through a `watch` channel
//! and the listener waits for them to finish.

use std::{io, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
    task::{JoinError, JoinSet},
};
use tracing::{info, warn};

use super::{
    cli::AppConfig,
    session::{ConnectionSession, ServerContext},
};
use crate::{codec::MqttCodec, connection::Connection};

/// Bound listener ready to accept MQTT clients.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    context: Arc<ServerContext>,
}

impl Server {
    /// Validate `config` and bind its address.
    ///
    /// # Errors
    /// Returns an error when the configuration is invalid or the address
    /// cannot be bound.
    pub async fn bind(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let addr = config.bind_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        Ok(Self {
            listener,
            context: Arc::new(ServerContext::from_config(config)),
        })
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    /// Propagates the socket error if the address cannot be read.
    pub fn local_addr(&self) -> io::Result<SocketAddr> { self.listener.local_addr() }

    /// Accept clients until `shutdown` completes, then wait for every
    /// connection task to finish.
    ///
    /// Finished connection tasks are reaped while accepting. Accept failures
    /// are logged and the loop continues.
    pub async fn serve_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut join_set = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("shutdown signal received");
                    break;
                }
                res = self.listener.accept() => match res {
                    Ok((socket, peer)) => {
                        let context = Arc::clone(&self.context);
                        let mut rx = shutdown_rx.clone();
                        join_set.spawn(async move {
                            handle_client(socket, peer, context, &mut rx).await;
                        });
                    }
                    Err(e) => warn!(error = %e, "accept error"),
                },
                Some(res) = join_set.join_next(), if !join_set.is_empty() => log_task_exit(&res),
            }
        }

        shutdown_tx.send_replace(true);

        while let Some(res) = join_set.join_next().await {
            log_task_exit(&res);
        }
    }
}

fn log_task_exit(res: &Result<(), JoinError>) {
    if let Err(e) = res {
        warn!(error = %e, "connection task failed");
    }
}

async fn handle_client(
    socket: TcpStream,
    peer: SocketAddr,
    context: Arc<ServerContext>,
    shutdown: &mut watch::Receiver<bool>,
) {
    info!(peer = %peer, "accepted connection");
    let codec = MqttCodec::with_max_packet_size(context.max_packet_size);
    let conn = Connection::with_codec(socket, codec);
    if let Err(e) = ConnectionSession::new(conn, peer, context)
        .run(shutdown)
        .await
    {
        warn!(peer = %peer, error = %e, "connection error");
    }
}

/// Bind `config`, log the listening address, and serve until Ctrl-C or
/// SIGTERM.
///
/// # Errors
/// Returns an error if the configuration is invalid or the listener cannot
/// be bound.
pub async fn run(config: &AppConfig) -> Result<()> {
    let server = Server::bind(config).await?;
    info!(addr = %server.local_addr()?, "pubsub-mqtt listening");
    server.serve_until(shutdown_signal()).await;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    () = ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}
