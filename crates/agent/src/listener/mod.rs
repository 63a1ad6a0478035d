// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session Server: accepts connections, authenticates callers and hands each
//! established session to its own task.
//!
//! A connection carries at most one job. Concurrent jobs arrive as concurrent
//! connections and share nothing but the read-only context below.

mod session;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use shield_engine::JobExecutor;
use shield_wire::{accept, with_timeout, AuthorizedKeys, Keypair, ProtocolError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

pub use session::MAX_CHANNELS;

/// Read-only state shared by every connection.
pub struct ListenCtx {
    /// The agent's static key, presented during the handshake.
    pub keypair: Keypair,
    /// Callers allowed to connect.
    pub authorized: AuthorizedKeys,
    pub executor: Arc<dyn JobExecutor>,
    pub handshake_timeout: Duration,
}

/// Accept loop for the agent's TCP socket.
pub struct Listener {
    tcp: TcpListener,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn new(tcp: TcpListener, ctx: Arc<ListenCtx>) -> Self {
        Self { tcp, ctx }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    /// Accept connections until `shutdown` fires, then wait for open
    /// sessions to finish. Running jobs are cancelled through the same token.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut sessions = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.tcp.accept() => match result {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(%addr, "set_nodelay failed: {e}");
                        }
                        let ctx = Arc::clone(&self.ctx);
                        let cancel = shutdown.child_token();
                        let span = info_span!("connection", %addr);
                        sessions.spawn(
                            async move {
                                if let Err(e) = handle_connection(stream, &ctx, cancel).await {
                                    log_connection_error(e);
                                }
                            }
                            .instrument(span),
                        );
                    }
                    Err(e) => error!("accept error: {e}"),
                },
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            }
        }

        if !sessions.is_empty() {
            info!(sessions = sessions.len(), "waiting for open sessions");
        }
        while sessions.join_next().await.is_some() {}
        info!("listener stopped");
    }
}

/// Authenticate one connection and serve its session.
pub(crate) async fn handle_connection<S>(
    stream: S,
    ctx: &ListenCtx,
    shutdown: CancellationToken,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let handshake = with_timeout(ctx.handshake_timeout, accept(stream, &ctx.keypair, &ctx.authorized));
    let secure = tokio::select! {
        result = handshake => result?,
        _ = shutdown.cancelled() => return Ok(()),
    };
    info!(peer = %secure.peer(), "session established");
    session::serve(secure, Arc::clone(&ctx.executor), shutdown).await
}

fn log_connection_error(e: ProtocolError) {
    match e {
        ProtocolError::ConnectionClosed => debug!("client disconnected"),
        ProtocolError::Timeout => warn!("handshake timed out"),
        ProtocolError::Unauthorized(key) => warn!(key = %key, "rejected unauthorized client"),
        ProtocolError::Noise(_) | ProtocolError::Handshake(_) => warn!("handshake failed: {e}"),
        _ => error!("connection error: {e}"),
    }
}

#[cfg(test)]
#[path = "../listener_tests.rs"]
mod tests;
