use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::info;

use crate::fs::FileSystem;
use crate::http::connection::{Connection, ConnectionError};
use crate::server::ServerContext;

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not spin.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// A source of accepted stream connections.
pub trait Listener: Send {
    type Conn: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Waits for the next connection and returns it with a printable peer
    /// name. `Ok(None)` means the listener is closed for good.
    fn accept(&mut self) -> impl Future<Output = io::Result<Option<(Self::Conn, String)>>> + Send;
}

impl Listener for TcpListener {
    type Conn = TcpStream;

    async fn accept(&mut self) -> io::Result<Option<(TcpStream, String)>> {
        let listener: &TcpListener = self;
        let (socket, peer) = listener.accept().await?;
        Ok(Some((socket, peer.to_string())))
    }
}

pub async fn bind(addr: &str) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    info!("Listening on {}", addr);
    Ok(listener)
}

/// Accepts connections until `shutdown` reads `true` or the listener closes.
///
/// The flag is checked once per iteration, before each accept, so a call
/// already blocked in accept still hands over one more connection. Every
/// connection runs on its own task; connection tasks are never cancelled.
pub async fn serve<L, F>(
    mut listener: L,
    ctx: Arc<ServerContext<F>>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()>
where
    L: Listener,
    F: FileSystem,
{
    loop {
        if *shutdown.borrow() {
            info!("Server stopping");
            return Ok(());
        }

        let (socket, peer) = match listener.accept().await {
            Ok(Some(accepted)) => accepted,
            Ok(None) => {
                info!("Listener closed");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error accepting connection");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                continue;
            }
        };
        info!("Accepted connection from {}", peer);

        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            let mut conn = Connection::new(socket, ctx);
            match conn.run().await {
                Ok(()) => tracing::debug!(peer = %peer, "Connection closed"),
                Err(ConnectionError::ReadTimeout) => {
                    tracing::debug!(peer = %peer, "Connection timed out waiting for request")
                }
                Err(e) => tracing::error!("Connection error from {}: {}", peer, e),
            }
        });
    }
}

/// Runs [`serve`] but returns as soon as `shutdown` flips to `true`, even if
/// the loop is blocked in accept. Connection tasks already spawned keep running.
pub async fn serve_until_shutdown<L, F>(
    listener: L,
    ctx: Arc<ServerContext<F>>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()>
where
    L: Listener,
    F: FileSystem,
{
    let mut stop = shutdown.clone();

    tokio::select! {
        res = serve(listener, ctx, shutdown) => res,
        _ = async {
            // A dropped sender can never signal; keep serving.
            if stop.wait_for(|stopped| *stopped).await.is_err() {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Server stopping");
            Ok(())
        }
    }
}
