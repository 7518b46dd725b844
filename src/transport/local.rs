use futures::{SinkExt, StreamExt};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::core::codec::{ClientCodec, ServerCodec};
use crate::error::constants::ERR_CONNECTION_CLOSED;
use crate::error::Result;
use crate::protocol::access::CallerIdentity;
use crate::protocol::dispatcher::EngineCore;
use crate::utils::metrics::Metrics;
use crate::utils::timeout::SHUTDOWN_POLL_INTERVAL;

/// Serve `engine` on the configured Unix socket until Ctrl-C.
#[instrument(skip(config, engine), fields(socket_path = %config.socket_path.display()))]
pub async fn serve(config: &ServerConfig, engine: Arc<EngineCore>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    serve_with_shutdown(config, engine, shutdown_rx).await
}

/// Serve `engine` until a message arrives on (or the sender of) `shutdown_rx`.
///
/// On shutdown the listener stops accepting, open connections finish the
/// request they are working on, and the socket file is removed.
#[instrument(skip(config, engine, shutdown_rx), fields(socket_path = %config.socket_path.display()))]
pub async fn serve_with_shutdown(
    config: &ServerConfig,
    engine: Arc<EngineCore>,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let path = config.socket_path.as_path();
    if path.exists() {
        tokio::fs::remove_file(path).await.ok();
    }

    let listener = UnixListener::bind(path)?;
    set_socket_mode(path, config.socket_mode)?;
    info!(
        path = %path.display(),
        commands = engine.registry().len(),
        aux = engine.has_aux(),
        "Listening on unix socket"
    );

    let metrics = engine.metrics().clone();
    let stopping = CancellationToken::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,

            accept_result = listener.accept() => {
                let stream = match accept_result {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        error!(error = %e, "Error accepting connection");
                        continue;
                    }
                };

                let active = metrics.connections_active.load(Ordering::Relaxed);
                if active >= config.max_connections as u64 {
                    metrics.connection_rejected();
                    warn!(active, limit = config.max_connections, "Connection limit reached, closing new connection");
                    drop(stream);
                    continue;
                }

                metrics.connection_established();
                let guard = ConnectionGuard(metrics.clone());
                tokio::spawn(handle_connection(stream, engine.clone(), stopping.child_token(), guard));
            }
        }
    }

    info!("Shutting down server. Waiting for connections to close...");
    drop(listener);
    stopping.cancel();
    drain(&metrics, config).await;

    if path.exists() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            error!(error = %e, path = %path.display(), "Failed to remove socket file");
        } else {
            info!(path = %path.display(), "Removed socket file");
        }
    }

    Ok(())
}

/// Open a framed client connection to an engine socket.
#[instrument(skip(path), fields(socket_path = %path.as_ref().display()))]
pub async fn connect<P: AsRef<Path>>(
    path: P,
    max_payload: usize,
) -> Result<Framed<UnixStream, ClientCodec>> {
    let stream = UnixStream::connect(path).await?;
    Ok(Framed::new(stream, ClientCodec::new(max_payload)))
}

fn set_socket_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

/// Decrements the active connection count when the connection task ends.
struct ConnectionGuard(Arc<Metrics>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.connection_closed();
    }
}

async fn drain(metrics: &Metrics, config: &ServerConfig) {
    let deadline = tokio::time::sleep(config.shutdown_timeout);
    tokio::pin!(deadline);

    loop {
        let connections = metrics.connections_active.load(Ordering::Relaxed);
        if connections == 0 {
            info!("All connections closed, shutting down");
            return;
        }
        tokio::select! {
            _ = &mut deadline => {
                warn!(connections, "Shutdown timeout reached, forcing exit");
                return;
            }
            _ = tokio::time::sleep(SHUTDOWN_POLL_INTERVAL) => {
                debug!(connections, "Waiting for connections to close");
            }
        }
    }
}

async fn handle_connection(
    stream: UnixStream,
    engine: Arc<EngineCore>,
    stopping: CancellationToken,
    _guard: ConnectionGuard,
) {
    let caller = match stream.peer_cred() {
        Ok(cred) => CallerIdentity::from_ucred(&cred),
        Err(e) => {
            warn!(error = %e, "Peer credentials unavailable, treating caller as anonymous");
            CallerIdentity::anonymous()
        }
    };
    debug!(uid = ?caller.uid, pid = ?caller.pid, "Connection accepted");

    let mut framed = Framed::new(stream, ServerCodec::new(engine.frame_limit()));

    loop {
        let next = tokio::select! {
            _ = stopping.cancelled() => break,
            next = framed.next() => next,
        };

        let request = match next {
            Some(Ok(request)) => request,
            Some(Err(e)) => {
                engine.metrics().frame_error();
                warn!(uid = ?caller.uid, error = %e, "Framing error, closing connection");
                break;
            }
            None => break,
        };

        // a disconnect mid-request is only noticed on the write
        let response = engine.handle(request, &caller).await;
        if let Err(e) = framed.send(response).await {
            debug!(error = %e, "Failed to write response");
            break;
        }
    }

    debug!(uid = ?caller.uid, "{ERR_CONNECTION_CLOSED}");
}
