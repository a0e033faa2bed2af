//! IPC server.
//!
//! Listens on a local socket (unix domain socket, or loopback TCP where
//! unix sockets are unavailable), spawning one task per connection. Each
//! connection is a loop of length-framed JSON requests; protocol violations
//! and oversized frames drop the connection.

use eyre::Result;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::components::CompletionService;
use crate::daemon::DaemonHandle;
use crate::events::DaemonEvent;
use crate::protocol::{self, CompletionRequest, DebugRequest, DebugResponse, Frame, ProtocolError};
use crate::socket;

/// Run the IPC server.
///
/// This starts the server in the background and returns immediately. The
/// server shuts down when a ShutdownRequested event is received.
#[cfg(unix)]
pub async fn run_server(service: CompletionService, handle: DaemonHandle) -> Result<()> {
    use tokio::net::UnixListener;

    let socket_path = {
        let settings = handle.settings().await;
        socket::socket_path(&settings)
    };

    // A previous daemon that crashed leaves a stale socket file behind.
    if let Err(e) = std::fs::remove_file(&socket_path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("could not remove stale socket: {e}");
        }
    }

    let listener = UnixListener::bind(&socket_path)?;
    tracing::info!("listening on unix socket {socket_path:?}");

    let mut shutdown_rx = handle.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let service = service.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, service).await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!("accept failed: {e}");
                    }
                },
                _ = wait_for_shutdown(&mut shutdown_rx) => break,
            }
        }

        if let Err(e) = std::fs::remove_file(&socket_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to remove socket: {e}");
            }
        }
        tracing::info!("IPC server shut down");
    });

    Ok(())
}

/// Run the IPC server (loopback TCP version).
#[cfg(not(unix))]
pub async fn run_server(service: CompletionService, handle: DaemonHandle) -> Result<()> {
    use tokio::net::TcpListener;

    let port = handle.settings().await.tcp_port;
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!("listening on tcp port {port}");

    let mut shutdown_rx = handle.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let service = service.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, service).await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!("accept failed: {e}");
                    }
                },
                _ = wait_for_shutdown(&mut shutdown_rx) => break,
            }
        }
        tracing::info!("IPC server shut down");
    });

    Ok(())
}

async fn wait_for_shutdown(rx: &mut tokio::sync::broadcast::Receiver<DaemonEvent>) {
    loop {
        match rx.recv().await {
            Ok(DaemonEvent::ShutdownRequested) => break,
            Ok(_) => continue,
            Err(_) => break, // Channel closed
        }
    }
}

/// Serve one connection until EOF, a protocol violation, or a write error
/// (client disconnected - abandon the work).
async fn handle_connection<S>(stream: S, service: CompletionService)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    loop {
        match protocol::read_frame(&mut reader).await {
            Ok(None) => break,
            Ok(Some(Frame::Completion(payload))) => {
                let request: CompletionRequest = match serde_json::from_slice(&payload) {
                    Ok(request) => request,
                    Err(e) => {
                        tracing::warn!("invalid completion request, dropping connection: {e}");
                        break;
                    }
                };

                let response = service.complete(request).await;
                let Ok(bytes) = serde_json::to_vec(&response) else {
                    break;
                };
                if protocol::write_frame(&mut writer, false, &bytes).await.is_err() {
                    break;
                }
            }
            Ok(Some(Frame::Debug(payload))) => match serde_json::from_slice::<DebugRequest>(&payload)
            {
                Ok(request) => {
                    let response = service.debug(request).await;
                    let Ok(bytes) = serde_json::to_vec(&response) else {
                        break;
                    };
                    if protocol::write_frame(&mut writer, true, &bytes).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let response = DebugResponse {
                        success: false,
                        message: Some(format!("invalid debug request: {e}")),
                        ..Default::default()
                    };
                    if let Ok(bytes) = serde_json::to_vec(&response) {
                        let _ = protocol::write_frame(&mut writer, true, &bytes).await;
                    }
                    break;
                }
            },
            Err(ProtocolError::Oversize(len)) => {
                // no response for oversized frames
                tracing::warn!(len, "oversized frame, dropping connection");
                break;
            }
            Err(e) => {
                tracing::debug!("connection error: {e}");
                break;
            }
        }
    }
}
