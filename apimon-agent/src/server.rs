//! TCP command server: startup handshake and sequential accept loop.
//!
//! [`start`] spawns the long-lived server thread and blocks until that
//! thread reports exactly one of two outcomes over a one-shot channel: the
//! listening socket is bound, or the bind failed with a cause. The caller
//! never proceeds on an ambiguous or absent outcome.
//!
//! The accept loop is deliberately single-threaded: one connection at a
//! time, one request per connection, decode → dispatch → encode → close.
//! A malformed request is fatal to the whole server, not just the
//! connection: the listening socket is closed and the loop ends. The
//! close command tears the socket down only after its (empty) response
//! has been sent.

use apimon_common::{ResponseBatch, codec};
use std::io;
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Dispatch seam between the server loop and the embedding agent.
///
/// The loop is sequential, so implementations are never invoked
/// concurrently with themselves.
pub trait RequestHandler: Send + Sync + 'static {
    /// Produce the response for one decoded request.
    fn handle(&self, request: &str) -> ResponseBatch;

    /// Whether the listening socket should be torn down after the
    /// response to `request` has been sent.
    fn should_close(&self, request: &str) -> bool;
}

#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound (port in use or similar).
    #[error("failed to bind command server on port {port}: {source}")]
    StartFailure { port: u16, source: io::Error },

    /// The server thread could not be spawned at all.
    #[error("failed to spawn command server thread: {0}")]
    Spawn(io::Error),

    /// The server thread died before reporting a bind outcome. Indicates
    /// a panic in the thread's startup path; never occurs in normal
    /// operation.
    #[error("command server thread exited without reporting a bind outcome")]
    HandshakeBroken,
}

/// Handle to a running command server.
#[derive(Debug)]
pub struct CommandServer {
    port: u16,
    thread: JoinHandle<()>,
}

impl CommandServer {
    /// The bound port. Differs from the requested port only when the
    /// server was started on port 0 (OS-assigned).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the accept loop has terminated.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the accept loop to terminate (after a close command, a
    /// decode failure, or an I/O error).
    pub fn join(self) -> thread::Result<()> {
        self.thread.join()
    }
}

/// Start the command server on `port`, blocking until the dedicated
/// server thread reports the bind outcome.
///
/// On success the returned handle is independent of the caller: the
/// server thread owns the listening socket from here on. On bind failure
/// the thread has already exited without ever entering the accept loop.
pub fn start<H: RequestHandler>(port: u16, handler: Arc<H>) -> Result<CommandServer, ServerError> {
    let (outcome_tx, outcome_rx) = mpsc::sync_channel::<io::Result<u16>>(1);

    let thread = thread::Builder::new()
        .name("apimon-server".to_string())
        .spawn(move || {
            // Report the bind outcome before doing anything else
            // observable; the starter is blocked on the other end.
            let listener = match bind(port) {
                Ok((listener, bound)) => {
                    let _ = outcome_tx.send(Ok(bound));
                    listener
                }
                Err(err) => {
                    let _ = outcome_tx.send(Err(err));
                    return;
                }
            };
            serve(listener, handler.as_ref());
        })
        .map_err(ServerError::Spawn)?;

    match outcome_rx.recv() {
        Ok(Ok(bound)) => {
            info!("command server listening on port {bound}");
            Ok(CommandServer {
                port: bound,
                thread,
            })
        }
        Ok(Err(source)) => {
            error!("command server failed to bind port {port}: {source}");
            Err(ServerError::StartFailure { port, source })
        }
        Err(_) => Err(ServerError::HandshakeBroken),
    }
}

fn bind(port: u16) -> io::Result<(TcpListener, u16)> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))?;
    let bound = listener.local_addr()?.port();
    Ok((listener, bound))
}

/// Accept loop. Runs until the close command, a decode failure, or an
/// I/O error; the listening socket closes when the loop returns and the
/// listener drops.
fn serve<H: RequestHandler>(listener: TcpListener, handler: &H) {
    let port = listener.local_addr().map(|a| a.port()).unwrap_or_default();
    loop {
        let stream = match listener.accept() {
            Ok((stream, peer)) => {
                debug!("accepted controller connection from {peer} on port {port}");
                stream
            }
            Err(err) => {
                warn!("accept failed on port {port}, closing command server: {err}");
                break;
            }
        };

        match handle_connection(stream, handler) {
            Ok(close_requested) => {
                if close_requested {
                    info!("close command received, shutting down command server on port {port}");
                    break;
                }
            }
            Err(err) => {
                // Malformed or truncated request: fatal to the server,
                // not just the connection.
                error!("failed to serve controller request on port {port}: {err}");
                break;
            }
        }
    }
}

/// Serve exactly one request on `stream`. Returns whether the handler
/// asked for the listening socket to be closed afterwards.
fn handle_connection<H: RequestHandler>(
    mut stream: TcpStream,
    handler: &H,
) -> Result<bool, codec::CodecError> {
    let request: String = codec::decode(&mut stream)?;
    debug!("dispatching request {request:?}");

    let response = handler.handle(&request);
    codec::encode(&mut stream, &response)?;
    // The per-connection stream drops (and closes) before any socket
    // teardown, so the controller always sees the response first.
    drop(stream);

    Ok(handler.should_close(&request))
}
