use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Result, StreamError};

/// How often a blocked accept loop re-checks its running flag.
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A bound listener and the thread serving it.
pub(crate) struct Listening {
    pub local_addr: SocketAddr,
    pub thread: JoinHandle<()>,
}

impl Listening {
    /// Wait for the accept thread to exit. The listener socket is closed
    /// when the thread drops it.
    pub fn join(self, kind: &'static str) {
        if self.thread.join().is_err() {
            tracing::error!(kind, "accept thread panicked");
        }
    }
}

/// Bind a non-blocking listener on `ip:port`.
pub(crate) fn bind(ip: IpAddr, port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::new(ip, port);
    let listener = TcpListener::bind(addr).map_err(|source| StreamError::Bind { addr, source })?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Spawn a named accept thread running [`accept_loop`].
pub(crate) fn spawn<F>(name: &str, run: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    Ok(thread::Builder::new().name(name.to_string()).spawn(run)?)
}

/// Non-blocking TCP accept loop.
///
/// Checks `running` between accepts with a 50ms poll interval so that a
/// server's `stop()` can terminate it promptly. Accepted sockets are put
/// back in blocking mode with Nagle disabled before being handed over.
pub(crate) fn accept_loop<F>(
    listener: TcpListener,
    running: &AtomicBool,
    kind: &'static str,
    mut on_client: F,
) where
    F: FnMut(TcpStream, SocketAddr),
{
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = prepare(&stream) {
                    tracing::warn!(kind, %peer, error = %e, "failed to configure client socket");
                    continue;
                }
                on_client(stream, peer);
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(kind, error = %e, "TCP accept error");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }
    }
    tracing::debug!(kind, "accept loop exited");
}

fn prepare(stream: &TcpStream) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)
}
