use std::io::{self, BufWriter, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::tcp::{self, Listening};
use crate::error::Result;
use crate::media::Rotation;
use crate::protocol::{END_OF_STREAM, FrameHeader, HEADER_LEN};

/// Default bound on a single blocking write to the viewer.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on the end-of-stream write during shutdown.
const EOS_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Single-viewer video server.
///
/// Accepts TCP connections on a background thread and writes one
/// length-prefixed record per [`send_frame`](Self::send_frame) call to the
/// most recently connected viewer. A new connection replaces the previous
/// one. On [`stop`](Self::stop) the viewer receives the end-of-stream
/// sentinel before the connection is closed.
///
/// The accept, send and stop paths all serialize on one client lock, so a
/// record is never interleaved with another or cut by a replacement.
pub struct VideoServer {
    bind_ip: IpAddr,
    write_timeout: Option<Duration>,
    running: Arc<AtomicBool>,
    client: Arc<Mutex<Option<VideoClient>>>,
    listening: Mutex<Option<Listening>>,
}

struct VideoClient {
    writer: BufWriter<TcpStream>,
    peer: SocketAddr,
}

impl VideoClient {
    fn write_record(&mut self, header: FrameHeader, payload: &[u8]) -> io::Result<()> {
        self.writer.write_all(&header.encode())?;
        self.writer.write_all(payload)?;
        self.writer.flush()
    }

    /// Shut the socket down before the writer is dropped, so the drop-time
    /// flush cannot block on a stalled peer.
    fn close(self) {
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }
}

impl VideoServer {
    pub fn new(bind_ip: IpAddr) -> Self {
        Self {
            bind_ip,
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
            running: Arc::new(AtomicBool::new(false)),
            client: Arc::new(Mutex::new(None)),
            listening: Mutex::new(None),
        }
    }

    /// Bound each blocking write to the viewer. A write that times out
    /// drops the viewer. `None` waits indefinitely.
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Bind `bind_ip:port` and start accepting viewers.
    ///
    /// Port `0` picks an ephemeral port; see [`local_addr`](Self::local_addr).
    /// Calling `start` on a listening server is a no-op.
    pub fn start(&self, port: u16) -> Result<()> {
        let mut listening = self.listening.lock();
        if listening.is_some() {
            tracing::debug!("video server already listening");
            return Ok(());
        }

        let listener = tcp::bind(self.bind_ip, port)?;
        let local_addr = listener.local_addr()?;

        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let client = self.client.clone();
        let write_timeout = self.write_timeout;

        let thread = tcp::spawn("video-accept", move || {
            tcp::accept_loop(listener, &running, "video", |stream, peer| {
                install_client(&client, &running, stream, peer, write_timeout);
            });
        });
        let thread = match thread {
            Ok(thread) => thread,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        tracing::info!(addr = %local_addr, "video server listening");
        *listening = Some(Listening { local_addr, thread });
        Ok(())
    }

    /// Write one frame record to the current viewer.
    ///
    /// Does nothing when no viewer is connected or the payload is empty.
    /// A failed write drops the viewer; the error is logged, never returned.
    /// Returns whether a record was delivered.
    pub fn send_frame(&self, payload: &[u8], rotation: Rotation) -> bool {
        if payload.is_empty() || !self.running.load(Ordering::Acquire) {
            return false;
        }
        let Ok(size) = u32::try_from(payload.len()) else {
            tracing::warn!(bytes = payload.len(), "frame too large for record header, skipped");
            return false;
        };

        let mut guard = self.client.lock();
        let Some(client) = guard.as_mut() else {
            return false;
        };

        match client.write_record(FrameHeader::new(size, rotation), payload) {
            Ok(()) => {
                tracing::trace!(bytes = HEADER_LEN + payload.len(), "frame sent");
                true
            }
            Err(e) => {
                tracing::warn!(peer = %client.peer, error = %e, "video client dropped after write failure");
                if let Some(client) = guard.take() {
                    client.close();
                }
                false
            }
        }
    }

    /// Stop accepting, send end-of-stream to the viewer, close it, and
    /// close the listener. Idempotent.
    pub fn stop(&self) {
        let mut listening = self.listening.lock();
        self.running.store(false, Ordering::SeqCst);

        if let Some(mut client) = self.client.lock().take() {
            let _ = client
                .writer
                .get_ref()
                .set_write_timeout(Some(EOS_WRITE_TIMEOUT));
            match client.write_record(END_OF_STREAM, &[]) {
                Ok(()) => tracing::debug!(peer = %client.peer, "end-of-stream sent"),
                Err(e) => {
                    tracing::warn!(peer = %client.peer, error = %e, "failed to send end-of-stream")
                }
            }
            client.close();
        }

        if let Some(listening) = listening.take() {
            let addr = listening.local_addr;
            listening.join("video");
            tracing::info!(%addr, "video server stopped");
        }
    }

    pub fn is_listening(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn has_client(&self) -> bool {
        self.client.lock().is_some()
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client.lock().as_ref().map(|c| c.peer)
    }

    /// Address actually bound, while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listening.lock().as_ref().map(|l| l.local_addr)
    }
}

impl Drop for VideoServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn install_client(
    slot: &Mutex<Option<VideoClient>>,
    running: &AtomicBool,
    stream: TcpStream,
    peer: SocketAddr,
    write_timeout: Option<Duration>,
) {
    if let Err(e) = stream.set_write_timeout(write_timeout) {
        tracing::warn!(%peer, error = %e, "failed to set write timeout");
    }

    let mut guard = slot.lock();
    // stop() may have run between accept and here.
    if !running.load(Ordering::SeqCst) {
        let _ = stream.shutdown(Shutdown::Both);
        return;
    }
    if let Some(previous) = guard.take() {
        tracing::info!(peer = %previous.peer, "replacing video client");
        previous.close();
    }
    *guard = Some(VideoClient {
        writer: BufWriter::with_capacity(64 * 1024, stream),
        peer,
    });
    tracing::info!(%peer, "video client connected");
}

#[cfg(test)]
mod tests {
    use std::io::{ErrorKind, Read};
    use std::net::Ipv4Addr;
    use std::thread;
    use std::time::Instant;

    use super::*;

    fn viewer(server: &VideoServer) -> TcpStream {
        let stream = TcpStream::connect(server.local_addr().unwrap()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(3);
        while !server.has_client() {
            assert!(Instant::now() < deadline, "viewer never installed");
            thread::sleep(Duration::from_millis(10));
        }
        stream
    }

    /// Run `f` on the server-side socket of the current viewer.
    fn with_viewer_socket(server: &VideoServer, f: impl FnOnce(&TcpStream)) {
        let guard = server.client.lock();
        f(guard.as_ref().unwrap().writer.get_ref());
    }

    #[test]
    fn stop_completes_when_end_of_stream_write_fails() {
        let server = VideoServer::new(Ipv4Addr::LOCALHOST.into());
        server.start(0).unwrap();
        let mut viewer = viewer(&server);

        // Writes on a socket shut down for writing fail immediately.
        with_viewer_socket(&server, |s| s.shutdown(Shutdown::Write).unwrap());

        server.stop();
        assert!(!server.is_listening());
        assert!(!server.has_client());
        assert!(server.local_addr().is_none());

        viewer.set_read_timeout(Some(Duration::from_secs(3))).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(viewer.read(&mut buf).unwrap(), 0, "no end-of-stream record expected");
    }

    #[test]
    fn stop_is_bounded_when_viewer_stalls() {
        let server = VideoServer::new(Ipv4Addr::LOCALHOST.into());
        server.start(0).unwrap();
        let _stalled = viewer(&server);

        // Fill the socket buffers so the end-of-stream write can only time out.
        with_viewer_socket(&server, |s| {
            s.set_nonblocking(true).unwrap();
            let chunk = vec![0u8; 64 * 1024];
            let mut s = s;
            loop {
                match s.write(&chunk) {
                    Ok(_) => {}
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) => panic!("unexpected write error: {e}"),
                }
            }
            s.set_nonblocking(false).unwrap();
        });

        let started = Instant::now();
        server.stop();
        let took = started.elapsed();

        assert!(took < EOS_WRITE_TIMEOUT * 3, "stop took {took:?}");
        assert!(!server.is_listening());
        assert!(!server.has_client());
    }
}
