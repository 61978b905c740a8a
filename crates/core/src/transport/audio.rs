use std::io::Write;
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use super::tcp::{self, Listening};
use crate::error::Result;
use crate::media::AudioSource;
use crate::protocol::AudioFormat;

/// Default chunk: 20 ms of the default format.
pub const DEFAULT_CHUNK_BYTES: usize = 1764;

/// Single-listener raw PCM server.
///
/// Each accepted connection gets its own session thread which opens a
/// fresh capture from the [`AudioSource`], pumps chunks to the socket until
/// the viewer disconnects, the capture ends or the server stops, and then
/// releases the capture. A new connection supersedes the current one: the
/// old session is ended and its capture released before the new one opens.
/// The new session waits for that release on its own thread, so a slow
/// [`AudioCapture::read`](crate::media::AudioCapture::read) delays the new
/// viewer's first bytes but never blocks accepting.
pub struct AudioServer {
    bind_ip: IpAddr,
    source: Arc<dyn AudioSource>,
    chunk_bytes: usize,
    running: Arc<AtomicBool>,
    client: Arc<Mutex<Option<AudioClient>>>,
    listening: Mutex<Option<Listening>>,
}

/// Handle on the live session, used to end it from other threads.
struct AudioClient {
    stream: TcpStream,
    peer: SocketAddr,
    active: Arc<AtomicBool>,
}

impl AudioClient {
    fn end(&self) {
        self.active.store(false, Ordering::SeqCst);
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl AudioServer {
    pub fn new(bind_ip: IpAddr, source: Arc<dyn AudioSource>) -> Self {
        Self {
            bind_ip,
            source,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            running: Arc::new(AtomicBool::new(false)),
            client: Arc::new(Mutex::new(None)),
            listening: Mutex::new(None),
        }
    }

    /// Bytes requested from the capture per read. Rounded down to whole
    /// 16-bit samples, minimum one sample.
    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = (chunk_bytes & !1).max(2);
        self
    }

    /// Size chunks to `format` and `duration`.
    pub fn with_chunk_duration(self, format: AudioFormat, duration: Duration) -> Self {
        self.with_chunk_bytes(format.chunk_bytes(duration))
    }

    /// Bind `bind_ip:port` and start accepting viewers. No-op if already
    /// listening.
    pub fn start(&self, port: u16) -> Result<()> {
        let mut listening = self.listening.lock();
        if listening.is_some() {
            tracing::debug!("audio server already listening");
            return Ok(());
        }

        let listener = tcp::bind(self.bind_ip, port)?;
        let local_addr = listener.local_addr()?;

        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let client = self.client.clone();
        let source = self.source.clone();
        let chunk_bytes = self.chunk_bytes;

        let thread = tcp::spawn("audio-accept", move || {
            let mut session: Option<JoinHandle<()>> = None;
            tcp::accept_loop(listener, &running, "audio", |stream, peer| {
                let ctx = SessionContext {
                    slot: client.clone(),
                    running: running.clone(),
                    source: source.clone(),
                    chunk_bytes,
                };
                ctx.supersede(&mut session, stream, peer);
            });
            if let Some(handle) = session.take() {
                join_session(handle);
            }
        });
        let thread = match thread {
            Ok(thread) => thread,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        tracing::info!(addr = %local_addr, chunk_bytes, "audio server listening");
        *listening = Some(Listening { local_addr, thread });
        Ok(())
    }

    /// End the current session, release its capture, and close the
    /// listener. Idempotent.
    pub fn stop(&self) {
        let mut listening = self.listening.lock();
        self.running.store(false, Ordering::SeqCst);

        if let Some(client) = self.client.lock().take() {
            tracing::debug!(peer = %client.peer, "ending audio session");
            client.end();
        }

        if let Some(listening) = listening.take() {
            let addr = listening.local_addr;
            // The accept thread joins the session thread before exiting.
            listening.join("audio");
            tracing::info!(%addr, "audio server stopped");
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

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listening.lock().as_ref().map(|l| l.local_addr)
    }

    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }
}

impl Drop for AudioServer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct SessionContext {
    slot: Arc<Mutex<Option<AudioClient>>>,
    running: Arc<AtomicBool>,
    source: Arc<dyn AudioSource>,
    chunk_bytes: usize,
}

impl SessionContext {
    /// Replace whatever session is live with one for `stream`.
    fn supersede(self, session: &mut Option<JoinHandle<()>>, stream: TcpStream, peer: SocketAddr) {
        if let Some(previous) = self.slot.lock().take() {
            tracing::info!(peer = %previous.peer, "replacing audio client");
            previous.end();
        }
        // Joined by the new session, not here, so a capture read in
        // progress never holds up accepting.
        let previous = session.take();

        let writer = match stream.try_clone() {
            Ok(writer) => writer,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "failed to clone audio client socket");
                *session = previous;
                return;
            }
        };
        let active = Arc::new(AtomicBool::new(true));
        {
            let mut guard = self.slot.lock();
            if !self.running.load(Ordering::SeqCst) {
                let _ = stream.shutdown(Shutdown::Both);
                *session = previous;
                return;
            }
            *guard = Some(AudioClient {
                stream,
                peer,
                active: active.clone(),
            });
        }
        tracing::info!(%peer, "audio client connected");

        let slot = self.slot.clone();
        let session_active = active.clone();
        let spawned = std::thread::Builder::new()
            .name("audio-session".to_string())
            .spawn(move || {
                // The old capture must be released before a new one is opened.
                if let Some(handle) = previous {
                    join_session(handle);
                }
                if session_active.load(Ordering::SeqCst) && self.running.load(Ordering::SeqCst) {
                    self.run(writer, peer, &session_active);
                } else {
                    tracing::debug!(%peer, "audio session superseded before capture opened");
                    let _ = writer.shutdown(Shutdown::Both);
                }
                // A newer session may already own the slot.
                take_if_current(&self.slot, &session_active);
            });
        match spawned {
            Ok(handle) => *session = Some(handle),
            Err(e) => {
                tracing::error!(%peer, error = %e, "failed to spawn audio session");
                if let Some(client) = take_if_current(&slot, &active) {
                    client.end();
                }
            }
        }
    }

    /// Session body: open the capture, pump chunks, release the capture.
    fn run(&self, mut writer: TcpStream, peer: SocketAddr, active: &AtomicBool) {
        let mut capture = match self.source.open() {
            Ok(capture) => capture,
            Err(e) => {
                tracing::error!(%peer, error = %e, "audio capture unavailable, closing session");
                let _ = writer.shutdown(Shutdown::Both);
                return;
            }
        };
        tracing::info!(%peer, "audio streaming started");

        let mut buf = vec![0u8; self.chunk_bytes];
        let mut sent: u64 = 0;
        let reason = loop {
            if !active.load(Ordering::SeqCst) || !self.running.load(Ordering::SeqCst) {
                break "stopped";
            }
            match capture.read(&mut buf) {
                Ok(0) => break "capture ended",
                Ok(n) => {
                    if let Err(e) = writer.write_all(&buf[..n.min(buf.len())]) {
                        tracing::debug!(%peer, error = %e, "audio write failed");
                        break "client disconnected";
                    }
                    sent += n as u64;
                }
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "audio capture read failed");
                    break "capture error";
                }
            }
        };

        drop(capture);
        let _ = writer.shutdown(Shutdown::Both);
        tracing::info!(%peer, reason, bytes = sent, "audio session ended");
    }
}

fn take_if_current(
    slot: &Mutex<Option<AudioClient>>,
    active: &Arc<AtomicBool>,
) -> Option<AudioClient> {
    let mut guard = slot.lock();
    if guard.as_ref().is_some_and(|c| Arc::ptr_eq(&c.active, active)) {
        guard.take()
    } else {
        None
    }
}

fn join_session(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        tracing::error!("audio session thread panicked");
    }
}
