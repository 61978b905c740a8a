use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use parking_lot::{Mutex, RwLock};

use crate::config::{StreamConfig, TransportMode};
use crate::discovery::{AddressResolver, LocalAddressResolver, NoopAdvertiser, ServiceAdvertiser};
use crate::error::{Result, StreamError};
use crate::events::{EventSink, StreamEvent, TracingSink};
use crate::media::tone::ToneSource;
use crate::media::{AudioSource, Rotation};
use crate::transport::{AudioServer, VideoServer};

/// Where a viewer should connect for the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    pub host: String,
    pub video_port: u16,
    pub audio_port: u16,
}

impl fmt::Display for StreamEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} (audio {})", self.host, self.video_port, self.audio_port)
    }
}

/// Servers created for one streaming session.
struct Session {
    video: Arc<VideoServer>,
    audio: AudioServer,
    endpoint: StreamEndpoint,
}

/// Starts and stops the video and audio servers together and drives
/// service advertisement.
///
/// Streaming state changes only through explicit calls; socket events
/// never flip it. Servers are created on each start so no state survives
/// a restart.
///
/// ```no_run
/// use phonecam::{StreamConfig, StreamController};
/// use phonecam::media::Rotation;
///
/// let controller = StreamController::builder(StreamConfig::default()).build();
/// controller.start_streaming();
/// controller.process_frame(&[0xFF, 0xD8, 0xFF, 0xD9], Rotation::Deg90);
/// controller.stop_streaming();
/// ```
pub struct StreamController {
    config: Mutex<StreamConfig>,
    audio_source: Arc<dyn AudioSource>,
    advertiser: Arc<dyn ServiceAdvertiser>,
    resolver: Arc<dyn AddressResolver>,
    events: Arc<dyn EventSink>,
    streaming: AtomicBool,
    session: RwLock<Option<Session>>,
    /// Serializes start and stop.
    lifecycle: Mutex<()>,
}

impl StreamController {
    pub fn builder(config: StreamConfig) -> StreamControllerBuilder {
        StreamControllerBuilder::new(config)
    }

    pub fn toggle_streaming(&self) {
        if self.is_streaming() {
            self.stop_streaming();
        } else {
            self.start_streaming();
        }
    }

    /// Mark streaming and bring up both servers.
    ///
    /// Failures (port in use, advertisement refused) are reported as error
    /// events; the controller stays in the streaming state regardless.
    pub fn start_streaming(&self) {
        let _lifecycle = self.lifecycle.lock();
        if self.streaming.swap(true, Ordering::SeqCst) {
            tracing::debug!("already streaming");
            return;
        }

        let config = self.config.lock().clone();
        let (bind_ip, host): (IpAddr, String) = match config.mode {
            TransportMode::Usb => (Ipv4Addr::LOCALHOST.into(), Ipv4Addr::LOCALHOST.to_string()),
            TransportMode::Network => (Ipv4Addr::UNSPECIFIED.into(), self.resolver.address()),
        };
        tracing::info!(mode = %config.mode, %bind_ip, "starting stream");

        let video = Arc::new(VideoServer::new(bind_ip).with_write_timeout(config.write_timeout));
        let audio = AudioServer::new(bind_ip, self.audio_source.clone())
            .with_chunk_bytes(config.audio_chunk_bytes());

        let (video_started, audio_started) = thread::scope(|s| {
            let v = s.spawn(|| video.start(config.video_port));
            let a = s.spawn(|| audio.start(config.audio_port));
            (joined(v.join()), joined(a.join()))
        });

        let video_port = bound_port(video.local_addr(), config.video_port);
        let audio_port = bound_port(audio.local_addr(), config.audio_port);

        match &video_started {
            Ok(()) => self.emit(StreamEvent::info(format!(
                "Video server listening on port {video_port}"
            ))),
            Err(e) => self.emit(StreamEvent::error(format!("Video server failed to start: {e}"))),
        }
        match &audio_started {
            Ok(()) => self.emit(StreamEvent::info(format!(
                "Audio server listening on port {audio_port}"
            ))),
            Err(e) => self.emit(StreamEvent::error(format!("Audio server failed to start: {e}"))),
        }

        if config.mode == TransportMode::Network && video_started.is_ok() {
            match self.advertiser.start(video_port) {
                Ok(()) => self.emit(StreamEvent::info(format!(
                    "Advertising {} ({}) on port {video_port}",
                    config.service_name, config.service_type
                ))),
                Err(e) => self.emit(StreamEvent::error(format!("Service advertisement failed: {e}"))),
            }
        }

        let endpoint = StreamEndpoint {
            host,
            video_port,
            audio_port,
        };
        self.emit(StreamEvent::info(format!(
            "Streaming started ({}) at {endpoint}",
            config.mode
        )));

        *self.session.write() = Some(Session {
            video,
            audio,
            endpoint,
        });
    }

    /// Clear the streaming state, withdraw advertisement, then stop both
    /// servers.
    pub fn stop_streaming(&self) {
        let _lifecycle = self.lifecycle.lock();
        if !self.streaming.swap(false, Ordering::SeqCst) {
            tracing::debug!("not streaming");
            return;
        }
        self.teardown();
        self.emit(StreamEvent::info("Streaming stopped"));
    }

    /// Forward one compressed frame to the video viewer, if streaming.
    pub fn process_frame(&self, payload: &[u8], rotation: Rotation) {
        if !self.streaming.load(Ordering::Acquire) {
            return;
        }
        // Release the lock before the blocking write so stop() is not held
        // up by a slow viewer.
        let video = self.session.read().as_ref().map(|s| s.video.clone());
        if let Some(video) = video {
            video.send_frame(payload, rotation);
        }
    }

    /// Select USB or network mode. Takes effect on the next start.
    pub fn set_mode(&self, mode: TransportMode) {
        let mut config = self.config.lock();
        if config.mode != mode {
            config.mode = mode;
            tracing::info!(%mode, "transport mode changed");
            if self.is_streaming() {
                self.emit(StreamEvent::info(format!(
                    "Mode set to {mode}; restart streaming to apply"
                )));
            }
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    pub fn mode(&self) -> TransportMode {
        self.config.lock().mode
    }

    /// Addressing of the running session.
    pub fn endpoint(&self) -> Option<StreamEndpoint> {
        self.session.read().as_ref().map(|s| s.endpoint.clone())
    }

    /// Bound video address, while the video server listens.
    pub fn video_addr(&self) -> Option<SocketAddr> {
        self.session.read().as_ref().and_then(|s| s.video.local_addr())
    }

    /// Bound audio address, while the audio server listens.
    pub fn audio_addr(&self) -> Option<SocketAddr> {
        self.session.read().as_ref().and_then(|s| s.audio.local_addr())
    }

    pub fn has_video_client(&self) -> bool {
        self.session.read().as_ref().is_some_and(|s| s.video.has_client())
    }

    pub fn has_audio_client(&self) -> bool {
        self.session.read().as_ref().is_some_and(|s| s.audio.has_client())
    }

    fn teardown(&self) {
        self.advertiser.stop();
        let session = self.session.write().take();
        if let Some(session) = session {
            session.video.stop();
            session.audio.stop();
        }
    }

    fn emit(&self, event: StreamEvent) {
        self.events.emit(event);
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.streaming.store(false, Ordering::SeqCst);
        self.teardown();
    }
}

fn joined(result: thread::Result<Result<()>>) -> Result<()> {
    result.unwrap_or_else(|_| Err(StreamError::Io(std::io::Error::other("server start panicked"))))
}

fn bound_port(addr: Option<SocketAddr>, configured: u16) -> u16 {
    addr.map_or(configured, |a| a.port())
}

/// Builder for [`StreamController`]; every collaborator has a default.
pub struct StreamControllerBuilder {
    config: StreamConfig,
    audio_source: Option<Arc<dyn AudioSource>>,
    advertiser: Option<Arc<dyn ServiceAdvertiser>>,
    resolver: Option<Arc<dyn AddressResolver>>,
    events: Option<Arc<dyn EventSink>>,
}

impl StreamControllerBuilder {
    fn new(config: StreamConfig) -> Self {
        Self {
            config,
            audio_source: None,
            advertiser: None,
            resolver: None,
            events: None,
        }
    }

    pub fn audio_source(mut self, source: Arc<dyn AudioSource>) -> Self {
        self.audio_source = Some(source);
        self
    }

    pub fn advertiser(mut self, advertiser: Arc<dyn ServiceAdvertiser>) -> Self {
        self.advertiser = Some(advertiser);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn AddressResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> StreamController {
        let audio_source = self
            .audio_source
            .unwrap_or_else(|| Arc::new(ToneSource::new(self.config.audio, 440.0)));
        StreamController {
            audio_source,
            advertiser: self
                .advertiser
                .unwrap_or_else(|| Arc::new(NoopAdvertiser::default())),
            resolver: self
                .resolver
                .unwrap_or_else(|| Arc::new(LocalAddressResolver::default())),
            events: self.events.unwrap_or_else(|| Arc::new(TracingSink)),
            streaming: AtomicBool::new(false),
            session: RwLock::new(None),
            lifecycle: Mutex::new(()),
            config: Mutex::new(self.config),
        }
    }
}
