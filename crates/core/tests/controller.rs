//! Session controller: start/stop ordering, addressing, events, cleanup.

mod common;

use std::net::{IpAddr, Ipv4Addr, TcpListener, TcpStream};
use std::sync::Arc;

use common::{CountingSource, LOCALHOST, connect, is_closed, read_i32, read_u32, wait_for};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use phonecam::discovery::{ServiceAdvertiser, StaticAddress};
use phonecam::events::ChannelSink;
use phonecam::media::Rotation;
use phonecam::{EventLevel, StreamConfig, StreamController, StreamError, StreamEvent, TransportMode};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Start(u16),
    /// Whether the video port was still bound when stop ran.
    Stop { video_listening: bool },
}

#[derive(Default)]
struct RecordingAdvertiser {
    calls: Mutex<Vec<Call>>,
    port: Mutex<Option<u16>>,
    fail: bool,
}

impl RecordingAdvertiser {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

impl ServiceAdvertiser for RecordingAdvertiser {
    fn start(&self, port: u16) -> phonecam::Result<()> {
        self.calls.lock().push(Call::Start(port));
        if self.fail {
            return Err(StreamError::Discovery("registration refused".into()));
        }
        *self.port.lock() = Some(port);
        Ok(())
    }

    fn stop(&self) {
        let video_listening = self
            .port
            .lock()
            .take()
            .is_some_and(port_in_use);
        self.calls.lock().push(Call::Stop { video_listening });
    }
}

/// Checks the port by binding it, so no connection ever reaches the
/// server's accept loop and displaces a viewer.
fn port_in_use(port: u16) -> bool {
    matches!(
        TcpListener::bind((LOCALHOST, port)),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse
    )
}

struct Harness {
    controller: StreamController,
    advertiser: Arc<RecordingAdvertiser>,
    source: Arc<CountingSource>,
    events: Receiver<StreamEvent>,
}

fn harness(mode: TransportMode) -> Harness {
    harness_with(
        StreamConfig {
            video_port: 0,
            audio_port: 0,
            mode,
            ..StreamConfig::default()
        },
        RecordingAdvertiser::default(),
    )
}

fn harness_with(config: StreamConfig, advertiser: RecordingAdvertiser) -> Harness {
    let advertiser = Arc::new(advertiser);
    let source = Arc::new(CountingSource::default());
    let (sink, events) = ChannelSink::bounded(64);
    let controller = StreamController::builder(config)
        .audio_source(source.clone())
        .advertiser(advertiser.clone())
        .resolver(Arc::new(StaticAddress("192.0.2.7".into())))
        .events(Arc::new(sink))
        .build();
    Harness {
        controller,
        advertiser,
        source,
        events,
    }
}

fn drain(events: &Receiver<StreamEvent>) -> Vec<StreamEvent> {
    events.try_iter().collect()
}

fn messages(events: &[StreamEvent], level: EventLevel) -> Vec<&str> {
    events
        .iter()
        .filter(|e| e.level == level)
        .map(|e| e.message.as_str())
        .collect()
}

#[test]
fn toggle_starts_and_stops_both_servers() {
    let h = harness(TransportMode::Usb);
    assert!(!h.controller.is_streaming());

    h.controller.toggle_streaming();
    assert!(h.controller.is_streaming());
    let video = h.controller.video_addr().expect("video listening");
    let audio = h.controller.audio_addr().expect("audio listening");

    let mut viewer = connect(video);
    let _listener = connect(audio);
    wait_for("video client", || h.controller.has_video_client());
    wait_for("audio capture open", || h.source.open_count() == 1);

    h.controller.process_frame(&[1, 2, 3, 4], Rotation::Deg270);
    assert_eq!(read_u32(&mut viewer), 4);
    assert_eq!(read_i32(&mut viewer), 270);
    let mut payload = [0u8; 4];
    std::io::Read::read_exact(&mut viewer, &mut payload).unwrap();
    assert_eq!(payload, [1, 2, 3, 4]);

    h.controller.toggle_streaming();
    assert!(!h.controller.is_streaming());
    assert!(h.controller.video_addr().is_none());
    assert!(h.controller.endpoint().is_none());
    assert_eq!(read_u32(&mut viewer), 0, "viewer gets end-of-stream");
    assert_eq!(read_i32(&mut viewer), 0);
    assert!(is_closed(&mut viewer));
    assert_eq!(h.source.release_count(), h.source.open_count());

    let events = drain(&h.events);
    assert!(messages(&events, EventLevel::Error).is_empty(), "{events:?}");
    let info = messages(&events, EventLevel::Info);
    assert!(info.iter().any(|m| m.starts_with("Streaming started")));
    assert_eq!(info.last(), Some(&"Streaming stopped"));
}

#[test]
fn frames_are_dropped_while_not_streaming() {
    let h = harness(TransportMode::Usb);
    h.controller.process_frame(&[1, 2, 3], Rotation::Deg0);

    h.controller.start_streaming();
    let mut viewer = connect(h.controller.video_addr().unwrap());
    wait_for("video client", || h.controller.has_video_client());
    h.controller.stop_streaming();
    h.controller.process_frame(&[1, 2, 3], Rotation::Deg0);

    // Only the end-of-stream record arrives.
    assert_eq!(read_u32(&mut viewer), 0);
    assert_eq!(read_i32(&mut viewer), 0);
    assert!(is_closed(&mut viewer));
}

#[test]
fn usb_mode_uses_loopback_and_skips_advertisement() {
    let h = harness(TransportMode::Usb);
    h.controller.start_streaming();

    let video = h.controller.video_addr().unwrap();
    assert_eq!(video.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    let endpoint = h.controller.endpoint().unwrap();
    assert_eq!(endpoint.host, "127.0.0.1");
    assert_eq!(endpoint.video_port, video.port());
    assert_eq!(endpoint.audio_port, h.controller.audio_addr().unwrap().port());

    assert!(h.advertiser.calls().is_empty());
}

#[test]
fn network_mode_listens_everywhere_and_advertises_video_port() {
    let h = harness(TransportMode::Network);
    h.controller.start_streaming();

    let video = h.controller.video_addr().unwrap();
    assert_eq!(video.ip(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    assert_eq!(h.controller.endpoint().unwrap().host, "192.0.2.7");
    assert_eq!(h.advertiser.calls(), vec![Call::Start(video.port())]);

    let events = drain(&h.events);
    assert!(
        messages(&events, EventLevel::Info)
            .iter()
            .any(|m| m.contains("PhoneCam") && m.contains(&video.port().to_string()))
    );
}

#[test]
fn advertisement_withdrawn_before_transports_stop() {
    let h = harness(TransportMode::Network);
    h.controller.start_streaming();
    let video = h.controller.video_addr().unwrap();
    let mut viewer = connect((LOCALHOST, video.port()).into());
    wait_for("video client", || h.controller.has_video_client());
    h.controller.stop_streaming();

    // Checking the port during withdrawal must not displace this viewer.
    assert_eq!(read_u32(&mut viewer), 0);
    assert_eq!(read_i32(&mut viewer), 0);

    let calls = h.advertiser.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[1],
        Call::Stop {
            video_listening: true
        }
    );
}

#[test]
fn advertisement_failure_is_an_error_event() {
    let h = harness_with(
        StreamConfig {
            video_port: 0,
            audio_port: 0,
            mode: TransportMode::Network,
            ..StreamConfig::default()
        },
        RecordingAdvertiser {
            fail: true,
            ..RecordingAdvertiser::default()
        },
    );
    h.controller.start_streaming();

    assert!(h.controller.is_streaming());
    assert!(h.controller.video_addr().is_some());
    let events = drain(&h.events);
    let errors = messages(&events, EventLevel::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("registration refused"));
}

#[test]
fn bind_failure_reports_error_and_stays_streaming() {
    let blocker = TcpListener::bind((LOCALHOST, 0)).unwrap();
    let taken = blocker.local_addr().unwrap().port();

    let h = harness_with(
        StreamConfig {
            video_port: taken,
            audio_port: 0,
            mode: TransportMode::Usb,
            ..StreamConfig::default()
        },
        RecordingAdvertiser::default(),
    );
    h.controller.start_streaming();

    assert!(h.controller.is_streaming());
    assert!(h.controller.video_addr().is_none());
    assert!(h.controller.audio_addr().is_some(), "audio starts independently");

    let events = drain(&h.events);
    let errors = messages(&events, EventLevel::Error);
    assert_eq!(errors.len(), 1, "{events:?}");
    assert!(errors[0].starts_with("Video server failed to start"));

    // Frames go nowhere, quietly.
    h.controller.process_frame(&[1], Rotation::Deg0);
    h.controller.stop_streaming();
    assert!(!h.controller.is_streaming());
}

#[test]
fn start_and_stop_are_idempotent() {
    let h = harness(TransportMode::Usb);
    h.controller.stop_streaming();

    h.controller.start_streaming();
    let video = h.controller.video_addr();
    h.controller.start_streaming();
    assert_eq!(h.controller.video_addr(), video);

    h.controller.stop_streaming();
    h.controller.stop_streaming();
    assert!(!h.controller.is_streaming());

    let events = drain(&h.events);
    let started = messages(&events, EventLevel::Info)
        .into_iter()
        .filter(|m| m.starts_with("Streaming started"))
        .count();
    assert_eq!(started, 1);
}

#[test]
fn mode_change_applies_on_next_start() {
    let h = harness(TransportMode::Network);
    assert_eq!(h.controller.mode(), TransportMode::Network);

    h.controller.start_streaming();
    h.controller.set_mode(TransportMode::Usb);
    assert_eq!(h.controller.endpoint().unwrap().host, "192.0.2.7");

    h.controller.stop_streaming();
    h.controller.start_streaming();
    assert_eq!(h.controller.mode(), TransportMode::Usb);
    assert_eq!(h.controller.endpoint().unwrap().host, "127.0.0.1");
}

#[test]
fn restart_gets_fresh_servers() {
    let h = harness(TransportMode::Usb);
    h.controller.start_streaming();
    let first = h.controller.video_addr().unwrap();
    h.controller.stop_streaming();
    assert!(TcpStream::connect(first).is_err());

    h.controller.start_streaming();
    let mut viewer = connect(h.controller.video_addr().unwrap());
    wait_for("video client", || h.controller.has_video_client());
    h.controller.process_frame(&[5], Rotation::Deg90);
    assert_eq!(read_u32(&mut viewer), 1);
}

#[test]
fn drop_releases_everything() {
    let h = harness(TransportMode::Network);
    h.controller.start_streaming();
    let video = h.controller.video_addr().unwrap();
    let audio = h.controller.audio_addr().unwrap();
    let video_local = (LOCALHOST, video.port());

    let mut viewer = connect(video_local.into());
    let _listener = connect((LOCALHOST, audio.port()).into());
    wait_for("audio capture open", || h.source.open_count() == 1);
    wait_for("video client", || h.controller.has_video_client());

    let Harness {
        controller,
        advertiser,
        source,
        ..
    } = h;
    drop(controller);

    assert_eq!(source.release_count(), 1);
    assert!(matches!(advertiser.calls().last(), Some(Call::Stop { .. })));
    assert_eq!(read_u32(&mut viewer), 0);
    assert!(TcpStream::connect(video_local).is_err());
}
