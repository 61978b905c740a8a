use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::media::yuv::DEFAULT_JPEG_QUALITY;
use crate::protocol::AudioFormat;
use crate::transport::video::DEFAULT_WRITE_TIMEOUT;

pub const DEFAULT_VIDEO_PORT: u16 = 8554;
pub const DEFAULT_AUDIO_PORT: u16 = 8555;

/// How the viewer reaches the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportMode {
    /// Loopback only; the viewer connects through a forwarded port
    /// (e.g. `adb forward tcp:8554 tcp:8554`).
    Usb,
    /// All interfaces, advertised on the local network.
    #[default]
    Network,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usb => write!(f, "usb"),
            Self::Network => write!(f, "network"),
        }
    }
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "usb" => Ok(Self::Usb),
            "network" | "wifi" | "wi-fi" => Ok(Self::Network),
            other => Err(format!("unknown transport mode '{other}' (expected usb or network)")),
        }
    }
}

/// Settings for a [`StreamController`](crate::StreamController).
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub video_port: u16,
    pub audio_port: u16,
    pub mode: TransportMode,
    /// JPEG quality used by frame sources built from this config.
    pub jpeg_quality: u8,
    pub audio: AudioFormat,
    /// Capture read size, as playback time.
    pub audio_chunk: Duration,
    /// Bound on one blocking write to the video viewer.
    pub write_timeout: Option<Duration>,
    /// DNS-SD instance name shown in advertisement events.
    pub service_name: String,
    /// DNS-SD service type.
    pub service_type: String,
}

impl StreamConfig {
    pub fn audio_chunk_bytes(&self) -> usize {
        self.audio.chunk_bytes(self.audio_chunk)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            video_port: DEFAULT_VIDEO_PORT,
            audio_port: DEFAULT_AUDIO_PORT,
            mode: TransportMode::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            audio: AudioFormat::default(),
            audio_chunk: Duration::from_millis(20),
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
            service_name: "PhoneCam".to_string(),
            service_type: "_rtsp._tcp.".to_string(),
        }
    }
}
