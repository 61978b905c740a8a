//! Media capabilities consumed by the transport core.
//!
//! The transport never talks to camera or microphone APIs directly. It
//! consumes two narrow capabilities instead:
//!
//! - **[`FrameSource`]**: a lazy, effectively infinite sequence of
//!   compressed frames with their display rotation. It is pulled by one
//!   capture thread and cannot be restarted mid-stream.
//! - **[`AudioSource`]**: a factory for [`AudioCapture`] handles. Each
//!   viewer connection opens a fresh capture and drops it when the
//!   connection ends, so the device is never held across sessions.
//!
//! ## Provided implementations
//!
//! | Source | Module | Purpose |
//! |--------|--------|---------|
//! | [`pattern::TestPattern`] | [`pattern`] | Moving gradient, compressed via [`yuv::JpegCompressor`] |
//! | [`tone::ToneSource`] | [`tone`] | Sine tone as 16-bit PCM, paced in real time |

pub mod pattern;
pub mod rotation;
pub mod tone;
pub mod yuv;

pub use rotation::Rotation;

use crate::error::Result;

/// One compressed image ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub payload: Vec<u8>,
    pub rotation: Rotation,
}

impl EncodedFrame {
    pub fn new(payload: Vec<u8>, rotation: Rotation) -> Self {
        Self { payload, rotation }
    }
}

/// Supplier of compressed frames, pulled by the capture pipeline.
///
/// Any `Iterator<Item = EncodedFrame> + Send` qualifies. Returning `None`
/// ends the capture pipeline.
pub trait FrameSource: Iterator<Item = EncodedFrame> + Send {}

impl<T> FrameSource for T where T: Iterator<Item = EncodedFrame> + Send {}

/// Opens audio captures on demand.
///
/// Shared between the accept thread and session threads, hence `Sync`.
pub trait AudioSource: Send + Sync {
    /// Open the capture device fresh.
    ///
    /// Returns [`StreamError::DeviceUnavailable`](crate::StreamError::DeviceUnavailable)
    /// when the device cannot be initialized (missing permission, busy,
    /// unplugged). The audio server treats that as the end of one session.
    fn open(&self) -> Result<Box<dyn AudioCapture>>;
}

impl<F> AudioSource for F
where
    F: Fn() -> Result<Box<dyn AudioCapture>> + Send + Sync,
{
    fn open(&self) -> Result<Box<dyn AudioCapture>> {
        self()
    }
}

/// An open audio capture producing raw PCM bytes.
///
/// Dropping the capture stops recording and releases the device. It is
/// created and dropped on the same session thread, so it need not be `Send`.
pub trait AudioCapture {
    /// Block until PCM bytes are available and copy them into `buf`.
    ///
    /// `Ok(0)` means the capture has nothing more to deliver; the session
    /// ends. Implementations should bound how long a read blocks: a
    /// superseded or stopped session only notices between reads.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}
