//! TCP servers for the two media ports.
//!
//! Both servers share the same shape:
//!
//! - A non-blocking listener polled by one accept thread ([`tcp`]), so
//!   `stop()` terminates it without closing the socket under its feet.
//! - At most one viewer at a time. The newest connection wins.
//! - `start`/`stop` are idempotent and callable from any thread.
//!
//! [`VideoServer`] is push-driven: the capture pipeline hands it frames.
//! [`AudioServer`] is pull-driven: each viewer session reads its own
//! capture on a dedicated thread.

pub mod audio;
pub mod tcp;
pub mod video;

pub use audio::AudioServer;
pub use video::VideoServer;
