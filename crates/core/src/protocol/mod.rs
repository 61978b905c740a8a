//! Wire formats of the two transport ports.
//!
//! ## Video (default port 8554)
//!
//! A sequence of length-prefixed records, all integers big-endian:
//!
//! ```text
//! u32  payload size     (0 = end of stream)
//! i32  rotation degrees (0, 90, 180, 270; ignored at end of stream)
//! [u8] payload          (JPEG bytes, absent at end of stream)
//! ```
//!
//! The server never emits a zero-size record for a real frame, so a
//! zero size always means the server is shutting down gracefully.
//!
//! ## Audio (default port 8555)
//!
//! Raw PCM with no header or framing, starting as soon as the viewer
//! connects. See [`AudioFormat`] for the sample layout.

pub mod audio;
pub mod frame;

pub use audio::AudioFormat;
pub use frame::{END_OF_STREAM, FrameHeader, FrameReader, HEADER_LEN, Record};
