//! Error types for the stream transport library.

use std::fmt;
use std::net::SocketAddr;

/// Errors that can occur in the stream transport library.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Transport**: [`Io`](Self::Io), [`Bind`](Self::Bind): socket failures.
/// - **Codec**: [`Codec`](Self::Codec): an image sample could not be compressed.
/// - **Capture**: [`DeviceUnavailable`](Self::DeviceUnavailable): the audio
///   capture device could not be opened or stopped producing data.
/// - **Wire**: [`Protocol`](Self::Protocol): malformed frame records on the
///   viewer side.
/// - **Discovery**: [`Discovery`](Self::Discovery): service advertisement failed.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The listening socket could not be bound (port in use, permissions).
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Compressing a planar image sample failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The audio capture device could not be initialized or went away.
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A frame record read from the wire was malformed.
    #[error("protocol error: {kind}")]
    Protocol { kind: ProtocolErrorKind },

    /// The service advertiser refused to register the endpoint.
    #[error("discovery error: {0}")]
    Discovery(String),
}

/// Failures of the 4:2:0 to JPEG adapter.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Width or height is zero or odd.
    #[error("invalid image dimensions {width}x{height} (must be even and non-zero)")]
    InvalidDimensions { width: usize, height: usize },

    /// A plane does not contain enough bytes for its declared strides.
    #[error("{plane} plane too short: need index {needed}, have {len} bytes")]
    PlaneTooShort {
        plane: &'static str,
        needed: usize,
        len: usize,
    },

    /// The JPEG encoder rejected the image.
    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Specific kind of frame record decoding failure.
#[derive(Debug)]
pub enum ProtocolErrorKind {
    /// The stream ended in the middle of a record.
    Truncated,
    /// The size field exceeds the reader's payload limit.
    PayloadTooLarge(u32),
    /// The rotation field is not one of 0, 90, 180, 270.
    InvalidRotation(i32),
}

impl fmt::Display for ProtocolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated record"),
            Self::PayloadTooLarge(size) => write!(f, "payload too large ({size} bytes)"),
            Self::InvalidRotation(deg) => write!(f, "invalid rotation {deg}"),
        }
    }
}

/// Convenience alias for `Result<T, StreamError>`.
pub type Result<T> = std::result::Result<T, StreamError>;
