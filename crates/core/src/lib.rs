pub mod config;
pub mod controller;
pub mod discovery;
pub mod error;
pub mod events;
pub mod media;
pub mod pipeline;
pub mod protocol;
pub mod transport;

pub use config::{StreamConfig, TransportMode};
pub use controller::{StreamController, StreamControllerBuilder, StreamEndpoint};
pub use error::{CodecError, ProtocolErrorKind, Result, StreamError};
pub use events::{EventLevel, EventSink, StreamEvent};
pub use media::{AudioCapture, AudioSource, EncodedFrame, FrameSource, Rotation};
pub use pipeline::CapturePipeline;
pub use transport::{AudioServer, VideoServer};
