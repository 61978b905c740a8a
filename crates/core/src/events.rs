use std::fmt;

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// Severity of a [`StreamEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Error,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// A user-facing status message from the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub level: EventLevel,
    pub message: String,
}

impl StreamEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: EventLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: EventLevel::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == EventLevel::Error
    }
}

impl fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Receiver of controller events. Fire-and-forget: implementations must
/// not block the caller.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StreamEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: StreamEvent) {
        match event.level {
            EventLevel::Info => tracing::info!(target: "phonecam::events", "{}", event.message),
            EventLevel::Error => tracing::error!(target: "phonecam::events", "{}", event.message),
        }
    }
}

/// Pushes events into a bounded channel, dropping them when it is full.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<StreamEvent>,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<StreamEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: StreamEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::trace!(message = %event.message, "event channel full, dropped");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
