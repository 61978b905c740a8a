use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::controller::StreamController;
use crate::error::Result;
use crate::media::FrameSource;

/// Dedicated capture thread feeding a [`StreamController`].
///
/// Pulls frames from a [`FrameSource`] at up to `fps` frames per second
/// and hands each to [`StreamController::process_frame`], which drops them
/// while not streaming. Runs until the source is exhausted or the pipeline
/// is stopped. Dropping the pipeline stops it.
pub struct CapturePipeline {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<u64>>,
}

impl CapturePipeline {
    /// Start pulling from `source`. `fps == 0` pulls as fast as the source
    /// yields.
    pub fn spawn<S>(source: S, controller: Arc<StreamController>, fps: u32) -> Result<Self>
    where
        S: FrameSource + 'static,
    {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let interval = if fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / fps
        };

        let thread = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || capture_loop(source, &controller, interval, &stop_rx))?;

        tracing::info!(fps, "capture pipeline started");
        Ok(Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Stop the capture thread and wait for it. Returns the number of
    /// frames pulled from the source. Idempotent; later calls return 0.
    pub fn stop(&mut self) -> u64 {
        // Disconnecting the channel wakes a pacing wait immediately.
        self.stop_tx.take();
        let Some(thread) = self.thread.take() else {
            return 0;
        };
        match thread.join() {
            Ok(frames) => {
                tracing::info!(frames, "capture pipeline stopped");
                frames
            }
            Err(_) => {
                tracing::error!("capture thread panicked");
                0
            }
        }
    }

    /// Whether the capture thread has exited on its own.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop<S: FrameSource>(
    mut source: S,
    controller: &StreamController,
    interval: Duration,
    stop_rx: &Receiver<()>,
) -> u64 {
    let mut frames = 0u64;
    let mut next_due = Instant::now();

    loop {
        if !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty)) {
            break;
        }
        let Some(frame) = source.next() else {
            tracing::debug!(frames, "frame source exhausted");
            break;
        };
        controller.process_frame(&frame.payload, frame.rotation);
        frames += 1;

        if interval.is_zero() {
            continue;
        }
        next_due += interval;
        let now = Instant::now();
        if next_due <= now {
            // Running behind; skip the wait rather than burst.
            next_due = now;
            continue;
        }
        match stop_rx.recv_timeout(next_due - now) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => break,
        }
    }
    frames
}
