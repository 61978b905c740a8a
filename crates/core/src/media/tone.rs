use std::f32::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

use super::{AudioCapture, AudioSource};
use crate::error::{Result, StreamError};
use crate::protocol::AudioFormat;

/// Synthetic microphone: a continuous sine tone as 16-bit PCM.
///
/// Each [`open`](AudioSource::open) starts a new capture at phase zero.
/// When paced, reads block so that data is produced at the real sample
/// rate, like a hardware device would.
#[derive(Debug, Clone)]
pub struct ToneSource {
    format: AudioFormat,
    frequency: f32,
    amplitude: f32,
    paced: bool,
}

impl ToneSource {
    pub fn new(format: AudioFormat, frequency: f32) -> Self {
        Self {
            format,
            frequency,
            amplitude: 0.25,
            paced: true,
        }
    }

    /// Peak amplitude as a fraction of full scale.
    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    /// Produce data as fast as it is read instead of in real time.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }
}

impl Default for ToneSource {
    /// 440 Hz at the default stream format.
    fn default() -> Self {
        Self::new(AudioFormat::default(), 440.0)
    }
}

impl AudioSource for ToneSource {
    fn open(&self) -> Result<Box<dyn AudioCapture>> {
        if self.format.bits_per_sample != 16 || self.format.channels == 0 {
            return Err(StreamError::DeviceUnavailable(format!(
                "tone source supports 16-bit PCM only, got {} bits x {} channels",
                self.format.bits_per_sample, self.format.channels
            )));
        }
        tracing::debug!(frequency = self.frequency, "tone capture opened");
        Ok(Box::new(ToneCapture {
            format: self.format,
            step: TAU * self.frequency / self.format.sample_rate as f32,
            amplitude: self.amplitude * i16::MAX as f32,
            phase: 0.0,
            paced: self.paced,
            deadline: Instant::now(),
        }))
    }
}

struct ToneCapture {
    format: AudioFormat,
    step: f32,
    amplitude: f32,
    phase: f32,
    paced: bool,
    deadline: Instant,
}

impl AudioCapture for ToneCapture {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let frame_len = self.format.bytes_per_frame();
        let frames = buf.len() / frame_len;

        for frame in buf.chunks_exact_mut(frame_len) {
            let sample = (self.phase.sin() * self.amplitude) as i16;
            for channel in frame.chunks_exact_mut(2) {
                channel.copy_from_slice(&sample.to_le_bytes());
            }
            self.phase = (self.phase + self.step) % TAU;
        }

        let n = frames * frame_len;
        if self.paced {
            self.deadline += self.format.duration_of(n);
            let now = Instant::now();
            if self.deadline > now {
                thread::sleep(self.deadline - now);
            } else if now - self.deadline > Duration::from_millis(500) {
                // Reader fell far behind; do not burst to catch up.
                self.deadline = now;
            }
        }
        Ok(n)
    }
}
