//! Default input device as an [`AudioSource`], via `cpal`.

use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use phonecam::protocol::AudioFormat;
use phonecam::{AudioCapture, AudioSource, Result, StreamError};

/// A capture that delivers nothing for this long is treated as stale.
const STALE_AFTER: Duration = Duration::from_secs(2);

pub struct MicSource {
    format: AudioFormat,
}

impl MicSource {
    pub fn new(format: AudioFormat) -> Self {
        Self { format }
    }
}

impl AudioSource for MicSource {
    fn open(&self) -> Result<Box<dyn AudioCapture>> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| StreamError::DeviceUnavailable("no default input device".into()))?;

        let config = cpal::StreamConfig {
            channels: self.format.channels,
            sample_rate: cpal::SampleRate(self.format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = bounded::<Vec<u8>>(64);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mut pcm = Vec::with_capacity(data.len() * 2);
                    for sample in data {
                        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                        pcm.extend_from_slice(&value.to_le_bytes());
                    }
                    // Drop on overflow rather than block the audio callback.
                    let _ = tx.try_send(pcm);
                },
                |err| tracing::warn!(error = %err, "input stream error"),
                None,
            )
            .map_err(|e| StreamError::DeviceUnavailable(e.to_string()))?;
        stream
            .play()
            .map_err(|e| StreamError::DeviceUnavailable(e.to_string()))?;

        tracing::info!(
            device = %device.name().unwrap_or_default(),
            sample_rate = self.format.sample_rate,
            "microphone opened"
        );
        Ok(Box::new(MicCapture {
            _stream: stream,
            rx,
            pending: Vec::new(),
            offset: 0,
        }))
    }
}

/// Dropping the capture drops the `cpal` stream, which stops recording.
struct MicCapture {
    _stream: cpal::Stream,
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    offset: usize,
}

impl AudioCapture for MicCapture {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.offset >= self.pending.len() {
            match self.rx.recv_timeout(STALE_AFTER) {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.offset = 0;
                }
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!("microphone stopped delivering data");
                    return Ok(0);
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len() - self.offset);
        buf[..n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}
