use std::time::Duration;

/// Format of the raw PCM stream on the audio port.
///
/// The stream carries no header; the viewer must be configured with the
/// same values. Samples are signed, little-endian, interleaved when
/// `channels > 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.bytes_per_frame()
    }

    /// Bytes covering `duration`, rounded down to a whole sample frame and
    /// never less than one frame.
    pub fn chunk_bytes(&self, duration: Duration) -> usize {
        let frame = self.bytes_per_frame().max(1);
        let frames = (self.sample_rate as u128 * duration.as_micros() / 1_000_000) as usize;
        frames.max(1) * frame
    }

    /// Playback time represented by `bytes` of PCM.
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let per_second = self.bytes_per_second().max(1) as u64;
        Duration::from_micros(bytes as u64 * 1_000_000 / per_second)
    }
}

impl Default for AudioFormat {
    /// 44.1 kHz, mono, 16-bit.
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            bits_per_sample: 16,
        }
    }
}
