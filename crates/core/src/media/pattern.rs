use super::yuv::{JpegCompressor, Plane, Yuv420Image};
use super::{EncodedFrame, Rotation};

const MAX_CONSECUTIVE_FAILURES: usize = 10;

/// Synthetic camera: an infinite sequence of moving-gradient frames.
///
/// Each frame is laid out the way most camera analyzers deliver it (luma
/// plane plus one interleaved `VUVU...` buffer exposed as two stride-2
/// views) and is compressed through [`JpegCompressor`], so the pattern
/// exercises the same path as real captures.
#[derive(Debug, Clone)]
pub struct TestPattern {
    width: usize,
    height: usize,
    rotation: Rotation,
    compressor: JpegCompressor,
    frame_index: u64,
    luma: Vec<u8>,
    chroma: Vec<u8>,
}

impl TestPattern {
    /// `width` and `height` are rounded down to even values (minimum 2).
    pub fn new(width: usize, height: usize, compressor: JpegCompressor) -> Self {
        let width = (width & !1).max(2);
        let height = (height & !1).max(2);
        Self {
            width,
            height,
            rotation: Rotation::Deg0,
            compressor,
            frame_index: 0,
            luma: vec![0; width * height],
            chroma: vec![0; width * height / 2],
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn render(&mut self) {
        let shift = (self.frame_index * 4) as usize;
        let (w, h) = (self.width, self.height);

        for row in 0..h {
            for col in 0..w {
                self.luma[row * w + col] = ((col + shift) * 255 / w.max(1)) as u8;
            }
        }
        for row in 0..h / 2 {
            for col in 0..w / 2 {
                let i = row * w + col * 2;
                self.chroma[i] = (row * 255 / (h / 2).max(1)) as u8;
                self.chroma[i + 1] = ((col + shift / 2) % 256) as u8;
            }
        }
    }
}

impl Iterator for TestPattern {
    type Item = EncodedFrame;

    fn next(&mut self) -> Option<EncodedFrame> {
        // A failed frame is skipped; a run of failures ends the sequence.
        for _ in 0..MAX_CONSECUTIVE_FAILURES {
            self.render();
            self.frame_index += 1;

            let image = Yuv420Image {
                width: self.width,
                height: self.height,
                y: Plane::new(&self.luma, self.width, 1),
                u: Plane::new(&self.chroma[1..], self.width, 2),
                v: Plane::new(&self.chroma[..self.chroma.len() - 1], self.width, 2),
            };
            if let Some(payload) = self.compressor.compress(&image) {
                return Some(EncodedFrame::new(payload, self.rotation));
            }
        }
        None
    }
}
