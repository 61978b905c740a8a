//! 4:2:0 planar image to JPEG adapter.
//!
//! Camera analyzers hand out YUV 4:2:0 samples as three planes, each with
//! its own row stride and pixel stride. Depending on the device, the chroma
//! planes are either views into one interleaved `VUVU...` buffer (pixel
//! stride 2, NV21 in disguise) or fully separate (pixel stride 1, I420).
//!
//! ```text
//! NV21 output layout:
//! +---------------------------+
//! | Y  (width * height)       |
//! +---------------------------+
//! | V U V U ... (width * h/2) |
//! +---------------------------+
//! ```
//!
//! The adapter repacks any layout into NV21, converts to RGB (BT.601,
//! full range) and compresses with the `image` crate's JPEG encoder.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::error::CodecError;

/// Default JPEG quality used for streamed frames.
pub const DEFAULT_JPEG_QUALITY: u8 = 60;

/// One plane of a planar image sample.
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    /// Bytes between the starts of consecutive rows.
    pub row_stride: usize,
    /// Bytes between consecutive samples within a row.
    pub pixel_stride: usize,
}

impl<'a> Plane<'a> {
    pub fn new(data: &'a [u8], row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    fn sample(&self, plane: &'static str, row: usize, col: usize) -> Result<u8, CodecError> {
        let index = row * self.row_stride + col * self.pixel_stride;
        self.data
            .get(index)
            .copied()
            .ok_or(CodecError::PlaneTooShort {
                plane,
                needed: index,
                len: self.data.len(),
            })
    }
}

/// A borrowed YUV 4:2:0 sample (luma at full resolution, chroma at half
/// resolution in both directions).
#[derive(Debug, Clone, Copy)]
pub struct Yuv420Image<'a> {
    pub width: usize,
    pub height: usize,
    pub y: Plane<'a>,
    pub u: Plane<'a>,
    pub v: Plane<'a>,
}

impl Yuv420Image<'_> {
    /// True when U and V are two views of a single contiguous `VUVU...`
    /// buffer: both pixel strides are 2, chroma rows are packed, and the U
    /// view starts one byte after the V view.
    pub fn has_interleaved_chroma(&self) -> bool {
        self.u.pixel_stride == 2
            && self.v.pixel_stride == 2
            && self.u.row_stride == self.width
            && self.v.row_stride == self.width
            && std::ptr::eq(self.u.data.as_ptr(), self.v.data.as_ptr().wrapping_add(1))
    }
}

/// Repack a 4:2:0 sample into a contiguous NV21 buffer.
pub fn to_nv21(image: &Yuv420Image<'_>) -> Result<Vec<u8>, CodecError> {
    let (width, height) = (image.width, image.height);
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(CodecError::InvalidDimensions { width, height });
    }

    let luma_len = width * height;
    let chroma_len = luma_len / 2;
    let mut nv21 = vec![0u8; luma_len + chroma_len];

    copy_luma(&image.y, width, height, &mut nv21[..luma_len])?;

    let chroma = &mut nv21[luma_len..];
    if image.has_interleaved_chroma() {
        // The V view covers the whole VU block except, on most devices, the
        // trailing U byte, which only the U view reaches.
        let n = image.v.data.len().min(chroma_len);
        chroma[..n].copy_from_slice(&image.v.data[..n]);
        if n < chroma_len {
            let tail = chroma_len - 1;
            if n < tail {
                return Err(CodecError::PlaneTooShort {
                    plane: "v",
                    needed: tail - 1,
                    len: image.v.data.len(),
                });
            }
            chroma[tail] = *image
                .u
                .data
                .get(tail - 1)
                .ok_or(CodecError::PlaneTooShort {
                    plane: "u",
                    needed: tail - 1,
                    len: image.u.data.len(),
                })?;
        }
    } else {
        let mut pos = 0;
        for row in 0..height / 2 {
            for col in 0..width / 2 {
                chroma[pos] = image.v.sample("v", row, col)?;
                chroma[pos + 1] = image.u.sample("u", row, col)?;
                pos += 2;
            }
        }
    }

    Ok(nv21)
}

fn copy_luma(y: &Plane<'_>, width: usize, height: usize, out: &mut [u8]) -> Result<(), CodecError> {
    if y.pixel_stride == 1 && y.row_stride == width {
        let src = y.data.get(..out.len()).ok_or(CodecError::PlaneTooShort {
            plane: "y",
            needed: out.len() - 1,
            len: y.data.len(),
        })?;
        out.copy_from_slice(src);
        return Ok(());
    }

    for row in 0..height {
        for col in 0..width {
            out[row * width + col] = y.sample("y", row, col)?;
        }
    }
    Ok(())
}

/// Convert an NV21 buffer to packed RGB8 (BT.601 full range).
///
/// `nv21` must hold at least `width * height * 3 / 2` bytes.
pub fn nv21_to_rgb(nv21: &[u8], width: usize, height: usize) -> Result<Vec<u8>, CodecError> {
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(CodecError::InvalidDimensions { width, height });
    }
    let luma_len = width * height;
    let required = luma_len + luma_len / 2;
    if nv21.len() < required {
        return Err(CodecError::PlaneTooShort {
            plane: "nv21",
            needed: required - 1,
            len: nv21.len(),
        });
    }
    let mut rgb = vec![0u8; luma_len * 3];

    for row in 0..height {
        let chroma_row = luma_len + (row / 2) * width;
        for col in 0..width {
            let y = nv21[row * width + col] as f32;
            let pair = chroma_row + (col / 2) * 2;
            let v = nv21[pair] as f32 - 128.0;
            let u = nv21[pair + 1] as f32 - 128.0;

            let r = y + 1.402 * v;
            let g = y - 0.344_136 * u - 0.714_136 * v;
            let b = y + 1.772 * u;

            let idx = (row * width + col) * 3;
            rgb[idx] = r.clamp(0.0, 255.0) as u8;
            rgb[idx + 1] = g.clamp(0.0, 255.0) as u8;
            rgb[idx + 2] = b.clamp(0.0, 255.0) as u8;
        }
    }

    Ok(rgb)
}

/// Stateless 4:2:0 to JPEG compressor.
#[derive(Debug, Clone, Copy)]
pub struct JpegCompressor {
    quality: u8,
}

impl JpegCompressor {
    /// `quality` is clamped to 1..=100.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn try_compress(&self, image: &Yuv420Image<'_>) -> Result<Vec<u8>, CodecError> {
        let nv21 = to_nv21(image)?;
        let rgb = nv21_to_rgb(&nv21, image.width, image.height)?;

        let mut out = Vec::with_capacity(image.width * image.height / 4);
        JpegEncoder::new_with_quality(&mut out, self.quality).write_image(
            &rgb,
            image.width as u32,
            image.height as u32,
            ExtendedColorType::Rgb8,
        )?;
        Ok(out)
    }

    /// Compress a sample, treating any failure as a dropped frame.
    pub fn compress(&self, image: &Yuv420Image<'_>) -> Option<Vec<u8>> {
        match self.try_compress(image) {
            Ok(jpeg) => Some(jpeg),
            Err(e) => {
                tracing::warn!(error = %e, width = image.width, height = image.height, "frame dropped");
                None
            }
        }
    }
}

impl Default for JpegCompressor {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}
