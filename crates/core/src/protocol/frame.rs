use std::io::{self, Read};

use crate::error::{ProtocolErrorKind, Result, StreamError};
use crate::media::{EncodedFrame, Rotation};

/// Length of the fixed record header in bytes.
pub const HEADER_LEN: usize = 8;

/// Default upper bound on a single payload accepted by [`FrameReader`].
pub const DEFAULT_MAX_PAYLOAD: u32 = 16 * 1024 * 1024;

/// Fixed 8-byte header preceding every video record.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                     payload size (u32 BE)                     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                 rotation degrees (i32 BE)                     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// A size of zero is the end-of-stream sentinel; its rotation is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub size: u32,
    pub rotation: i32,
}

/// The sentinel written by the server on graceful shutdown.
pub const END_OF_STREAM: FrameHeader = FrameHeader {
    size: 0,
    rotation: 0,
};

impl FrameHeader {
    pub fn new(size: u32, rotation: Rotation) -> Self {
        Self {
            size,
            rotation: rotation.degrees(),
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.size == 0
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&self.size.to_be_bytes());
        buf[4..8].copy_from_slice(&self.rotation.to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8; HEADER_LEN]) -> Self {
        Self {
            size: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            rotation: i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }
}

/// A decoded video record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Frame(EncodedFrame),
    EndOfStream,
}

/// Viewer-side decoder for the video record stream.
pub struct FrameReader<R> {
    inner: R,
    max_payload: u32,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_payload(inner, DEFAULT_MAX_PAYLOAD)
    }

    pub fn with_max_payload(inner: R, max_payload: u32) -> Self {
        Self { inner, max_payload }
    }

    /// Read the next record.
    ///
    /// Returns `Ok(None)` when the connection closes cleanly on a record
    /// boundary, which happens when the server drops a viewer without
    /// sending end-of-stream (e.g. a newer viewer replaced it).
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        let mut buf = [0u8; HEADER_LEN];
        if !read_full_or_eof(&mut self.inner, &mut buf)? {
            return Ok(None);
        }
        let header = FrameHeader::decode(&buf);

        if header.is_end_of_stream() {
            return Ok(Some(Record::EndOfStream));
        }
        if header.size > self.max_payload {
            return Err(StreamError::Protocol {
                kind: ProtocolErrorKind::PayloadTooLarge(header.size),
            });
        }
        let rotation = Rotation::from_degrees(header.rotation).ok_or(StreamError::Protocol {
            kind: ProtocolErrorKind::InvalidRotation(header.rotation),
        })?;

        let mut payload = vec![0u8; header.size as usize];
        self.inner.read_exact(&mut payload).map_err(truncated)?;

        Ok(Some(Record::Frame(EncodedFrame::new(payload, rotation))))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Fill `buf` completely, or return `false` if the stream ends before the
/// first byte. EOF after a partial read is a truncation error.
fn read_full_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(StreamError::Protocol {
                    kind: ProtocolErrorKind::Truncated,
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

fn truncated(e: io::Error) -> StreamError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        StreamError::Protocol {
            kind: ProtocolErrorKind::Truncated,
        }
    } else {
        e.into()
    }
}
