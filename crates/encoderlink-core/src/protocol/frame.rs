//! Telemetry frame decoding
//!
//! Record format (12 bytes, all fields little-endian `u32`):
//! - 0..4:  channel A encoder count
//! - 4..8:  channel B encoder count
//! - 8..12: device timestamp in microseconds
//!
//! The device never marks record boundaries, so the decoder keeps any
//! incomplete tail across reads and only ever emits whole records.

use byteorder::{ByteOrder, LittleEndian};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use super::{FramingError, FRAME_LEN};

/// One decoded telemetry record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    /// Raw encoder count, channel A
    pub position_a: u32,
    /// Raw encoder count, channel B
    pub position_b: u32,
    /// Device clock in microseconds (wraps at 2^32)
    pub timestamp: u32,
}

impl RawSample {
    /// Create a new sample
    pub fn new(position_a: u32, position_b: u32, timestamp: u32) -> Self {
        Self {
            position_a,
            position_b,
            timestamp,
        }
    }

    /// Decode a sample from exactly one wire record
    pub fn from_bytes(record: &[u8; FRAME_LEN]) -> Self {
        Self {
            position_a: LittleEndian::read_u32(&record[0..4]),
            position_b: LittleEndian::read_u32(&record[4..8]),
            timestamp: LittleEndian::read_u32(&record[8..12]),
        }
    }

    /// Encode the sample as one wire record
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut record = [0u8; FRAME_LEN];
        LittleEndian::write_u32(&mut record[0..4], self.position_a);
        LittleEndian::write_u32(&mut record[4..8], self.position_b);
        LittleEndian::write_u32(&mut record[8..12], self.timestamp);
        record
    }
}

/// Split one record off the front of `buf`, if a whole record is buffered
pub(crate) fn take_frame(buf: &mut BytesMut) -> Option<RawSample> {
    if buf.len() < FRAME_LEN {
        return None;
    }
    let chunk = buf.split_to(FRAME_LEN);
    let mut record = [0u8; FRAME_LEN];
    record.copy_from_slice(&chunk);
    Some(RawSample::from_bytes(&record))
}

/// Observable state of a [`FrameDecoder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// On a record boundary, nothing buffered
    AwaitingBytes,
    /// Holding a partial record of `n` bytes (0 < n < 12)
    HaveNBytes(usize),
}

/// Incremental decoder for the inbound telemetry stream
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
    frames_decoded: u64,
}

impl FrameDecoder {
    /// Create a decoder sitting on a record boundary
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(FRAME_LEN * 64),
            frames_decoded: 0,
        }
    }

    /// Buffer a chunk of bytes and iterate over the records it completes
    ///
    /// The returned iterator is lazy: records are split off the buffer as it
    /// is advanced. Records not pulled before the iterator is dropped stay
    /// buffered and come out of the next call.
    pub fn push(&mut self, bytes: &[u8]) -> Frames<'_> {
        self.buffer.extend_from_slice(bytes);
        Frames { decoder: self }
    }

    /// Pop the next complete record, if one is buffered
    pub fn next_sample(&mut self) -> Option<RawSample> {
        let sample = take_frame(&mut self.buffer)?;
        self.frames_decoded += 1;
        Some(sample)
    }

    /// Current decoder state
    pub fn state(&self) -> DecoderState {
        // Whole records not yet pulled do not count as a partial tail
        match self.buffer.len() % FRAME_LEN {
            0 => DecoderState::AwaitingBytes,
            n => DecoderState::HaveNBytes(n),
        }
    }

    /// Number of bytes currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Total records emitted since construction
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Drop any buffered bytes, returning how many were discarded
    pub fn discard(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        dropped
    }

    /// Close the decoder at end of stream
    ///
    /// Fails if a partial record is left over. Whole records that were never
    /// pulled are dropped, so drain with [`next_sample`](Self::next_sample)
    /// first.
    pub fn finish(self) -> Result<(), FramingError> {
        match self.buffer.len() % FRAME_LEN {
            0 => Ok(()),
            buffered => Err(FramingError::TruncatedRecord { buffered }),
        }
    }
}

/// Lazy iterator over records completed by a [`FrameDecoder::push`]
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = RawSample;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.next_sample()
    }
}
