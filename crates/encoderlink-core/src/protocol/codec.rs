//! `tokio-util` codec for async links
//!
//! Lets a `FramedRead`/`FramedWrite` (or `Framed`) over any async byte stream,
//! such as a `tokio_serial::SerialStream`, speak the telemetry protocol.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use super::frame::take_frame;
use super::{Command, FramingError, ProtocolError, RawSample, FRAME_LEN};

/// Decodes telemetry records and encodes command lines
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryCodec;

impl TelemetryCodec {
    /// Create a codec with an empty decode state
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for TelemetryCodec {
    type Item = RawSample;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawSample>, ProtocolError> {
        let sample = take_frame(src);
        if sample.is_none() {
            src.reserve(FRAME_LEN - src.len());
        }
        Ok(sample)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<RawSample>, ProtocolError> {
        match self.decode(src)? {
            Some(sample) => Ok(Some(sample)),
            None if src.is_empty() => Ok(None),
            None => {
                let buffered = src.len();
                src.clear();
                Err(FramingError::TruncatedRecord { buffered }.into())
            }
        }
    }
}

impl Encoder<Command> for TelemetryCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.extend_from_slice(&item.encode()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_waits_for_full_record() {
        let mut codec = TelemetryCodec::new();
        let mut buf = BytesMut::from(&RawSample::new(5, 6, 7).to_bytes()[..8]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(&RawSample::new(5, 6, 7).to_bytes()[8..]);
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(RawSample::new(5, 6, 7))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_eof_truncated() {
        let mut codec = TelemetryCodec::new();
        let mut buf = BytesMut::from(&[1u8, 2, 3][..]);
        let err = codec.decode_eof(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Framing(FramingError::TruncatedRecord { buffered: 3 })
        ));
    }

    #[test]
    fn test_decode_eof_clean() {
        let mut codec = TelemetryCodec::new();
        let mut buf = BytesMut::new();
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_encode_command() {
        let mut codec = TelemetryCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Command::turns(2, 80), &mut buf).unwrap();
        assert_eq!(&buf[..], b"2,80,0.00,0\n");
    }
}
