//! # Frame Dispatch and Stream Decoding
//!
//! [`Frame`] is the sum of the decodable frame types; [`Frame::from_hex`]
//! dispatches a complete frame buffer on its SYNC word. [`FrameDecoder`]
//! turns an arbitrary byte stream into frames: it peeks the 4-byte
//! SYNC+FRAMESIZE prefix, waits for the full frame, checks the CRC and
//! dispatches.
//!
//! Error recovery keeps the stream alive: a failed frame is consumed (its
//! FRAMESIZE bytes when the prefix is believable, otherwise bytes up to the
//! next 0xAA lead byte) and the error is handed to the caller while
//! decoding continues with the next frame.

use bytes::{Buf, Bytes, BytesMut};

use super::commands::CommandFrame;
use super::common::{FrameError, FrameType, MIN_FRAME_SIZE, PREFIX_SIZE, SYNC_LEAD};
use super::config::{ConfigIndex, ConfigurationFrame};
use super::data_frame::DataFrame;
use super::header::HeaderFrame;
use super::utils::validate_checksum;

/// Any decodable frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Header(HeaderFrame),
    Config(ConfigurationFrame),
    Data(DataFrame),
    Command(CommandFrame),
}

impl Frame {
    /// Decodes one complete frame buffer.
    ///
    /// `context` supplies the configurations data-frame decoding depends
    /// on; a data frame for a stream absent from the index fails with
    /// `MissingConfiguration`.
    pub fn from_hex(bytes: &[u8], context: &ConfigIndex) -> Result<Frame, FrameError> {
        if bytes.len() < PREFIX_SIZE {
            return Err(FrameError::ShortFrame {
                message: format!("frame needs at least {} bytes, got {}", PREFIX_SIZE, bytes.len()),
            });
        }
        let sync = u16::from_be_bytes([bytes[0], bytes[1]]);
        match FrameType::from_sync(sync)? {
            FrameType::Header => Ok(Frame::Header(HeaderFrame::from_hex(bytes)?)),
            FrameType::Config1 | FrameType::Config2 => {
                Ok(Frame::Config(ConfigurationFrame::from_hex(bytes)?))
            }
            FrameType::Command => Ok(Frame::Command(CommandFrame::from_hex(bytes)?)),
            FrameType::Data => {
                let idcode = u16::from_be_bytes([bytes[4], bytes[5]]);
                let cfg = context.get(idcode).ok_or_else(|| {
                    FrameError::MissingConfiguration {
                        message: format!("no configuration known for stream {}", idcode),
                    }
                })?;
                Ok(Frame::Data(DataFrame::from_hex(bytes, cfg)?))
            }
            FrameType::Config3 => Err(FrameError::UnknownFrame {
                message: "configuration frame 3 is not supported".to_string(),
            }),
        }
    }

    /// Encodes the frame to its wire form.
    pub fn to_hex(&self) -> Result<Vec<u8>, FrameError> {
        match self {
            Frame::Header(frame) => Ok(frame.to_hex()),
            Frame::Config(frame) => frame.to_hex(),
            Frame::Data(frame) => Ok(frame.to_hex()),
            Frame::Command(frame) => frame.to_hex(),
        }
    }

    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Header(_) => FrameType::Header,
            Frame::Config(cfg) if cfg.cfg_type == 1 => FrameType::Config1,
            Frame::Config(_) => FrameType::Config2,
            Frame::Data(_) => FrameType::Data,
            Frame::Command(_) => FrameType::Command,
        }
    }

    pub fn idcode(&self) -> u16 {
        match self {
            Frame::Header(frame) => frame.prefix.idcode,
            Frame::Config(frame) => frame.prefix.idcode,
            Frame::Data(frame) => frame.prefix.idcode,
            Frame::Command(frame) => frame.prefix.idcode,
        }
    }
}

/// Incremental decoder over a byte stream.
///
/// Feed bytes in whatever chunks the transport delivers, then pull frames
/// until `Ok(None)` says more input is needed. Decoded configuration frames
/// are rebound into the supplied [`ConfigIndex`] so data frames that follow
/// them on the same stream decode without caller involvement.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        FrameDecoder {
            buf: BytesMut::with_capacity(4096),
        }
    }

    /// Appends raw bytes to the decode buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Direct access to the decode buffer for `read_buf`-style transports.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Bytes buffered but not yet consumed.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Pulls the next frame together with its verbatim wire bytes.
    ///
    /// `Ok(None)` means the buffer holds no complete frame yet. An `Err`
    /// reports a frame that was consumed but did not decode; the stream
    /// stays aligned and the next call continues behind it.
    pub fn next_frame_raw(
        &mut self,
        context: &mut ConfigIndex,
    ) -> Result<Option<(Frame, Bytes)>, FrameError> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        if self.buf[0] != SYNC_LEAD {
            let skipped = self.resync();
            return Err(FrameError::UnknownFrame {
                message: format!("skipped {} bytes resynchronising on the sync word", skipped),
            });
        }
        let framesize = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
        if framesize < MIN_FRAME_SIZE {
            // FRAMESIZE cannot be trusted; drop the lead byte and hunt for
            // the next one.
            self.buf.advance(1);
            let skipped = self.resync() + 1;
            return Err(FrameError::ShortFrame {
                message: format!(
                    "FRAMESIZE {} below the {}-byte minimum, skipped {} bytes",
                    framesize, MIN_FRAME_SIZE, skipped
                ),
            });
        }
        if self.buf.len() < framesize {
            return Ok(None);
        }

        let frame_bytes = self.buf.split_to(framesize).freeze();
        validate_checksum(&frame_bytes)?;
        let frame = Frame::from_hex(&frame_bytes, context)?;
        if let Frame::Config(cfg) = &frame {
            context.insert(cfg.clone());
        }
        Ok(Some((frame, frame_bytes)))
    }

    /// Pulls the next frame, discarding the raw bytes.
    pub fn next_frame(&mut self, context: &mut ConfigIndex) -> Result<Option<Frame>, FrameError> {
        Ok(self.next_frame_raw(context)?.map(|(frame, _)| frame))
    }

    /// Decodes everything currently buffered, collecting frames and the
    /// errors of frames that had to be dropped.
    pub fn drain(&mut self, context: &mut ConfigIndex) -> (Vec<Frame>, Vec<FrameError>) {
        let mut frames = Vec::new();
        let mut errors = Vec::new();
        loop {
            match self.next_frame(context) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(err) => errors.push(err),
            }
        }
        (frames, errors)
    }

    /// Drops bytes up to the next 0xAA lead byte, returning the count.
    fn resync(&mut self) -> usize {
        match self.buf.iter().position(|&b| b == SYNC_LEAD) {
            Some(pos) => {
                self.buf.advance(pos);
                pos
            }
            None => {
                let dropped = self.buf.len();
                self.buf.clear();
                dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ieee_c37_118::header::HeaderFrame;

    fn header_bytes(text: &str) -> Vec<u8> {
        HeaderFrame::new(7, text).to_hex()
    }

    #[test]
    fn test_single_frame() {
        let mut decoder = FrameDecoder::new();
        let mut index = ConfigIndex::new();
        decoder.feed(&header_bytes("one"));
        match decoder.next_frame(&mut index).unwrap() {
            Some(Frame::Header(h)) => assert_eq!(h.header, "one"),
            other => panic!("expected a header frame, got {:?}", other),
        }
        assert!(decoder.next_frame(&mut index).unwrap().is_none());
    }

    #[test]
    fn test_byte_at_a_time_delivery() {
        let mut decoder = FrameDecoder::new();
        let mut index = ConfigIndex::new();
        let bytes = header_bytes("split");
        for (i, byte) in bytes.iter().enumerate() {
            decoder.feed(&[*byte]);
            let got = decoder.next_frame(&mut index).unwrap();
            if i + 1 < bytes.len() {
                assert!(got.is_none(), "frame surfaced {} bytes early", bytes.len() - i - 1);
            } else {
                assert!(matches!(got, Some(Frame::Header(_))));
            }
        }
    }

    #[test]
    fn test_multiple_frames_per_feed() {
        let mut decoder = FrameDecoder::new();
        let mut index = ConfigIndex::new();
        let mut stream = Vec::new();
        for text in ["a", "bb", "ccc"] {
            stream.extend_from_slice(&header_bytes(text));
        }
        decoder.feed(&stream);
        let (frames, errors) = decoder.drain(&mut index);
        assert!(errors.is_empty());
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn test_config_rebinds_context() {
        use crate::ieee_c37_118::config::ConfigurationFrame;
        use crate::ieee_c37_118::data_frame::DataFrame;

        let cfg = ConfigurationFrame::ieee_sample(7734, 30).unwrap();
        let data = DataFrame::ieee_sample(&cfg).unwrap();

        let mut decoder = FrameDecoder::new();
        let mut index = ConfigIndex::new();
        decoder.feed(&cfg.to_hex().unwrap());
        decoder.feed(&data.to_hex());

        let (frames, errors) = decoder.drain(&mut index);
        assert!(errors.is_empty());
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], Frame::Config(_)));
        assert!(matches!(frames[1], Frame::Data(_)));
        assert!(index.get(7734).is_some());
    }

    #[test]
    fn test_data_without_config_is_reported_and_skipped() {
        use crate::ieee_c37_118::config::ConfigurationFrame;
        use crate::ieee_c37_118::data_frame::DataFrame;

        let cfg = ConfigurationFrame::ieee_sample(7734, 30).unwrap();
        let data = DataFrame::ieee_sample(&cfg).unwrap();

        let mut decoder = FrameDecoder::new();
        let mut index = ConfigIndex::new();
        decoder.feed(&data.to_hex());
        decoder.feed(&header_bytes("after"));

        let (frames, errors) = decoder.drain(&mut index);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], FrameError::MissingConfiguration { .. }));
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_garbage_resync() {
        let mut decoder = FrameDecoder::new();
        let mut index = ConfigIndex::new();
        decoder.feed(&[0x00, 0x13, 0x37, 0x42]);
        decoder.feed(&header_bytes("ok"));

        let (frames, errors) = decoder.drain(&mut index);
        assert_eq!(errors.len(), 1);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_bogus_framesize_resync() {
        let mut decoder = FrameDecoder::new();
        let mut index = ConfigIndex::new();
        // A sync lead with an impossible FRAMESIZE of 3.
        decoder.feed(&[0xAA, 0x01, 0x00, 0x03]);
        decoder.feed(&header_bytes("ok"));

        let (frames, errors) = decoder.drain(&mut index);
        assert!(!errors.is_empty());
        assert_eq!(frames.len(), 1);
    }
}
