//! # Header Frames
//!
//! A header frame carries free-form, human-readable ASCII between the
//! prefix and the checksum. Endpoints use it to describe the data source;
//! this codec also uses it as the protocol-compliant vehicle for negative
//! replies to CFG-3 requests.

use super::common::{FrameError, FrameType, PrefixFrame, PREFIX_SIZE};
use super::utils::{calculate_crc, validate_checksum};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderFrame {
    pub prefix: PrefixFrame,
    pub header: String,
}

impl HeaderFrame {
    pub fn new(idcode: u16, header: &str) -> Self {
        let mut frame = HeaderFrame {
            prefix: PrefixFrame::new(FrameType::Header, idcode),
            header: header.to_string(),
        };
        frame.prefix.framesize = (PREFIX_SIZE + frame.header.len() + 2) as u16;
        frame
    }

    pub fn from_hex(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < PREFIX_SIZE + 2 {
            return Err(FrameError::ShortFrame {
                message: format!("header frame needs at least 16 bytes, got {}", bytes.len()),
            });
        }
        validate_checksum(bytes)?;
        let prefix = PrefixFrame::from_hex(bytes)?;
        if prefix.frame_type()? != FrameType::Header {
            return Err(FrameError::UnknownFrame {
                message: format!("expected a header frame, got SYNC 0x{:04X}", prefix.sync),
            });
        }
        if prefix.framesize as usize != bytes.len() {
            return Err(FrameError::ShortFrame {
                message: format!(
                    "FRAMESIZE says {} bytes, buffer has {}",
                    prefix.framesize,
                    bytes.len()
                ),
            });
        }
        let header = String::from_utf8_lossy(&bytes[PREFIX_SIZE..bytes.len() - 2]).into_owned();
        Ok(HeaderFrame { prefix, header })
    }

    pub fn to_hex(&self) -> Vec<u8> {
        let framesize = PREFIX_SIZE + self.header.len() + 2;
        let mut prefix = self.prefix.clone();
        prefix.framesize = framesize as u16;

        let mut result = Vec::with_capacity(framesize);
        result.extend_from_slice(&prefix.to_hex());
        result.extend_from_slice(self.header.as_bytes());
        let chk = calculate_crc(&result);
        result.extend_from_slice(&chk.to_be_bytes());
        result
    }
}
