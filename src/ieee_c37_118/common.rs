//! # Common Codec Types
//!
//! Core types shared by every frame variant: the codec error enum, the SYNC
//! word (frame type + version), the 14-byte frame prefix and the bit-packed
//! STAT field carried by data frames.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::utils;

/// Size of the common frame prefix in bytes (SYNC through FRACSEC).
pub const PREFIX_SIZE: usize = 14;

/// Leading byte of every SYNC word.
pub const SYNC_LEAD: u8 = 0xAA;

/// Version nibble written into the SYNC word for this standard.
pub const VERSION_2011: u8 = 0x1;

/// Smallest frame this standard can produce: prefix plus checksum.
pub const MIN_FRAME_SIZE: usize = PREFIX_SIZE + 2;

/// Errors raised while encoding or decoding frames.
///
/// # Variants
///
/// * `ShortFrame`: the buffer ends before the frame does.
/// * `CrcMismatch`: the trailing checksum does not match the frame bytes.
/// * `UnknownFrame`: the SYNC word names a frame type this codec does not
///   handle (including Configuration Frame 3).
/// * `InvalidLayout`: declared channel counts disagree with the supplied
///   per-channel lists.
/// * `FieldRange`: a field value is outside the range the standard allows
///   (for example `FRACSEC >= TIME_BASE`).
/// * `MissingConfiguration`: a data frame arrived for a stream whose
///   configuration has not been seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    ShortFrame { message: String },
    CrcMismatch { message: String },
    UnknownFrame { message: String },
    InvalidLayout { message: String },
    FieldRange { message: String },
    MissingConfiguration { message: String },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FrameError::ShortFrame { message } => write!(f, "Short frame: {}", message),
            FrameError::CrcMismatch { message } => write!(f, "CRC mismatch: {}", message),
            FrameError::UnknownFrame { message } => write!(f, "Unknown frame: {}", message),
            FrameError::InvalidLayout { message } => write!(f, "Invalid layout: {}", message),
            FrameError::FieldRange { message } => write!(f, "Field out of range: {}", message),
            FrameError::MissingConfiguration { message } => {
                write!(f, "Missing configuration: {}", message)
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// Frame type encoded in bits 6-4 of the SYNC word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameType {
    Data,
    Header,
    Config1,
    Config2,
    Command,
    Config3,
}

impl FrameType {
    /// Extracts the frame type from a SYNC word, checking the 0xAA lead byte.
    pub fn from_sync(sync: u16) -> Result<FrameType, FrameError> {
        if (sync >> 8) as u8 != SYNC_LEAD {
            return Err(FrameError::UnknownFrame {
                message: format!("bad lead byte 0x{:02X}, expected 0xAA", sync >> 8),
            });
        }
        match (sync >> 4) & 0x7 {
            0 => Ok(FrameType::Data),
            1 => Ok(FrameType::Header),
            2 => Ok(FrameType::Config1),
            3 => Ok(FrameType::Config2),
            4 => Ok(FrameType::Command),
            5 => Ok(FrameType::Config3),
            bits => Err(FrameError::UnknownFrame {
                message: format!("frame type bits {} are reserved", bits),
            }),
        }
    }

    fn type_bits(self) -> u16 {
        match self {
            FrameType::Data => 0,
            FrameType::Header => 1,
            FrameType::Config1 => 2,
            FrameType::Config2 => 3,
            FrameType::Command => 4,
            FrameType::Config3 => 5,
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameType::Data => write!(f, "Data Frame"),
            FrameType::Header => write!(f, "Header Frame"),
            FrameType::Config1 => write!(f, "Configuration Frame 1"),
            FrameType::Config2 => write!(f, "Configuration Frame 2"),
            FrameType::Command => write!(f, "Command Frame"),
            FrameType::Config3 => write!(f, "Configuration Frame 3"),
        }
    }
}

/// Builds a SYNC word for the given frame type.
///
/// Bit 15 is always 1 (0xAA lead byte), bits 6-4 carry the frame type and
/// bits 3-0 the version nibble, 0001 for this standard.
pub fn create_sync(frame_type: FrameType) -> u16 {
    ((SYNC_LEAD as u16) << 8) | (frame_type.type_bits() << 4) | VERSION_2011 as u16
}

/// Common prefix carried by every frame.
///
/// # Fields
///
/// * `sync`: SYNC word — lead byte 0xAA, frame type (bits 6-4), version
///   (bits 3-0).
/// * `framesize`: total frame length in bytes, checksum included.
/// * `idcode`: data stream identifier.
/// * `soc`: second-of-century, UNIX seconds.
/// * `time_quality`: leap-second flags (bits 6-4) and message time quality
///   (bits 3-0); bit 7 reserved.
/// * `fracsec`: fraction of second, a 24-bit count of `TIME_BASE` ticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixFrame {
    pub sync: u16,
    pub framesize: u16,
    pub idcode: u16,
    pub soc: u32,
    pub time_quality: u8,
    pub fracsec: u32,
}

impl PrefixFrame {
    /// Creates a prefix for the given frame type with zeroed time fields.
    ///
    /// `framesize` starts at the bare minimum and is recomputed when the
    /// owning frame is encoded.
    pub fn new(frame_type: FrameType, idcode: u16) -> Self {
        PrefixFrame {
            sync: create_sync(frame_type),
            framesize: MIN_FRAME_SIZE as u16,
            idcode,
            soc: 0,
            time_quality: 0,
            fracsec: 0,
        }
    }

    /// Parses a prefix from the first 14 bytes of a frame.
    pub fn from_hex(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < PREFIX_SIZE {
            return Err(FrameError::ShortFrame {
                message: format!("prefix needs {} bytes, got {}", PREFIX_SIZE, bytes.len()),
            });
        }
        Ok(PrefixFrame {
            sync: u16::from_be_bytes([bytes[0], bytes[1]]),
            framesize: u16::from_be_bytes([bytes[2], bytes[3]]),
            idcode: u16::from_be_bytes([bytes[4], bytes[5]]),
            soc: u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]),
            time_quality: bytes[10],
            fracsec: u32::from_be_bytes([0, bytes[11], bytes[12], bytes[13]]),
        })
    }

    /// Serializes the prefix to its 14-byte wire form.
    pub fn to_hex(&self) -> [u8; PREFIX_SIZE] {
        let mut result = [0u8; PREFIX_SIZE];
        result[0..2].copy_from_slice(&self.sync.to_be_bytes());
        result[2..4].copy_from_slice(&self.framesize.to_be_bytes());
        result[4..6].copy_from_slice(&self.idcode.to_be_bytes());
        result[6..10].copy_from_slice(&self.soc.to_be_bytes());
        result[10] = self.time_quality;
        let fracsec = self.fracsec.to_be_bytes();
        result[11..14].copy_from_slice(&fracsec[1..4]);
        result
    }

    /// Frame type named by the SYNC word.
    pub fn frame_type(&self) -> Result<FrameType, FrameError> {
        FrameType::from_sync(self.sync)
    }

    /// Stamps the prefix with the current UTC time against `time_base`.
    pub fn set_time_now(&mut self, time_base: u32) {
        let (soc, fracsec) = utils::now_to_soc_fracsec(time_base);
        self.soc = soc;
        self.fracsec = fracsec;
    }

    /// Frame timestamp as a `chrono` instant, `None` if `time_base` is zero
    /// or the SOC is unrepresentable.
    pub fn timestamp(&self, time_base: u32) -> Option<chrono::DateTime<chrono::Utc>> {
        utils::frame_time(self.soc, self.fracsec, time_base)
    }
}

/// The STAT word of a data frame, per Table 7 of the standard.
///
/// Bit positions: 15-14 data error, 13 PMU sync lost, 12 data sorting by
/// arrival, 11 trigger detected, 10 configuration change pending, 9 data
/// modified, 8-6 PMU time quality, 5-4 unlocked time, 3-0 trigger reason.
/// All sixteen bits are covered, so `from_raw` and `to_raw` are exact
/// inverses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatField {
    /// 0 = good data, 1 = PMU error, 2 = test mode, 3 = PMU error, do not use.
    pub data_error: u8,
    /// Set when the PMU is not locked to a UTC time source.
    pub sync_lost: bool,
    /// Set when data is sorted by arrival rather than timestamp.
    pub data_sorting: bool,
    /// Set when a trigger was detected.
    pub trigger: bool,
    /// Set while a configuration change is pending.
    pub config_change: bool,
    /// Set when the data has been modified by post-processing.
    pub data_modified: bool,
    /// Worst-case PMU time quality code, 3 bits.
    pub time_quality: u8,
    /// Time since the PMU lost time lock, 2-bit code.
    pub unlock_time: u8,
    /// Trigger reason code, 4 bits.
    pub trigger_reason: u8,
}

impl StatField {
    /// STAT for a healthy, time-locked measurement: every bit clear.
    pub fn ok() -> Self {
        StatField::default()
    }

    /// Decomposes a raw STAT word.
    pub fn from_raw(raw: u16) -> Self {
        StatField {
            data_error: ((raw >> 14) & 0x03) as u8,
            sync_lost: raw & 0x2000 != 0,
            data_sorting: raw & 0x1000 != 0,
            trigger: raw & 0x0800 != 0,
            config_change: raw & 0x0400 != 0,
            data_modified: raw & 0x0200 != 0,
            time_quality: ((raw >> 6) & 0x07) as u8,
            unlock_time: ((raw >> 4) & 0x03) as u8,
            trigger_reason: (raw & 0x000F) as u8,
        }
    }

    /// Packs the field back into its raw 16-bit form.
    pub fn to_raw(&self) -> u16 {
        let mut raw = (self.data_error as u16 & 0x03) << 14;
        raw |= (self.sync_lost as u16) << 13;
        raw |= (self.data_sorting as u16) << 12;
        raw |= (self.trigger as u16) << 11;
        raw |= (self.config_change as u16) << 10;
        raw |= (self.data_modified as u16) << 9;
        raw |= (self.time_quality as u16 & 0x07) << 6;
        raw |= (self.unlock_time as u16 & 0x03) << 4;
        raw |= self.trigger_reason as u16 & 0x000F;
        raw
    }

    /// True when the data error code reports a usable measurement.
    pub fn data_valid(&self) -> bool {
        self.data_error == 0
    }
}
