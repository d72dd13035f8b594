//! # Checksum and Time Utilities
//!
//! CRC-CCITT as specified in Appendix B of the standard, plus SOC/FRACSEC
//! time tagging against a configurable TIME_BASE.

use super::common::FrameError;
use chrono::{DateTime, TimeZone, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

/// Calculates the CRC-CCITT checksum of `buffer`.
///
/// Polynomial 0x1021, initial value 0xFFFF, MSB first, no final XOR —
/// the parameters fixed by IEEE C37.118.2-2011 Appendix B.
pub fn calculate_crc(buffer: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in buffer {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Validates the trailing checksum of a complete frame buffer.
///
/// The last two bytes must equal the CRC of everything before them.
pub fn validate_checksum(buffer: &[u8]) -> Result<(), FrameError> {
    if buffer.len() < 2 {
        return Err(FrameError::ShortFrame {
            message: format!("buffer of {} bytes cannot carry a checksum", buffer.len()),
        });
    }
    let calculated = calculate_crc(&buffer[..buffer.len() - 2]);
    let frame_crc = u16::from_be_bytes([buffer[buffer.len() - 2], buffer[buffer.len() - 1]]);
    if calculated != frame_crc {
        return Err(FrameError::CrcMismatch {
            message: format!("expected 0x{:04X}, got 0x{:04X}", calculated, frame_crc),
        });
    }
    Ok(())
}

/// True when `buffer` ends in a checksum matching its content. The
/// boolean twin of [`validate_checksum`] for callers that only branch.
pub fn checksum_ok(buffer: &[u8]) -> bool {
    validate_checksum(buffer).is_ok()
}

/// Current UTC time as an `(soc, fracsec)` pair against `time_base`.
///
/// `fracsec` is the sub-second remainder expressed in TIME_BASE ticks and
/// masked to its 24 wire bits.
pub fn now_to_soc_fracsec(time_base: u32) -> (u32, u32) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let soc = now.as_secs() as u32;
    let fracsec =
        ((now.subsec_nanos() as u64 * time_base as u64) / 1_000_000_000) as u32 & 0x00FF_FFFF;
    (soc, fracsec)
}

/// Converts an `(soc, fracsec)` pair back into a UTC instant.
///
/// Returns `None` when `time_base` is zero (an invalid configuration that
/// is rejected before encode, but tolerated here) or the SOC does not map
/// to a representable time.
pub fn frame_time(soc: u32, fracsec: u32, time_base: u32) -> Option<DateTime<Utc>> {
    if time_base == 0 {
        return None;
    }
    let nanos = (fracsec as u64 * 1_000_000_000 / time_base as u64) as u32;
    Utc.timestamp_opt(soc as i64, nanos).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_check_value() {
        // Standard CRC-CCITT (false) check value.
        assert_eq!(calculate_crc(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_crc_empty_buffer() {
        assert_eq!(calculate_crc(&[]), 0xFFFF);
    }

    #[test]
    fn test_validate_checksum() {
        let mut frame = b"some frame bytes".to_vec();
        let crc = calculate_crc(&frame);
        frame.extend_from_slice(&crc.to_be_bytes());
        assert!(validate_checksum(&frame).is_ok());

        frame[3] ^= 0x40;
        assert!(matches!(
            validate_checksum(&frame),
            Err(FrameError::CrcMismatch { .. })
        ));
        assert!(!checksum_ok(&frame));
    }

    #[test]
    fn test_validate_checksum_short_buffer() {
        assert!(matches!(
            validate_checksum(&[0xAA]),
            Err(FrameError::ShortFrame { .. })
        ));
    }

    #[test]
    fn test_fracsec_stays_in_24_bits() {
        for time_base in [1u32, 1_000, 1_000_000, 0x00FF_FFFF] {
            let (_, fracsec) = now_to_soc_fracsec(time_base);
            assert!(fracsec <= 0x00FF_FFFF);
            assert!(fracsec < time_base || fracsec == 0);
        }
    }

    #[test]
    fn test_frame_time_roundtrip() {
        let time_base = 1_000_000;
        // 2023-01-01 00:00:00 UTC plus 654321 microseconds.
        let t = frame_time(1_672_531_200, 654_321, time_base).unwrap();
        assert_eq!(t.timestamp(), 1_672_531_200);
        assert_eq!(t.timestamp_subsec_micros(), 654_321);
    }

    #[test]
    fn test_frame_time_zero_time_base() {
        assert!(frame_time(1_672_531_200, 100, 0).is_none());
    }
}
