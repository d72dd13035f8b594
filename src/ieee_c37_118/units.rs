//! # Channel Conversion Factors
//!
//! The per-channel unit words of a configuration frame: PHUNIT (phasor
//! scaling), ANUNIT (analog scaling), DIGUNIT (digital mask words) and the
//! FNOM nominal-frequency word.

use super::common::FrameError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// PHUNIT — conversion factor for one phasor channel.
///
/// The most significant byte flags voltage (0) or current (1); the low 24
/// bits are an unsigned scale in 1e-5 V or A per bit, applied to 16-bit
/// integer phasor data and ignored for floating-point formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasorUnit {
    pub is_current: bool,
    pub scale: u32,
}

impl PhasorUnit {
    pub fn voltage(scale: u32) -> Result<Self, FrameError> {
        Self::new(false, scale)
    }

    pub fn current(scale: u32) -> Result<Self, FrameError> {
        Self::new(true, scale)
    }

    pub fn new(is_current: bool, scale: u32) -> Result<Self, FrameError> {
        if scale > 0x00FF_FFFF {
            return Err(FrameError::FieldRange {
                message: format!("PHUNIT scale {} exceeds 24 bits", scale),
            });
        }
        Ok(PhasorUnit { is_current, scale })
    }

    pub fn from_hex(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < 4 {
            return Err(FrameError::ShortFrame {
                message: format!("PHUNIT needs 4 bytes, got {}", bytes.len()),
            });
        }
        Ok(PhasorUnit {
            is_current: bytes[0] != 0,
            scale: u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]]),
        })
    }

    pub fn to_hex(&self) -> [u8; 4] {
        let mut bytes = self.scale.to_be_bytes();
        bytes[0] = self.is_current as u8;
        bytes
    }

    /// Scale applied to a raw integer phasor component, in V or A per count.
    pub fn unit_scale(&self) -> f32 {
        self.scale as f32 * 1.0e-5
    }
}

/// Measurement type carried in the high byte of an ANUNIT word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalogKind {
    /// Single point-on-wave sample.
    PointOnWave,
    /// RMS of the analog input.
    Rms,
    /// Peak of the analog input.
    Peak,
    /// Reserved or user-defined type code.
    Reserved(u8),
}

impl AnalogKind {
    fn from_code(code: u8) -> Self {
        match code {
            0 => AnalogKind::PointOnWave,
            1 => AnalogKind::Rms,
            2 => AnalogKind::Peak,
            other => AnalogKind::Reserved(other),
        }
    }

    fn code(self) -> u8 {
        match self {
            AnalogKind::PointOnWave => 0,
            AnalogKind::Rms => 1,
            AnalogKind::Peak => 2,
            AnalogKind::Reserved(code) => code,
        }
    }
}

impl fmt::Display for AnalogKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AnalogKind::PointOnWave => write!(f, "point-on-wave"),
            AnalogKind::Rms => write!(f, "RMS"),
            AnalogKind::Peak => write!(f, "peak"),
            AnalogKind::Reserved(code) => write!(f, "reserved ({})", code),
        }
    }
}

/// ANUNIT — conversion factor for one analog channel.
///
/// High byte is the measurement type code; the low 24 bits are a signed,
/// user-defined scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalogUnit {
    pub kind: AnalogKind,
    pub scale: i32,
}

impl AnalogUnit {
    pub fn new(kind: AnalogKind, scale: i32) -> Result<Self, FrameError> {
        if !(-8_388_608..=8_388_607).contains(&scale) {
            return Err(FrameError::FieldRange {
                message: format!("ANUNIT scale {} exceeds signed 24 bits", scale),
            });
        }
        Ok(AnalogUnit { kind, scale })
    }

    pub fn from_hex(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < 4 {
            return Err(FrameError::ShortFrame {
                message: format!("ANUNIT needs 4 bytes, got {}", bytes.len()),
            });
        }
        let raw = u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]]);
        // Sign-extend the 24-bit scale.
        let scale = if raw & 0x0080_0000 != 0 {
            (raw | 0xFF00_0000) as i32
        } else {
            raw as i32
        };
        Ok(AnalogUnit {
            kind: AnalogKind::from_code(bytes[0]),
            scale,
        })
    }

    pub fn to_hex(&self) -> [u8; 4] {
        let mut bytes = (self.scale as u32).to_be_bytes();
        bytes[0] = self.kind.code();
        bytes
    }
}

/// DIGUNIT — mask words for one digital status word.
///
/// The first word gives the normal status of the inputs (XOR with the
/// status word yields zero in the normal state); the second flags which
/// inputs are currently valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalUnit {
    pub normal_state: u16,
    pub valid_inputs: u16,
}

impl DigitalUnit {
    pub fn new(normal_state: u16, valid_inputs: u16) -> Self {
        DigitalUnit {
            normal_state,
            valid_inputs,
        }
    }

    pub fn from_hex(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < 4 {
            return Err(FrameError::ShortFrame {
                message: format!("DIGUNIT needs 4 bytes, got {}", bytes.len()),
            });
        }
        Ok(DigitalUnit {
            normal_state: u16::from_be_bytes([bytes[0], bytes[1]]),
            valid_inputs: u16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }

    pub fn to_hex(&self) -> [u8; 4] {
        let mut bytes = [0u8; 4];
        bytes[0..2].copy_from_slice(&self.normal_state.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.valid_inputs.to_be_bytes());
        bytes
    }
}

/// FNOM — nominal line frequency word. Bit 0 set means 50 Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NominalFrequency {
    Hz50,
    Hz60,
}

impl NominalFrequency {
    pub fn from_raw(raw: u16) -> Self {
        if raw & 0x0001 != 0 {
            NominalFrequency::Hz50
        } else {
            NominalFrequency::Hz60
        }
    }

    pub fn to_raw(self) -> u16 {
        match self {
            NominalFrequency::Hz50 => 1,
            NominalFrequency::Hz60 => 0,
        }
    }

    /// Creates the word from a frequency in hertz; only 50 and 60 are legal.
    pub fn from_hz(hz: u16) -> Result<Self, FrameError> {
        match hz {
            50 => Ok(NominalFrequency::Hz50),
            60 => Ok(NominalFrequency::Hz60),
            other => Err(FrameError::FieldRange {
                message: format!("nominal frequency must be 50 or 60 Hz, got {}", other),
            }),
        }
    }

    pub fn hz(self) -> f32 {
        match self {
            NominalFrequency::Hz50 => 50.0,
            NominalFrequency::Hz60 => 60.0,
        }
    }
}

impl fmt::Display for NominalFrequency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NominalFrequency::Hz50 => write!(f, "50 Hz"),
            NominalFrequency::Hz60 => write!(f, "60 Hz"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phasor_unit_reference_words() {
        // Voltage and current PHUNIT words from the standard's annex example.
        let voltage = PhasorUnit::from_hex(&[0x00, 0x0D, 0xF8, 0x47]).unwrap();
        assert!(!voltage.is_current);
        assert_eq!(voltage.scale, 915_527);

        let current = PhasorUnit::from_hex(&[0x01, 0x00, 0xB2, 0xD0]).unwrap();
        assert!(current.is_current);
        assert_eq!(current.scale, 45_776);

        assert_eq!(voltage.to_hex(), [0x00, 0x0D, 0xF8, 0x47]);
        assert_eq!(current.to_hex(), [0x01, 0x00, 0xB2, 0xD0]);
    }

    #[test]
    fn test_phasor_unit_scale_range() {
        assert!(PhasorUnit::voltage(0x0100_0000).is_err());
        assert!(PhasorUnit::voltage(0x00FF_FFFF).is_ok());
    }

    #[test]
    fn test_analog_unit_roundtrip() {
        for (kind, scale) in [
            (AnalogKind::PointOnWave, 1),
            (AnalogKind::Rms, -1000),
            (AnalogKind::Peak, 8_388_607),
            (AnalogKind::PointOnWave, -8_388_608),
        ] {
            let unit = AnalogUnit::new(kind, scale).unwrap();
            let decoded = AnalogUnit::from_hex(&unit.to_hex()).unwrap();
            assert_eq!(decoded, unit);
        }
    }

    #[test]
    fn test_analog_unit_reference_words() {
        assert_eq!(
            AnalogUnit::new(AnalogKind::PointOnWave, 1).unwrap().to_hex(),
            [0x00, 0x00, 0x00, 0x01]
        );
        assert_eq!(
            AnalogUnit::new(AnalogKind::Rms, 1).unwrap().to_hex(),
            [0x01, 0x00, 0x00, 0x01]
        );
        assert_eq!(
            AnalogUnit::new(AnalogKind::Peak, 1).unwrap().to_hex(),
            [0x02, 0x00, 0x00, 0x01]
        );
    }

    #[test]
    fn test_digital_unit_roundtrip() {
        let unit = DigitalUnit::new(0x0000, 0xFFFF);
        assert_eq!(unit.to_hex(), [0x00, 0x00, 0xFF, 0xFF]);
        assert_eq!(DigitalUnit::from_hex(&unit.to_hex()).unwrap(), unit);
    }

    #[test]
    fn test_nominal_frequency() {
        assert_eq!(NominalFrequency::from_raw(0), NominalFrequency::Hz60);
        assert_eq!(NominalFrequency::from_raw(1), NominalFrequency::Hz50);
        assert_eq!(NominalFrequency::Hz60.to_raw(), 0);
        assert_eq!(NominalFrequency::Hz50.to_raw(), 1);
        assert!(NominalFrequency::from_hz(55).is_err());
    }
}
