//! # Phasor Wire Representations
//!
//! A phasor travels in one of four shapes, selected per station by the
//! FORMAT word of the configuration: integer or IEEE-754 float components,
//! rectangular (real, imaginary) or polar (magnitude, angle) coordinates.
//! Polar versus rectangular is a semantic interpretation only; the byte
//! layout is two 16-bit integers or two 32-bit floats either way.
//!
//! Integer polar phasors carry an unsigned magnitude followed by a signed
//! angle in 1e-4 radian units. Integer rectangular components are signed and
//! scaled by the channel's PHUNIT word (1e-5 V or A per count).

use super::common::FrameError;
use serde::{Deserialize, Serialize};

/// PHUNIT integer data is scaled by `scale * 1e-5` volts or amperes per count.
const PHUNIT_LSB: f32 = 1.0e-5;

/// Integer polar angles are in units of 1e-4 radians.
const ANGLE_LSB: f32 = 1.0e-4;

/// A phasor measurement in its on-wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PhasorValue {
    IntRect(PhasorIntRect),
    IntPolar(PhasorIntPolar),
    FloatRect(PhasorFloatRect),
    FloatPolar(PhasorFloatPolar),
}

impl PhasorValue {
    /// Parses one phasor of the shape the FORMAT word dictates.
    pub fn from_hex(bytes: &[u8], polar: bool, float: bool) -> Result<Self, FrameError> {
        match (float, polar) {
            (false, false) => Ok(PhasorValue::IntRect(PhasorIntRect::from_hex(bytes)?)),
            (false, true) => Ok(PhasorValue::IntPolar(PhasorIntPolar::from_hex(bytes)?)),
            (true, false) => Ok(PhasorValue::FloatRect(PhasorFloatRect::from_hex(bytes)?)),
            (true, true) => Ok(PhasorValue::FloatPolar(PhasorFloatPolar::from_hex(bytes)?)),
        }
    }

    /// Appends the wire form to `out`.
    pub fn write_hex(&self, out: &mut Vec<u8>) {
        match self {
            PhasorValue::IntRect(p) => out.extend_from_slice(&p.to_hex()),
            PhasorValue::IntPolar(p) => out.extend_from_slice(&p.to_hex()),
            PhasorValue::FloatRect(p) => out.extend_from_slice(&p.to_hex()),
            PhasorValue::FloatPolar(p) => out.extend_from_slice(&p.to_hex()),
        }
    }

    /// Encoded size in bytes: 4 for integer shapes, 8 for float shapes.
    pub fn size(&self) -> usize {
        match self {
            PhasorValue::IntRect(_) | PhasorValue::IntPolar(_) => 4,
            PhasorValue::FloatRect(_) | PhasorValue::FloatPolar(_) => 8,
        }
    }

    /// True for the polar shapes.
    pub fn is_polar(&self) -> bool {
        matches!(self, PhasorValue::IntPolar(_) | PhasorValue::FloatPolar(_))
    }

    /// True for the float shapes.
    pub fn is_float(&self) -> bool {
        matches!(self, PhasorValue::FloatRect(_) | PhasorValue::FloatPolar(_))
    }

    /// Converts to engineering-unit polar form. `phunit_scale` is the
    /// channel's PHUNIT scale and is only consulted for integer shapes.
    pub fn to_polar(&self, phunit_scale: u32) -> PhasorFloatPolar {
        match self {
            PhasorValue::FloatPolar(p) => *p,
            PhasorValue::FloatRect(p) => p.to_polar(),
            PhasorValue::IntPolar(p) => p.to_polar(phunit_scale),
            PhasorValue::IntRect(p) => p.to_rect(phunit_scale).to_polar(),
        }
    }

    /// Converts to engineering-unit rectangular form.
    pub fn to_rect(&self, phunit_scale: u32) -> PhasorFloatRect {
        match self {
            PhasorValue::FloatRect(p) => *p,
            PhasorValue::FloatPolar(p) => p.to_rect(),
            PhasorValue::IntRect(p) => p.to_rect(phunit_scale),
            PhasorValue::IntPolar(p) => p.to_polar(phunit_scale).to_rect(),
        }
    }
}

/// Integer rectangular phasor: signed raw components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasorIntRect {
    pub real: i16,
    pub imag: i16,
}

impl PhasorIntRect {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < 4 {
            return Err(FrameError::ShortFrame {
                message: format!("integer phasor needs 4 bytes, got {}", bytes.len()),
            });
        }
        Ok(PhasorIntRect {
            real: i16::from_be_bytes([bytes[0], bytes[1]]),
            imag: i16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }

    pub fn to_hex(&self) -> [u8; 4] {
        let mut result = [0u8; 4];
        result[0..2].copy_from_slice(&self.real.to_be_bytes());
        result[2..4].copy_from_slice(&self.imag.to_be_bytes());
        result
    }

    pub fn to_rect(&self, phunit_scale: u32) -> PhasorFloatRect {
        let scale = phunit_scale as f32 * PHUNIT_LSB;
        PhasorFloatRect {
            real: self.real as f32 * scale,
            imag: self.imag as f32 * scale,
        }
    }
}

/// Integer polar phasor: unsigned magnitude, then angle in 1e-4 rad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasorIntPolar {
    pub magnitude: u16,
    pub angle: i16,
}

impl PhasorIntPolar {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < 4 {
            return Err(FrameError::ShortFrame {
                message: format!("integer phasor needs 4 bytes, got {}", bytes.len()),
            });
        }
        Ok(PhasorIntPolar {
            magnitude: u16::from_be_bytes([bytes[0], bytes[1]]),
            angle: i16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }

    pub fn to_hex(&self) -> [u8; 4] {
        let mut result = [0u8; 4];
        result[0..2].copy_from_slice(&self.magnitude.to_be_bytes());
        result[2..4].copy_from_slice(&self.angle.to_be_bytes());
        result
    }

    pub fn to_polar(&self, phunit_scale: u32) -> PhasorFloatPolar {
        PhasorFloatPolar {
            magnitude: self.magnitude as f32 * phunit_scale as f32 * PHUNIT_LSB,
            angle: self.angle as f32 * ANGLE_LSB,
        }
    }
}

/// Floating-point rectangular phasor, already in engineering units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhasorFloatRect {
    pub real: f32,
    pub imag: f32,
}

impl PhasorFloatRect {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < 8 {
            return Err(FrameError::ShortFrame {
                message: format!("float phasor needs 8 bytes, got {}", bytes.len()),
            });
        }
        Ok(PhasorFloatRect {
            real: f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            imag: f32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }

    pub fn to_hex(&self) -> [u8; 8] {
        let mut result = [0u8; 8];
        result[0..4].copy_from_slice(&self.real.to_be_bytes());
        result[4..8].copy_from_slice(&self.imag.to_be_bytes());
        result
    }

    pub fn to_polar(&self) -> PhasorFloatPolar {
        PhasorFloatPolar {
            magnitude: (self.real * self.real + self.imag * self.imag).sqrt(),
            angle: self.imag.atan2(self.real),
        }
    }
}

/// Floating-point polar phasor: magnitude in engineering units, angle in
/// radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhasorFloatPolar {
    pub magnitude: f32,
    pub angle: f32,
}

impl PhasorFloatPolar {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < 8 {
            return Err(FrameError::ShortFrame {
                message: format!("float phasor needs 8 bytes, got {}", bytes.len()),
            });
        }
        Ok(PhasorFloatPolar {
            magnitude: f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            angle: f32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }

    pub fn to_hex(&self) -> [u8; 8] {
        let mut result = [0u8; 8];
        result[0..4].copy_from_slice(&self.magnitude.to_be_bytes());
        result[4..8].copy_from_slice(&self.angle.to_be_bytes());
        result
    }

    pub fn to_rect(&self) -> PhasorFloatRect {
        PhasorFloatRect {
            real: self.magnitude * self.angle.cos(),
            imag: self.magnitude * self.angle.sin(),
        }
    }
}
