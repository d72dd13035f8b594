//! # Data Frames
//!
//! One data frame carries one measurement block per configured station:
//! STAT word, phasors, FREQ/DFREQ, analog values and digital status words.
//! The byte layout of every block is dictated by the station's FORMAT word
//! and channel counts, so a data frame can only be decoded against the
//! configuration frame that preceded it on the stream.

use super::common::{FrameError, FrameType, PrefixFrame, StatField, PREFIX_SIZE};
use super::config::ConfigurationFrame;
use super::phasors::{
    PhasorFloatPolar, PhasorFloatRect, PhasorIntPolar, PhasorIntRect, PhasorValue,
};
use super::utils::{calculate_crc, validate_checksum};
use serde::{Deserialize, Serialize};

/// A FREQ or DFREQ value.
///
/// Fixed-point frequency is the deviation from nominal in millihertz;
/// floating point carries the value directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FreqValue {
    Fixed(i16),
    Float(f32),
}

impl FreqValue {
    fn from_hex(bytes: &[u8], float: bool) -> Result<Self, FrameError> {
        if float {
            if bytes.len() < 4 {
                return Err(FrameError::ShortFrame {
                    message: format!("float FREQ needs 4 bytes, got {}", bytes.len()),
                });
            }
            Ok(FreqValue::Float(f32::from_be_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ])))
        } else {
            if bytes.len() < 2 {
                return Err(FrameError::ShortFrame {
                    message: format!("fixed FREQ needs 2 bytes, got {}", bytes.len()),
                });
            }
            Ok(FreqValue::Fixed(i16::from_be_bytes([bytes[0], bytes[1]])))
        }
    }

    fn write_hex(&self, out: &mut Vec<u8>) {
        match self {
            FreqValue::Fixed(v) => out.extend_from_slice(&v.to_be_bytes()),
            FreqValue::Float(v) => out.extend_from_slice(&v.to_be_bytes()),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            FreqValue::Fixed(_) => 2,
            FreqValue::Float(_) => 4,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, FreqValue::Float(_))
    }
}

/// An analog channel value: fixed-point scaled by the channel's ANUNIT
/// word, or floating point in engineering units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AnalogValue {
    Fixed(i16),
    Float(f32),
}

impl AnalogValue {
    fn from_hex(bytes: &[u8], float: bool) -> Result<Self, FrameError> {
        if float {
            if bytes.len() < 4 {
                return Err(FrameError::ShortFrame {
                    message: format!("float analog needs 4 bytes, got {}", bytes.len()),
                });
            }
            Ok(AnalogValue::Float(f32::from_be_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ])))
        } else {
            if bytes.len() < 2 {
                return Err(FrameError::ShortFrame {
                    message: format!("fixed analog needs 2 bytes, got {}", bytes.len()),
                });
            }
            Ok(AnalogValue::Fixed(i16::from_be_bytes([bytes[0], bytes[1]])))
        }
    }

    fn write_hex(&self, out: &mut Vec<u8>) {
        match self {
            AnalogValue::Fixed(v) => out.extend_from_slice(&v.to_be_bytes()),
            AnalogValue::Float(v) => out.extend_from_slice(&v.to_be_bytes()),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            AnalogValue::Fixed(_) => 2,
            AnalogValue::Float(_) => 4,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, AnalogValue::Float(_))
    }
}

/// One station's measurement block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub stat: StatField,
    pub phasors: Vec<PhasorValue>,
    pub freq: FreqValue,
    pub dfreq: FreqValue,
    pub analogs: Vec<AnalogValue>,
    pub digitals: Vec<u16>,
}

impl Measurement {
    fn byte_len(&self) -> usize {
        2 + self.phasors.iter().map(|p| p.size()).sum::<usize>()
            + self.freq.size()
            + self.dfreq.size()
            + self.analogs.iter().map(|a| a.size()).sum::<usize>()
            + 2 * self.digitals.len()
    }

    fn write_hex(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.stat.to_raw().to_be_bytes());
        for phasor in &self.phasors {
            phasor.write_hex(out);
        }
        self.freq.write_hex(out);
        self.dfreq.write_hex(out);
        for analog in &self.analogs {
            analog.write_hex(out);
        }
        for digital in &self.digitals {
            out.extend_from_slice(&digital.to_be_bytes());
        }
    }
}

/// A complete data frame: prefix, one measurement block per station,
/// trailing checksum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    pub prefix: PrefixFrame,
    pub measurements: Vec<Measurement>,
}

impl DataFrame {
    /// Builds a data frame and validates it against `cfg` before it can
    /// reach the wire.
    pub fn new(
        idcode: u16,
        measurements: Vec<Measurement>,
        cfg: &ConfigurationFrame,
    ) -> Result<Self, FrameError> {
        let mut frame = DataFrame {
            prefix: PrefixFrame::new(FrameType::Data, idcode),
            measurements,
        };
        frame.prefix.framesize = frame.encoded_len() as u16;
        frame.validate_against(cfg)?;
        Ok(frame)
    }

    /// Encoded frame length in bytes, checksum included.
    pub fn encoded_len(&self) -> usize {
        PREFIX_SIZE + self.measurements.iter().map(|m| m.byte_len()).sum::<usize>() + 2
    }

    /// Checks that every measurement block matches the counts and formats
    /// its station declares.
    pub fn validate_against(&self, cfg: &ConfigurationFrame) -> Result<(), FrameError> {
        if self.measurements.len() != cfg.stations.len() {
            return Err(FrameError::InvalidLayout {
                message: format!(
                    "configuration has {} stations, data frame has {} measurement blocks",
                    cfg.stations.len(),
                    self.measurements.len()
                ),
            });
        }
        for (station, m) in cfg.stations.iter().zip(&self.measurements) {
            if m.phasors.len() != station.phasor_num as usize {
                return Err(FrameError::InvalidLayout {
                    message: format!(
                        "station {} expects {} phasors, got {}",
                        station.idcode,
                        station.phasor_num,
                        m.phasors.len()
                    ),
                });
            }
            if m.analogs.len() != station.analog_num as usize {
                return Err(FrameError::InvalidLayout {
                    message: format!(
                        "station {} expects {} analogs, got {}",
                        station.idcode,
                        station.analog_num,
                        m.analogs.len()
                    ),
                });
            }
            if m.digitals.len() != station.digital_num as usize {
                return Err(FrameError::InvalidLayout {
                    message: format!(
                        "station {} expects {} digital words, got {}",
                        station.idcode,
                        station.digital_num,
                        m.digitals.len()
                    ),
                });
            }
            for phasor in &m.phasors {
                if phasor.is_float() != station.phasor_float()
                    || phasor.is_polar() != station.phasor_polar()
                {
                    return Err(FrameError::InvalidLayout {
                        message: format!(
                            "station {} phasor representation disagrees with FORMAT 0x{:04X}",
                            station.idcode, station.format
                        ),
                    });
                }
            }
            if m.freq.is_float() != station.freq_float() || m.dfreq.is_float() != station.freq_float()
            {
                return Err(FrameError::InvalidLayout {
                    message: format!(
                        "station {} FREQ representation disagrees with FORMAT 0x{:04X}",
                        station.idcode, station.format
                    ),
                });
            }
            for analog in &m.analogs {
                if analog.is_float() != station.analog_float() {
                    return Err(FrameError::InvalidLayout {
                        message: format!(
                            "station {} analog representation disagrees with FORMAT 0x{:04X}",
                            station.idcode, station.format
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Parses a complete data frame buffer against `cfg`.
    pub fn from_hex(bytes: &[u8], cfg: &ConfigurationFrame) -> Result<Self, FrameError> {
        if bytes.len() < PREFIX_SIZE + 2 {
            return Err(FrameError::ShortFrame {
                message: format!("data frame needs at least 16 bytes, got {}", bytes.len()),
            });
        }
        validate_checksum(bytes)?;
        let prefix = PrefixFrame::from_hex(bytes)?;
        if prefix.frame_type()? != FrameType::Data {
            return Err(FrameError::UnknownFrame {
                message: format!("expected a data frame, got SYNC 0x{:04X}", prefix.sync),
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

        let payload_end = bytes.len() - 2;
        let mut offset = PREFIX_SIZE;
        let mut measurements = Vec::with_capacity(cfg.stations.len());

        for station in &cfg.stations {
            let need = station.data_block_size();
            if offset + need > payload_end {
                return Err(FrameError::ShortFrame {
                    message: format!(
                        "station {} needs {} bytes at offset {}, only {} remain",
                        station.idcode,
                        need,
                        offset,
                        payload_end - offset
                    ),
                });
            }

            let stat = StatField::from_raw(u16::from_be_bytes([bytes[offset], bytes[offset + 1]]));
            offset += 2;

            let phasor_size = station.phasor_size();
            let mut phasors = Vec::with_capacity(station.phasor_num as usize);
            for _ in 0..station.phasor_num {
                phasors.push(PhasorValue::from_hex(
                    &bytes[offset..offset + phasor_size],
                    station.phasor_polar(),
                    station.phasor_float(),
                )?);
                offset += phasor_size;
            }

            let freq_size = station.freq_size();
            let freq = FreqValue::from_hex(&bytes[offset..offset + freq_size], station.freq_float())?;
            offset += freq_size;
            let dfreq =
                FreqValue::from_hex(&bytes[offset..offset + freq_size], station.freq_float())?;
            offset += freq_size;

            let analog_size = station.analog_size();
            let mut analogs = Vec::with_capacity(station.analog_num as usize);
            for _ in 0..station.analog_num {
                analogs.push(AnalogValue::from_hex(
                    &bytes[offset..offset + analog_size],
                    station.analog_float(),
                )?);
                offset += analog_size;
            }

            let mut digitals = Vec::with_capacity(station.digital_num as usize);
            for _ in 0..station.digital_num {
                digitals.push(u16::from_be_bytes([bytes[offset], bytes[offset + 1]]));
                offset += 2;
            }

            measurements.push(Measurement {
                stat,
                phasors,
                freq,
                dfreq,
                analogs,
                digitals,
            });
        }

        if offset != payload_end {
            return Err(FrameError::InvalidLayout {
                message: format!(
                    "{} unaccounted payload bytes after {} stations",
                    payload_end - offset,
                    cfg.stations.len()
                ),
            });
        }

        Ok(DataFrame {
            prefix,
            measurements,
        })
    }

    /// Serializes the frame, recomputing FRAMESIZE and the checksum. The
    /// measurement variants carry their own representation, so no
    /// configuration is needed here; validation against one happens in
    /// [`DataFrame::new`] or [`DataFrame::validate_against`].
    pub fn to_hex(&self) -> Vec<u8> {
        let framesize = self.encoded_len();
        let mut prefix = self.prefix.clone();
        prefix.framesize = framesize as u16;

        let mut result = Vec::with_capacity(framesize);
        result.extend_from_slice(&prefix.to_hex());
        for m in &self.measurements {
            m.write_hex(&mut result);
        }
        let chk = calculate_crc(&result);
        result.extend_from_slice(&chk.to_be_bytes());
        result
    }

    /// The IEEE sample measurement set (the values the standard's annex
    /// walks through), shaped to fit `cfg`.
    pub fn ieee_sample(cfg: &ConfigurationFrame) -> Result<Self, FrameError> {
        const RECT: [(i16, i16); 4] = [(14635, 0), (-7318, -12676), (-7318, 12675), (1092, 0)];
        const ANALOGS: [i16; 3] = [100, 1000, 10000];

        let mut measurements = Vec::with_capacity(cfg.stations.len());
        for station in &cfg.stations {
            let phasors = (0..station.phasor_num as usize)
                .map(|i| {
                    let (re, im) = RECT[i % RECT.len()];
                    match (station.phasor_float(), station.phasor_polar()) {
                        (false, false) => PhasorValue::IntRect(PhasorIntRect { real: re, imag: im }),
                        (false, true) => PhasorValue::IntPolar(PhasorIntPolar {
                            magnitude: re.unsigned_abs(),
                            angle: im,
                        }),
                        (true, false) => PhasorValue::FloatRect(PhasorFloatRect {
                            real: re as f32,
                            imag: im as f32,
                        }),
                        (true, true) => PhasorValue::FloatPolar(PhasorFloatPolar {
                            magnitude: re.unsigned_abs() as f32,
                            angle: im as f32 * 1.0e-4,
                        }),
                    }
                })
                .collect();

            let (freq, dfreq) = if station.freq_float() {
                (
                    FreqValue::Float(station.fnom.hz()),
                    FreqValue::Float(0.0),
                )
            } else {
                (FreqValue::Fixed(2500), FreqValue::Fixed(0))
            };

            let analogs = (0..station.analog_num as usize)
                .map(|i| {
                    let value = ANALOGS[i % ANALOGS.len()];
                    if station.analog_float() {
                        AnalogValue::Float(value as f32)
                    } else {
                        AnalogValue::Fixed(value)
                    }
                })
                .collect();

            measurements.push(Measurement {
                stat: StatField::ok(),
                phasors,
                freq,
                dfreq,
                analogs,
                digitals: vec![0x3C12; station.digital_num as usize],
            });
        }

        DataFrame::new(cfg.prefix.idcode, measurements, cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ieee_c37_118::config::ConfigurationFrame;

    #[test]
    fn test_sample_roundtrip() {
        let cfg = ConfigurationFrame::ieee_sample(7734, 30).unwrap();
        let mut frame = DataFrame::ieee_sample(&cfg).unwrap();
        frame.prefix.soc = 1_149_580_800;
        frame.prefix.fracsec = 16_817;

        let bytes = frame.to_hex();
        assert_eq!(bytes.len(), cfg.data_frame_size());
        assert_eq!(bytes.len(), 52);

        let decoded = DataFrame::from_hex(&bytes, &cfg).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_validation_catches_count_mismatch() {
        let cfg = ConfigurationFrame::ieee_sample(7734, 30).unwrap();
        let mut frame = DataFrame::ieee_sample(&cfg).unwrap();
        frame.measurements[0].phasors.pop();
        assert!(matches!(
            frame.validate_against(&cfg),
            Err(FrameError::InvalidLayout { .. })
        ));
    }

    #[test]
    fn test_validation_catches_format_mismatch() {
        let cfg = ConfigurationFrame::ieee_sample(7734, 30).unwrap();
        let mut frame = DataFrame::ieee_sample(&cfg).unwrap();
        // The sample config declares float analogs.
        frame.measurements[0].analogs[0] = AnalogValue::Fixed(100);
        assert!(matches!(
            frame.validate_against(&cfg),
            Err(FrameError::InvalidLayout { .. })
        ));
    }

    #[test]
    fn test_decode_needs_matching_size() {
        let cfg = ConfigurationFrame::ieee_sample(7734, 30).unwrap();
        let frame = DataFrame::ieee_sample(&cfg).unwrap();
        let bytes = frame.to_hex();

        // Decode against a config expecting a different layout.
        let mut other = ConfigurationFrame::ieee_sample(7734, 30).unwrap();
        other.set_channel_counts(0, 2, 0, 0).unwrap();
        assert!(DataFrame::from_hex(&bytes, &other).is_err());
    }

    #[test]
    fn test_stat_survives_roundtrip() {
        let cfg = ConfigurationFrame::ieee_sample(7734, 30).unwrap();
        let mut frame = DataFrame::ieee_sample(&cfg).unwrap();
        frame.measurements[0].stat = StatField {
            data_error: 1,
            sync_lost: true,
            time_quality: 5,
            trigger_reason: 3,
            ..StatField::default()
        };
        let decoded = DataFrame::from_hex(&frame.to_hex(), &cfg).unwrap();
        assert_eq!(decoded.measurements[0].stat, frame.measurements[0].stat);
        assert!(!decoded.measurements[0].stat.data_valid());
    }
}
