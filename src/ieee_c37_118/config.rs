//! # Configuration Frames
//!
//! CFG-1 and CFG-2 share one byte layout: a frame prefix, TIME_BASE, the
//! number of embedded stations, one block per station (names, counts,
//! formats, conversion factors) and a trailing DATA_RATE. The configuration
//! fixes the byte layout of every data frame on the same stream, so decoded
//! configurations are the context a data-frame decode requires.
//!
//! The mutating setters validate the way the standard demands before
//! anything reaches the wire, and bump CFGCNT once the configuration has
//! been transmitted, so consumers can detect changes.

use super::common::{create_sync, FrameError, FrameType, PrefixFrame, PREFIX_SIZE};
use super::units::{AnalogKind, AnalogUnit, DigitalUnit, NominalFrequency, PhasorUnit};
use super::utils::{calculate_crc, validate_checksum};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Fixed-size part of a station block: name, ID, FORMAT and the three
/// channel counts.
const STATION_FIXED: usize = 16 + 2 + 2 + 2 + 2 + 2;

/// Builds a FORMAT word from its four flags.
///
/// Bit 0: polar phasors, bit 1: float phasors, bit 2: float analogs,
/// bit 3: float FREQ/DFREQ. Bits 15-4 are unused.
pub fn format_word(polar: bool, phasor_float: bool, analog_float: bool, freq_float: bool) -> u16 {
    (polar as u16) | (phasor_float as u16) << 1 | (analog_float as u16) << 2 | (freq_float as u16) << 3
}

fn pad16(name: &str) -> String {
    let mut bytes: Vec<u8> = name.bytes().take(16).collect();
    bytes.resize(16, b' ');
    String::from_utf8_lossy(&bytes).into_owned()
}

fn write_name16(out: &mut Vec<u8>, name: &str) {
    let mut bytes: Vec<u8> = name.bytes().take(16).collect();
    bytes.resize(16, b' ');
    out.extend_from_slice(&bytes);
}

fn check_idcode(idcode: u16) -> Result<(), FrameError> {
    if !(1..=65534).contains(&idcode) {
        return Err(FrameError::FieldRange {
            message: format!("ID code must be 1..=65534, got {}", idcode),
        });
    }
    Ok(())
}

/// Configuration block for one station (one measurement stream).
///
/// # Fields
///
/// * `station_name`: 16-character, space-padded station label.
/// * `idcode`: the station's own data-stream identifier.
/// * `format`: FORMAT word, see [`format_word`].
/// * `phasor_num` / `analog_num` / `digital_num`: channel counts (PHNMR,
///   ANNMR, DGNMR). Each digital word carries 16 individually named bits.
/// * `channel_names`: PHNMR + ANNMR + 16·DGNMR names, 16 characters each.
/// * `phasor_units` / `analog_units` / `digital_units`: per-channel
///   conversion factors, one entry per counted channel.
/// * `fnom`: nominal line frequency.
/// * `cfg_count`: configuration change count for this station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    pub station_name: String,
    pub idcode: u16,
    pub format: u16,
    pub phasor_num: u16,
    pub analog_num: u16,
    pub digital_num: u16,
    pub channel_names: Vec<String>,
    pub phasor_units: Vec<PhasorUnit>,
    pub analog_units: Vec<AnalogUnit>,
    pub digital_units: Vec<DigitalUnit>,
    pub fnom: NominalFrequency,
    pub cfg_count: u16,
}

impl StationConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        station_name: &str,
        idcode: u16,
        format: u16,
        channel_names: Vec<String>,
        phasor_units: Vec<PhasorUnit>,
        analog_units: Vec<AnalogUnit>,
        digital_units: Vec<DigitalUnit>,
        fnom: NominalFrequency,
        cfg_count: u16,
    ) -> Result<Self, FrameError> {
        check_idcode(idcode)?;
        let station = StationConfig {
            station_name: pad16(station_name),
            idcode,
            format,
            phasor_num: phasor_units.len() as u16,
            analog_num: analog_units.len() as u16,
            digital_num: digital_units.len() as u16,
            channel_names: channel_names.iter().map(|n| pad16(n)).collect(),
            phasor_units,
            analog_units,
            digital_units,
            fnom,
            cfg_count,
        };
        station.validate()?;
        Ok(station)
    }

    /// Number of channel names this station must carry.
    pub fn expected_channel_names(&self) -> usize {
        self.phasor_num as usize + self.analog_num as usize + 16 * self.digital_num as usize
    }

    /// Checks that every list length agrees with its declared count.
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.channel_names.len() != self.expected_channel_names() {
            return Err(FrameError::InvalidLayout {
                message: format!(
                    "station {} declares {} channel names but supplies {}",
                    self.idcode,
                    self.expected_channel_names(),
                    self.channel_names.len()
                ),
            });
        }
        if self.phasor_units.len() != self.phasor_num as usize {
            return Err(FrameError::InvalidLayout {
                message: format!(
                    "station {} declares PHNMR {} but supplies {} PHUNITs",
                    self.idcode,
                    self.phasor_num,
                    self.phasor_units.len()
                ),
            });
        }
        if self.analog_units.len() != self.analog_num as usize {
            return Err(FrameError::InvalidLayout {
                message: format!(
                    "station {} declares ANNMR {} but supplies {} ANUNITs",
                    self.idcode,
                    self.analog_num,
                    self.analog_units.len()
                ),
            });
        }
        if self.digital_units.len() != self.digital_num as usize {
            return Err(FrameError::InvalidLayout {
                message: format!(
                    "station {} declares DGNMR {} but supplies {} DIGUNITs",
                    self.idcode,
                    self.digital_num,
                    self.digital_units.len()
                ),
            });
        }
        Ok(())
    }

    pub fn phasor_polar(&self) -> bool {
        self.format & 0x0001 != 0
    }

    pub fn phasor_float(&self) -> bool {
        self.format & 0x0002 != 0
    }

    pub fn analog_float(&self) -> bool {
        self.format & 0x0004 != 0
    }

    pub fn freq_float(&self) -> bool {
        self.format & 0x0008 != 0
    }

    /// Bytes per phasor in a data frame.
    pub fn phasor_size(&self) -> usize {
        if self.phasor_float() {
            8
        } else {
            4
        }
    }

    /// Bytes per analog value in a data frame.
    pub fn analog_size(&self) -> usize {
        if self.analog_float() {
            4
        } else {
            2
        }
    }

    /// Bytes per FREQ (and DFREQ) value in a data frame.
    pub fn freq_size(&self) -> usize {
        if self.freq_float() {
            4
        } else {
            2
        }
    }

    /// Size of this station's section of a data frame.
    pub fn data_block_size(&self) -> usize {
        2 + self.phasor_size() * self.phasor_num as usize
            + 2 * self.freq_size()
            + self.analog_size() * self.analog_num as usize
            + 2 * self.digital_num as usize
    }

    /// Size of this station's block in a configuration frame.
    pub fn byte_len(&self) -> usize {
        STATION_FIXED
            + 16 * self.expected_channel_names()
            + 4 * (self.phasor_num + self.analog_num + self.digital_num) as usize
            + 2 // FNOM
            + 2 // CFGCNT
    }

    /// Parses one station block, returning it and the bytes consumed.
    pub fn from_hex(bytes: &[u8]) -> Result<(Self, usize), FrameError> {
        if bytes.len() < STATION_FIXED {
            return Err(FrameError::ShortFrame {
                message: format!(
                    "station block needs at least {} bytes, got {}",
                    STATION_FIXED,
                    bytes.len()
                ),
            });
        }
        let station_name = String::from_utf8_lossy(&bytes[0..16]).into_owned();
        let idcode = u16::from_be_bytes([bytes[16], bytes[17]]);
        let format = u16::from_be_bytes([bytes[18], bytes[19]]);
        let phasor_num = u16::from_be_bytes([bytes[20], bytes[21]]);
        let analog_num = u16::from_be_bytes([bytes[22], bytes[23]]);
        let digital_num = u16::from_be_bytes([bytes[24], bytes[25]]);

        let name_count = phasor_num as usize + analog_num as usize + 16 * digital_num as usize;
        let unit_count = (phasor_num + analog_num + digital_num) as usize;
        let total = STATION_FIXED + 16 * name_count + 4 * unit_count + 4;
        if bytes.len() < total {
            return Err(FrameError::ShortFrame {
                message: format!("station block needs {} bytes, got {}", total, bytes.len()),
            });
        }

        let mut offset = STATION_FIXED;
        let mut channel_names = Vec::with_capacity(name_count);
        for _ in 0..name_count {
            channel_names.push(String::from_utf8_lossy(&bytes[offset..offset + 16]).into_owned());
            offset += 16;
        }

        let mut phasor_units = Vec::with_capacity(phasor_num as usize);
        for _ in 0..phasor_num {
            phasor_units.push(PhasorUnit::from_hex(&bytes[offset..offset + 4])?);
            offset += 4;
        }
        let mut analog_units = Vec::with_capacity(analog_num as usize);
        for _ in 0..analog_num {
            analog_units.push(AnalogUnit::from_hex(&bytes[offset..offset + 4])?);
            offset += 4;
        }
        let mut digital_units = Vec::with_capacity(digital_num as usize);
        for _ in 0..digital_num {
            digital_units.push(DigitalUnit::from_hex(&bytes[offset..offset + 4])?);
            offset += 4;
        }

        let fnom = NominalFrequency::from_raw(u16::from_be_bytes([bytes[offset], bytes[offset + 1]]));
        offset += 2;
        let cfg_count = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
        offset += 2;

        Ok((
            StationConfig {
                station_name,
                idcode,
                format,
                phasor_num,
                analog_num,
                digital_num,
                channel_names,
                phasor_units,
                analog_units,
                digital_units,
                fnom,
                cfg_count,
            },
            offset,
        ))
    }

    /// Serializes the station block.
    pub fn to_hex(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.byte_len());
        write_name16(&mut result, &self.station_name);
        result.extend_from_slice(&self.idcode.to_be_bytes());
        result.extend_from_slice(&self.format.to_be_bytes());
        result.extend_from_slice(&self.phasor_num.to_be_bytes());
        result.extend_from_slice(&self.analog_num.to_be_bytes());
        result.extend_from_slice(&self.digital_num.to_be_bytes());
        for name in &self.channel_names {
            write_name16(&mut result, name);
        }
        for unit in &self.phasor_units {
            result.extend_from_slice(&unit.to_hex());
        }
        for unit in &self.analog_units {
            result.extend_from_slice(&unit.to_hex());
        }
        for unit in &self.digital_units {
            result.extend_from_slice(&unit.to_hex());
        }
        result.extend_from_slice(&self.fnom.to_raw().to_be_bytes());
        result.extend_from_slice(&self.cfg_count.to_be_bytes());
        result
    }
}

/// A complete configuration frame, CFG-1 or CFG-2.
///
/// CFG-1 advertises device capabilities, CFG-2 the configuration of the
/// current data stream; the two differ only in the frame type bits of the
/// SYNC word. `cfg_type` records which one this is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationFrame {
    pub prefix: PrefixFrame,
    pub time_base: u32,
    pub stations: Vec<StationConfig>,
    pub data_rate: i16,
    pub cfg_type: u8,
    #[serde(skip)]
    transmitted: bool,
}

impl PartialEq for ConfigurationFrame {
    fn eq(&self, other: &Self) -> bool {
        // `transmitted` is endpoint bookkeeping, not part of the wire image.
        self.prefix == other.prefix
            && self.time_base == other.time_base
            && self.stations == other.stations
            && self.data_rate == other.data_rate
            && self.cfg_type == other.cfg_type
    }
}

impl ConfigurationFrame {
    pub fn new(
        idcode: u16,
        time_base: u32,
        stations: Vec<StationConfig>,
        data_rate: i16,
        cfg_type: u8,
    ) -> Result<Self, FrameError> {
        check_idcode(idcode)?;
        check_time_base(time_base)?;
        check_data_rate(data_rate)?;
        if stations.is_empty() {
            return Err(FrameError::InvalidLayout {
                message: "configuration must carry at least one station".to_string(),
            });
        }
        for station in &stations {
            station.validate()?;
        }
        let frame_type = match cfg_type {
            1 => FrameType::Config1,
            2 => FrameType::Config2,
            other => {
                return Err(FrameError::FieldRange {
                    message: format!("cfg_type must be 1 or 2, got {}", other),
                })
            }
        };
        let mut cfg = ConfigurationFrame {
            prefix: PrefixFrame::new(frame_type, idcode),
            time_base,
            stations,
            data_rate,
            cfg_type,
            transmitted: false,
        };
        cfg.prefix.framesize = cfg.encoded_len() as u16;
        Ok(cfg)
    }

    /// Encoded frame length in bytes, checksum included.
    pub fn encoded_len(&self) -> usize {
        PREFIX_SIZE + 4 + 2 + self.stations.iter().map(|s| s.byte_len()).sum::<usize>() + 2 + 2
    }

    /// The IEEE sample configuration (standard Annex D, Table D.2): one
    /// station "Station A" with phasors VA/VB/VC/I1, three analog channels
    /// and one digital word of breaker status bits.
    pub fn ieee_sample(idcode: u16, data_rate: i16) -> Result<Self, FrameError> {
        let mut channel_names: Vec<String> = ["VA", "VB", "VC", "I1", "ANALOG1", "ANALOG2", "ANALOG3"]
            .iter()
            .map(|n| n.to_string())
            .collect();
        for bit in [
            "1", "2", "3", "4", "5", "6", "7", "8", "9", "A", "B", "C", "D", "E", "F", "G",
        ] {
            channel_names.push(format!("BREAKER {} STATUS", bit));
        }
        let station = StationConfig::new(
            "Station A",
            idcode,
            format_word(false, false, true, false),
            channel_names,
            vec![
                PhasorUnit::voltage(915_527)?,
                PhasorUnit::voltage(915_527)?,
                PhasorUnit::voltage(915_527)?,
                PhasorUnit::current(45_776)?,
            ],
            vec![
                AnalogUnit::new(AnalogKind::PointOnWave, 1)?,
                AnalogUnit::new(AnalogKind::Rms, 1)?,
                AnalogUnit::new(AnalogKind::Peak, 1)?,
            ],
            vec![DigitalUnit::new(0x0000, 0xFFFF)],
            NominalFrequency::Hz60,
            22,
        )?;
        ConfigurationFrame::new(idcode, 1_000_000, vec![station], data_rate, 2)
    }

    /// A CFG-1 view of this configuration: same content, capability frame
    /// type.
    pub fn as_cfg1(&self) -> Self {
        let mut cfg = self.clone();
        cfg.cfg_type = 1;
        cfg.prefix.sync = create_sync(FrameType::Config1);
        cfg
    }

    pub fn num_pmu(&self) -> u16 {
        self.stations.len() as u16
    }

    /// Parses a complete configuration frame buffer.
    pub fn from_hex(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < PREFIX_SIZE + 6 + 4 {
            return Err(FrameError::ShortFrame {
                message: format!("configuration frame needs at least 24 bytes, got {}", bytes.len()),
            });
        }
        validate_checksum(bytes)?;
        let prefix = PrefixFrame::from_hex(bytes)?;
        let cfg_type = match prefix.frame_type()? {
            FrameType::Config1 => 1,
            FrameType::Config2 => 2,
            other => {
                return Err(FrameError::UnknownFrame {
                    message: format!("expected a configuration frame, got {}", other),
                })
            }
        };
        if prefix.framesize as usize != bytes.len() {
            return Err(FrameError::ShortFrame {
                message: format!(
                    "FRAMESIZE says {} bytes, buffer has {}",
                    prefix.framesize,
                    bytes.len()
                ),
            });
        }

        let mut offset = PREFIX_SIZE;
        let time_base = u32::from_be_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]) & 0x00FF_FFFF;
        offset += 4;
        let num_pmu = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
        offset += 2;

        let mut stations = Vec::with_capacity(num_pmu as usize);
        let station_end = bytes.len() - 4;
        for _ in 0..num_pmu {
            if offset >= station_end {
                return Err(FrameError::ShortFrame {
                    message: format!("buffer exhausted after {} station blocks", stations.len()),
                });
            }
            let (station, consumed) = StationConfig::from_hex(&bytes[offset..station_end])?;
            offset += consumed;
            stations.push(station);
        }

        if offset + 4 != bytes.len() {
            return Err(FrameError::InvalidLayout {
                message: format!(
                    "{} bytes left after {} station blocks, expected 4",
                    bytes.len() - offset,
                    num_pmu
                ),
            });
        }
        let data_rate = i16::from_be_bytes([bytes[offset], bytes[offset + 1]]);

        Ok(ConfigurationFrame {
            prefix,
            time_base,
            stations,
            data_rate,
            cfg_type,
            transmitted: false,
        })
    }

    /// Serializes the frame, recomputing FRAMESIZE and the checksum.
    ///
    /// Validation happens before any byte is produced: station layouts,
    /// TIME_BASE range and `FRACSEC < TIME_BASE`.
    pub fn to_hex(&self) -> Result<Vec<u8>, FrameError> {
        check_time_base(self.time_base)?;
        check_fracsec(self.prefix.fracsec, self.time_base)?;
        if self.stations.is_empty() {
            return Err(FrameError::InvalidLayout {
                message: "configuration must carry at least one station".to_string(),
            });
        }
        for station in &self.stations {
            station.validate()?;
        }

        let framesize = self.encoded_len();
        let mut prefix = self.prefix.clone();
        prefix.framesize = framesize as u16;

        let mut result = Vec::with_capacity(framesize);
        result.extend_from_slice(&prefix.to_hex());
        result.extend_from_slice(&self.time_base.to_be_bytes());
        result.extend_from_slice(&self.num_pmu().to_be_bytes());
        for station in &self.stations {
            result.extend_from_slice(&station.to_hex());
        }
        result.extend_from_slice(&self.data_rate.to_be_bytes());
        let chk = calculate_crc(&result);
        result.extend_from_slice(&chk.to_be_bytes());
        Ok(result)
    }

    /// Size in bytes of a data frame laid out against this configuration.
    pub fn data_frame_size(&self) -> usize {
        PREFIX_SIZE + 2 + self.stations.iter().map(|s| s.data_block_size()).sum::<usize>()
    }

    /// Interval between data frames at the configured rate.
    pub fn tick_interval(&self) -> Duration {
        if self.data_rate > 0 {
            Duration::from_secs_f64(1.0 / self.data_rate as f64)
        } else {
            Duration::from_secs((-self.data_rate).max(1) as u64)
        }
    }

    /// Marks the configuration as having been sent at least once. From this
    /// point every successful mutation bumps CFGCNT on all stations.
    pub fn mark_transmitted(&mut self) {
        self.transmitted = true;
    }

    pub fn is_transmitted(&self) -> bool {
        self.transmitted
    }

    fn touch(&mut self) {
        self.prefix.framesize = self.encoded_len() as u16;
        if self.transmitted {
            for station in &mut self.stations {
                station.cfg_count = station.cfg_count.wrapping_add(1);
            }
        }
    }

    pub fn set_id_code(&mut self, idcode: u16) -> Result<(), FrameError> {
        check_idcode(idcode)?;
        self.prefix.idcode = idcode;
        self.touch();
        Ok(())
    }

    pub fn set_time_base(&mut self, time_base: u32) -> Result<(), FrameError> {
        check_time_base(time_base)?;
        self.time_base = time_base;
        self.touch();
        Ok(())
    }

    pub fn set_data_rate(&mut self, data_rate: i16) -> Result<(), FrameError> {
        check_data_rate(data_rate)?;
        self.data_rate = data_rate;
        self.touch();
        Ok(())
    }

    pub fn set_station_name(&mut self, station: usize, name: &str) -> Result<(), FrameError> {
        self.station_mut(station)?.station_name = pad16(name);
        self.touch();
        Ok(())
    }

    pub fn set_data_format(
        &mut self,
        station: usize,
        polar: bool,
        phasor_float: bool,
        analog_float: bool,
        freq_float: bool,
    ) -> Result<(), FrameError> {
        self.station_mut(station)?.format =
            format_word(polar, phasor_float, analog_float, freq_float);
        self.touch();
        Ok(())
    }

    /// Changes a station's channel counts. The dependent name and unit
    /// lists are reset to zero-initialised entries of the new lengths.
    pub fn set_channel_counts(
        &mut self,
        station: usize,
        phasor_num: u16,
        analog_num: u16,
        digital_num: u16,
    ) -> Result<(), FrameError> {
        let st = self.station_mut(station)?;
        st.phasor_num = phasor_num;
        st.analog_num = analog_num;
        st.digital_num = digital_num;
        st.channel_names = vec![pad16(""); st.expected_channel_names()];
        st.phasor_units = vec![
            PhasorUnit {
                is_current: false,
                scale: 0
            };
            phasor_num as usize
        ];
        st.analog_units = vec![
            AnalogUnit {
                kind: AnalogKind::PointOnWave,
                scale: 0
            };
            analog_num as usize
        ];
        st.digital_units = vec![DigitalUnit::default(); digital_num as usize];
        self.touch();
        Ok(())
    }

    pub fn set_channel_names(&mut self, station: usize, names: &[&str]) -> Result<(), FrameError> {
        let st = self.station_mut(station)?;
        if names.len() != st.expected_channel_names() {
            return Err(FrameError::InvalidLayout {
                message: format!(
                    "station {} needs {} channel names, got {}",
                    st.idcode,
                    st.expected_channel_names(),
                    names.len()
                ),
            });
        }
        st.channel_names = names.iter().map(|n| pad16(n)).collect();
        self.touch();
        Ok(())
    }

    pub fn set_phasor_units(
        &mut self,
        station: usize,
        units: Vec<PhasorUnit>,
    ) -> Result<(), FrameError> {
        let st = self.station_mut(station)?;
        if units.len() != st.phasor_num as usize {
            return Err(FrameError::InvalidLayout {
                message: format!(
                    "station {} needs {} PHUNITs, got {}",
                    st.idcode,
                    st.phasor_num,
                    units.len()
                ),
            });
        }
        st.phasor_units = units;
        self.touch();
        Ok(())
    }

    pub fn set_analog_units(
        &mut self,
        station: usize,
        units: Vec<AnalogUnit>,
    ) -> Result<(), FrameError> {
        let st = self.station_mut(station)?;
        if units.len() != st.analog_num as usize {
            return Err(FrameError::InvalidLayout {
                message: format!(
                    "station {} needs {} ANUNITs, got {}",
                    st.idcode,
                    st.analog_num,
                    units.len()
                ),
            });
        }
        st.analog_units = units;
        self.touch();
        Ok(())
    }

    pub fn set_digital_units(
        &mut self,
        station: usize,
        units: Vec<DigitalUnit>,
    ) -> Result<(), FrameError> {
        let st = self.station_mut(station)?;
        if units.len() != st.digital_num as usize {
            return Err(FrameError::InvalidLayout {
                message: format!(
                    "station {} needs {} DIGUNITs, got {}",
                    st.idcode,
                    st.digital_num,
                    units.len()
                ),
            });
        }
        st.digital_units = units;
        self.touch();
        Ok(())
    }

    pub fn set_fnom(&mut self, station: usize, hz: u16) -> Result<(), FrameError> {
        self.station_mut(station)?.fnom = NominalFrequency::from_hz(hz)?;
        self.touch();
        Ok(())
    }

    fn station_mut(&mut self, station: usize) -> Result<&mut StationConfig, FrameError> {
        let count = self.stations.len();
        self.stations
            .get_mut(station)
            .ok_or(FrameError::InvalidLayout {
                message: format!("station index {} out of range ({} stations)", station, count),
            })
    }
}

fn check_time_base(time_base: u32) -> Result<(), FrameError> {
    if !(1..=0x00FF_FFFF).contains(&time_base) {
        return Err(FrameError::FieldRange {
            message: format!("TIME_BASE must be 1..=16777215, got {}", time_base),
        });
    }
    Ok(())
}

fn check_data_rate(data_rate: i16) -> Result<(), FrameError> {
    if data_rate == 0 {
        return Err(FrameError::FieldRange {
            message: "DATA_RATE must be non-zero".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn check_fracsec(fracsec: u32, time_base: u32) -> Result<(), FrameError> {
    if fracsec != 0 && fracsec >= time_base {
        return Err(FrameError::FieldRange {
            message: format!("FRACSEC {} must be below TIME_BASE {}", fracsec, time_base),
        });
    }
    Ok(())
}

/// Decode context: the configurations a stream has announced, keyed by
/// stream ID code. Data frames can only be decoded for streams present here.
#[derive(Debug, Clone, Default)]
pub struct ConfigIndex {
    configs: HashMap<u16, ConfigurationFrame>,
}

impl ConfigIndex {
    pub fn new() -> Self {
        ConfigIndex::default()
    }

    /// An index seeded with a single configuration.
    pub fn with(cfg: ConfigurationFrame) -> Self {
        let mut index = ConfigIndex::new();
        index.insert(cfg);
        index
    }

    /// Inserts or replaces the configuration for its stream ID, returning
    /// the previous one if any.
    pub fn insert(&mut self, cfg: ConfigurationFrame) -> Option<ConfigurationFrame> {
        self.configs.insert(cfg.prefix.idcode, cfg)
    }

    pub fn get(&self, idcode: u16) -> Option<&ConfigurationFrame> {
        self.configs.get(&idcode)
    }

    pub fn remove(&mut self, idcode: u16) -> Option<ConfigurationFrame> {
        self.configs.remove(&idcode)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}
