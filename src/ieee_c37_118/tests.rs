//! Cross-module codec tests pinned to reference captures.
//!
//! The hex strings below are byte images of CFG-2, data, header and command
//! frames produced by a conformant implementation; the codec must reproduce
//! them exactly and parse them back field for field.

use super::codec::{Frame, FrameDecoder};
use super::commands::{CommandFrame, CommandType};
use super::common::StatField;
use super::config::{format_word, ConfigIndex, ConfigurationFrame, StationConfig};
use super::data_frame::{AnalogValue, DataFrame, FreqValue, Measurement};
use super::header::HeaderFrame;
use super::phasors::{PhasorIntPolar, PhasorValue};
use super::units::{AnalogKind, AnalogUnit, DigitalUnit, NominalFrequency, PhasorUnit};
use super::utils::validate_checksum;

const CFG2_ONE_STATION: &str = concat!(
    "aa3101c61e36448527f056071098000f4240000153746174696f6e2041202020",
    "202020201e360004000400030001564120202020202020202020202020205642",
    "2020202020202020202020202020564320202020202020202020202020204931",
    "2020202020202020202020202020414e414c4f4731202020202020202020414e",
    "414c4f4732202020202020202020414e414c4f47332020202020202020204252",
    "45414b4552203120535441545553425245414b45522032205354415455534252",
    "45414b4552203320535441545553425245414b45522034205354415455534252",
    "45414b4552203520535441545553425245414b45522036205354415455534252",
    "45414b4552203720535441545553425245414b45522038205354415455534252",
    "45414b4552203920535441545553425245414b45522041205354415455534252",
    "45414b4552204220535441545553425245414b45522043205354415455534252",
    "45414b4552204420535441545553425245414b45522045205354415455534252",
    "45414b4552204620535441545553425245414b4552204720535441545553000d",
    "f847000df847000df8470100b2d00000000101000001020000010000ffff0000",
    "0016001ed5d1",
);

const CFG2_TWO_STATIONS: &str = concat!(
    "aa3103741e36448527f056071098000f4240000253746174696f6e2041202020",
    "202020201e360004000400030001564120202020202020202020202020205642",
    "2020202020202020202020202020564320202020202020202020202020204931",
    "2020202020202020202020202020414e414c4f4731202020202020202020414e",
    "414c4f4732202020202020202020414e414c4f47332020202020202020204252",
    "45414b4552203120535441545553425245414b45522032205354415455534252",
    "45414b4552203320535441545553425245414b45522034205354415455534252",
    "45414b4552203520535441545553425245414b45522036205354415455534252",
    "45414b4552203720535441545553425245414b45522038205354415455534252",
    "45414b4552203920535441545553425245414b45522041205354415455534252",
    "45414b4552204220535441545553425245414b45522043205354415455534252",
    "45414b4552204420535441545553425245414b45522045205354415455534252",
    "45414b4552204620535441545553425245414b4552204720535441545553000d",
    "f847000df847000df8470100b2d00000000101000001020000010000ffff0000",
    "001653746174696f6e2041202020202020201e36000400040003000156412020",
    "2020202020202020202020205642202020202020202020202020202056432020",
    "20202020202020202020202049312020202020202020202020202020414e414c",
    "4f4731202020202020202020414e414c4f4732202020202020202020414e414c",
    "4f4733202020202020202020425245414b455220312053544154555342524541",
    "4b4552203220535441545553425245414b455220332053544154555342524541",
    "4b4552203420535441545553425245414b455220352053544154555342524541",
    "4b4552203620535441545553425245414b455220372053544154555342524541",
    "4b4552203820535441545553425245414b455220392053544154555342524541",
    "4b4552204120535441545553425245414b455220422053544154555342524541",
    "4b4552204320535441545553425245414b455220442053544154555342524541",
    "4b4552204520535441545553425245414b455220462053544154555342524541",
    "4b4552204720535441545553000df847000df847000df8470100b2d000000001",
    "01000001020000010000ffff00000016001e20e8",
);

const DATA_ONE_STATION: &str = concat!(
    "aa0100341e3644853600000041b10000392b0000e36ace7ce36a318304440000",
    "09c4000042c80000447a0000461c40003c12d43f",
);

const DATA_TWO_STATIONS: &str = concat!(
    "aa0100581e3644853600000041b10000392b0000e36ace7ce36a318304440000",
    "09c4000042c80000447a0000461c40003c120000392b0000e36ace7ce36a3183",
    "0444000009c4000042c80000447a0000461c40003c12bd52",
);

const HEADER_FRAME: &str = concat!(
    "aa1100271e36448560300f0bbfd048656c6c6f2049276d204865616465722046",
    "72616d652e17cc",
);

const COMMAND_START: &str = "aa4100121e36448560300f0bbfd00002ce00";

fn hex_to_bytes(hex: &str) -> Vec<u8> {
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
        .collect()
}

/// The reference configuration with the capture's timestamp applied.
fn reference_config() -> ConfigurationFrame {
    let mut cfg = ConfigurationFrame::ieee_sample(7734, 30).unwrap();
    cfg.prefix.soc = 1_149_577_200;
    cfg.prefix.time_quality = 0x56;
    cfg.prefix.fracsec = 463_000;
    cfg
}

#[test]
fn test_cfg2_one_station_matches_capture() {
    let cfg = reference_config();
    let bytes = cfg.to_hex().unwrap();
    assert_eq!(bytes, hex_to_bytes(CFG2_ONE_STATION));
}

#[test]
fn test_cfg2_one_station_parses_back() {
    let bytes = hex_to_bytes(CFG2_ONE_STATION);
    let cfg = ConfigurationFrame::from_hex(&bytes).unwrap();
    assert_eq!(cfg, reference_config());
    assert_eq!(cfg.prefix.framesize, 454);
    assert_eq!(cfg.time_base, 1_000_000);
    assert_eq!(cfg.num_pmu(), 1);
    assert_eq!(cfg.data_rate, 30);

    let st = &cfg.stations[0];
    assert_eq!(st.station_name, "Station A       ");
    assert_eq!(st.idcode, 7734);
    assert_eq!(st.format, format_word(false, false, true, false));
    assert_eq!(st.channel_names[0], "VA              ");
    assert_eq!(st.channel_names[3], "I1              ");
    assert_eq!(st.channel_names[7], "BREAKER 1 STATUS");
    assert_eq!(st.phasor_units[0], PhasorUnit::voltage(915_527).unwrap());
    assert_eq!(st.phasor_units[3], PhasorUnit::current(45_776).unwrap());
    assert_eq!(st.analog_units[1].kind, AnalogKind::Rms);
    assert_eq!(st.digital_units[0], DigitalUnit::new(0x0000, 0xFFFF));
    assert_eq!(st.fnom, NominalFrequency::Hz60);
    assert_eq!(st.cfg_count, 22);
}

#[test]
fn test_cfg2_two_stations_matches_capture() {
    let mut cfg = reference_config();
    let station = cfg.stations[0].clone();
    cfg.stations.push(station);
    cfg.prefix.framesize = cfg.encoded_len() as u16;
    let bytes = cfg.to_hex().unwrap();
    assert_eq!(bytes, hex_to_bytes(CFG2_TWO_STATIONS));

    let decoded = ConfigurationFrame::from_hex(&bytes).unwrap();
    assert_eq!(decoded.num_pmu(), 2);
    assert_eq!(decoded, cfg);
}

/// The reference data frame: annex values against the sample configuration.
fn reference_data(cfg: &ConfigurationFrame) -> DataFrame {
    let mut frame = DataFrame::ieee_sample(cfg).unwrap();
    frame.prefix.soc = 1_149_580_800;
    frame.prefix.time_quality = 0;
    frame.prefix.fracsec = 16_817;
    frame
}

#[test]
fn test_data_frame_matches_capture() {
    let cfg = reference_config();
    let frame = reference_data(&cfg);
    assert_eq!(frame.to_hex(), hex_to_bytes(DATA_ONE_STATION));
}

#[test]
fn test_data_frame_parses_back() {
    let cfg = reference_config();
    let bytes = hex_to_bytes(DATA_ONE_STATION);
    let frame = DataFrame::from_hex(&bytes, &cfg).unwrap();
    assert_eq!(frame, reference_data(&cfg));

    let m = &frame.measurements[0];
    assert_eq!(m.stat, StatField::ok());
    assert_eq!(m.phasors.len(), 4);
    match &m.phasors[0] {
        PhasorValue::IntRect(p) => {
            assert_eq!(p.real, 14635);
            assert_eq!(p.imag, 0);
        }
        other => panic!("expected an integer rectangular phasor, got {:?}", other),
    }
    assert_eq!(m.freq, FreqValue::Fixed(2500));
    assert_eq!(m.dfreq, FreqValue::Fixed(0));
    assert_eq!(m.analogs[0], AnalogValue::Float(100.0));
    assert_eq!(m.analogs[2], AnalogValue::Float(10000.0));
    assert_eq!(m.digitals, vec![0x3C12]);
}

#[test]
fn test_data_frame_two_stations_matches_capture() {
    let mut cfg = reference_config();
    let station = cfg.stations[0].clone();
    cfg.stations.push(station);

    let mut frame = reference_data(&cfg);
    assert_eq!(frame.measurements.len(), 2);
    frame.validate_against(&cfg).unwrap();
    assert_eq!(frame.to_hex(), hex_to_bytes(DATA_TWO_STATIONS));
}

#[test]
fn test_header_frame_matches_capture() {
    let mut frame = HeaderFrame::new(7734, "Hello I'm Header Frame.");
    frame.prefix.soc = 1_149_591_600;
    frame.prefix.time_quality = 0x0F;
    frame.prefix.fracsec = 770_000;
    let bytes = frame.to_hex();
    assert_eq!(bytes, hex_to_bytes(HEADER_FRAME));
    assert_eq!(bytes.len(), 39);

    let decoded = HeaderFrame::from_hex(&bytes).unwrap();
    assert_eq!(decoded, frame);
    assert_eq!(decoded.header, "Hello I'm Header Frame.");
}

#[test]
fn test_command_frame_matches_capture() {
    let mut frame = CommandFrame::turn_on_transmission(7734);
    frame.prefix.soc = 1_149_591_600;
    frame.prefix.time_quality = 0x0F;
    frame.prefix.fracsec = 770_000;
    let bytes = frame.to_hex().unwrap();
    assert_eq!(bytes, hex_to_bytes(COMMAND_START));

    let decoded = CommandFrame::from_hex(&bytes).unwrap();
    assert_eq!(decoded.command_type(), Some(CommandType::TurnOnTransmission));
    assert_eq!(decoded, frame);
}

// --- spec scenarios ---

#[test]
fn test_header_roundtrip_scenario() {
    let mut frame = HeaderFrame::new(7, "Hello tinyPMU!");
    frame.prefix.soc = 1_000_000_000;
    frame.prefix.fracsec = 0;

    let bytes = frame.to_hex();
    assert_eq!(u16::from_be_bytes([bytes[0], bytes[1]]), 0xAA11);
    assert_eq!(bytes.len(), 30);
    assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 30);
    validate_checksum(&bytes).unwrap();

    let decoded = HeaderFrame::from_hex(&bytes).unwrap();
    assert_eq!(decoded, frame);

    // An 18-character text lands at 34 bytes.
    assert_eq!(HeaderFrame::new(7, "Hello I'm tinyPMU!").to_hex().len(), 34);
}

/// One station, one polar fixed phasor, one fixed analog, one digital word.
fn polar_fixed_config() -> ConfigurationFrame {
    let mut names = vec!["PH1".to_string(), "AN1".to_string()];
    for i in 0..16 {
        names.push(format!("DIG BIT {:02}", i));
    }
    let station = StationConfig::new(
        "POLAR STATION",
        91,
        format_word(true, false, false, false),
        names,
        vec![PhasorUnit::voltage(915_527).unwrap()],
        vec![AnalogUnit::new(AnalogKind::PointOnWave, 1).unwrap()],
        vec![DigitalUnit::new(0x0000, 0xFFFF)],
        NominalFrequency::Hz60,
        0,
    )
    .unwrap();
    ConfigurationFrame::new(91, 1_000_000, vec![station], 30, 2).unwrap()
}

#[test]
fn test_configuration_v2_scenario() {
    let cfg = polar_fixed_config();
    let bytes = cfg.to_hex().unwrap();
    assert_eq!(bytes.len(), u16::from_be_bytes([bytes[2], bytes[3]]) as usize);

    let decoded = ConfigurationFrame::from_hex(&bytes).unwrap();
    assert_eq!(decoded, cfg);
    assert!(decoded.stations[0].phasor_polar());
    assert!(!decoded.stations[0].phasor_float());
}

#[test]
fn test_data_frame_scenario() {
    let cfg = polar_fixed_config();
    let measurement = Measurement {
        stat: StatField::ok(),
        phasors: vec![PhasorValue::IntPolar(PhasorIntPolar {
            magnitude: 12345,
            angle: 7854,
        })],
        freq: FreqValue::Fixed(50),
        dfreq: FreqValue::Fixed(0),
        analogs: vec![AnalogValue::Fixed(-1000)],
        digitals: vec![0xAA55],
    };
    let frame = DataFrame::new(91, vec![measurement], &cfg).unwrap();
    let bytes = frame.to_hex();
    assert_eq!(bytes.len(), cfg.data_frame_size());

    let decoded = DataFrame::from_hex(&bytes, &cfg).unwrap();
    assert_eq!(decoded, frame);
    match &decoded.measurements[0].phasors[0] {
        PhasorValue::IntPolar(p) => {
            assert_eq!(p.magnitude, 12345);
            assert_eq!(p.angle, 7854);
            // 7854e-4 rad is about pi/4.
            let polar = p.to_polar(915_527);
            assert!((polar.angle - std::f32::consts::FRAC_PI_4).abs() < 1e-3);
        }
        other => panic!("expected an integer polar phasor, got {:?}", other),
    }
    assert_eq!(decoded.measurements[0].analogs[0], AnalogValue::Fixed(-1000));
    assert_eq!(decoded.measurements[0].digitals[0], 0xAA55);
}

#[test]
fn test_crc_rejection_scenario() {
    let cfg = polar_fixed_config();
    let mut bytes = cfg.to_hex().unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;

    let index = ConfigIndex::new();
    assert!(matches!(
        Frame::from_hex(&bytes, &index),
        Err(super::common::FrameError::CrcMismatch { .. })
    ));

    // The stream decoder drops the bad frame and keeps going.
    let mut decoder = FrameDecoder::new();
    let mut ctx = ConfigIndex::new();
    decoder.feed(&bytes);
    decoder.feed(&cfg.to_hex().unwrap());
    let (frames, errors) = decoder.drain(&mut ctx);
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0],
        super::common::FrameError::CrcMismatch { .. }
    ));
    assert_eq!(frames.len(), 1);
    assert!(matches!(frames[0], Frame::Config(_)));
}

#[test]
fn test_corrupted_stream_never_desynchronises() {
    use rand::Rng;

    let cfg = reference_config();
    let cfg_bytes = cfg.to_hex().unwrap();
    let mut data_frames = Vec::new();
    for i in 0..8u32 {
        let mut frame = reference_data(&cfg);
        frame.prefix.fracsec = 1_000 * i;
        data_frames.push(frame.to_hex());
    }

    let mut rng = rand::rng();
    for _ in 0..20 {
        let victim = rng.random_range(0..data_frames.len());
        // Any flip that leaves SYNC and FRAMESIZE intact is caught by the
        // CRC and costs exactly one frame.
        let offset = rng.random_range(4..data_frames[victim].len());

        let mut stream = cfg_bytes.clone();
        for (i, frame) in data_frames.iter().enumerate() {
            let mut frame = frame.clone();
            if i == victim {
                frame[offset] ^= 0x01;
            }
            stream.extend_from_slice(&frame);
        }

        let mut decoder = FrameDecoder::new();
        let mut ctx = ConfigIndex::new();
        decoder.feed(&stream);
        let (frames, errors) = decoder.drain(&mut ctx);

        assert_eq!(errors.len(), 1, "exactly the corrupted frame is dropped");
        assert_eq!(frames.len(), data_frames.len(), "config plus surviving data");
        let survivors: Vec<u32> = frames
            .iter()
            .filter_map(|f| match f {
                Frame::Data(d) => Some(d.prefix.fracsec),
                _ => None,
            })
            .collect();
        let expected: Vec<u32> = (0..8u32)
            .filter(|i| *i as usize != victim)
            .map(|i| 1_000 * i)
            .collect();
        assert_eq!(survivors, expected);
    }
}

#[test]
fn test_frame_dispatch_and_accessors() {
    let cfg = reference_config();
    let index = ConfigIndex::with(cfg.clone());

    let frame = Frame::from_hex(&hex_to_bytes(DATA_ONE_STATION), &index).unwrap();
    assert_eq!(frame.idcode(), 7734);
    assert_eq!(frame.to_hex().unwrap(), hex_to_bytes(DATA_ONE_STATION));

    let frame = Frame::from_hex(&hex_to_bytes(HEADER_FRAME), &index).unwrap();
    assert!(matches!(frame, Frame::Header(_)));

    let frame = Frame::from_hex(&hex_to_bytes(COMMAND_START), &index).unwrap();
    assert!(matches!(frame, Frame::Command(_)));

    let frame = Frame::from_hex(&hex_to_bytes(CFG2_ONE_STATION), &index).unwrap();
    assert!(matches!(frame, Frame::Config(_)));
}

#[test]
fn test_cfg3_request_is_unknown_frame() {
    // A CFG-3 frame: header bytes with the CFG-3 type bits and a fresh CRC.
    let mut bytes = hex_to_bytes(HEADER_FRAME);
    bytes[1] = 0x51;
    let crc = super::utils::calculate_crc(&bytes[..bytes.len() - 2]);
    let len = bytes.len();
    bytes[len - 2..].copy_from_slice(&crc.to_be_bytes());

    let index = ConfigIndex::new();
    assert!(matches!(
        Frame::from_hex(&bytes, &index),
        Err(super::common::FrameError::UnknownFrame { .. })
    ));
}
