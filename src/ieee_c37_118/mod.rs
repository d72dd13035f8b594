//! # IEEE C37.118.2-2011 Frame Codec
//!
//! Byte-exact encoding and decoding of synchrophasor frames as defined in
//! IEEE Std C37.118.2-2011. All multibyte fields are big-endian; every frame
//! carries a 14-byte prefix and a trailing CRC-CCITT checksum.
//!
//! ## Submodules
//!
//! - `common`: codec errors, the SYNC word, the frame prefix and the
//!   bit-packed STAT field.
//! - `utils`: CRC-CCITT calculation/validation and SOC/FRACSEC time tagging.
//! - `units`: PHUNIT/ANUNIT/DIGUNIT conversion factors and the nominal
//!   frequency word.
//! - `phasors`: the four phasor wire representations (integer/float,
//!   rectangular/polar).
//! - `config`: configuration frames (CFG-1/CFG-2), per-station blocks,
//!   validated setters and the decode context (`ConfigIndex`).
//! - `data_frame`: data frames with typed per-station measurements.
//! - `header`: header frames (free-form ASCII payload).
//! - `commands`: command frames and the standard command set.
//! - `codec`: frame dispatch by SYNC word plus the incremental stream
//!   decoder (`FrameDecoder`).

pub mod codec;
pub mod commands;
pub mod common;
pub mod config;
pub mod data_frame;
pub mod header;
pub mod phasors;
pub mod units;
pub mod utils;

#[cfg(test)]
mod tests;
