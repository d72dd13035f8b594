//! # IEEE C37.118.2-2011 Synchrophasor Data Transfer
//!
//! This crate implements the IEEE C37.118.2-2011 synchrophasor data-transfer
//! protocol used in power-system monitoring: a byte-exact codec for the five
//! frame types (configuration 1/2, data, header, command) and the three
//! cooperating endpoint roles built on top of it.
//!
//! ## Modules
//!
//! - [`ieee_c37_118`]: the frame codec — CRC-CCITT, prefix and STAT words,
//!   configuration/data/header/command frames, and the incremental stream
//!   decoder with drop-and-resync error recovery.
//! - [`pmu`]: the PMU endpoint — a TCP server that advertises a
//!   configuration and streams data frames to any number of PDC clients.
//! - [`pdc`]: the PDC endpoint — a TCP client bound to exactly one PMU,
//!   with command/response helpers and a streaming receive loop.
//! - [`splitter`]: the stream splitter — one upstream PDC session fanned out
//!   verbatim to many downstream clients through an embedded PMU endpoint.
//!
//! Data-frame decoding is context dependent: the byte layout of a data frame
//! is fixed by the configuration frame that precedes it on the stream. The
//! codec therefore takes an explicit [`ieee_c37_118::config::ConfigIndex`]
//! wherever data frames may appear; nothing in this crate keeps decoding
//! state in globals.

pub mod ieee_c37_118;

pub mod endpoint;
pub mod pdc;
pub mod pmu;
pub mod splitter;

pub use endpoint::EndpointError;
pub use ieee_c37_118::codec::{Frame, FrameDecoder};
pub use ieee_c37_118::common::FrameError;
pub use ieee_c37_118::config::{ConfigIndex, ConfigurationFrame, StationConfig};
pub use ieee_c37_118::data_frame::DataFrame;
pub use pdc::Pdc;
pub use pmu::Pmu;
pub use splitter::StreamSplitter;
