//! # Command Frames
//!
//! Commands flow from a data consumer to a data source: start or stop the
//! real-time stream, or request a header or configuration frame. Command
//! 0x0008 carries an opaque extended payload between the command word and
//! the checksum.

use super::common::{FrameError, FrameType, PrefixFrame, PREFIX_SIZE};
use super::utils::{calculate_crc, validate_checksum};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest extended payload a 16-bit FRAMESIZE leaves room for.
const MAX_EXTENDED: usize = 65_518;

/// The standard command set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandType {
    TurnOffTransmission = 1,
    TurnOnTransmission = 2,
    SendHeaderFrame = 3,
    SendConfigFrame1 = 4,
    SendConfigFrame2 = 5,
    SendConfigFrame3 = 6,
    SendExtendedFrame = 8,
}

impl TryFrom<u16> for CommandType {
    type Error = FrameError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CommandType::TurnOffTransmission),
            2 => Ok(CommandType::TurnOnTransmission),
            3 => Ok(CommandType::SendHeaderFrame),
            4 => Ok(CommandType::SendConfigFrame1),
            5 => Ok(CommandType::SendConfigFrame2),
            6 => Ok(CommandType::SendConfigFrame3),
            8 => Ok(CommandType::SendExtendedFrame),
            other => Err(FrameError::FieldRange {
                message: format!("command code {} is not in the standard set", other),
            }),
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandType::TurnOffTransmission => write!(f, "turn off transmission"),
            CommandType::TurnOnTransmission => write!(f, "turn on transmission"),
            CommandType::SendHeaderFrame => write!(f, "send header frame"),
            CommandType::SendConfigFrame1 => write!(f, "send configuration frame 1"),
            CommandType::SendConfigFrame2 => write!(f, "send configuration frame 2"),
            CommandType::SendConfigFrame3 => write!(f, "send configuration frame 3"),
            CommandType::SendExtendedFrame => write!(f, "extended frame"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandFrame {
    pub prefix: PrefixFrame,
    pub command: u16,
    pub extended_data: Option<Vec<u8>>,
}

impl CommandFrame {
    /// Builds a command frame. `time` is an optional `(soc, fracsec)` pair;
    /// endpoints usually stamp at send time instead.
    pub fn new(
        idcode: u16,
        command: CommandType,
        time: Option<(u32, u32)>,
        extended_data: Option<Vec<u8>>,
    ) -> Self {
        let mut prefix = PrefixFrame::new(FrameType::Command, idcode);
        if let Some((soc, fracsec)) = time {
            prefix.soc = soc;
            prefix.fracsec = fracsec;
        }
        let ext_len = extended_data.as_ref().map_or(0, |d| d.len());
        prefix.framesize = (PREFIX_SIZE + 2 + ext_len + 2) as u16;
        CommandFrame {
            prefix,
            command: command as u16,
            extended_data,
        }
    }

    pub fn turn_on_transmission(idcode: u16) -> Self {
        Self::new(idcode, CommandType::TurnOnTransmission, None, None)
    }

    pub fn turn_off_transmission(idcode: u16) -> Self {
        Self::new(idcode, CommandType::TurnOffTransmission, None, None)
    }

    pub fn send_header_frame(idcode: u16) -> Self {
        Self::new(idcode, CommandType::SendHeaderFrame, None, None)
    }

    pub fn send_config_frame1(idcode: u16) -> Self {
        Self::new(idcode, CommandType::SendConfigFrame1, None, None)
    }

    pub fn send_config_frame2(idcode: u16) -> Self {
        Self::new(idcode, CommandType::SendConfigFrame2, None, None)
    }

    pub fn send_config_frame3(idcode: u16) -> Self {
        Self::new(idcode, CommandType::SendConfigFrame3, None, None)
    }

    pub fn extended(idcode: u16, payload: Vec<u8>) -> Self {
        Self::new(idcode, CommandType::SendExtendedFrame, None, Some(payload))
    }

    /// The command as a `CommandType`, `None` for codes outside the
    /// standard set.
    pub fn command_type(&self) -> Option<CommandType> {
        CommandType::try_from(self.command).ok()
    }

    pub fn from_hex(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < PREFIX_SIZE + 2 + 2 {
            return Err(FrameError::ShortFrame {
                message: format!("command frame needs at least 18 bytes, got {}", bytes.len()),
            });
        }
        validate_checksum(bytes)?;
        let prefix = PrefixFrame::from_hex(bytes)?;
        if prefix.frame_type()? != FrameType::Command {
            return Err(FrameError::UnknownFrame {
                message: format!("expected a command frame, got SYNC 0x{:04X}", prefix.sync),
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
        let command = u16::from_be_bytes([bytes[PREFIX_SIZE], bytes[PREFIX_SIZE + 1]]);
        let extended_data = if bytes.len() > PREFIX_SIZE + 4 {
            Some(bytes[PREFIX_SIZE + 2..bytes.len() - 2].to_vec())
        } else {
            None
        };
        Ok(CommandFrame {
            prefix,
            command,
            extended_data,
        })
    }

    pub fn to_hex(&self) -> Result<Vec<u8>, FrameError> {
        let ext_len = self.extended_data.as_ref().map_or(0, |d| d.len());
        if ext_len > MAX_EXTENDED {
            return Err(FrameError::FieldRange {
                message: format!("extended payload of {} bytes exceeds {}", ext_len, MAX_EXTENDED),
            });
        }
        let framesize = PREFIX_SIZE + 2 + ext_len + 2;
        let mut prefix = self.prefix.clone();
        prefix.framesize = framesize as u16;

        let mut result = Vec::with_capacity(framesize);
        result.extend_from_slice(&prefix.to_hex());
        result.extend_from_slice(&self.command.to_be_bytes());
        if let Some(data) = &self.extended_data {
            result.extend_from_slice(data);
        }
        let chk = calculate_crc(&result);
        result.extend_from_slice(&chk.to_be_bytes());
        Ok(result)
    }
}
