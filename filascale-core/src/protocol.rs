//! Wire protocol constants and message types
//!
//! Frame layout (little-endian multi-byte fields):
//!
//! | Field        | Size       |
//! |--------------|------------|
//! | sync         | 1 byte     |
//! | message_type | 1 byte     |
//! | length       | 2 bytes    |
//! | payload      | `length`   |
//! | crc16        | 2 bytes    |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FilaScaleError, Result};

/// Marker byte at the start of every frame
pub const SYNC_BYTE: u8 = 0x55;

/// Maximum payload size in bytes
pub const MAX_PAYLOAD: usize = 512;

/// Header size following the sync byte (type + length)
pub const HEADER_LEN: usize = 3;

/// Trailing CRC size
pub const CRC_LEN: usize = 2;

/// Bytes a frame carries besides its payload
pub const FRAME_OVERHEAD: usize = 1 + HEADER_LEN + CRC_LEN;

/// Default serial speed of the FilaScale firmware
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Message types understood by the device
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Spool status request/report (0x00)
    Status = 0,
    /// Device configuration, e.g. scale calibration (0x01)
    Config = 1,
    /// Start measuring (0x02)
    Start = 2,
    /// Stop measuring (0x03)
    Stop = 3,
    /// Threshold update (0x04)
    Threshold = 4,
}

impl MessageType {
    /// All message types in wire order
    pub const ALL: [MessageType; 5] = [
        MessageType::Status,
        MessageType::Config,
        MessageType::Start,
        MessageType::Stop,
        MessageType::Threshold,
    ];

    /// Wire value of this type
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Upper-case protocol name
    pub fn name(&self) -> &'static str {
        match self {
            MessageType::Status => "STATUS",
            MessageType::Config => "CONFIG",
            MessageType::Start => "START",
            MessageType::Stop => "STOP",
            MessageType::Threshold => "THRESHOLD",
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = FilaScaleError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(MessageType::Status),
            1 => Ok(MessageType::Config),
            2 => Ok(MessageType::Start),
            3 => Ok(MessageType::Stop),
            4 => Ok(MessageType::Threshold),
            other => Err(FilaScaleError::BadMsgType(other)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_values() {
        assert_eq!(MessageType::Status.as_u8(), 0);
        assert_eq!(MessageType::Config.as_u8(), 1);
        assert_eq!(MessageType::Start.as_u8(), 2);
        assert_eq!(MessageType::Stop.as_u8(), 3);
        assert_eq!(MessageType::Threshold.as_u8(), 4);
    }

    #[test]
    fn test_message_type_try_from() {
        for mt in MessageType::ALL {
            assert_eq!(MessageType::try_from(mt.as_u8()).unwrap(), mt);
        }
    }

    #[test]
    fn test_message_type_out_of_range() {
        for value in [5u8, 0x55, 0xFF] {
            let err = MessageType::try_from(value).unwrap_err();
            assert!(matches!(err, FilaScaleError::BadMsgType(v) if v == value));
        }
    }

    #[test]
    fn test_frame_overhead() {
        assert_eq!(FRAME_OVERHEAD, 6);
    }
}
