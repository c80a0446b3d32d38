//! Error types for the FilaScale system

use thiserror::Error;

use crate::protocol::MessageType;

/// Core error type for FilaScale operations
#[derive(Error, Debug)]
pub enum FilaScaleError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unrecoverable serial port errors (open failures other than "not available")
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Nothing arrived within the read timeout
    #[error("No data")]
    NoData,

    /// Fewer bytes arrived than the frame header declared
    #[error("Short message: expected {expected} bytes, received {received}")]
    ShortMsg { expected: usize, received: usize },

    /// Message type byte outside the known enumeration
    #[error("Invalid message type: 0x{0:02X}")]
    BadMsgType(u8),

    /// Declared payload length exceeds the protocol ceiling
    #[error("Bad message size: {0} bytes")]
    BadSize(usize),

    /// Received CRC does not match the CRC computed over the frame
    #[error("Bad CRC: computed 0x{expected:04X}, received 0x{received:04X}")]
    BadCrc { expected: u16, received: u16 },

    /// The serial device went away during I/O
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Operation requires an open session and none exists
    #[error("No connection")]
    NoConnection,

    /// Port does not exist or is claimed by another process
    #[error("Port unavailable: {port} ({reason})")]
    PortUnavailable { port: String, reason: String },

    /// No clean frame arrived within the retry ceiling
    #[error("Retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// A well-framed STATUS payload did not decode into a status record
    #[error("Invalid status payload: {0}")]
    InvalidStatusPayload(String),

    /// The device answered with a different message type than requested
    #[error("Unexpected reply: expected {expected}, received {received}")]
    UnexpectedReply {
        expected: MessageType,
        received: MessageType,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl FilaScaleError {
    /// Errors consumed inside an exchange's retry loop.
    ///
    /// These indicate a quiet device or a garbled frame, never an absent one.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FilaScaleError::NoData
                | FilaScaleError::ShortMsg { .. }
                | FilaScaleError::BadMsgType(_)
                | FilaScaleError::BadSize(_)
                | FilaScaleError::BadCrc { .. }
        )
    }

    /// Errors after which the session must be considered gone.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            FilaScaleError::ConnectionLost(_)
                | FilaScaleError::NoConnection
                | FilaScaleError::PortUnavailable { .. }
        )
    }
}

/// Result type alias for FilaScale operations
pub type Result<T> = std::result::Result<T, FilaScaleError>;

impl From<serde_json::Error> for FilaScaleError {
    fn from(err: serde_json::Error) -> Self {
        FilaScaleError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: FilaScaleError = json_err.into();

        match err {
            FilaScaleError::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FilaScaleError = io_err.into();

        match err {
            FilaScaleError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(FilaScaleError::NoData.is_transient());
        assert!(FilaScaleError::ShortMsg {
            expected: 3,
            received: 1
        }
        .is_transient());
        assert!(FilaScaleError::BadMsgType(9).is_transient());
        assert!(FilaScaleError::BadSize(4096).is_transient());
        assert!(FilaScaleError::BadCrc {
            expected: 1,
            received: 2
        }
        .is_transient());

        assert!(!FilaScaleError::NoConnection.is_transient());
        assert!(!FilaScaleError::ConnectionLost("gone".to_string()).is_transient());
        assert!(!FilaScaleError::RetriesExhausted { attempts: 3 }.is_transient());
    }

    #[test]
    fn test_connection_fatal_classification() {
        assert!(FilaScaleError::NoConnection.is_connection_fatal());
        assert!(FilaScaleError::ConnectionLost("EIO".to_string()).is_connection_fatal());
        assert!(FilaScaleError::PortUnavailable {
            port: "/dev/ttyUSB0".to_string(),
            reason: "busy".to_string()
        }
        .is_connection_fatal());

        assert!(!FilaScaleError::NoData.is_connection_fatal());
        assert!(!FilaScaleError::InvalidStatusPayload("eof".to_string()).is_connection_fatal());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", FilaScaleError::NoData), "No data");
        assert_eq!(format!("{}", FilaScaleError::NoConnection), "No connection");
        assert_eq!(
            format!("{}", FilaScaleError::BadMsgType(0x07)),
            "Invalid message type: 0x07"
        );
        assert_eq!(
            format!(
                "{}",
                FilaScaleError::BadCrc {
                    expected: 0x31C3,
                    received: 0x0000
                }
            ),
            "Bad CRC: computed 0x31C3, received 0x0000"
        );
        assert_eq!(
            format!("{}", FilaScaleError::RetriesExhausted { attempts: 3 }),
            "Retries exhausted after 3 attempts"
        );
        assert_eq!(
            format!(
                "{}",
                FilaScaleError::UnexpectedReply {
                    expected: MessageType::Status,
                    received: MessageType::Config
                }
            ),
            "Unexpected reply: expected STATUS, received CONFIG"
        );
    }
}
