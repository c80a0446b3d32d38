//! Wire codec for FilaScale frames
//!
//! Pure encode/decode, no I/O. The serial reader locates and collects a
//! frame; decoding only validates what was collected.

use filascale_core::{
    FilaScaleError, MessageType, Result, CRC_LEN, FRAME_OVERHEAD, HEADER_LEN, MAX_PAYLOAD,
    SYNC_BYTE,
};
use std::fmt::Write;

use crate::crc::crc16;

/// One validated protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    message_type: MessageType,
    payload: Vec<u8>,
}

impl Frame {
    /// Build a frame, rejecting payloads above `MAX_PAYLOAD`.
    pub fn new(message_type: MessageType, payload: impl Into<Vec<u8>>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD {
            return Err(FilaScaleError::BadSize(payload.len()));
        }
        Ok(Self {
            message_type,
            payload,
        })
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Encoded wire bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        encode(self.message_type, &self.payload)
    }
}

/// Encode a frame: sync, type, LE length, payload, LE CRC16 over all of those.
///
/// Payloads above `MAX_PAYLOAD` are a caller bug.
pub fn encode(message_type: MessageType, payload: &[u8]) -> Vec<u8> {
    debug_assert!(
        payload.len() <= MAX_PAYLOAD,
        "payload of {} bytes exceeds MAX_PAYLOAD",
        payload.len()
    );

    let len = payload.len() as u16;
    let mut bytes = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    bytes.push(SYNC_BYTE);
    bytes.push(message_type.as_u8());
    bytes.extend_from_slice(&len.to_le_bytes());
    bytes.extend_from_slice(payload);

    let crc = crc16(&bytes);
    bytes.extend_from_slice(&crc.to_le_bytes());
    bytes
}

/// Parse the 3 header bytes that follow the sync byte.
///
/// Returns the message type and declared payload length.
pub fn parse_header(header: &[u8]) -> Result<(MessageType, usize)> {
    if header.len() < HEADER_LEN {
        return Err(FilaScaleError::ShortMsg {
            expected: HEADER_LEN,
            received: header.len(),
        });
    }

    let message_type = MessageType::try_from(header[0])?;
    let length = u16::from_le_bytes([header[1], header[2]]) as usize;
    if length > MAX_PAYLOAD {
        return Err(FilaScaleError::BadSize(length));
    }

    Ok((message_type, length))
}

/// Decode a complete frame starting at its sync byte.
///
/// The CRC is recomputed over the received bytes (sync through payload), so a
/// corrupted sync byte is caught as well.
pub fn decode(frame: &[u8]) -> Result<(MessageType, Vec<u8>)> {
    if frame.is_empty() {
        return Err(FilaScaleError::ShortMsg {
            expected: FRAME_OVERHEAD,
            received: 0,
        });
    }

    let (message_type, length) = parse_header(&frame[1..])?;

    let body_end = 1 + HEADER_LEN + length;
    let expected = body_end + CRC_LEN;
    if frame.len() < expected {
        return Err(FilaScaleError::ShortMsg {
            expected,
            received: frame.len(),
        });
    }

    let received = u16::from_le_bytes([frame[body_end], frame[body_end + 1]]);
    let computed = crc16(&frame[..body_end]);
    if received != computed {
        return Err(FilaScaleError::BadCrc {
            expected: computed,
            received,
        });
    }

    Ok((message_type, frame[1 + HEADER_LEN..body_end].to_vec()))
}

/// Upper-case, space separated hex dump
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        // write! to String is infallible
        let _ = write!(out, "{:02X}", b);
    }
    out
}
