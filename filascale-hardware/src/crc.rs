//! CRC-16/XMODEM as computed by the FilaScale firmware
//!
//! Polynomial 0x1021, initial value 0x0000, no reflection, no final xor.

use crc::{Crc, CRC_16_XMODEM};

const FRAME_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Compute the frame checksum over `bytes`.
pub fn crc16(bytes: &[u8]) -> u16 {
    FRAME_CRC.checksum(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(crc16(b"123456789"), 0x31C3);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(crc16(&[]), 0x0000);
    }

    #[test]
    fn test_single_byte() {
        // One byte of 'A' (0x41)
        assert_eq!(crc16(b"A"), 0x58E5);
    }

    #[test]
    fn test_long_input() {
        let bytes = [0xFF; 300];
        let mut digest = FRAME_CRC.digest();
        digest.update(&bytes[..100]);
        digest.update(&bytes[100..]);
        assert_eq!(crc16(&bytes), digest.finalize());
    }

    #[test]
    fn test_order_matters() {
        assert_ne!(crc16(&[0x01, 0x02]), crc16(&[0x02, 0x01]));
    }

    #[test]
    fn test_empty_status_request_header() {
        // sync, STATUS, length 0 (LE)
        let header = [0x55, 0x00, 0x00, 0x00];
        assert_eq!(crc16(&header), 0xC97E);
        assert_ne!(crc16(&header), crc16(&[0x55, 0x01, 0x00, 0x00]));
    }
}
