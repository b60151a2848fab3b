//! CRC-32 as the Secure DFU protocol uses it (IEEE / ISO-HDLC polynomial).

use crc::{CRC_32_ISO_HDLC, Crc};

pub static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// CRC-32 of a byte slice.
pub fn crc32_of(bytes: &[u8]) -> u32 {
    CRC32.checksum(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // Standard CRC-32 check value.
        assert_eq!(crc32_of(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_empty() {
        assert_eq!(crc32_of(&[]), 0);
    }
}
