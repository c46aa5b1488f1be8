//! CRC-8 used to protect packet headers.
//!
//! MSB-first, polynomial `x^8 + x^2 + x + 1` (0x07), initial value 0, no
//! final XOR. Only the header bytes in front of the `crc8` field are covered.

use crate::constants::CRC_OFFSET;

/// Generator polynomial.
pub const CRC8_POLYNOMIAL: u8 = 0x07;

const CRC8_TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC8_POLYNOMIAL
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the CRC-8 of `data`.
pub fn crc8(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |crc, &byte| CRC8_TABLE[(crc ^ byte) as usize])
}

/// Compute the checksum of a packet header (the bytes before `crc8`).
///
/// `frame` must be at least [`CRC_OFFSET`] bytes long.
pub fn header_crc8(frame: &[u8]) -> u8 {
    crc8(&frame[..CRC_OFFSET])
}
