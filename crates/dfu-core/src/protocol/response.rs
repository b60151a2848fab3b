//! Control point notification parsing.
//!
//! Every well-formed notification is `[0x60, request_opcode, result, payload...]`
//! with little-endian payload fields.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use super::constants::*;

/// A control point notification, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Well-formed response to a previously issued opcode.
    Response(ControlPointResponse),
    /// Bytes that do not form a response; a desync if one was expected.
    Malformed(Vec<u8>),
}

impl Notification {
    /// Classify raw notification bytes.
    pub fn parse(bytes: &[u8]) -> Self {
        if bytes.len() < 3 || bytes[0] != OP_RESPONSE {
            return Notification::Malformed(bytes.to_vec());
        }
        Notification::Response(ControlPointResponse {
            opcode: bytes[1],
            result: bytes[2],
            payload: bytes[3..].to_vec(),
        })
    }
}

/// Decoded response: echoed opcode, result code, and trailing payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPointResponse {
    pub opcode: u8,
    pub result: u8,
    pub payload: Vec<u8>,
}

impl ControlPointResponse {
    pub fn is_success(&self) -> bool {
        self.result == RES_SUCCESS
    }
}

impl fmt::Display for ControlPointResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "opcode=0x{:02X} result={}",
            self.opcode,
            result_name(self.result)
        )
    }
}

/// Device's authoritative report of durable progress for one object type.
///
/// `crc32` always describes exactly bytes `[0, offset)` of that object
/// type's cumulative payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectResponse {
    /// Largest object the device accepts for this type.
    pub max_size: u32,
    /// Bytes durably received so far.
    pub offset: u32,
    /// CRC-32 of the received prefix.
    pub crc32: u32,
}

impl SelectResponse {
    /// Decode the 12-byte SELECT payload `{maxSize, offset, crc32}`.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload.len() < 12 {
            return None;
        }
        Some(Self {
            max_size: LittleEndian::read_u32(&payload[0..4]),
            offset: LittleEndian::read_u32(&payload[4..8]),
            crc32: LittleEndian::read_u32(&payload[8..12]),
        })
    }
}

/// CalcChecksum / PRN acknowledgment payload `{offset, crc32}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumResponse {
    pub offset: u32,
    pub crc32: u32,
}

impl ChecksumResponse {
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload.len() < 8 {
            return None;
        }
        Some(Self {
            offset: LittleEndian::read_u32(&payload[0..4]),
            crc32: LittleEndian::read_u32(&payload[4..8]),
        })
    }
}
