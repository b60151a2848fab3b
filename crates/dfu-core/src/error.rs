//! DFU error taxonomy.
//!
//! Resumability is structural, not retry-driven: none of these variants is
//! retried internally. A caller that sees `ChecksumMismatch` or `Timeout`
//! may rerun the image; the next attempt re-derives its plan from a fresh
//! SELECT response.

use thiserror::Error;

use crate::peripheral::PeripheralError;
use crate::protocol::constants::result_name;

#[derive(Error, Debug)]
pub enum DfuError {
    /// Notifications could not be enabled; fatal, no internal retry.
    #[error("transport setup failed: {0}")]
    TransportSetup(PeripheralError),

    /// Device answered a request with a non-success result code.
    #[error("device rejected opcode 0x{opcode:02X}: {} (0x{code:02X})", result_name(*.code))]
    DeviceProtocol { opcode: u8, code: u8 },

    /// Post-write verification disagreed with the locally tracked offset/CRC.
    #[error(
        "checksum mismatch: device reports offset={reported_offset} crc=0x{reported_crc:08X}, \
         local offset={local_offset} crc=0x{local_crc:08X}"
    )]
    ChecksumMismatch {
        reported_offset: u32,
        reported_crc: u32,
        local_offset: u32,
        local_crc: u32,
    },

    /// Payload violates the negotiated object constraints.
    #[error("payload too large: {len} bytes, device allows {max}")]
    PayloadTooLarge { len: usize, max: u32 },

    /// Configured data point chunk size cannot move any bytes.
    #[error("configured mtu must be at least 1")]
    InvalidMtu,

    /// Device negotiated a max object size that admits no object.
    #[error("device reports a max object size of 0")]
    InvalidMaxSize,

    /// No response within the configured deadline; indistinguishable from
    /// transient link loss.
    #[error("timed out after {timeout_ms}ms waiting for control point response")]
    Timeout { timeout_ms: u64 },

    /// Request issued while another is outstanding.
    #[error("control point busy: a request is already awaiting its response")]
    Busy,

    /// Device claims more durable progress than local data provides.
    #[error("device reports offset {offset} past local payload of {available} bytes")]
    ProtocolMismatch { offset: u32, available: usize },

    /// Notification carrying an opcode other than the one outstanding.
    /// The channel stays desynchronized; the attempt cannot proceed.
    #[error("protocol desync: expected response to 0x{expected:02X}, got 0x{got:02X}")]
    UnexpectedResponse { expected: u8, got: u8 },

    /// Bytes on the control characteristic that do not form a response.
    #[error("malformed control point notification ({len} bytes)")]
    MalformedResponse { len: usize },

    /// Link/radio failure reported by the adapter, propagated unchanged.
    #[error("peripheral error: {0}")]
    Peripheral(#[from] PeripheralError),
}
