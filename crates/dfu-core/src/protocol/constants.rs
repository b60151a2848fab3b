//! Wire constants for the Nordic Secure DFU control point.

// ============================================================================
// Control point opcodes (Host -> Device)
// ============================================================================

/// Create a new object of the given type and size.
pub const OP_CREATE: u8 = 0x01;

/// Set the Packet Receipt Notification interval.
pub const OP_SET_PRN: u8 = 0x02;

/// Request the offset/CRC-32 of the data received so far.
pub const OP_CALC_CHECKSUM: u8 = 0x03;

/// Execute (commit) the current object.
pub const OP_EXECUTE: u8 = 0x04;

/// Select an object type, returning its durable offset/CRC and max size.
pub const OP_SELECT: u8 = 0x06;

/// Response marker, first byte of every control point notification.
pub const OP_RESPONSE: u8 = 0x60;

// ============================================================================
// Object types
// ============================================================================

/// Command object: the init packet (metadata + signature).
pub const OBJECT_TYPE_COMMAND: u8 = 0x01;

/// Data object: firmware image bytes.
pub const OBJECT_TYPE_DATA: u8 = 0x02;

// ============================================================================
// Result codes (Device -> Host, third byte of a response)
// ============================================================================

pub const RES_INVALID_CODE: u8 = 0x00;
pub const RES_SUCCESS: u8 = 0x01;
pub const RES_OPCODE_NOT_SUPPORTED: u8 = 0x02;
pub const RES_INVALID_PARAMETER: u8 = 0x03;
pub const RES_INSUFFICIENT_RESOURCES: u8 = 0x04;
pub const RES_INVALID_OBJECT: u8 = 0x05;
pub const RES_UNSUPPORTED_TYPE: u8 = 0x07;
pub const RES_OPERATION_NOT_PERMITTED: u8 = 0x08;
pub const RES_OPERATION_FAILED: u8 = 0x0A;

/// Human-readable name for a device result code.
pub fn result_name(code: u8) -> &'static str {
    match code {
        RES_INVALID_CODE => "INVALID_CODE",
        RES_SUCCESS => "SUCCESS",
        RES_OPCODE_NOT_SUPPORTED => "OPCODE_NOT_SUPPORTED",
        RES_INVALID_PARAMETER => "INVALID_PARAMETER",
        RES_INSUFFICIENT_RESOURCES => "INSUFFICIENT_RESOURCES",
        RES_INVALID_OBJECT => "INVALID_OBJECT",
        RES_UNSUPPORTED_TYPE => "UNSUPPORTED_TYPE",
        RES_OPERATION_NOT_PERMITTED => "OPERATION_NOT_PERMITTED",
        RES_OPERATION_FAILED => "OPERATION_FAILED",
        _ => "UNKNOWN",
    }
}

// ============================================================================
// Defaults
// ============================================================================

/// Default ATT payload per data point write (ATT_MTU 23 minus 3-byte header).
pub const DEFAULT_MTU: usize = 20;

/// Default Packet Receipt Notification interval (0 = disabled).
pub const DEFAULT_PRN: u16 = 0;

/// Default control point round-trip timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
