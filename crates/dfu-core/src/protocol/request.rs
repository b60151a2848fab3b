//! Control point request encoding.
//!
//! Every request is an opcode byte followed by a little-endian payload.

use std::fmt;

use super::constants::*;

/// Protocol-level object type selecting which durable object the
/// Create/Select/Checksum commands address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// Init packet (metadata + signature), validated before data transfer.
    Command,
    /// Firmware image bytes.
    Data,
}

impl ObjectType {
    pub fn as_u8(self) -> u8 {
        match self {
            ObjectType::Command => OBJECT_TYPE_COMMAND,
            ObjectType::Data => OBJECT_TYPE_DATA,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectType::Command => write!(f, "command"),
            ObjectType::Data => write!(f, "data"),
        }
    }
}

/// A single control point command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPointRequest {
    /// Create a new object of `size` bytes.
    Create { object_type: ObjectType, size: u32 },
    /// Set the Packet Receipt Notification interval (0 disables it).
    SetPrn(u16),
    /// Ask for the current offset and CRC-32.
    CalcChecksum,
    /// Commit the current object.
    Execute,
    /// Query durable progress and max object size for an object type.
    Select(ObjectType),
}

impl ControlPointRequest {
    /// The opcode a matching response must echo back.
    pub fn opcode(&self) -> u8 {
        match self {
            ControlPointRequest::Create { .. } => OP_CREATE,
            ControlPointRequest::SetPrn(_) => OP_SET_PRN,
            ControlPointRequest::CalcChecksum => OP_CALC_CHECKSUM,
            ControlPointRequest::Execute => OP_EXECUTE,
            ControlPointRequest::Select(_) => OP_SELECT,
        }
    }

    /// Encode to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(6);
        buf.push(self.opcode());
        match self {
            ControlPointRequest::Create { object_type, size } => {
                buf.push(object_type.as_u8());
                buf.extend_from_slice(&size.to_le_bytes());
            }
            ControlPointRequest::SetPrn(value) => {
                buf.extend_from_slice(&value.to_le_bytes());
            }
            ControlPointRequest::Select(object_type) => {
                buf.push(object_type.as_u8());
            }
            ControlPointRequest::CalcChecksum | ControlPointRequest::Execute => {}
        }
        buf
    }
}
