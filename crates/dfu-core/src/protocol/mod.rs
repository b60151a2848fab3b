//! Secure DFU control point wire protocol: opcodes, requests, responses.

pub mod constants;
pub mod request;
pub mod response;

pub use request::{ControlPointRequest, ObjectType};
pub use response::{ChecksumResponse, ControlPointResponse, Notification, SelectResponse};
