//! Peripheral/adapter layer abstraction.
//!
//! Defines the `Peripheral` trait the transfer engine runs over, allowing
//! different implementations (a real BLE adapter binding, mock, emulator).
//! Connection establishment is the adapter's job; by the time a transfer
//! starts the link is up and characteristics are discovered.

use std::fmt;
use std::sync::mpsc::Receiver;

use thiserror::Error;

/// The two GATT characteristics the DFU service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicId {
    /// Command/response channel (Create, Select, Execute, ...).
    ControlPoint,
    /// Channel carrying raw image bytes.
    DataPoint,
}

impl fmt::Display for CharacteristicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharacteristicId::ControlPoint => write!(f, "control point"),
            CharacteristicId::DataPoint => write!(f, "data point"),
        }
    }
}

/// GATT write flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Acknowledged write; used for control point requests.
    WithResponse,
    /// Unacknowledged write; used for streaming data point chunks.
    WithoutResponse,
}

#[derive(Error, Debug)]
pub enum PeripheralError {
    #[error("notifications unavailable on {characteristic}: {message}")]
    NotificationsUnavailable {
        characteristic: CharacteristicId,
        message: String,
    },

    #[error("write to {characteristic} failed: {message}")]
    WriteFailed {
        characteristic: CharacteristicId,
        message: String,
    },

    #[error("device disconnected")]
    Disconnected,
}

/// Abstract connected peripheral.
///
/// This trait enables:
/// - Production implementations binding a platform BLE stack
/// - Mock implementation for unit testing
/// - In-memory device emulation for end-to-end tests
pub trait Peripheral: Send + Sync {
    /// Enable notifications on a characteristic and return the single
    /// inbound stream for it. The active transfer exclusively owns the
    /// control point subscription for its duration; dropping the receiver
    /// detaches it.
    fn enable_notifications(
        &self,
        id: CharacteristicId,
    ) -> Result<Receiver<Vec<u8>>, PeripheralError>;

    /// Write raw bytes to a characteristic.
    fn write(&self, id: CharacteristicId, bytes: &[u8], mode: WriteMode)
    -> Result<(), PeripheralError>;
}
