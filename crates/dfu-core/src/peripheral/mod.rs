//! Peripheral/adapter layer: trait, mock, and device emulator.

pub mod emulator;
pub mod mock;
pub mod traits;

pub use emulator::DeviceEmulator;
pub use mock::MockPeripheral;
pub use traits::{CharacteristicId, Peripheral, PeripheralError, WriteMode};
