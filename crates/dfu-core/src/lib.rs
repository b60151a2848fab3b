//! DFU-Core: Nordic Secure DFU transfer engine in Rust.
//!
//! This crate implements the resumable, integrity-checked, chunked Secure
//! DFU transport protocol run over a BLE control/data characteristic pair,
//! together with the planning that reconciles an interrupted session
//! against device-reported progress.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Opcodes, result codes, request/response codecs
//! - **Peripheral**: Adapter abstraction (mock, device emulator)
//! - **Plan**: Pure transfer planning against the device's SELECT report
//! - **Control / Data**: The two characteristic channels
//! - **Transfer**: One object-type transfer (init packet or firmware)
//! - **Dfu**: Orchestrator sequencing a manifest's images
//! - **Events**: Observer pattern for UI decoupling
//!
//! # Example
//!
//! ```no_run
//! use dfu_core::dfu::{DfuOrchestrator, UpdateConfig};
//! use dfu_core::image::{FirmwareImage, ImageType};
//! use dfu_core::peripheral::DeviceEmulator;
//!
//! let image = FirmwareImage::from_files(
//!     ImageType::Application,
//!     "app.dat",
//!     "app.bin",
//! ).expect("read image files");
//!
//! let target = DeviceEmulator::new(512, 4096);
//! let orchestrator = DfuOrchestrator::new(UpdateConfig::default(), vec![image]);
//! orchestrator.run(&target).expect("DFU failed");
//! ```

pub mod checksum;
pub mod control;
pub mod data;
pub mod dfu;
pub mod error;
pub mod events;
pub mod image;
pub mod peripheral;
pub mod plan;
pub mod protocol;
pub mod transfer;

// Re-exports for convenience
pub use checksum::crc32_of;
pub use control::ControlPointChannel;
pub use data::DataPointChannel;
pub use dfu::{DfuOrchestrator, UpdateConfig};
pub use error::DfuError;
pub use events::{DfuEvent, DfuObserver, NullObserver, TracingObserver};
pub use image::{FirmwareImage, ImageType};
pub use peripheral::{
    CharacteristicId, DeviceEmulator, MockPeripheral, Peripheral, PeripheralError, WriteMode,
};
pub use plan::{TransferPlan, plan};
pub use protocol::{ChecksumResponse, ControlPointRequest, ObjectType, SelectResponse};
pub use transfer::{DfuTransport, TransferConfig};
