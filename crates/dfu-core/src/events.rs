//! Event system for UI decoupling.
//!
//! Allows CLI/GUI layers to observe update progress without tight coupling
//! to the transfer engine.

use crate::image::ImageType;
use crate::protocol::constants::result_name;

/// Events emitted while an update runs.
#[derive(Debug, Clone)]
pub enum DfuEvent {
    /// Orchestrator set up and image order fixed.
    Initialized,
    /// An image's transfer (init packet + firmware) is starting.
    TransferStart { image: ImageType },
    /// Progress within one image's firmware transfer.
    TransferProgress {
        image: ImageType,
        bytes_sent: u64,
        total_bytes: u64,
    },
    /// One image fully transferred and executed.
    TransferComplete { image: ImageType },
    /// Decoded control point response passthrough.
    ControlPointResponse { opcode: u8, result: u8 },
    /// Update aborted.
    Error { message: String },
    /// All images transferred.
    Completed,
}

/// Observer trait for receiving update events.
///
/// Implement this in your UI layer to receive updates.
pub trait DfuObserver: Send + Sync {
    fn on_event(&self, event: &DfuEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl DfuObserver for NullObserver {
    fn on_event(&self, _event: &DfuEvent) {
        // Do nothing
    }
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl DfuObserver for TracingObserver {
    fn on_event(&self, event: &DfuEvent) {
        match event {
            DfuEvent::Initialized => {
                tracing::info!("DFU initialized");
            }
            DfuEvent::TransferStart { image } => {
                tracing::info!(image = %image, "Transfer start");
            }
            DfuEvent::TransferProgress {
                image,
                bytes_sent,
                total_bytes,
            } => {
                let pct = if *total_bytes > 0 {
                    (*bytes_sent * 100) / *total_bytes
                } else {
                    100
                };
                tracing::debug!(
                    image = %image,
                    sent = bytes_sent,
                    total = total_bytes,
                    progress = %format!("{pct}%"),
                    "Transfer progress"
                );
            }
            DfuEvent::TransferComplete { image } => {
                tracing::info!(image = %image, "Transfer complete");
            }
            DfuEvent::ControlPointResponse { opcode, result } => {
                tracing::trace!(
                    opcode = %format!("0x{opcode:02X}"),
                    result = %result_name(*result),
                    "Control point response"
                );
            }
            DfuEvent::Error { message } => {
                tracing::error!("DFU error: {}", message);
            }
            DfuEvent::Completed => {
                tracing::info!("Update complete");
            }
        }
    }
}
