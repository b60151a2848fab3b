//! DFU orchestrator: drives an ordered set of firmware images through the
//! transfer engine, one image at a time.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::events::{DfuEvent, DfuObserver, TracingObserver};
use crate::image::{FirmwareImage, sort_by_priority};
use crate::peripheral::Peripheral;
use crate::protocol::constants::{DEFAULT_MTU, DEFAULT_PRN, DEFAULT_TIMEOUT_MS};
use crate::transfer::{DfuTransport, TransferConfig};

/// Configuration for an update run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Bytes per data point write.
    pub mtu: usize,
    /// Packet receipt notification interval (0 disables).
    pub prn: u16,
    /// Control point round-trip timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            prn: DEFAULT_PRN,
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl UpdateConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: UpdateConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no transfer can run with.
    pub fn validate(&self) -> Result<(), crate::error::DfuError> {
        if self.mtu == 0 {
            return Err(crate::error::DfuError::InvalidMtu);
        }
        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            mtu: self.mtu,
            prn: self.prn,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

/// Sequences a manifest's images over one connected peripheral.
///
/// Strictly sequential: an image's firmware does not start until its init
/// packet's Execute succeeded, and the next image does not start until the
/// previous one completed. Aborts on first failure; rollback is the
/// device's responsibility.
pub struct DfuOrchestrator<O: DfuObserver> {
    config: UpdateConfig,
    observer: Arc<O>,
    images: Vec<FirmwareImage>,
}

impl DfuOrchestrator<TracingObserver> {
    /// Orchestrator with the default tracing observer.
    pub fn new(config: UpdateConfig, images: Vec<FirmwareImage>) -> Self {
        Self::with_observer(config, images, Arc::new(TracingObserver))
    }
}

impl<O: DfuObserver + 'static> DfuOrchestrator<O> {
    /// Orchestrator with a custom observer. Image order is fixed to the
    /// update priority regardless of manifest order.
    pub fn with_observer(config: UpdateConfig, mut images: Vec<FirmwareImage>, observer: Arc<O>) -> Self {
        sort_by_priority(&mut images);
        Self {
            config,
            observer,
            images,
        }
    }

    /// Run the full update against an already-connected peripheral.
    #[instrument(skip(self, peripheral))]
    pub fn run<P: Peripheral>(&self, peripheral: &P) -> Result<(), crate::error::DfuError> {
        self.observer.on_event(&DfuEvent::Initialized);
        info!(images = self.images.len(), "starting update");

        for image in &self.images {
            self.observer.on_event(&DfuEvent::TransferStart {
                image: image.image_type,
            });
            info!(
                image = %image.image_type,
                init_len = image.init_packet.len(),
                firmware_len = image.firmware.len(),
                "image transfer start"
            );

            let transport = DfuTransport::new(
                peripheral,
                self.observer.as_ref(),
                self.config.transfer_config(),
                image.image_type,
            );

            // The device validates metadata before accepting data: the
            // firmware must wait for the init packet's Execute.
            let result = transport
                .send_init_packet(&image.init_packet)
                .and_then(|()| transport.send_firmware(&image.firmware));

            if let Err(e) = result {
                self.observer.on_event(&DfuEvent::Error {
                    message: e.to_string(),
                });
                return Err(e);
            }
        }

        self.observer.on_event(&DfuEvent::Completed);
        info!("update complete");
        Ok(())
    }
}
