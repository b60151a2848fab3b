//! Firmware image container and update ordering.

use std::fmt;
use std::path::Path;

/// Role of a firmware image within an update package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    SoftDevice,
    Bootloader,
    /// Combined softdevice + bootloader image.
    SoftDeviceBootloader,
    Application,
}

impl ImageType {
    /// Fixed update priority: softdevice first, application last. The
    /// device validates each init packet against what is already flashed,
    /// so order matters.
    pub fn priority(self) -> u8 {
        match self {
            ImageType::SoftDevice => 0,
            ImageType::Bootloader => 1,
            ImageType::SoftDeviceBootloader => 2,
            ImageType::Application => 3,
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageType::SoftDevice => write!(f, "softdevice"),
            ImageType::Bootloader => write!(f, "bootloader"),
            ImageType::SoftDeviceBootloader => write!(f, "softdevice+bootloader"),
            ImageType::Application => write!(f, "application"),
        }
    }
}

/// One image from a parsed update package: init packet plus firmware bytes.
/// Package/manifest parsing happens upstream; this is its output.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    pub image_type: ImageType,
    pub init_packet: Vec<u8>,
    pub firmware: Vec<u8>,
}

impl FirmwareImage {
    pub fn new(image_type: ImageType, init_packet: Vec<u8>, firmware: Vec<u8>) -> Self {
        Self {
            image_type,
            init_packet,
            firmware,
        }
    }

    /// Load an image's parts from an init-packet file and a firmware file.
    pub fn from_files<P: AsRef<Path>>(
        image_type: ImageType,
        init_packet_path: P,
        firmware_path: P,
    ) -> std::io::Result<Self> {
        Ok(Self {
            image_type,
            init_packet: std::fs::read(init_packet_path)?,
            firmware: std::fs::read(firmware_path)?,
        })
    }
}

/// Order images by fixed update priority, keeping the relative order of
/// images with equal roles.
pub fn sort_by_priority(images: &mut [FirmwareImage]) {
    images.sort_by_key(|image| image.image_type.priority());
}
