//! Data point channel: MTU-bounded streaming with packet receipt flow
//! control.
//!
//! Transmission chunks are independent of the object size negotiated via
//! Create/Select. With a receipt interval N > 0 the sender may run at most
//! N chunks ahead of device-side processing; each receipt is verified
//! against the locally tracked offset/CRC. Failure fails the current
//! object; recovery is a re-SELECT and replan one level up, never a blind
//! resend.

use std::ops::Range;

use tracing::{debug, trace};

use crate::checksum::crc32_of;
use crate::control::ControlPointChannel;
use crate::error::DfuError;
use crate::events::DfuObserver;
use crate::peripheral::{CharacteristicId, Peripheral, WriteMode};
use crate::protocol::response::ChecksumResponse;

/// Streams payload bytes over the data point characteristic.
#[derive(Debug, Clone, Copy)]
pub struct DataPointChannel {
    /// Bytes per write-without-response.
    mtu: usize,
    /// Packet receipt notification interval; 0 disables flow control.
    prn: u16,
}

impl DataPointChannel {
    pub fn new(mtu: usize, prn: u16) -> Self {
        Self { mtu, prn }
    }

    /// Stream `payload[range]`, verifying receipts against the cumulative
    /// prefix `payload[..sent_end]` as transmission advances.
    pub fn stream<P: Peripheral, O: DfuObserver>(
        &self,
        peripheral: &P,
        control: &mut ControlPointChannel<'_, P, O>,
        payload: &[u8],
        range: Range<usize>,
    ) -> Result<(), DfuError> {
        // The mtu comes from user configuration; a zero chunk size cannot
        // make progress.
        if self.mtu == 0 {
            return Err(DfuError::InvalidMtu);
        }
        let mut sent_end = range.start;
        let mut chunks_since_receipt: u16 = 0;

        for chunk in payload[range].chunks(self.mtu) {
            peripheral.write(CharacteristicId::DataPoint, chunk, WriteMode::WithoutResponse)?;
            sent_end += chunk.len();
            trace!(len = chunk.len(), sent_end, "data chunk");

            if self.prn > 0 {
                chunks_since_receipt += 1;
                if chunks_since_receipt >= self.prn {
                    chunks_since_receipt = 0;
                    let receipt = control.wait_receipt()?;
                    verify_progress(payload, sent_end, &receipt)?;
                    debug!(offset = receipt.offset, "packet receipt verified");
                }
            }
        }
        Ok(())
    }
}

/// Compare a device-reported offset/CRC against the local expectation that
/// exactly `payload[..local_end]` has been received.
pub(crate) fn verify_progress(
    payload: &[u8],
    local_end: usize,
    reported: &ChecksumResponse,
) -> Result<(), DfuError> {
    let local_crc = crc32_of(&payload[..local_end]);
    if reported.offset as usize != local_end || reported.crc32 != local_crc {
        return Err(DfuError::ChecksumMismatch {
            reported_offset: reported.offset,
            reported_crc: reported.crc32,
            local_offset: local_end as u32,
            local_crc,
        });
    }
    Ok(())
}
