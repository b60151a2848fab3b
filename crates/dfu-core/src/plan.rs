//! Transfer planning: reconciling local payload bytes against the device's
//! reported resume state.
//!
//! The device's SELECT response is the only source of truth for resumption.
//! A plan is computed fresh from each SELECT and discarded after the
//! attempt. Only whole-object CRC agreement is trustworthy: a mismatch
//! anywhere inside an object cannot distinguish stale from foreign data, so
//! on disagreement trust snaps back to the last fully completed object
//! boundary.

use tracing::{debug, warn};

use crate::checksum::crc32_of;
use crate::error::DfuError;
use crate::protocol::response::SelectResponse;

/// Chunking plan for one object type's payload.
///
/// Invariants (upheld by [`plan`]):
/// - `partial_object.len() + Σ objects[i].len() + offset == payload.len()`
/// - `crc32` describes exactly bytes `[0, offset)` of the payload
/// - no chunk exceeds the negotiated `max_size`
/// - a non-empty `partial_object` implies `offset` is not object-aligned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    /// Confirmed durable progress the plan starts from.
    pub offset: u32,
    /// CRC-32 of `payload[..offset]`.
    pub crc32: u32,
    /// Bytes finishing the device's in-progress object, possibly empty.
    pub partial_object: Vec<u8>,
    /// Fresh whole objects to create, stream, and execute in order.
    pub objects: Vec<Vec<u8>>,
}

impl TransferPlan {
    /// Total bytes this plan will put on the wire.
    pub fn bytes_to_send(&self) -> usize {
        self.partial_object.len() + self.objects.iter().map(Vec::len).sum::<usize>()
    }
}

/// Compute a transfer plan from the payload and the device's SELECT report.
///
/// Pure: identical inputs always yield an identical plan.
pub fn plan(payload: &[u8], select: &SelectResponse) -> Result<TransferPlan, DfuError> {
    let max_size = select.max_size as usize;
    if max_size == 0 {
        return Err(DfuError::InvalidMaxSize);
    }
    let offset = select.offset as usize;
    if offset > payload.len() {
        return Err(DfuError::ProtocolMismatch {
            offset: select.offset,
            available: payload.len(),
        });
    }

    if offset == 0 {
        return Ok(TransferPlan {
            offset: 0,
            crc32: 0,
            partial_object: Vec::new(),
            objects: chunk(payload, max_size),
        });
    }

    let expected = crc32_of(&payload[..offset]);
    if expected != select.crc32 {
        // Device data cannot be trusted past the last completed object
        // boundary; resume from there.
        let snapped = (offset / max_size) * max_size;
        warn!(
            reported_offset = offset,
            reported_crc = %format_args!("0x{:08X}", select.crc32),
            expected_crc = %format_args!("0x{expected:08X}"),
            snapped_offset = snapped,
            "resume CRC mismatch, snapping to last object boundary"
        );
        return Ok(TransferPlan {
            offset: snapped as u32,
            crc32: crc32_of(&payload[..snapped]),
            partial_object: Vec::new(),
            objects: chunk(&payload[snapped..], max_size),
        });
    }

    // Bytes [0, offset) are confirmed.
    if offset % max_size == 0 {
        debug!(offset, "resuming at object boundary");
        return Ok(TransferPlan {
            offset: select.offset,
            crc32: select.crc32,
            partial_object: Vec::new(),
            objects: chunk(&payload[offset..], max_size),
        });
    }

    // Finish the in-progress object first, then chunk the rest.
    let boundary_end = offset.div_ceil(max_size).saturating_mul(max_size);
    let boundary_end = boundary_end.min(payload.len());
    debug!(offset, boundary_end, "resuming inside an object");
    Ok(TransferPlan {
        offset: select.offset,
        crc32: select.crc32,
        partial_object: payload[offset..boundary_end].to_vec(),
        objects: chunk(&payload[boundary_end..], max_size),
    })
}

/// Split bytes into `max_size`-bounded chunks, last one possibly short.
fn chunk(bytes: &[u8], max_size: usize) -> Vec<Vec<u8>> {
    bytes.chunks(max_size).map(<[u8]>::to_vec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(max_size: u32, offset: u32, crc32: u32) -> SelectResponse {
        SelectResponse {
            max_size,
            offset,
            crc32,
        }
    }

    fn payload_1_to_10() -> Vec<u8> {
        (1..=10).collect()
    }

    /// Reassemble confirmed prefix + partial + objects and compare to the
    /// original payload.
    fn assert_reconstructs(payload: &[u8], plan: &TransferPlan) {
        let mut rebuilt = payload[..plan.offset as usize].to_vec();
        rebuilt.extend_from_slice(&plan.partial_object);
        for object in &plan.objects {
            rebuilt.extend_from_slice(object);
        }
        assert_eq!(rebuilt, payload, "plan loses or duplicates bytes");
    }

    #[test]
    fn test_fresh_transfer() {
        let payload = payload_1_to_10();
        let plan = plan(&payload, &select(4, 0, 0)).unwrap();

        assert_eq!(plan.offset, 0);
        assert_eq!(plan.crc32, 0);
        assert!(plan.partial_object.is_empty());
        assert_eq!(
            plan.objects,
            vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8], vec![9, 10]]
        );
        assert_reconstructs(&payload, &plan);
    }

    #[test]
    fn test_crc_mismatch_snaps_to_boundary() {
        let payload = payload_1_to_10();
        let bad_crc = crc32_of(&payload[..5]).wrapping_add(1);
        let plan = plan(&payload, &select(4, 5, bad_crc)).unwrap();

        assert_eq!(plan.offset, 4);
        assert_eq!(plan.crc32, crc32_of(&payload[..4]));
        assert!(plan.partial_object.is_empty());
        assert_eq!(plan.objects, vec![vec![5, 6, 7, 8], vec![9, 10]]);
        assert_reconstructs(&payload, &plan);
    }

    #[test]
    fn test_valid_unaligned_resume_keeps_partial() {
        let payload = payload_1_to_10();
        let crc = crc32_of(&payload[..5]);
        let plan = plan(&payload, &select(4, 5, crc)).unwrap();

        assert_eq!(plan.offset, 5);
        assert_eq!(plan.crc32, crc);
        assert_eq!(plan.partial_object, vec![6, 7, 8]);
        assert_eq!(plan.objects, vec![vec![9, 10]]);
        assert_reconstructs(&payload, &plan);
    }

    #[test]
    fn test_valid_aligned_resume() {
        let payload = payload_1_to_10();
        let crc = crc32_of(&payload[..8]);
        let plan = plan(&payload, &select(4, 8, crc)).unwrap();

        assert_eq!(plan.offset, 8);
        assert!(plan.partial_object.is_empty());
        assert_eq!(plan.objects, vec![vec![9, 10]]);
        assert_reconstructs(&payload, &plan);
    }

    #[test]
    fn test_offset_past_payload_is_protocol_mismatch() {
        let payload = payload_1_to_10();
        let err = plan(&payload, &select(4, 11, 0)).unwrap_err();
        assert!(matches!(
            err,
            DfuError::ProtocolMismatch {
                offset: 11,
                available: 10
            }
        ));
    }

    #[test]
    fn test_fully_received_payload_yields_empty_plan() {
        let payload = payload_1_to_10();
        let crc = crc32_of(&payload);
        // Offset 10 with max 4 is unaligned, but nothing remains to send.
        let plan = plan(&payload, &select(4, 10, crc)).unwrap();
        assert_eq!(plan.offset, 10);
        assert!(plan.partial_object.is_empty());
        assert!(plan.objects.is_empty());
        assert_eq!(plan.bytes_to_send(), 0);
        assert_reconstructs(&payload, &plan);
    }

    #[test]
    fn test_mismatch_never_reuses_bytes_past_boundary() {
        // Offsets inside every object of a 23-byte payload, all with a bad
        // CRC: the plan must restart at or before the boundary below.
        let payload: Vec<u8> = (0..23).map(|i| i as u8).collect();
        for offset in 1..=22u32 {
            let bad = crc32_of(&payload[..offset as usize]) ^ 0xFFFF_FFFF;
            let plan = plan(&payload, &select(8, offset, bad)).unwrap();
            let boundary = (offset / 8) * 8;
            assert_eq!(plan.offset, boundary);
            assert!(plan.partial_object.is_empty());
            assert_reconstructs(&payload, &plan);
        }
    }

    #[test]
    fn test_plan_is_pure() {
        let payload = payload_1_to_10();
        let sel = select(4, 5, crc32_of(&payload[..5]));
        assert_eq!(plan(&payload, &sel).unwrap(), plan(&payload, &sel).unwrap());
    }

    #[test]
    fn test_no_chunk_exceeds_max_size() {
        let payload: Vec<u8> = (0..100).map(|i| i as u8).collect();
        for max in [1usize, 3, 7, 16, 100, 128] {
            let plan = plan(&payload, &select(max as u32, 0, 0)).unwrap();
            assert!(plan.objects.iter().all(|o| o.len() <= max));
            assert_reconstructs(&payload, &plan);
        }
    }

    #[test]
    fn test_zero_max_size_rejected() {
        let payload = payload_1_to_10();
        let err = plan(&payload, &select(0, 0, 0)).unwrap_err();
        assert!(matches!(err, DfuError::InvalidMaxSize));
    }
}
