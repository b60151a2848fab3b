//! One object-type transfer: select, plan, stream, verify, execute.
//!
//! Drives the control and data channels for a single payload (init packet
//! or firmware image). There are no internal retries: every attempt derives
//! its plan from the device's SELECT response, so an interrupted attempt
//! leaves nothing to clean up and the next one resumes from whatever the
//! device durably holds.

use std::time::Duration;

use tracing::{debug, info};

use crate::control::ControlPointChannel;
use crate::data::{DataPointChannel, verify_progress};
use crate::error::DfuError;
use crate::events::{DfuEvent, DfuObserver};
use crate::image::ImageType;
use crate::peripheral::{CharacteristicId, Peripheral};
use crate::plan;
use crate::protocol::constants::{
    DEFAULT_MTU, DEFAULT_PRN, DEFAULT_TIMEOUT_MS, RES_OPERATION_NOT_PERMITTED,
};
use crate::protocol::request::ObjectType;

/// Tunables for a transfer.
#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    /// Bytes per data point write.
    pub mtu: usize,
    /// Packet receipt notification interval (0 disables).
    pub prn: u16,
    /// Control point round-trip / receipt deadline.
    pub request_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            prn: DEFAULT_PRN,
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

/// Transfers one image's payloads to a connected peripheral.
pub struct DfuTransport<'a, P: Peripheral, O: DfuObserver> {
    peripheral: &'a P,
    observer: &'a O,
    config: TransferConfig,
    image: ImageType,
}

impl<'a, P: Peripheral, O: DfuObserver> DfuTransport<'a, P, O> {
    pub fn new(
        peripheral: &'a P,
        observer: &'a O,
        config: TransferConfig,
        image: ImageType,
    ) -> Self {
        Self {
            peripheral,
            observer,
            config,
            image,
        }
    }

    /// Send the init packet (command object). Must fit a single object.
    pub fn send_init_packet(&self, bytes: &[u8]) -> Result<(), DfuError> {
        info!(image = %self.image, len = bytes.len(), "sending init packet");
        self.send_payload(ObjectType::Command, bytes)
    }

    /// Send the firmware image (data objects).
    pub fn send_firmware(&self, bytes: &[u8]) -> Result<(), DfuError> {
        info!(image = %self.image, len = bytes.len(), "sending firmware");
        self.send_payload(ObjectType::Data, bytes)
    }

    fn send_payload(&self, object_type: ObjectType, payload: &[u8]) -> Result<(), DfuError> {
        let notifications = self
            .peripheral
            .enable_notifications(CharacteristicId::ControlPoint)
            .map_err(DfuError::TransportSetup)?;
        let mut control = ControlPointChannel::new(
            self.peripheral,
            self.observer,
            notifications,
            self.config.request_timeout,
        );

        control.set_prn(self.config.prn)?;
        let select = control.select(object_type)?;
        debug!(
            object_type = %object_type,
            max_size = select.max_size,
            offset = select.offset,
            crc32 = %format_args!("0x{:08X}", select.crc32),
            "select response"
        );

        // The init packet must fit in a single object.
        if object_type == ObjectType::Command && payload.len() > select.max_size as usize {
            return Err(DfuError::PayloadTooLarge {
                len: payload.len(),
                max: select.max_size,
            });
        }

        let plan = plan::plan(payload, &select)?;
        let data = DataPointChannel::new(self.config.mtu, self.config.prn);
        let total = payload.len() as u64;
        let mut confirmed = plan.offset as usize;

        if !plan.partial_object.is_empty() {
            // Finish the device's in-progress object, verify, and commit it.
            let end = confirmed + plan.partial_object.len();
            debug!(from = confirmed, to = end, "completing partial object");
            data.stream(self.peripheral, &mut control, payload, confirmed..end)?;
            let checksum = control.calc_checksum()?;
            verify_progress(payload, end, &checksum)?;
            control.execute()?;
            confirmed = end;
            self.emit_progress(confirmed as u64, total);
        } else if confirmed == payload.len() && confirmed > 0 {
            // Everything is already on the device; make sure the trailing
            // object is committed. Tolerate an already-executed object.
            match control.execute() {
                Ok(()) => {}
                Err(DfuError::DeviceProtocol {
                    code: RES_OPERATION_NOT_PERMITTED,
                    ..
                }) => {}
                Err(e) => return Err(e),
            }
        }

        for object in &plan.objects {
            control.create(object_type, object.len() as u32)?;
            let end = confirmed + object.len();
            data.stream(self.peripheral, &mut control, payload, confirmed..end)?;
            let checksum = control.calc_checksum()?;
            verify_progress(payload, end, &checksum)?;
            control.execute()?;
            confirmed = end;
            self.emit_progress(confirmed as u64, total);
        }

        self.observer
            .on_event(&DfuEvent::TransferComplete { image: self.image });
        Ok(())
    }

    fn emit_progress(&self, bytes_sent: u64, total_bytes: u64) {
        self.observer.on_event(&DfuEvent::TransferProgress {
            image: self.image,
            bytes_sent,
            total_bytes,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::peripheral::{DeviceEmulator, MockPeripheral};
    use crate::protocol::constants::{
        OP_CALC_CHECKSUM, OP_CREATE, OP_EXECUTE, OP_SELECT, OP_SET_PRN,
        RES_INSUFFICIENT_RESOURCES, RES_SUCCESS,
    };
    use std::sync::Mutex;

    /// Observer capturing the decoded control point response stream.
    struct ResponseLog {
        responses: Mutex<Vec<(u8, u8)>>,
    }

    impl ResponseLog {
        fn new() -> Self {
            Self {
                responses: Mutex::new(Vec::new()),
            }
        }

        fn opcodes(&self) -> Vec<u8> {
            self.responses
                .lock()
                .unwrap()
                .iter()
                .map(|&(opcode, _)| opcode)
                .collect()
        }

        fn responses(&self) -> Vec<(u8, u8)> {
            self.responses.lock().unwrap().clone()
        }
    }

    impl DfuObserver for ResponseLog {
        fn on_event(&self, event: &DfuEvent) {
            if let DfuEvent::ControlPointResponse { opcode, result } = event {
                self.responses.lock().unwrap().push((*opcode, *result));
            }
        }
    }

    fn config(mtu: usize, prn: u16) -> TransferConfig {
        TransferConfig {
            mtu,
            prn,
            request_timeout: Duration::from_millis(100),
        }
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    #[test]
    fn test_fresh_firmware_transfer() {
        let emu = DeviceEmulator::new(64, 16);
        let fw = payload(40);
        let transport = DfuTransport::new(&emu, &NullObserver, config(4, 0), ImageType::Application);

        transport.send_firmware(&fw).unwrap();
        assert_eq!(emu.received(ObjectType::Data), fw);
        assert_eq!(emu.executed_len(ObjectType::Data), 40);
    }

    #[test]
    fn test_init_packet_single_object() {
        let emu = DeviceEmulator::new(64, 16);
        let init = payload(32);
        let transport = DfuTransport::new(&emu, &NullObserver, config(8, 0), ImageType::Application);

        transport.send_init_packet(&init).unwrap();
        assert_eq!(emu.received(ObjectType::Command), init);
        assert_eq!(emu.executed_len(ObjectType::Command), 32);
    }

    #[test]
    fn test_oversized_init_packet_rejected() {
        let emu = DeviceEmulator::new(8, 16);
        let init = payload(10);
        let transport = DfuTransport::new(&emu, &NullObserver, config(4, 0), ImageType::Application);

        match transport.send_init_packet(&init) {
            Err(DfuError::PayloadTooLarge { len: 10, max: 8 }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_notifications_unavailable_is_setup_error() {
        let mock = MockPeripheral::new();
        mock.break_notifications();
        let transport =
            DfuTransport::new(&mock, &NullObserver, config(4, 0), ImageType::Application);

        assert!(matches!(
            transport.send_firmware(&payload(8)),
            Err(DfuError::TransportSetup(_))
        ));
    }

    #[test]
    fn test_resume_after_disconnect_inside_object() {
        let emu = DeviceEmulator::new(64, 16);
        let fw = payload(40);

        // First attempt dies mid-way through the second object.
        emu.fail_after_data_writes(6);
        let transport = DfuTransport::new(&emu, &NullObserver, config(4, 0), ImageType::Application);
        assert!(transport.send_firmware(&fw).is_err());
        assert_eq!(emu.executed_len(ObjectType::Data), 16);
        assert_eq!(emu.received(ObjectType::Data).len(), 24);

        // Second attempt resumes the in-progress object, no byte resent
        // before the reported offset.
        emu.clear_faults();
        let transport = DfuTransport::new(&emu, &NullObserver, config(4, 0), ImageType::Application);
        transport.send_firmware(&fw).unwrap();
        assert_eq!(emu.received(ObjectType::Data), fw);
        assert_eq!(emu.executed_len(ObjectType::Data), 40);
    }

    #[test]
    fn test_resume_with_corrupted_tail_restarts_from_boundary() {
        let emu = DeviceEmulator::new(64, 16);
        let fw = payload(40);

        emu.fail_after_data_writes(6);
        let transport = DfuTransport::new(&emu, &NullObserver, config(4, 0), ImageType::Application);
        assert!(transport.send_firmware(&fw).is_err());

        // Corrupt a staged (unexecuted) byte; the resume CRC check must
        // refuse the partial object and restart from the boundary.
        emu.corrupt_received(ObjectType::Data, 20);
        emu.clear_faults();
        let transport = DfuTransport::new(&emu, &NullObserver, config(4, 0), ImageType::Application);
        transport.send_firmware(&fw).unwrap();
        assert_eq!(emu.received(ObjectType::Data), fw);
        assert_eq!(emu.executed_len(ObjectType::Data), 40);
    }

    #[test]
    fn test_rerun_of_completed_transfer_is_idempotent() {
        let emu = DeviceEmulator::new(64, 16);
        let fw = payload(32);
        let transport = DfuTransport::new(&emu, &NullObserver, config(4, 0), ImageType::Application);
        transport.send_firmware(&fw).unwrap();

        // No data writes should happen the second time.
        let before = emu.received(ObjectType::Data);
        let transport = DfuTransport::new(&emu, &NullObserver, config(4, 0), ImageType::Application);
        transport.send_firmware(&fw).unwrap();
        assert_eq!(emu.received(ObjectType::Data), before);
    }

    #[test]
    fn test_transfer_with_prn_flow_control() {
        let emu = DeviceEmulator::new(64, 16);
        let fw = payload(40);
        let transport = DfuTransport::new(&emu, &NullObserver, config(4, 2), ImageType::Application);

        transport.send_firmware(&fw).unwrap();
        assert_eq!(emu.received(ObjectType::Data), fw);
        assert_eq!(emu.executed_len(ObjectType::Data), 40);
    }

    #[test]
    fn test_every_control_exchange_surfaces_its_response() {
        let emu = DeviceEmulator::new(64, 16);
        let fw = payload(32);
        let log = ResponseLog::new();
        let transport = DfuTransport::new(&emu, &log, config(4, 0), ImageType::Application);

        // Two objects: set_prn, select, then create/calc_checksum/execute
        // per object.
        transport.send_firmware(&fw).unwrap();
        let opcodes = log.opcodes();
        for expected in [OP_SET_PRN, OP_SELECT, OP_CREATE, OP_CALC_CHECKSUM, OP_EXECUTE] {
            assert!(
                opcodes.contains(&expected),
                "no response event for opcode 0x{expected:02X}: {opcodes:?}"
            );
        }
        assert_eq!(opcodes.iter().filter(|&&op| op == OP_CREATE).count(), 2);
        assert_eq!(opcodes.iter().filter(|&&op| op == OP_EXECUTE).count(), 2);
        assert!(log.responses().iter().all(|&(_, result)| result == RES_SUCCESS));
    }

    #[test]
    fn test_rejected_request_response_surfaces_with_its_result_code() {
        let emu = DeviceEmulator::new(64, 16);
        emu.force_result(OP_CREATE, RES_INSUFFICIENT_RESOURCES);
        let log = ResponseLog::new();
        let transport = DfuTransport::new(&emu, &log, config(4, 0), ImageType::Application);

        assert!(transport.send_firmware(&payload(8)).is_err());
        assert!(
            log.responses()
                .contains(&(OP_CREATE, RES_INSUFFICIENT_RESOURCES)),
            "non-success response missing from event stream: {:?}",
            log.responses()
        );
    }

    #[test]
    fn test_device_rejection_surfaces() {
        let emu = DeviceEmulator::new(64, 16);
        emu.force_result(
            crate::protocol::constants::OP_CREATE,
            crate::protocol::constants::RES_INSUFFICIENT_RESOURCES,
        );
        let transport = DfuTransport::new(&emu, &NullObserver, config(4, 0), ImageType::Application);

        match transport.send_firmware(&payload(8)) {
            Err(DfuError::DeviceProtocol { code, .. }) => {
                assert_eq!(code, crate::protocol::constants::RES_INSUFFICIENT_RESOURCES);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
