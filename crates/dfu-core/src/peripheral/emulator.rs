//! In-memory Secure DFU device emulator.
//!
//! Implements `Peripheral` with a device-side object state machine so the
//! whole transfer engine, including interrupted-transfer resumption, can be
//! exercised end to end without a radio. Fault injection covers mid-stream
//! disconnects, forced result codes, and flash corruption.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::mpsc::{Receiver, Sender, channel};

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, trace};

use super::traits::{CharacteristicId, Peripheral, PeripheralError, WriteMode};
use crate::checksum::crc32_of;
use crate::protocol::constants::*;
use crate::protocol::request::ObjectType;

/// Device-side storage for one object type.
#[derive(Debug)]
struct ObjectBank {
    max_size: u32,
    /// All bytes received for this type, committed or in-progress.
    bytes: Vec<u8>,
    /// Length covered by executed objects.
    executed_len: usize,
    /// Size of the object currently open via Create, if any.
    created: Option<u32>,
}

impl ObjectBank {
    fn new(max_size: u32) -> Self {
        Self {
            max_size,
            bytes: Vec::new(),
            executed_len: 0,
            created: None,
        }
    }
}

struct EmulatorState {
    command: ObjectBank,
    data: ObjectBank,
    /// Object type the data point currently feeds (last Select/Create).
    selected: ObjectType,
    prn: u16,
    writes_since_receipt: u16,
    notifier: Option<Sender<Vec<u8>>>,
    /// Disconnect once this many data point writes have been accepted.
    fail_after_data_writes: Option<usize>,
    data_writes: usize,
    /// Force a result code for an opcode, overriding normal handling.
    forced_results: HashMap<u8, u8>,
}

impl EmulatorState {
    fn bank(&mut self, object_type: ObjectType) -> &mut ObjectBank {
        match object_type {
            ObjectType::Command => &mut self.command,
            ObjectType::Data => &mut self.data,
        }
    }

    fn notify(&self, bytes: Vec<u8>) {
        if let Some(tx) = &self.notifier {
            let _ = tx.send(bytes);
        }
    }

    fn respond(&self, opcode: u8, result: u8, payload: &[u8]) {
        let mut bytes = vec![OP_RESPONSE, opcode, result];
        bytes.extend_from_slice(payload);
        self.notify(bytes);
    }

    fn checksum_payload(&mut self) -> [u8; 8] {
        let bank = self.bank(self.selected);
        let mut payload = [0u8; 8];
        LittleEndian::write_u32(&mut payload[0..4], bank.bytes.len() as u32);
        LittleEndian::write_u32(&mut payload[4..8], crc32_of(&bank.bytes));
        payload
    }
}

/// Emulated Secure DFU target.
pub struct DeviceEmulator {
    state: Mutex<EmulatorState>,
}

impl DeviceEmulator {
    /// New emulator with the given max object sizes for the init packet
    /// (command) and firmware (data) types.
    pub fn new(command_max_size: u32, data_max_size: u32) -> Self {
        Self {
            state: Mutex::new(EmulatorState {
                command: ObjectBank::new(command_max_size),
                data: ObjectBank::new(data_max_size),
                selected: ObjectType::Command,
                prn: 0,
                writes_since_receipt: 0,
                notifier: None,
                fail_after_data_writes: None,
                data_writes: 0,
                forced_results: HashMap::new(),
            }),
        }
    }

    /// Disconnect after `n` further data point writes have been accepted.
    pub fn fail_after_data_writes(&self, n: usize) {
        let mut state = self.state.lock().unwrap();
        let at = state.data_writes + n;
        state.fail_after_data_writes = Some(at);
    }

    /// Clear injected faults, as if the link came back up.
    pub fn clear_faults(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_after_data_writes = None;
        state.forced_results.clear();
    }

    /// Answer every request with `opcode` using `result` instead of the
    /// normal handling.
    pub fn force_result(&self, opcode: u8, result: u8) {
        self.state
            .lock()
            .unwrap()
            .forced_results
            .insert(opcode, result);
    }

    /// Flip one received byte, so the next SELECT reports a CRC that no
    /// longer matches the sender's local data.
    pub fn corrupt_received(&self, object_type: ObjectType, index: usize) {
        let mut state = self.state.lock().unwrap();
        let bank = state.bank(object_type);
        if let Some(byte) = bank.bytes.get_mut(index) {
            *byte ^= 0xFF;
        }
    }

    /// Bytes received so far for an object type.
    pub fn received(&self, object_type: ObjectType) -> Vec<u8> {
        let mut state = self.state.lock().unwrap();
        state.bank(object_type).bytes.clone()
    }

    /// Length covered by executed objects for an object type.
    pub fn executed_len(&self, object_type: ObjectType) -> usize {
        let mut state = self.state.lock().unwrap();
        state.bank(object_type).executed_len
    }

    fn handle_control(&self, bytes: &[u8]) {
        let mut state = self.state.lock().unwrap();
        let Some(&opcode) = bytes.first() else {
            return;
        };

        if let Some(&result) = state.forced_results.get(&opcode) {
            state.respond(opcode, result, &[]);
            return;
        }

        match opcode {
            OP_SELECT => {
                let Some(object_type) = parse_object_type(bytes.get(1)) else {
                    state.respond(opcode, RES_INVALID_PARAMETER, &[]);
                    return;
                };
                state.selected = object_type;
                let bank = state.bank(object_type);
                let mut payload = [0u8; 12];
                LittleEndian::write_u32(&mut payload[0..4], bank.max_size);
                LittleEndian::write_u32(&mut payload[4..8], bank.bytes.len() as u32);
                LittleEndian::write_u32(&mut payload[8..12], crc32_of(&bank.bytes));
                debug!(
                    object_type = %object_type,
                    offset = bank.bytes.len(),
                    "emulator: SELECT"
                );
                state.respond(opcode, RES_SUCCESS, &payload);
            }
            OP_CREATE => {
                let Some(object_type) = parse_object_type(bytes.get(1)) else {
                    state.respond(opcode, RES_INVALID_PARAMETER, &[]);
                    return;
                };
                if bytes.len() < 6 {
                    state.respond(opcode, RES_INVALID_PARAMETER, &[]);
                    return;
                }
                let size = LittleEndian::read_u32(&bytes[2..6]);
                state.selected = object_type;
                let bank = state.bank(object_type);
                if size == 0 || size > bank.max_size {
                    state.respond(opcode, RES_INSUFFICIENT_RESOURCES, &[]);
                    return;
                }
                match object_type {
                    // A fresh init packet replaces the stored one entirely.
                    ObjectType::Command => {
                        bank.bytes.clear();
                        bank.executed_len = 0;
                    }
                    // A new data object discards in-progress bytes only.
                    ObjectType::Data => {
                        let executed = bank.executed_len;
                        bank.bytes.truncate(executed);
                    }
                }
                bank.created = Some(size);
                state.writes_since_receipt = 0;
                debug!(object_type = %object_type, size, "emulator: CREATE");
                state.respond(opcode, RES_SUCCESS, &[]);
            }
            OP_SET_PRN => {
                if bytes.len() < 3 {
                    state.respond(opcode, RES_INVALID_PARAMETER, &[]);
                    return;
                }
                state.prn = LittleEndian::read_u16(&bytes[1..3]);
                state.writes_since_receipt = 0;
                state.respond(opcode, RES_SUCCESS, &[]);
            }
            OP_CALC_CHECKSUM => {
                state.writes_since_receipt = 0;
                let payload = state.checksum_payload();
                state.respond(opcode, RES_SUCCESS, &payload);
            }
            OP_EXECUTE => {
                let selected = state.selected;
                let bank = state.bank(selected);
                let complete = match bank.created {
                    Some(size) => bank.bytes.len() == bank.executed_len + size as usize,
                    None => false,
                };
                if !complete {
                    state.respond(opcode, RES_OPERATION_NOT_PERMITTED, &[]);
                    return;
                }
                let bank = state.bank(selected);
                bank.executed_len = bank.bytes.len();
                bank.created = None;
                // Validating a new init packet starts a fresh firmware
                // reception, as the bootloader does.
                if selected == ObjectType::Command {
                    let data = state.bank(ObjectType::Data);
                    data.bytes.clear();
                    data.executed_len = 0;
                    data.created = None;
                }
                debug!(object_type = %selected, "emulator: EXECUTE");
                state.respond(opcode, RES_SUCCESS, &[]);
            }
            _ => {
                state.respond(opcode, RES_OPCODE_NOT_SUPPORTED, &[]);
            }
        }
    }

    fn handle_data(&self, bytes: &[u8]) -> Result<(), PeripheralError> {
        let mut state = self.state.lock().unwrap();
        if let Some(limit) = state.fail_after_data_writes
            && state.data_writes >= limit
        {
            return Err(PeripheralError::Disconnected);
        }
        state.data_writes += 1;

        let selected = state.selected;
        let bank = state.bank(selected);
        bank.bytes.extend_from_slice(bytes);
        trace!(
            object_type = %selected,
            len = bytes.len(),
            total = bank.bytes.len(),
            "emulator: data write"
        );

        if state.prn > 0 {
            state.writes_since_receipt += 1;
            if state.writes_since_receipt >= state.prn {
                state.writes_since_receipt = 0;
                let payload = state.checksum_payload();
                state.respond(OP_CALC_CHECKSUM, RES_SUCCESS, &payload);
            }
        }
        Ok(())
    }
}

fn parse_object_type(byte: Option<&u8>) -> Option<ObjectType> {
    match byte {
        Some(&OBJECT_TYPE_COMMAND) => Some(ObjectType::Command),
        Some(&OBJECT_TYPE_DATA) => Some(ObjectType::Data),
        _ => None,
    }
}

impl Peripheral for DeviceEmulator {
    fn enable_notifications(
        &self,
        id: CharacteristicId,
    ) -> Result<Receiver<Vec<u8>>, PeripheralError> {
        let (tx, rx) = channel();
        if id == CharacteristicId::ControlPoint {
            self.state.lock().unwrap().notifier = Some(tx);
        }
        Ok(rx)
    }

    fn write(
        &self,
        id: CharacteristicId,
        bytes: &[u8],
        _mode: WriteMode,
    ) -> Result<(), PeripheralError> {
        match id {
            CharacteristicId::ControlPoint => {
                self.handle_control(bytes);
                Ok(())
            }
            CharacteristicId::DataPoint => self.handle_data(bytes),
        }
    }
}
