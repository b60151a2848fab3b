//! Scripted mock peripheral for unit testing channel logic.

use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};

use super::traits::{CharacteristicId, Peripheral, PeripheralError, WriteMode};

/// Mock peripheral: queue control point notifications, capture writes.
pub struct MockPeripheral {
    /// Notifications queued before (or between) requests.
    pending: Mutex<VecDeque<Vec<u8>>>,
    /// Live sender once notifications are enabled.
    notifier: Mutex<Option<Sender<Vec<u8>>>>,
    /// Captured writes, in order.
    write_log: Arc<Mutex<Vec<(CharacteristicId, Vec<u8>, WriteMode)>>>,
    /// Whether the "device" is connected.
    connected: Mutex<bool>,
    /// Simulate a characteristic without notification support.
    notifications_broken: Mutex<bool>,
}

impl MockPeripheral {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            notifier: Mutex::new(None),
            write_log: Arc::new(Mutex::new(Vec::new())),
            connected: Mutex::new(true),
            notifications_broken: Mutex::new(false),
        }
    }

    /// Queue raw bytes to arrive as the next control point notification.
    pub fn queue_notification(&self, bytes: &[u8]) {
        if let Some(tx) = self.notifier.lock().unwrap().as_ref() {
            let _ = tx.send(bytes.to_vec());
        } else {
            self.pending.lock().unwrap().push_back(bytes.to_vec());
        }
    }

    /// Queue a well-formed `[0x60, opcode, result, payload...]` response.
    pub fn queue_response(&self, opcode: u8, result: u8, payload: &[u8]) {
        let mut bytes = vec![crate::protocol::constants::OP_RESPONSE, opcode, result];
        bytes.extend_from_slice(payload);
        self.queue_notification(&bytes);
    }

    /// All captured writes.
    pub fn writes(&self) -> Vec<(CharacteristicId, Vec<u8>, WriteMode)> {
        self.write_log.lock().unwrap().clone()
    }

    /// Captured write payloads for one characteristic.
    pub fn writes_to(&self, id: CharacteristicId) -> Vec<Vec<u8>> {
        self.write_log
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _, _)| *c == id)
            .map(|(_, b, _)| b.clone())
            .collect()
    }

    pub fn clear_writes(&self) {
        self.write_log.lock().unwrap().clear();
    }

    /// Simulate link loss.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Make `enable_notifications` fail.
    pub fn break_notifications(&self) {
        *self.notifications_broken.lock().unwrap() = true;
    }
}

impl Default for MockPeripheral {
    fn default() -> Self {
        Self::new()
    }
}

impl Peripheral for MockPeripheral {
    fn enable_notifications(
        &self,
        id: CharacteristicId,
    ) -> Result<Receiver<Vec<u8>>, PeripheralError> {
        if *self.notifications_broken.lock().unwrap() {
            return Err(PeripheralError::NotificationsUnavailable {
                characteristic: id,
                message: "client characteristic configuration write rejected".into(),
            });
        }
        let (tx, rx) = channel();
        for queued in self.pending.lock().unwrap().drain(..) {
            let _ = tx.send(queued);
        }
        *self.notifier.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    fn write(
        &self,
        id: CharacteristicId,
        bytes: &[u8],
        mode: WriteMode,
    ) -> Result<(), PeripheralError> {
        if !*self.connected.lock().unwrap() {
            return Err(PeripheralError::Disconnected);
        }
        self.write_log
            .lock()
            .unwrap()
            .push((id, bytes.to_vec(), mode));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::{OP_EXECUTE, RES_SUCCESS};

    #[test]
    fn test_queued_notifications_survive_enable() {
        let mock = MockPeripheral::new();
        mock.queue_response(OP_EXECUTE, RES_SUCCESS, &[]);

        let rx = mock
            .enable_notifications(CharacteristicId::ControlPoint)
            .unwrap();
        let bytes = rx.try_recv().unwrap();
        assert_eq!(bytes, vec![0x60, OP_EXECUTE, RES_SUCCESS]);
    }

    #[test]
    fn test_write_capture_per_characteristic() {
        let mock = MockPeripheral::new();
        mock.write(
            CharacteristicId::ControlPoint,
            &[0x06, 0x01],
            WriteMode::WithResponse,
        )
        .unwrap();
        mock.write(
            CharacteristicId::DataPoint,
            &[1, 2, 3],
            WriteMode::WithoutResponse,
        )
        .unwrap();

        assert_eq!(mock.writes().len(), 2);
        assert_eq!(
            mock.writes_to(CharacteristicId::DataPoint),
            vec![vec![1, 2, 3]]
        );
    }

    #[test]
    fn test_disconnect_fails_writes() {
        let mock = MockPeripheral::new();
        mock.disconnect();
        assert!(
            mock.write(CharacteristicId::DataPoint, &[0], WriteMode::WithoutResponse)
                .is_err()
        );
    }
}
