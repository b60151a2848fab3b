//! Control point channel: strict request/response with single-outstanding
//! semantics.
//!
//! States: `Idle -> AwaitingResponse -> Idle`. A response that does not
//! match the outstanding opcode, or that cannot be parsed, leaves the
//! channel in `AwaitingResponse`: the host and device no longer agree on
//! what is in flight, which is fatal to the attempt. Timeouts resolve the
//! pending operation and return to `Idle` so the next attempt can proceed.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::DfuError;
use crate::events::{DfuEvent, DfuObserver};
use crate::peripheral::{CharacteristicId, Peripheral, WriteMode};
use crate::protocol::constants::OP_CALC_CHECKSUM;
use crate::protocol::request::{ControlPointRequest, ObjectType};
use crate::protocol::response::{
    ChecksumResponse, ControlPointResponse, Notification, SelectResponse,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelState {
    Idle,
    AwaitingResponse { opcode: u8 },
}

/// Command/response channel over the control point characteristic.
///
/// Owns the single notification subscription for the duration of a
/// transfer. Every decoded response, success or not, is passed through to
/// the observer as a `ControlPointResponse` event.
pub struct ControlPointChannel<'a, P: Peripheral, O: DfuObserver> {
    peripheral: &'a P,
    observer: &'a O,
    notifications: Receiver<Vec<u8>>,
    state: ChannelState,
    timeout: Duration,
}

impl<'a, P: Peripheral, O: DfuObserver> ControlPointChannel<'a, P, O> {
    pub fn new(
        peripheral: &'a P,
        observer: &'a O,
        notifications: Receiver<Vec<u8>>,
        timeout: Duration,
    ) -> Self {
        Self {
            peripheral,
            observer,
            notifications,
            state: ChannelState::Idle,
            timeout,
        }
    }

    /// Issue one request and wait for its response.
    pub fn request(
        &mut self,
        request: &ControlPointRequest,
    ) -> Result<ControlPointResponse, DfuError> {
        if self.state != ChannelState::Idle {
            return Err(DfuError::Busy);
        }
        let opcode = request.opcode();
        self.state = ChannelState::AwaitingResponse { opcode };
        debug!(opcode = %format_args!("0x{opcode:02X}"), "control request");

        if let Err(e) =
            self.peripheral
                .write(CharacteristicId::ControlPoint, &request.to_bytes(), WriteMode::WithResponse)
        {
            self.state = ChannelState::Idle;
            return Err(e.into());
        }

        self.await_response(opcode)
    }

    /// Wait for an unsolicited CalcChecksum response (a packet receipt
    /// notification). The channel must be idle; the PRN arrives without a
    /// request having been written.
    pub fn wait_receipt(&mut self) -> Result<ChecksumResponse, DfuError> {
        if self.state != ChannelState::Idle {
            return Err(DfuError::Busy);
        }
        self.state = ChannelState::AwaitingResponse {
            opcode: OP_CALC_CHECKSUM,
        };
        let response = self.await_response(OP_CALC_CHECKSUM)?;
        ChecksumResponse::from_payload(&response.payload).ok_or(DfuError::MalformedResponse {
            len: response.payload.len(),
        })
    }

    fn await_response(&mut self, expected: u8) -> Result<ControlPointResponse, DfuError> {
        let bytes = match self.notifications.recv_timeout(self.timeout) {
            Ok(bytes) => bytes,
            Err(RecvTimeoutError::Timeout) => {
                self.state = ChannelState::Idle;
                return Err(DfuError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.state = ChannelState::Idle;
                return Err(crate::peripheral::PeripheralError::Disconnected.into());
            }
        };

        match Notification::parse(&bytes) {
            Notification::Malformed(raw) => {
                // Desync: stay AwaitingResponse, the attempt is over.
                warn!(len = raw.len(), "malformed control point notification");
                Err(DfuError::MalformedResponse { len: raw.len() })
            }
            Notification::Response(response) => {
                self.observer.on_event(&DfuEvent::ControlPointResponse {
                    opcode: response.opcode,
                    result: response.result,
                });
                if response.opcode != expected {
                    warn!(
                        expected = %format_args!("0x{expected:02X}"),
                        got = %format_args!("0x{:02X}", response.opcode),
                        "control point response for wrong opcode"
                    );
                    return Err(DfuError::UnexpectedResponse {
                        expected,
                        got: response.opcode,
                    });
                }
                self.state = ChannelState::Idle;
                debug!(%response, "control response");
                if response.is_success() {
                    Ok(response)
                } else {
                    Err(DfuError::DeviceProtocol {
                        opcode: response.opcode,
                        code: response.result,
                    })
                }
            }
        }
    }

    /// SELECT: query durable progress and max object size.
    pub fn select(&mut self, object_type: ObjectType) -> Result<SelectResponse, DfuError> {
        let response = self.request(&ControlPointRequest::Select(object_type))?;
        SelectResponse::from_payload(&response.payload).ok_or(DfuError::MalformedResponse {
            len: response.payload.len(),
        })
    }

    /// CREATE: open a new object of `size` bytes.
    pub fn create(&mut self, object_type: ObjectType, size: u32) -> Result<(), DfuError> {
        self.request(&ControlPointRequest::Create { object_type, size })?;
        Ok(())
    }

    /// SET_PRN: configure the packet receipt notification interval.
    pub fn set_prn(&mut self, value: u16) -> Result<(), DfuError> {
        self.request(&ControlPointRequest::SetPrn(value))?;
        Ok(())
    }

    /// CALC_CHECKSUM: fetch the device's current offset and CRC.
    pub fn calc_checksum(&mut self) -> Result<ChecksumResponse, DfuError> {
        let response = self.request(&ControlPointRequest::CalcChecksum)?;
        ChecksumResponse::from_payload(&response.payload).ok_or(DfuError::MalformedResponse {
            len: response.payload.len(),
        })
    }

    /// EXECUTE: commit the current object.
    pub fn execute(&mut self) -> Result<(), DfuError> {
        self.request(&ControlPointRequest::Execute)?;
        Ok(())
    }
}
