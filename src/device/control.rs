//! EP0 control pipe
//!
//! `Idle -> Setup -> {DataIn | DataOut} -> {StatusIn | StatusOut} -> Idle`,
//! with `Stall` reachable from any state. Class code drives the DATA and
//! STATUS transitions with the `ctl_*` helpers from its `setup_stage`
//! callback; the interrupt handlers continue multi-packet data phases and
//! close them with the opposite-direction status phase.

use embedded_hal::delay::DelayNs;

use crate::buffer::TransferBuffer;
use crate::class::DeviceClass;
use crate::controller::CoreHandle;
use crate::error::Result;
use crate::otg::{Direction, OtgBus};

/// Control pipe state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ep0State {
    /// Waiting for SETUP
    #[default]
    Idle,
    /// SETUP received, not yet answered
    Setup,
    /// Sending the data stage
    DataIn,
    /// Receiving the data stage
    DataOut,
    /// Sending the zero-length status
    StatusIn,
    /// Receiving the zero-length status
    StatusOut,
    /// Request rejected
    Stall,
}

/// USB SETUP packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SetupPacket {
    /// bmRequestType
    pub request_type: u8,
    /// bRequest
    pub request: u8,
    /// wValue
    pub value: u16,
    /// wIndex
    pub index: u16,
    /// wLength
    pub length: u16,
}

impl SetupPacket {
    /// Decode the 8 bytes of a SETUP data packet
    pub const fn from_bytes(bytes: &[u8; 8]) -> Self {
        Self {
            request_type: bytes[0],
            request: bytes[1],
            value: u16::from_le_bytes([bytes[2], bytes[3]]),
            index: u16::from_le_bytes([bytes[4], bytes[5]]),
            length: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }

    /// Wire encoding
    pub const fn to_bytes(&self) -> [u8; 8] {
        let value = self.value.to_le_bytes();
        let index = self.index.to_le_bytes();
        let length = self.length.to_le_bytes();
        [
            self.request_type,
            self.request,
            value[0],
            value[1],
            index[0],
            index[1],
            length[0],
            length[1],
        ]
    }

    /// Create GET_DESCRIPTOR request
    pub const fn get_descriptor(desc_type: u8, desc_index: u8, language_id: u16, length: u16) -> Self {
        Self {
            request_type: 0x80,
            request: 0x06,
            value: ((desc_type as u16) << 8) | desc_index as u16,
            index: language_id,
            length,
        }
    }

    /// Create SET_ADDRESS request
    pub const fn set_address(address: u8) -> Self {
        Self {
            request_type: 0x00,
            request: 0x05,
            value: address as u16,
            index: 0,
            length: 0,
        }
    }

    /// Data stage direction
    pub const fn direction(&self) -> Direction {
        Direction::from_address(self.request_type)
    }
}

impl<B: OtgBus, D: DelayNs> CoreHandle<B, D> {
    /// Current control pipe state
    pub fn ep0_state(&self) -> Ep0State {
        self.device.ep0_state
    }

    /// Send the data stage of a control read
    ///
    /// The length is cut to wLength of the request being served.
    pub fn ctl_send_data(&mut self, buffer: Option<TransferBuffer>, len: usize) -> Result<()> {
        let len = len.min(self.device.ep0_request_len);
        self.ep_tx(0x80, buffer, len)?;
        self.device.ep0_state = Ep0State::DataIn;
        Ok(())
    }

    /// Receive the data stage of a control write
    pub fn ctl_prepare_rx(&mut self, buffer: Option<TransferBuffer>, len: usize) -> Result<()> {
        self.ep_prepare_rx(0x00, buffer, len)?;
        self.device.ep0_state = Ep0State::DataOut;
        Ok(())
    }

    /// Send a zero-length status packet
    pub fn ctl_send_status(&mut self) -> Result<()> {
        self.ep_tx(0x80, None, 0)?;
        self.device.ep0_state = Ep0State::StatusIn;
        Ok(())
    }

    /// Expect a zero-length status packet from the host
    pub fn ctl_receive_status(&mut self) -> Result<()> {
        self.ep_prepare_rx(0x00, None, 0)?;
        self.device.ep0_state = Ep0State::StatusOut;
        Ok(())
    }

    /// A SETUP phase finished; latch wLength before class code sees it
    pub(crate) fn ep0_setup_done(&mut self) {
        self.device.ep0_state = Ep0State::Setup;
        self.device.ep0_request_len = self.setup_packet().length as usize;
    }

    /// A data stage whose length is a whole number of packets but shorter
    /// than requested has to be closed with a zero-length packet
    fn ep0_needs_zlp(&self) -> bool {
        let ep = &self.device.in_ep[0];
        let len = ep.xfer.len();
        len > 0 && len % ep.max_packet as usize == 0 && len < self.device.ep0_request_len
    }

    /// EP0 IN transfer-complete handling
    pub(crate) fn ep0_in_complete<C: DeviceClass<B, D>>(&mut self, class: &mut C) {
        let ep = &self.device.in_ep[0];
        if ep.xfer.remaining() > 0 {
            self.ep0_start_in();
            return;
        }

        match self.device.ep0_state {
            Ep0State::DataIn => {
                if self.ep0_needs_zlp() {
                    let _ = self.ep_tx(0x80, None, 0);
                    return;
                }
                let outcome = class.data_in_stage(self, 0);
                self.diag.record_callback_status(outcome);
                if self.device.ep0_state == Ep0State::DataIn {
                    let _ = self.ctl_receive_status();
                }
            }
            Ep0State::StatusIn => {
                self.device.ep0_state = Ep0State::Idle;
                let outcome = class.data_in_stage(self, 0);
                self.diag.record_callback_status(outcome);
                if self.config().dma_enable {
                    self.ep0_out_start();
                }
            }
            _ => {
                let outcome = class.data_in_stage(self, 0);
                self.diag.record_callback_status(outcome);
            }
        }
    }

    /// EP0 OUT transfer-complete handling
    pub(crate) fn ep0_out_complete<C: DeviceClass<B, D>>(&mut self, class: &mut C) {
        let ep = &self.device.out_ep[0];
        // A full chunk with more to come keeps the data stage going
        if ep.xfer.remaining() > 0 && ep.xfer.count() == ep.pending_end {
            self.ep0_start_out();
            return;
        }

        match self.device.ep0_state {
            Ep0State::DataOut => {
                let outcome = class.data_out_stage(self, 0);
                self.diag.record_callback_status(outcome);
                if self.device.ep0_state == Ep0State::DataOut {
                    let _ = self.ctl_send_status();
                }
            }
            Ep0State::StatusOut => {
                self.device.ep0_state = Ep0State::Idle;
                let outcome = class.data_out_stage(self, 0);
                self.diag.record_callback_status(outcome);
                if self.config().dma_enable {
                    self.ep0_out_start();
                }
            }
            _ => {
                let outcome = class.data_out_stage(self, 0);
                self.diag.record_callback_status(outcome);
            }
        }
    }
}
