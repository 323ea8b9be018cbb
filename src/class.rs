//! Collaborator interfaces
//!
//! Device class code and the host port owner are borrowed for the duration
//! of an init or interrupt call. Each callback gets the core handle back so
//! it can queue the next transfer (send a descriptor, re-arm an OUT
//! endpoint, submit a URB) from inside the interrupt.
//!
//! Callbacks return a status byte. The engine forwards it and otherwise
//! ignores it.

use embedded_hal::delay::DelayNs;

use crate::controller::CoreHandle;
use crate::otg::OtgBus;

/// Device-mode class callbacks
pub trait DeviceClass<B: OtgBus, D: DelayNs> {
    /// A SETUP packet is available through [`CoreHandle::setup_packet`]
    fn setup_stage(&mut self, core: &mut CoreHandle<B, D>) -> u8;

    /// IN transfer on `ep_num` completed
    fn data_in_stage(&mut self, core: &mut CoreHandle<B, D>, ep_num: u8) -> u8;

    /// OUT transfer on `ep_num` completed
    fn data_out_stage(&mut self, core: &mut CoreHandle<B, D>, ep_num: u8) -> u8;

    /// Start of frame
    fn sof(&mut self, _core: &mut CoreHandle<B, D>) -> u8 {
        0
    }

    /// Bus reset; EP0 is already re-armed and the address is 0
    fn reset(&mut self, _core: &mut CoreHandle<B, D>) -> u8 {
        0
    }

    /// Bus suspended
    fn suspend(&mut self, _core: &mut CoreHandle<B, D>) -> u8 {
        0
    }

    /// Bus resumed
    fn resume(&mut self, _core: &mut CoreHandle<B, D>) -> u8 {
        0
    }

    /// An isochronous IN transfer missed its frame
    fn iso_in_incomplete(&mut self, _core: &mut CoreHandle<B, D>) -> u8 {
        0
    }

    /// An isochronous OUT transfer missed its frame
    fn iso_out_incomplete(&mut self, _core: &mut CoreHandle<B, D>) -> u8 {
        0
    }

    /// VBUS session started
    fn dev_connected(&mut self, _core: &mut CoreHandle<B, D>) -> u8 {
        0
    }

    /// VBUS session ended
    fn dev_disconnected(&mut self, _core: &mut CoreHandle<B, D>) -> u8 {
        0
    }
}

/// Host-mode port owner callbacks
pub trait HostPort<B: OtgBus, D: DelayNs> {
    /// A device was attached and the port is enabled
    fn connect(&mut self, core: &mut CoreHandle<B, D>) -> u8;

    /// The attached device went away
    fn disconnect(&mut self, core: &mut CoreHandle<B, D>) -> u8;

    /// Start of frame
    fn sof(&mut self, _core: &mut CoreHandle<B, D>) -> u8 {
        0
    }

    /// Switch the board's VBUS supply
    fn drive_vbus(&mut self, _on: bool) {}
}
