//! Interrupt dispatcher
//!
//! One entry point per mode, called from the OTG interrupt vector with the
//! collaborator borrowed for the duration of the call:
//!
//! ```ignore
//! #[interrupt]
//! fn OTG_FS() {
//!     critical_section::with(|cs| {
//!         let mut usb = USB.borrow_ref_mut(cs);
//!         let (core, class) = usb.as_mut().unwrap();
//!         core.handle_device_isr(class);
//!     });
//! }
//! ```
//!
//! Both read GINTSTS & GINTMSK once and test the bits in a fixed order:
//! endpoint and channel events before port and global events.

use embedded_hal::delay::DelayNs;

use crate::class::{DeviceClass, HostPort};
use crate::controller::CoreHandle;
use crate::otg::{CoreInterrupt, OtgBus};

impl<B: OtgBus, D: DelayNs> CoreHandle<B, D> {
    /// Device-mode interrupt entry
    ///
    /// Returns 0 when the core is in host mode or nothing enabled is
    /// pending, otherwise the OR of the handlers' results.
    pub fn handle_device_isr<C: DeviceClass<B, D>>(&mut self, class: &mut C) -> u32 {
        if self.is_host_mode() {
            return 0;
        }
        let pending = self.read_core_itr();
        if pending.is_empty() {
            return 0;
        }

        let mut handled = 0;
        if pending.contains(CoreInterrupt::OUT_ENDPOINT) {
            handled |= self.handle_out_ep_isr(class);
        }
        if pending.contains(CoreInterrupt::IN_ENDPOINT) {
            handled |= self.handle_in_ep_isr(class);
        }
        if pending.contains(CoreInterrupt::RX_FIFO_LEVEL) {
            handled |= self.handle_rx_status_queue_level();
        }
        if pending.contains(CoreInterrupt::MODE_MISMATCH) {
            self.clear_core_itr(CoreInterrupt::MODE_MISMATCH);
        }
        if pending.contains(CoreInterrupt::WAKEUP) {
            handled |= self.handle_resume(class);
        }
        if pending.contains(CoreInterrupt::USB_SUSPEND) {
            handled |= self.handle_usb_suspend(class);
        }
        if pending.contains(CoreInterrupt::SOF) {
            handled |= self.handle_sof(class);
        }
        if pending.contains(CoreInterrupt::USB_RESET) {
            handled |= self.handle_usb_reset(class);
        }
        if pending.contains(CoreInterrupt::ENUM_DONE) {
            handled |= self.handle_enum_done();
        }
        if pending.contains(CoreInterrupt::INCOMPLETE_ISO_IN) {
            handled |= self.handle_iso_in_incomplete(class);
        }
        if pending.contains(CoreInterrupt::INCOMPLETE_PERIODIC) {
            handled |= self.handle_iso_out_incomplete(class);
        }
        if self.config.vbus_sensing {
            if pending.contains(CoreInterrupt::SESSION_REQUEST) {
                handled |= self.handle_session_request(class);
            }
            if pending.contains(CoreInterrupt::OTG) {
                handled |= self.handle_otg(class);
            }
        }
        handled
    }

    /// Host-mode interrupt entry
    ///
    /// Returns 0 when the core is in device mode or nothing enabled is
    /// pending, otherwise the OR of the handlers' results.
    pub fn handle_host_isr<P: HostPort<B, D>>(&mut self, port: &mut P) -> u32 {
        if !self.is_host_mode() {
            return 0;
        }
        let pending = self.read_core_itr();
        if pending.is_empty() {
            return 0;
        }

        let mut handled = 0;
        if pending.contains(CoreInterrupt::RX_FIFO_LEVEL) {
            handled |= self.handle_host_rx_level();
        }
        if pending.contains(CoreInterrupt::NP_TX_FIFO_EMPTY) {
            handled |= self.handle_np_tx_empty();
        }
        if pending.contains(CoreInterrupt::P_TX_FIFO_EMPTY) {
            handled |= self.handle_p_tx_empty();
        }
        if pending.contains(CoreInterrupt::HOST_CHANNEL) {
            handled |= self.handle_host_channels();
        }
        if pending.contains(CoreInterrupt::HOST_PORT) {
            handled |= self.handle_port(port);
        }
        if pending.contains(CoreInterrupt::DISCONNECT) {
            handled |= self.handle_disconnect(port);
        }
        if pending.contains(CoreInterrupt::INCOMPLETE_PERIODIC) {
            handled |= self.handle_incomplete_periodic();
        }
        if pending.contains(CoreInterrupt::MODE_MISMATCH) {
            self.clear_core_itr(CoreInterrupt::MODE_MISMATCH);
        }
        if pending.contains(CoreInterrupt::SOF) {
            handled |= self.handle_host_sof(port);
        }
        handled
    }
}
