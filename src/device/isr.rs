//! Device-mode interrupt handlers
//!
//! Each handler services one GINTSTS condition and returns 1. Software
//! state is updated before the matching hardware bit is cleared.

use embedded_hal::delay::DelayNs;

use crate::class::DeviceClass;
use crate::config::{FS_MAX_PACKET_SIZE, HS_MAX_PACKET_SIZE};
use crate::controller::{read_packet, words, write_packet, CoreHandle};
use crate::otg::{
    offsets, ClockGating, CoreInterrupt, DeviceConfig, DevicePacketStatus, DeviceControl, DeviceStatus,
    EndpointControl, EndpointTransferSize, InEndpointInterrupt, OtgBus, OtgInterrupt,
    OutEndpointInterrupt, PortSpeed, RxStatus, TxFifoStatus, UsbConfig,
};

use super::{Ep0State, SETUP_BUFFER_LEN};

/// USB turnaround time in PHY clocks for a high-speed link
const TRDT_HIGH_SPEED: u32 = 9;
/// USB turnaround time in PHY clocks for a full-speed link
const TRDT_FULL_SPEED: u32 = 5;

/// EP0 max-packet encoding for low speed (8 bytes)
const EP0_MPS_8: u32 = 3;

impl<B: OtgBus, D: DelayNs> CoreHandle<B, D> {
    pub(crate) fn clear_core_itr(&mut self, bits: CoreInterrupt) {
        self.bus.write_1_to_clear(offsets::GINTSTS, bits.bits());
    }

    /// Pending IN endpoint interrupts, with TXFE gated by DIEPEMPMSK
    fn read_in_ep_itr(&mut self, num: usize) -> InEndpointInterrupt {
        let mut mask = self.bus.read(offsets::DIEPMSK);
        let empty = self.bus.read(offsets::DIEPEMPMSK);
        if (empty >> num) & 1 != 0 {
            mask |= InEndpointInterrupt::TX_FIFO_EMPTY.bits();
        }
        InEndpointInterrupt::from_bits_retain(self.bus.read(offsets::diepint(num)) & mask)
    }

    fn read_out_ep_itr(&mut self, num: usize) -> OutEndpointInterrupt {
        let mask = self.bus.read(offsets::DOEPMSK);
        OutEndpointInterrupt::from_bits_retain(self.bus.read(offsets::doepint(num)) & mask)
    }

    fn read_all_ep_itr(&mut self) -> u32 {
        self.bus.read(offsets::DAINT) & self.bus.read(offsets::DAINTMSK)
    }

    /// IN endpoint events: completion, FIFO refill, acknowledged errors
    pub(crate) fn handle_in_ep_isr<C: DeviceClass<B, D>>(&mut self, class: &mut C) -> u32 {
        let mut pending = self.read_all_ep_itr() & 0xFFFF;
        let mut num = 0;
        while pending != 0 {
            if pending & 1 != 0 && num < self.device.in_ep.len() {
                self.service_in_ep(class, num);
            }
            num += 1;
            pending >>= 1;
        }
        1
    }

    fn service_in_ep<C: DeviceClass<B, D>>(&mut self, class: &mut C, num: usize) {
        let int = self.read_in_ep_itr(num);
        let clear = |core: &mut Self, bits: InEndpointInterrupt| {
            core.bus.write_1_to_clear(offsets::diepint(num), bits.bits());
        };

        if int.contains(InEndpointInterrupt::TRANSFER_COMPLETE) {
            self.bus.clear_bits(offsets::DIEPEMPMSK, 1 << num);
            let ep = &mut self.device.in_ep[num];
            if self.config.dma_enable {
                ep.xfer.set_count(ep.pending_end);
            }
            clear(self, InEndpointInterrupt::TRANSFER_COMPLETE);

            if num == 0 {
                self.ep0_in_complete(class);
            } else {
                let outcome = class.data_in_stage(self, num as u8);
                self.diag.record_callback_status(outcome);
            }
        }

        if int.contains(InEndpointInterrupt::AHB_ERROR) {
            self.diag.record_ahb_error();
            #[cfg(feature = "defmt")]
            defmt::warn!("otg: AHB error on IN EP{}", num);
            clear(self, InEndpointInterrupt::AHB_ERROR);
        }
        for bits in [
            InEndpointInterrupt::TIMEOUT,
            InEndpointInterrupt::IN_TOKEN_TX_EMPTY,
            InEndpointInterrupt::IN_TOKEN_EP_MISMATCH,
            InEndpointInterrupt::NAK_EFFECTIVE,
        ] {
            if int.contains(bits) {
                clear(self, bits);
            }
        }
        if int.contains(InEndpointInterrupt::ENDPOINT_DISABLED) {
            self.diag.record_endpoint_disabled();
            clear(self, InEndpointInterrupt::ENDPOINT_DISABLED);
        }
        if int.contains(InEndpointInterrupt::TX_FIFO_UNDERRUN) {
            self.diag.record_tx_underrun();
            clear(self, InEndpointInterrupt::TX_FIFO_UNDERRUN);
        }
        if int.contains(InEndpointInterrupt::TX_FIFO_EMPTY) {
            self.write_empty_tx_fifo(num);
            clear(self, InEndpointInterrupt::TX_FIFO_EMPTY);
        }
    }

    /// Refill Tx FIFO `num` one packet at a time while a whole packet fits
    fn write_empty_tx_fifo(&mut self, num: usize) {
        let ep = &mut self.device.in_ep[num];
        let max_packet = ep.max_packet as usize;
        let end = ep.pending_end;

        let mut space = TxFifoStatus(self.bus.read(offsets::dtxfsts(num))).space() as usize;
        loop {
            let count = ep.xfer.count();
            if count >= end {
                break;
            }
            let len = (end - count).min(max_packet);
            if space < words(len) {
                break;
            }
            write_packet(&mut self.bus, num, ep.xfer.pending(len));
            ep.xfer.advance(len);
            #[cfg(feature = "defmt")]
            defmt::trace!("otg: EP{} wrote {} bytes", num, len);
            space = TxFifoStatus(self.bus.read(offsets::dtxfsts(num))).space() as usize;
        }

        if ep.xfer.count() >= end {
            self.bus.clear_bits(offsets::DIEPEMPMSK, 1 << num);
        }
    }

    /// OUT endpoint events: completion, SETUP done, acknowledged errors
    pub(crate) fn handle_out_ep_isr<C: DeviceClass<B, D>>(&mut self, class: &mut C) -> u32 {
        let mut pending = self.read_all_ep_itr() >> 16;
        let mut num = 0;
        while pending != 0 {
            if pending & 1 != 0 && num < self.device.out_ep.len() {
                self.service_out_ep(class, num);
            }
            num += 1;
            pending >>= 1;
        }
        1
    }

    fn service_out_ep<C: DeviceClass<B, D>>(&mut self, class: &mut C, num: usize) {
        let int = self.read_out_ep_itr(num);

        if int.contains(OutEndpointInterrupt::TRANSFER_COMPLETE) {
            if self.config.dma_enable {
                // Single-packet accounting: the remaining size only tells how
                // much of the last max-packet went unused
                let tsiz = EndpointTransferSize(self.bus.read(offsets::doeptsiz(num)));
                let ep = &mut self.device.out_ep[num];
                let received = (ep.max_packet as usize).saturating_sub(tsiz.xfer_size() as usize);
                let base = if num == 0 { ep.xfer.count() } else { 0 };
                ep.xfer.set_count(base + received);
            }
            self.bus.write_1_to_clear(
                offsets::doepint(num),
                OutEndpointInterrupt::TRANSFER_COMPLETE.bits(),
            );

            if num == 0 {
                self.ep0_out_complete(class);
            } else {
                let outcome = class.data_out_stage(self, num as u8);
                self.diag.record_callback_status(outcome);
            }
        }

        if int.contains(OutEndpointInterrupt::ENDPOINT_DISABLED) {
            self.diag.record_endpoint_disabled();
            self.bus.write_1_to_clear(
                offsets::doepint(num),
                OutEndpointInterrupt::ENDPOINT_DISABLED.bits(),
            );
        }
        if int.contains(OutEndpointInterrupt::AHB_ERROR) {
            self.diag.record_ahb_error();
            #[cfg(feature = "defmt")]
            defmt::warn!("otg: AHB error on OUT EP{}", num);
            self.bus
                .write_1_to_clear(offsets::doepint(num), OutEndpointInterrupt::AHB_ERROR.bits());
        }
        if int.contains(OutEndpointInterrupt::SETUP_DONE) {
            self.ep0_setup_done();
            let outcome = class.setup_stage(self);
            self.diag.record_callback_status(outcome);
            self.bus
                .write_1_to_clear(offsets::doepint(num), OutEndpointInterrupt::SETUP_DONE.bits());
        }
    }

    /// Pop one receive status entry and move its data
    pub(crate) fn handle_rx_status_queue_level(&mut self) -> u32 {
        self.bus
            .clear_bits(offsets::GINTMSK, CoreInterrupt::RX_FIFO_LEVEL.bits());

        let status = RxStatus(self.bus.read(offsets::GRXSTSP));
        let num = status.ep_num() as usize;
        let byte_count = status.byte_count() as usize;

        match DevicePacketStatus::from_bits(status.packet_status()) {
            Some(DevicePacketStatus::DataUpdate) if byte_count > 0 => {
                if let Some(ep) = self.device.out_ep.get_mut(num) {
                    let stored = read_packet(&mut self.bus, ep.xfer.receive_space(), byte_count);
                    ep.xfer.advance(stored);
                    if stored < byte_count {
                        self.diag.record_rx_discarded(byte_count - stored);
                        #[cfg(feature = "defmt")]
                        defmt::warn!(
                            "otg: EP{} dropped {} received bytes",
                            num,
                            byte_count - stored
                        );
                    }
                } else {
                    read_packet(&mut self.bus, &mut [], byte_count);
                    self.diag.record_rx_discarded(byte_count);
                }
            }
            Some(DevicePacketStatus::SetupUpdate) => {
                let mut setup = [0u8; 8];
                read_packet(&mut self.bus, &mut setup, 8);
                self.device.setup_buf[..8].copy_from_slice(&setup);
                if byte_count > 8 {
                    self.diag.record_rx_discarded(byte_count - 8);
                }
            }
            _ => {}
        }

        self.bus
            .set_bits(offsets::GINTMSK, CoreInterrupt::RX_FIFO_LEVEL.bits());
        1
    }

    /// Bus reset: quiesce endpoints, re-arm SETUP reception, address 0
    pub(crate) fn handle_usb_reset<C: DeviceClass<B, D>>(&mut self, class: &mut C) -> u32 {
        self.bus
            .clear_bits(offsets::DCTL, DeviceControl::REMOTE_WAKEUP.bits());
        let _ = self.flush_tx_fifo(0);

        for num in 0..self.device.in_ep.len() {
            self.bus.write(offsets::diepint(num), 0xFF);
            self.bus.write(offsets::doepint(num), 0xFF);
        }
        self.bus.write(offsets::DAINT, u32::MAX);
        self.bus.write(offsets::DAINTMSK, 1 | (1 << 16));
        self.bus.write(
            offsets::DOEPMSK,
            (OutEndpointInterrupt::SETUP_DONE
                | OutEndpointInterrupt::TRANSFER_COMPLETE
                | OutEndpointInterrupt::AHB_ERROR
                | OutEndpointInterrupt::ENDPOINT_DISABLED)
                .bits(),
        );
        self.bus.write(
            offsets::DIEPMSK,
            (InEndpointInterrupt::TRANSFER_COMPLETE
                | InEndpointInterrupt::TIMEOUT
                | InEndpointInterrupt::ENDPOINT_DISABLED
                | InEndpointInterrupt::AHB_ERROR
                | InEndpointInterrupt::IN_TOKEN_EP_MISMATCH)
                .bits(),
        );

        let mut dcfg = DeviceConfig(self.bus.read(offsets::DCFG));
        dcfg.set_address(0);
        self.bus.write(offsets::DCFG, dcfg.bits());

        for ep in self.device.in_ep.iter_mut().chain(self.device.out_ep.iter_mut()) {
            ep.is_stall = false;
            ep.pending_end = 0;
        }
        self.device.ep0_state = Ep0State::Idle;
        self.device.ep0_request_len = 0;
        self.device.setup_buf = [0; SETUP_BUFFER_LEN];

        self.ep0_out_start();
        self.clear_core_itr(CoreInterrupt::USB_RESET);
        let outcome = class.reset(self);
        self.diag.record_callback_status(outcome);
        1
    }

    /// Enumeration done: latch the speed, size EP0, set the turnaround time
    pub(crate) fn handle_enum_done(&mut self) -> u32 {
        self.ep0_activate();

        let speed = self.device_speed();
        let mut usbcfg = UsbConfig(self.bus.read(offsets::GUSBCFG));
        if speed == PortSpeed::HighSpeed {
            self.device.max_packet = HS_MAX_PACKET_SIZE;
            usbcfg.set_turnaround(TRDT_HIGH_SPEED);
        } else {
            self.device.max_packet = FS_MAX_PACKET_SIZE;
            usbcfg.set_turnaround(TRDT_FULL_SPEED);
        }
        self.device.speed = speed;
        self.bus.write(offsets::GUSBCFG, usbcfg.bits());

        self.clear_core_itr(CoreInterrupt::ENUM_DONE);
        1
    }

    /// Size EP0 for the enumerated speed and clear the global IN NAK
    fn ep0_activate(&mut self) {
        let dsts = DeviceStatus(self.bus.read(offsets::DSTS));
        let low_speed = PortSpeed::from_enum_speed(dsts.enum_speed()) == PortSpeed::LowSpeed;

        let mut ctl = EndpointControl(self.bus.read(offsets::diepctl(0)));
        let (code, bytes) = if low_speed {
            (EP0_MPS_8, 8)
        } else {
            (EndpointControl::ep0_max_packet_code(FS_MAX_PACKET_SIZE), FS_MAX_PACKET_SIZE)
        };
        ctl.set_max_packet(code);
        self.bus.write(offsets::diepctl(0), ctl.bits());
        for ep in [self.device.in_ep.get_mut(0), self.device.out_ep.get_mut(0)]
            .into_iter()
            .flatten()
        {
            ep.max_packet = bytes;
        }

        self.bus
            .set_bits(offsets::DCTL, DeviceControl::CLEAR_GLOBAL_IN_NAK.bits());
    }

    pub(crate) fn handle_resume<C: DeviceClass<B, D>>(&mut self, class: &mut C) -> u32 {
        if self.config.low_power {
            self.ungate_core_clock();
        }
        self.bus
            .clear_bits(offsets::DCTL, DeviceControl::REMOTE_WAKEUP.bits());
        let outcome = class.resume(self);
        self.diag.record_callback_status(outcome);
        self.clear_core_itr(CoreInterrupt::WAKEUP);
        1
    }

    pub(crate) fn handle_usb_suspend<C: DeviceClass<B, D>>(&mut self, class: &mut C) -> u32 {
        let outcome = class.suspend(self);
        self.diag.record_callback_status(outcome);
        let dsts = DeviceStatus(self.bus.read(offsets::DSTS));
        self.clear_core_itr(CoreInterrupt::USB_SUSPEND);

        if self.config.low_power && dsts.suspended() {
            self.bus
                .set_bits(offsets::PCGCCTL, ClockGating::STOP_PHY_CLOCK.bits());
            self.bus
                .set_bits(offsets::PCGCCTL, ClockGating::GATE_HCLK.bits());
        }
        1
    }

    pub(crate) fn handle_sof<C: DeviceClass<B, D>>(&mut self, class: &mut C) -> u32 {
        let outcome = class.sof(self);
        self.diag.record_callback_status(outcome);
        self.clear_core_itr(CoreInterrupt::SOF);
        1
    }

    pub(crate) fn handle_iso_in_incomplete<C: DeviceClass<B, D>>(&mut self, class: &mut C) -> u32 {
        let outcome = class.iso_in_incomplete(self);
        self.diag.record_callback_status(outcome);
        self.clear_core_itr(CoreInterrupt::INCOMPLETE_ISO_IN);
        1
    }

    pub(crate) fn handle_iso_out_incomplete<C: DeviceClass<B, D>>(
        &mut self,
        class: &mut C,
    ) -> u32 {
        let outcome = class.iso_out_incomplete(self);
        self.diag.record_callback_status(outcome);
        self.clear_core_itr(CoreInterrupt::INCOMPLETE_PERIODIC);
        1
    }

    pub(crate) fn handle_session_request<C: DeviceClass<B, D>>(&mut self, class: &mut C) -> u32 {
        let outcome = class.dev_connected(self);
        self.diag.record_callback_status(outcome);
        self.clear_core_itr(CoreInterrupt::SESSION_REQUEST);
        1
    }

    pub(crate) fn handle_otg<C: DeviceClass<B, D>>(&mut self, class: &mut C) -> u32 {
        let otg = self.read_otg_itr();
        if otg.contains(OtgInterrupt::SESSION_END) {
            let outcome = class.dev_disconnected(self);
            self.diag.record_callback_status(outcome);
        }
        self.bus.write(offsets::GOTGINT, otg.bits());
        1
    }
}
