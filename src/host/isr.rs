//! Host-mode interrupt handlers
//!
//! Channel events run through the tables in [`super::state`]; this module
//! performs the register side (unmask the halt interrupt, halt, re-arm,
//! acknowledge). Port and FIFO handlers follow the DWC2 host programming
//! model.

use embedded_hal::delay::DelayNs;

use crate::class::HostPort;
use crate::controller::{read_packet, CoreHandle};
use crate::otg::{
    offsets, ChannelCharacteristics, ChannelInterrupt, ChannelTransferSize, CoreInterrupt,
    EndpointType, HostConfig, HostPacketStatus, OtgBus, PortControl, PortSpeed, RxStatus,
    TxQueueStatus,
};

use super::state::{
    in_event, out_event, resolve_halt, ChannelEvent, ErrorCount, HcStatus, Reaction, UrbState,
};

/// HFIR frame interval for a low-speed device on a 6 MHz PHY clock
const FRAME_INTERVAL_6_MHZ: u32 = 6000;
/// HFIR frame interval for a full-speed device on a 48 MHz PHY clock
const FRAME_INTERVAL_48_MHZ: u32 = 48000;

impl<B: OtgBus, D: DelayNs> CoreHandle<B, D> {
    /// Service every channel flagged in HAINT
    pub(crate) fn handle_host_channels(&mut self) -> u32 {
        let pending = self.bus.read(offsets::HAINT) & self.bus.read(offsets::HAINTMSK);
        for num in 0..self.host.channels.len() {
            if pending & (1 << num) != 0 {
                self.service_channel(num);
            }
        }
        1
    }

    fn channel_itr(&mut self, num: usize) -> ChannelInterrupt {
        let status = self.bus.read(offsets::hcint(num));
        let mask = self.bus.read(offsets::hcintmsk(num));
        ChannelInterrupt::from_bits_retain(status & mask)
    }

    fn unmask_halt(&mut self, num: usize) {
        self.bus
            .set_bits(offsets::hcintmsk(num), ChannelInterrupt::HALTED.bits());
    }

    fn mask_halt(&mut self, num: usize) {
        self.bus
            .clear_bits(offsets::hcintmsk(num), ChannelInterrupt::HALTED.bits());
    }

    fn rearm_channel(&mut self, num: usize) {
        let mut hcchar = ChannelCharacteristics(self.bus.read(offsets::hcchar(num)));
        hcchar.set_enable(true).set_disable(false);
        self.bus.write(offsets::hcchar(num), hcchar.bits());
    }

    /// Handle the highest-priority pending event of one channel
    fn service_channel(&mut self, num: usize) {
        let (is_in, ep_type) = {
            let chan = &self.host.channels[num];
            (chan.ep_is_in, chan.ep_type)
        };
        let Some(event) = ChannelEvent::first(self.channel_itr(num), is_in) else {
            return;
        };
        let action = if is_in {
            in_event(event, ep_type)
        } else {
            out_event(event)
        };
        self.count_channel_event(event);

        let chan = &mut self.host.channels[num];
        if let Some(status) = action.status {
            chan.status = status;
        }
        match action.errors {
            ErrorCount::Keep => {}
            ErrorCount::Reset => chan.error_count = 0,
            ErrorCount::Increment => chan.error_count = chan.error_count.saturating_add(1),
        }

        if event == ChannelEvent::TransferComplete {
            self.complete_channel_transfer(num);
        }

        match action.reaction {
            Reaction::Acknowledge => {
                if event == ChannelEvent::AhbError {
                    self.unmask_halt(num);
                }
            }
            Reaction::Halt => {
                self.unmask_halt(num);
                self.halt(num);
            }
            Reaction::Rearm => self.rearm_channel(num),
            Reaction::Complete => {
                let mut hcchar = ChannelCharacteristics(self.bus.read(offsets::hcchar(num)));
                hcchar.set_odd_frame(true);
                self.bus.write(offsets::hcchar(num), hcchar.bits());
                self.host.channels[num].urb_state = UrbState::Done;
            }
            Reaction::ResolveHalt => {
                self.mask_halt(num);
                self.resolve_channel_halt(num);
            }
        }

        // A STALL or toggle error may arrive together with a NAK that would
        // otherwise overwrite the status on the next pass
        let mut ack = event.bit();
        if matches!(
            event,
            ChannelEvent::Stall | ChannelEvent::DataToggleError | ChannelEvent::TransferComplete
        ) {
            ack |= ChannelInterrupt::NAK;
        }
        self.bus.write(offsets::hcint(num), ack.bits());
    }

    fn count_channel_event(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::AhbError => self.diag.record_ahb_error(),
            ChannelEvent::TransactionError => self.diag.record_transaction_error(),
            ChannelEvent::Babble => self.diag.record_babble(),
            ChannelEvent::DataToggleError => self.diag.record_toggle_error(),
            ChannelEvent::Nak => self.diag.record_nak(),
            _ => {}
        }
    }

    /// Byte count and toggle bookkeeping on transfer completion
    fn complete_channel_transfer(&mut self, num: usize) {
        let dma = self.config.dma_enable;
        let chan = &mut self.host.channels[num];
        if dma {
            if chan.ep_is_in {
                let tsiz = ChannelTransferSize(self.bus.read(offsets::hctsiz(num)));
                let received = chan.programmed.saturating_sub(tsiz.xfer_size() as usize);
                chan.xfer.set_count(received);
            } else {
                let len = chan.xfer.len();
                chan.xfer.set_count(len);
            }
        }
        if chan.ep_is_in && chan.ep_type != EndpointType::Isochronous {
            chan.toggle_in = !chan.toggle_in;
        }
    }

    /// Turn the status recorded before the halt into the URB state
    fn resolve_channel_halt(&mut self, num: usize) {
        let chan = &mut self.host.channels[num];
        let Some(urb) = resolve_halt(chan.status, chan.error_count) else {
            return;
        };

        let mut ping = false;
        match chan.status {
            HcStatus::Xfrc => {
                if !chan.ep_is_in && chan.ep_type == EndpointType::Bulk {
                    chan.toggle_out = !chan.toggle_out;
                }
            }
            HcStatus::Nyet => ping = chan.do_ping,
            HcStatus::XactErr if urb == UrbState::Error => chan.error_count = 0,
            _ => {}
        }
        chan.urb_state = urb;

        if urb == UrbState::Error {
            #[cfg(feature = "defmt")]
            defmt::warn!("otg: channel {} failed with {}", num, chan.status);
        }
        if ping {
            self.ping(num);
        }
    }

    /// Pop one entry of the Rx status queue into its channel
    pub(crate) fn handle_host_rx_level(&mut self) -> u32 {
        self.bus
            .clear_bits(offsets::GINTMSK, CoreInterrupt::RX_FIFO_LEVEL.bits());

        let status = RxStatus(self.bus.read(offsets::GRXSTSP));
        let num = status.ep_num() as usize;
        let byte_count = status.byte_count() as usize;

        if HostPacketStatus::from_bits(status.packet_status()) == Some(HostPacketStatus::InData)
            && byte_count > 0
        {
            match self.host.channels.get_mut(num) {
                Some(chan) => {
                    let stored = read_packet(&mut self.bus, chan.xfer.receive_space(), byte_count);
                    chan.xfer.advance(stored);
                    if stored < byte_count {
                        self.diag.record_rx_discarded(byte_count - stored);
                    }

                    let tsiz = ChannelTransferSize(self.bus.read(offsets::hctsiz(num)));
                    if tsiz.packet_count() > 0 {
                        self.rearm_channel(num);
                    }
                }
                None => {
                    read_packet(&mut self.bus, &mut [], byte_count);
                    self.diag.record_rx_discarded(byte_count);
                }
            }
        }

        self.bus
            .set_bits(offsets::GINTMSK, CoreInterrupt::RX_FIFO_LEVEL.bits());
        1
    }

    /// Non-periodic Tx FIFO has room
    pub(crate) fn handle_np_tx_empty(&mut self) -> u32 {
        self.service_tx_empty(offsets::HNPTXSTS, CoreInterrupt::NP_TX_FIFO_EMPTY)
    }

    /// Periodic Tx FIFO has room
    pub(crate) fn handle_p_tx_empty(&mut self) -> u32 {
        self.service_tx_empty(offsets::HPTXSTS, CoreInterrupt::P_TX_FIFO_EMPTY)
    }

    fn service_tx_empty(&mut self, status_offset: usize, empty: CoreInterrupt) -> u32 {
        let top = TxQueueStatus(self.bus.read(status_offset)).top_channel() as usize;
        let pending = self
            .host
            .channels
            .get(top)
            .is_some_and(|chan| !chan.ep_is_in && chan.xfer.remaining() > 0);

        if pending {
            self.write_channel_packets(top);
        } else {
            self.bus.clear_bits(offsets::GINTMSK, empty.bits());
        }
        1
    }

    /// Port connect, enable and overcurrent changes
    pub(crate) fn handle_port<P: HostPort<B, D>>(&mut self, port: &mut P) -> u32 {
        let hprt = PortControl::from_bits_retain(self.bus.read(offsets::HPRT0));
        let mut ack = hprt.difference(PortControl::WRITE_CLEAR);
        let mut do_reset = false;
        let mut enabled = false;

        if hprt.contains(PortControl::CONNECT_DETECTED) {
            ack |= PortControl::CONNECT_DETECTED;
            do_reset = true;
        }

        if hprt.contains(PortControl::ENABLE_CHANGE) {
            ack |= PortControl::ENABLE_CHANGE;
            if hprt.contains(PortControl::ENABLED) {
                self.host.connected = true;
                enabled = true;
                match hprt.speed() {
                    Some(PortSpeed::LowSpeed) => {
                        self.bus.write(offsets::HFIR, FRAME_INTERVAL_6_MHZ);
                        do_reset |= self.select_fsls_clock(HostConfig::CLOCK_6_MHZ);
                    }
                    Some(PortSpeed::FullSpeed) => {
                        self.bus.write(offsets::HFIR, FRAME_INTERVAL_48_MHZ);
                        do_reset |= self.select_fsls_clock(HostConfig::CLOCK_48_MHZ);
                    }
                    _ => {}
                }
            }
        }

        if hprt.contains(PortControl::OVERCURRENT_CHANGE) {
            ack |= PortControl::OVERCURRENT_CHANGE;
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "otg: port overcurrent {}",
                hprt.contains(PortControl::OVERCURRENT_ACTIVE)
            );
        }

        if do_reset {
            self.reset_port();
        }
        self.bus.write(offsets::HPRT0, ack.bits());

        if enabled {
            let outcome = port.connect(self);
            self.diag.record_callback_status(outcome);
        }
        1
    }

    /// Program the FS/LS PHY clock; true when it changed
    fn select_fsls_clock(&mut self, clock: u32) -> bool {
        let mut hcfg = HostConfig(self.bus.read(offsets::HCFG));
        if hcfg.fsls_clock() == clock {
            return false;
        }
        hcfg.set_fsls_clock(clock);
        self.bus.write(offsets::HCFG, hcfg.bits());
        #[cfg(feature = "defmt")]
        defmt::debug!("otg: FS/LS PHY clock select {}", clock);
        true
    }

    pub(crate) fn handle_disconnect<P: HostPort<B, D>>(&mut self, port: &mut P) -> u32 {
        self.host.connected = false;
        let outcome = port.disconnect(self);
        self.diag.record_callback_status(outcome);
        self.clear_core_itr(CoreInterrupt::DISCONNECT);
        1
    }

    /// A periodic transfer missed its frame: halt every enabled periodic
    /// channel
    pub(crate) fn handle_incomplete_periodic(&mut self) -> u32 {
        for num in 0..self.host.channels.len() {
            if !self.host.channels[num].ep_type.is_periodic() {
                continue;
            }
            let hcchar = ChannelCharacteristics(self.bus.read(offsets::hcchar(num)));
            if hcchar.enable() {
                self.halt(num);
            }
        }
        self.clear_core_itr(CoreInterrupt::INCOMPLETE_PERIODIC);
        1
    }

    pub(crate) fn handle_host_sof<P: HostPort<B, D>>(&mut self, port: &mut P) -> u32 {
        let outcome = port.sof(self);
        self.diag.record_callback_status(outcome);
        self.clear_core_itr(CoreInterrupt::SOF);
        1
    }
}
