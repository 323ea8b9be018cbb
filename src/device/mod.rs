//! Device transfer engine
//!
//! Endpoint records for both directions and the device-facing API: core
//! setup for device mode, endpoint activation, transfer start, stall
//! handling and status. Interrupt servicing lives in [`isr`], the EP0
//! control pipe in [`control`].
//!
//! Endpoints are addressed USB-style: bit 7 selects IN, bits 3:0 the
//! endpoint number.

pub mod control;
pub(crate) mod isr;

use embedded_hal::delay::DelayNs;
use heapless::Vec;

use crate::buffer::{Transfer, TransferBuffer};
use crate::config::{CoreId, PhyInterface, FS_MAX_PACKET_SIZE, MAX_DEVICE_ENDPOINTS};
use crate::controller::{write_packet, CoreHandle, CoreMode};
use crate::error::{Result, UsbError};
use crate::fifo::FifoPlan;
use crate::otg::{
    offsets, timeouts, CoreInterrupt, DeviceConfig, DeviceControl, DeviceStatus, Direction,
    EndpointControl, EndpointTransferSize, EndpointType, InEndpointInterrupt, OtgBus, PortSpeed,
    ResetControl, ThresholdControl,
};

pub use control::{Ep0State, SetupPacket};

/// Size of the SETUP buffer: three back-to-back SETUP packets
pub const SETUP_BUFFER_LEN: usize = 24;

/// Device endpoint status as seen by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EpStatus {
    /// Endpoint answers with STALL
    Stall,
    /// Endpoint answers with NAK
    Nak,
    /// Endpoint is active
    Valid,
    /// Endpoint is deactivated
    Disabled,
}

/// One direction of one device endpoint
#[derive(Debug)]
pub struct Endpoint {
    pub(crate) num: u8,
    pub(crate) is_in: bool,
    pub(crate) ep_type: EndpointType,
    pub(crate) max_packet: u16,
    pub(crate) tx_fifo: u8,
    pub(crate) data_pid_start: bool,
    pub(crate) even_odd_frame: bool,
    pub(crate) is_stall: bool,
    pub(crate) xfer: Transfer,
    /// End of the chunk currently programmed into the hardware
    pub(crate) pending_end: usize,
}

impl Endpoint {
    const fn new(num: u8, is_in: bool) -> Self {
        Self {
            num,
            is_in,
            ep_type: EndpointType::Control,
            max_packet: FS_MAX_PACKET_SIZE,
            tx_fifo: if is_in { num } else { 0 },
            data_pid_start: false,
            even_odd_frame: false,
            is_stall: false,
            xfer: Transfer::new(),
            pending_end: 0,
        }
    }

    /// Endpoint number
    pub const fn number(&self) -> u8 {
        self.num
    }

    /// IN (device to host) endpoint
    pub const fn is_in(&self) -> bool {
        self.is_in
    }

    /// Transfer type
    pub const fn ep_type(&self) -> EndpointType {
        self.ep_type
    }

    /// Max-packet size in bytes
    pub const fn max_packet(&self) -> u16 {
        self.max_packet
    }

    /// Tx FIFO serving this endpoint (IN only)
    pub const fn tx_fifo(&self) -> u8 {
        self.tx_fifo
    }

    /// Endpoint was stalled by software
    pub const fn is_stalled(&self) -> bool {
        self.is_stall
    }

    /// Odd-frame parity for isochronous OUT transfers
    pub const fn even_odd_frame(&self) -> bool {
        self.even_odd_frame
    }

    /// Starting data PID, DATA1 when set
    pub const fn data_pid_start(&self) -> bool {
        self.data_pid_start
    }

    /// Length of the current transfer
    pub const fn xfer_len(&self) -> usize {
        self.xfer.len()
    }

    /// Bytes transferred so far
    pub const fn xfer_count(&self) -> usize {
        self.xfer.count()
    }
}

/// Device-mode software state
#[derive(Debug)]
pub struct DeviceState {
    pub(crate) in_ep: Vec<Endpoint, MAX_DEVICE_ENDPOINTS>,
    pub(crate) out_ep: Vec<Endpoint, MAX_DEVICE_ENDPOINTS>,
    pub(crate) setup_buf: [u8; SETUP_BUFFER_LEN],
    pub(crate) ep0_state: Ep0State,
    /// wLength of the SETUP packet being served
    pub(crate) ep0_request_len: usize,
    pub(crate) speed: PortSpeed,
    /// Max-packet size for the negotiated speed
    pub(crate) max_packet: u16,
    pub(crate) remote_wakeup: bool,
}

impl DeviceState {
    pub(crate) const fn new() -> Self {
        Self {
            in_ep: Vec::new(),
            out_ep: Vec::new(),
            setup_buf: [0; SETUP_BUFFER_LEN],
            ep0_state: Ep0State::Idle,
            ep0_request_len: 0,
            speed: PortSpeed::FullSpeed,
            max_packet: FS_MAX_PACKET_SIZE,
            remote_wakeup: false,
        }
    }

    pub(crate) fn endpoint_mut(&mut self, dir: Direction, num: usize) -> &mut Endpoint {
        match dir {
            Direction::In => &mut self.in_ep[num],
            Direction::Out => &mut self.out_ep[num],
        }
    }
}

/// DAINT / DAINTMSK bit of an endpoint
#[inline(always)]
pub(crate) const fn daint_bit(dir: Direction, num: usize) -> u32 {
    match dir {
        Direction::In => 1 << num,
        Direction::Out => 1 << (16 + num),
    }
}

#[inline(always)]
const fn ctl_offset(dir: Direction, num: usize) -> usize {
    match dir {
        Direction::In => offsets::diepctl(num),
        Direction::Out => offsets::doepctl(num),
    }
}

impl<B: OtgBus, D: DelayNs> CoreHandle<B, D> {
    /// Bring the core up in device mode
    ///
    /// Fails before touching any register when the device FIFO table does
    /// not fit the core.
    pub fn init_device(&mut self) -> Result<()> {
        let plan = FifoPlan::device(
            &self.config().device_fifo,
            self.config().dev_endpoints,
            self.config().total_fifo_size,
            self.config().max_packet,
        )?;

        self.device = DeviceState::new();
        for num in 0..self.config().dev_endpoints {
            // Capacity equals MAX_DEVICE_ENDPOINTS, checked by Config::validate
            let _ = self.device.in_ep.push(Endpoint::new(num, true));
            let _ = self.device.out_ep.push(Endpoint::new(num, false));
        }

        self.disable_global_int();
        self.core_init();
        self.set_current_mode(CoreMode::Device);
        self.core_init_device(&plan);
        self.enable_global_int();
        Ok(())
    }

    /// Device-mode register setup
    fn core_init_device(&mut self, plan: &FifoPlan) {
        self.restart_phy_clock();

        let speed = match (self.config().core_id, self.config().phy) {
            (CoreId::HighSpeed, PhyInterface::Ulpi) => DeviceConfig::SPEED_HIGH,
            (CoreId::HighSpeed, _) => DeviceConfig::SPEED_HIGH_IN_FULL,
            (CoreId::FullSpeed, _) => DeviceConfig::SPEED_FULL,
        };
        let mut dcfg = DeviceConfig(self.bus.read(offsets::DCFG));
        dcfg.set_periodic_interval(DeviceConfig::PERIODIC_INTERVAL_80)
            .set_speed(speed);
        self.bus.write(offsets::DCFG, dcfg.bits());

        plan.program(&mut self.bus);

        let _ = self.flush_tx_fifo(ResetControl::ALL_TX_FIFOS);
        let _ = self.flush_rx_fifo();

        self.bus.write(offsets::DIEPMSK, 0);
        self.bus.write(offsets::DOEPMSK, 0);
        self.bus.write(offsets::DAINT, u32::MAX);
        self.bus.write(offsets::DAINTMSK, 0);

        for num in 0..self.config().dev_endpoints as usize {
            for (ctl, tsiz, int) in [
                (offsets::diepctl(num), offsets::dieptsiz(num), offsets::diepint(num)),
                (offsets::doepctl(num), offsets::doeptsiz(num), offsets::doepint(num)),
            ] {
                let current = EndpointControl(self.bus.read(ctl));
                let mut next = EndpointControl(0);
                if current.enable() {
                    next.set_disable(true).set_snak(true);
                }
                self.bus.write(ctl, next.bits());
                self.bus.write(tsiz, 0);
                self.bus.write(int, 0xFF);
            }
        }

        self.bus.set_bits(
            offsets::DIEPMSK,
            InEndpointInterrupt::TX_FIFO_UNDERRUN.bits(),
        );

        if self.config().dma_enable {
            let mut thr = ThresholdControl(0);
            thr.set_non_iso_enable(true)
                .set_iso_enable(true)
                .set_tx_threshold(64)
                .set_rx_enable(true)
                .set_rx_threshold(64);
            self.bus.write(offsets::DTHRCTL, thr.bits());
        }

        self.enable_device_int();
    }

    fn enable_device_int(&mut self) {
        self.bus.write(offsets::GINTMSK, 0);
        self.bus.write(
            offsets::GINTSTS,
            !CoreInterrupt::SESSION_REQUEST.bits(),
        );
        self.enable_common_int();

        let mut mask = CoreInterrupt::USB_SUSPEND
            | CoreInterrupt::USB_RESET
            | CoreInterrupt::ENUM_DONE
            | CoreInterrupt::IN_ENDPOINT
            | CoreInterrupt::OUT_ENDPOINT
            | CoreInterrupt::SOF
            | CoreInterrupt::INCOMPLETE_ISO_IN
            | CoreInterrupt::INCOMPLETE_PERIODIC;
        if !self.config().dma_enable {
            mask |= CoreInterrupt::RX_FIFO_LEVEL;
        }
        if self.config().vbus_sensing {
            mask |= CoreInterrupt::SESSION_REQUEST | CoreInterrupt::OTG;
        }
        self.bus.set_bits(offsets::GINTMSK, mask.bits());
    }

    /// Validate an endpoint address against the endpoint records
    pub(crate) fn check_ep(&self, ep_addr: u8) -> Result<(Direction, usize)> {
        let dir = Direction::from_address(ep_addr);
        let num = (ep_addr & 0x7F) as usize;
        let count = match dir {
            Direction::In => self.device.in_ep.len(),
            Direction::Out => self.device.out_ep.len(),
        };
        if num >= count {
            return Err(UsbError::InvalidParameter);
        }
        Ok((dir, num))
    }

    /// Endpoint record for `ep_addr`
    pub fn endpoint(&self, ep_addr: u8) -> Option<&Endpoint> {
        let (dir, num) = self.check_ep(ep_addr).ok()?;
        Some(match dir {
            Direction::In => &self.device.in_ep[num],
            Direction::Out => &self.device.out_ep[num],
        })
    }

    /// Connect to the bus by releasing soft disconnect
    pub fn dev_connect(&mut self) {
        self.bus
            .clear_bits(offsets::DCTL, DeviceControl::SOFT_DISCONNECT.bits());
        self.delay.delay_ms(timeouts::SOFT_CONNECT_MS);
    }

    /// Drop off the bus with soft disconnect
    pub fn dev_disconnect(&mut self) {
        self.bus
            .set_bits(offsets::DCTL, DeviceControl::SOFT_DISCONNECT.bits());
        self.delay.delay_ms(timeouts::SOFT_CONNECT_MS);
    }

    /// Program the device address assigned by SET_ADDRESS
    pub fn ep_set_address(&mut self, address: u8) {
        let mut dcfg = DeviceConfig(self.bus.read(offsets::DCFG));
        dcfg.set_address(address as u32);
        self.bus.write(offsets::DCFG, dcfg.bits());
    }

    /// Configure and activate an endpoint
    ///
    /// An endpoint that is already active keeps its control register, and
    /// with it the data toggle.
    pub fn ep_open(&mut self, ep_addr: u8, max_packet: u16, ep_type: EndpointType) -> Result<()> {
        let (dir, num) = self.check_ep(ep_addr)?;
        let ep = self.device.endpoint_mut(dir, num);
        ep.max_packet = max_packet;
        ep.ep_type = ep_type;
        if dir == Direction::In {
            ep.tx_fifo = num as u8;
        }
        if ep_type == EndpointType::Bulk {
            ep.data_pid_start = false;
        }
        self.ep_activate(dir, num);
        Ok(())
    }

    fn ep_activate(&mut self, dir: Direction, num: usize) {
        let ep = self.device.endpoint_mut(dir, num);
        let (max_packet, ep_type, tx_fifo) = (ep.max_packet, ep.ep_type, ep.tx_fifo);
        let offset = ctl_offset(dir, num);

        let mut ctl = EndpointControl(self.bus.read(offset));
        if !ctl.active() {
            let mps = if num == 0 {
                EndpointControl::ep0_max_packet_code(max_packet)
            } else {
                max_packet as u32
            };
            ctl.set_max_packet(mps)
                .set_ep_type(ep_type.bits())
                .set_tx_fifo(if dir == Direction::In { tx_fifo as u32 } else { 0 })
                .set_sd0pid(true)
                .set_active(true);
            self.bus.write(offset, ctl.bits());
        }
        self.bus.set_bits(offsets::DAINTMSK, daint_bit(dir, num));
    }

    /// Deactivate an endpoint and mask its interrupt
    pub fn ep_close(&mut self, ep_addr: u8) -> Result<()> {
        let (dir, num) = self.check_ep(ep_addr)?;
        let offset = ctl_offset(dir, num);
        let mut ctl = EndpointControl(self.bus.read(offset));
        ctl.set_active(false);
        self.bus.write(offset, ctl.bits());
        self.bus.clear_bits(offsets::DAINTMSK, daint_bit(dir, num));
        Ok(())
    }

    /// Arm an OUT endpoint to receive `len` bytes into `buffer`
    pub fn ep_prepare_rx(
        &mut self,
        ep_addr: u8,
        buffer: Option<TransferBuffer>,
        len: usize,
    ) -> Result<()> {
        let (_, num) = self.check_ep(ep_addr & 0x7F)?;
        let dma = self.config().dma_enable;
        let ep = &mut self.device.out_ep[num];
        ep.xfer.start_rx(buffer, len)?;
        ep.pending_end = 0;
        let max_packet = ep.max_packet as usize;

        if num == 0 {
            self.ep0_start_out();
        } else {
            if dma && len > max_packet {
                #[cfg(feature = "defmt")]
                defmt::warn!(
                    "otg: DMA OUT on EP{} spans {} bytes, only one packet is accounted",
                    num,
                    len
                );
            }
            self.ep_start_out(num);
        }
        Ok(())
    }

    /// Start sending `len` bytes of `buffer` on an IN endpoint
    ///
    /// `None` with `len == 0` sends a zero-length packet.
    pub fn ep_tx(&mut self, ep_addr: u8, buffer: Option<TransferBuffer>, len: usize) -> Result<()> {
        let (_, num) = self.check_ep(ep_addr | 0x80)?;
        let ep = &mut self.device.in_ep[num];
        ep.xfer.start(buffer, len)?;
        ep.pending_end = 0;

        if num == 0 {
            self.ep0_start_in();
        } else {
            self.ep_start_in(num);
        }
        Ok(())
    }

    /// Program EP0 IN for the next chunk of at most one max-packet
    pub(crate) fn ep0_start_in(&mut self) {
        let dma = self.config().dma_enable;
        let ep = &mut self.device.in_ep[0];
        let chunk = ep.xfer.remaining().min(ep.max_packet as usize);
        ep.pending_end = ep.xfer.count() + chunk;

        let mut tsiz = EndpointTransferSize(self.bus.read(offsets::dieptsiz(0)));
        tsiz.set_xfer_size(chunk as u32).set_packet_count(1);
        self.bus.write(offsets::dieptsiz(0), tsiz.bits());
        if dma {
            self.bus.write(offsets::diepdma(0), ep.xfer.dma_address());
        }

        let mut ctl = EndpointControl(self.bus.read(offsets::diepctl(0)));
        ctl.set_enable(true).set_cnak(true);
        self.bus.write(offsets::diepctl(0), ctl.bits());

        if !dma && chunk > 0 {
            self.bus.set_bits(offsets::DIEPEMPMSK, 1);
        }
    }

    /// Program EP0 OUT for exactly one max-packet
    pub(crate) fn ep0_start_out(&mut self) {
        let dma = self.config().dma_enable;
        let ep = &mut self.device.out_ep[0];
        let max_packet = ep.max_packet as usize;
        ep.pending_end = ep.xfer.count() + ep.xfer.remaining().min(max_packet);

        let mut tsiz = EndpointTransferSize(self.bus.read(offsets::doeptsiz(0)));
        tsiz.set_xfer_size(max_packet as u32).set_packet_count(1);
        self.bus.write(offsets::doeptsiz(0), tsiz.bits());
        if dma {
            self.bus.write(offsets::doepdma(0), ep.xfer.dma_address());
        }

        let mut ctl = EndpointControl(self.bus.read(offsets::doepctl(0)));
        ctl.set_enable(true).set_cnak(true);
        self.bus.write(offsets::doepctl(0), ctl.bits());
    }

    fn ep_start_in(&mut self, num: usize) {
        let dma = self.config().dma_enable;
        let ep = &mut self.device.in_ep[num];
        let len = ep.xfer.len();
        let iso = ep.ep_type == EndpointType::Isochronous;
        ep.pending_end = len;

        let mut tsiz = EndpointTransferSize(self.bus.read(offsets::dieptsiz(num)));
        if len == 0 {
            tsiz.set_xfer_size(0).set_packet_count(1);
        } else {
            let packets = len.div_ceil(ep.max_packet as usize);
            tsiz.set_xfer_size(len as u32).set_packet_count(packets as u32);
            if iso {
                tsiz.set_multi_count(1);
            }
        }
        self.bus.write(offsets::dieptsiz(num), tsiz.bits());

        if dma {
            self.bus.write(offsets::diepdma(num), ep.xfer.dma_address());
        } else if !iso && len > 0 {
            self.bus.set_bits(offsets::DIEPEMPMSK, 1 << num);
        }

        let mut ctl = EndpointControl(self.bus.read(offsets::diepctl(num)));
        if iso {
            let dsts = DeviceStatus(self.bus.read(offsets::DSTS));
            if dsts.frame() & 1 == 0 {
                ctl.set_sd1pid(true);
            } else {
                ctl.set_sd0pid(true);
            }
        }
        ctl.set_cnak(true).set_enable(true);
        self.bus.write(offsets::diepctl(num), ctl.bits());

        if iso && !dma {
            write_packet(&mut self.bus, num, ep.xfer.pending(len));
            ep.xfer.advance(len);
        }
    }

    fn ep_start_out(&mut self, num: usize) {
        let dma = self.config().dma_enable;
        let ep = &mut self.device.out_ep[num];
        let len = ep.xfer.len();
        let max_packet = ep.max_packet as usize;
        ep.pending_end = len;

        let mut tsiz = EndpointTransferSize(self.bus.read(offsets::doeptsiz(num)));
        if len == 0 {
            tsiz.set_xfer_size(max_packet as u32).set_packet_count(1);
        } else {
            let packets = len.div_ceil(max_packet);
            tsiz.set_xfer_size((packets * max_packet) as u32)
                .set_packet_count(packets as u32);
        }
        self.bus.write(offsets::doeptsiz(num), tsiz.bits());

        if dma {
            self.bus.write(offsets::doepdma(num), ep.xfer.dma_address());
        }

        let mut ctl = EndpointControl(self.bus.read(offsets::doepctl(num)));
        if ep.ep_type == EndpointType::Isochronous {
            if ep.even_odd_frame {
                ctl.set_sd1pid(true);
            } else {
                ctl.set_sd0pid(true);
            }
        }
        ctl.set_cnak(true).set_enable(true);
        self.bus.write(offsets::doepctl(num), ctl.bits());
    }

    /// Answer further tokens on an endpoint with STALL
    pub fn ep_stall(&mut self, ep_addr: u8) -> Result<()> {
        let (dir, num) = self.check_ep(ep_addr)?;
        self.device.endpoint_mut(dir, num).is_stall = true;
        if num == 0 {
            self.device.ep0_state = Ep0State::Stall;
        }

        let offset = ctl_offset(dir, num);
        let mut ctl = EndpointControl(self.bus.read(offset));
        if dir == Direction::In && ctl.enable() {
            ctl.set_disable(true);
        }
        ctl.set_stall(true);
        self.bus.write(offset, ctl.bits());
        Ok(())
    }

    /// Clear a STALL; bulk and interrupt endpoints restart at DATA0
    pub fn ep_clear_stall(&mut self, ep_addr: u8) -> Result<()> {
        let (dir, num) = self.check_ep(ep_addr)?;
        let ep = self.device.endpoint_mut(dir, num);
        ep.is_stall = false;
        let resets_pid = matches!(ep.ep_type, EndpointType::Bulk | EndpointType::Interrupt);

        let offset = ctl_offset(dir, num);
        let mut ctl = EndpointControl(self.bus.read(offset));
        ctl.set_stall(false);
        if resets_pid {
            ctl.set_sd0pid(true);
        }
        self.bus.write(offset, ctl.bits());
        Ok(())
    }

    /// Flush the FIFO behind an endpoint
    ///
    /// IN endpoints flush their own Tx FIFO, OUT endpoints the shared Rx FIFO.
    pub fn ep_flush(&mut self, ep_addr: u8) -> Result<()> {
        let (dir, num) = self.check_ep(ep_addr)?;
        match dir {
            Direction::In => {
                let fifo = self.device.in_ep[num].tx_fifo as u32;
                self.flush_tx_fifo(fifo)
            }
            Direction::Out => self.flush_rx_fifo(),
        }
    }

    /// Current endpoint status read back from the hardware
    pub fn ep_status(&mut self, ep_addr: u8) -> Result<EpStatus> {
        let (dir, num) = self.check_ep(ep_addr)?;
        let ctl = EndpointControl(self.bus.read(ctl_offset(dir, num)));
        Ok(if ctl.stall() {
            EpStatus::Stall
        } else if ctl.nak_status() {
            EpStatus::Nak
        } else if ctl.active() {
            EpStatus::Valid
        } else {
            EpStatus::Disabled
        })
    }

    /// Force an endpoint status
    ///
    /// Making a stalled endpoint valid resets its even/odd frame and clears
    /// the stall the same way for both directions.
    pub fn set_ep_status(&mut self, ep_addr: u8, status: EpStatus) -> Result<()> {
        let (dir, num) = self.check_ep(ep_addr)?;
        let offset = ctl_offset(dir, num);
        let mut ctl = EndpointControl(self.bus.read(offset));

        match status {
            EpStatus::Stall => return self.ep_stall(ep_addr),
            EpStatus::Nak => {
                ctl.set_snak(true);
            }
            EpStatus::Valid => {
                if ctl.stall() {
                    self.device.endpoint_mut(dir, num).even_odd_frame = false;
                    return self.ep_clear_stall(ep_addr);
                }
                ctl.set_cnak(true).set_active(true).set_enable(true);
            }
            EpStatus::Disabled => {
                ctl.set_active(false);
            }
        }
        self.bus.write(offset, ctl.bits());
        Ok(())
    }

    /// Speed the host enumerated the device at
    pub fn device_speed(&mut self) -> PortSpeed {
        PortSpeed::from_enum_speed(DeviceStatus(self.bus.read(offsets::DSTS)).enum_speed())
    }

    /// Allow [`remote_wakeup`](Self::remote_wakeup) (SET_FEATURE DEVICE_REMOTE_WAKEUP)
    pub fn set_remote_wakeup_enabled(&mut self, enabled: bool) {
        self.device.remote_wakeup = enabled;
    }

    /// Signal resume to the host while suspended
    pub fn remote_wakeup(&mut self) {
        if !self.device.remote_wakeup {
            return;
        }
        let dsts = DeviceStatus(self.bus.read(offsets::DSTS));
        if !dsts.suspended() {
            return;
        }
        if self.config().low_power {
            self.ungate_core_clock();
        }
        self.bus
            .set_bits(offsets::DCTL, DeviceControl::REMOTE_WAKEUP.bits());
        self.delay.delay_ms(timeouts::REMOTE_WAKEUP_MS);
        self.bus
            .clear_bits(offsets::DCTL, DeviceControl::REMOTE_WAKEUP.bits());
    }

    /// Ungate the core clocks if the bus is suspended in low-power mode
    pub fn ungate_clock(&mut self) {
        if !self.config().low_power {
            return;
        }
        let dsts = DeviceStatus(self.bus.read(offsets::DSTS));
        if dsts.suspended() {
            self.ungate_core_clock();
        }
    }

    /// Mask and clear every endpoint interrupt, then flush all FIFOs
    pub fn stop_device(&mut self) {
        for num in 0..self.device.in_ep.len() {
            self.bus.write(offsets::diepint(num), 0xFF);
            self.bus.write(offsets::doepint(num), 0xFF);
        }
        self.bus.write(offsets::DIEPMSK, 0);
        self.bus.write(offsets::DOEPMSK, 0);
        self.bus.write(offsets::DAINTMSK, 0);
        self.bus.write(offsets::DAINT, 0xFF);

        let _ = self.flush_rx_fifo();
        let _ = self.flush_tx_fifo(ResetControl::ALL_TX_FIFOS);
    }

    /// Arm EP0 OUT for up to three back-to-back SETUP packets
    ///
    /// In DMA mode the SETUP buffer inside the handle is the DMA target, so
    /// the handle must not move while the core is running.
    pub fn ep0_out_start(&mut self) {
        let mut tsiz = EndpointTransferSize(0);
        tsiz.set_multi_count(3)
            .set_packet_count(1)
            .set_xfer_size(SETUP_BUFFER_LEN as u32);
        self.bus.write(offsets::doeptsiz(0), tsiz.bits());

        if self.config().dma_enable {
            let addr = self.device.setup_buf.as_ptr() as usize as u32;
            self.bus.write(offsets::doepdma(0), addr);
            let mut ctl = EndpointControl(0);
            ctl.set_enable(true).set_active(true);
            self.bus.write(offsets::doepctl(0), ctl.bits());
        }
    }

    /// Most recent SETUP packet
    pub fn setup_packet(&self) -> SetupPacket {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.device.setup_buf[..8]);
        SetupPacket::from_bytes(&bytes)
    }

    /// Bytes moved by the current or last transfer on `ep_addr`
    pub fn ep_xfer_count(&self, ep_addr: u8) -> Result<usize> {
        let (dir, num) = self.check_ep(ep_addr)?;
        Ok(match dir {
            Direction::In => self.device.in_ep[num].xfer.count(),
            Direction::Out => self.device.out_ep[num].xfer.count(),
        })
    }

    /// Data received so far on an OUT endpoint
    pub fn ep_rx_data(&self, ep_addr: u8) -> Result<&[u8]> {
        let (_, num) = self.check_ep(ep_addr & 0x7F)?;
        Ok(self.device.out_ep[num].xfer.data())
    }

    /// Hand the transfer buffer of `ep_addr` back to the caller
    pub fn ep_take_buffer(&mut self, ep_addr: u8) -> Result<Option<TransferBuffer>> {
        let (dir, num) = self.check_ep(ep_addr)?;
        Ok(self.device.endpoint_mut(dir, num).xfer.take_buffer())
    }

    /// Negotiated max-packet size (64 at full speed, 512 at high speed)
    pub fn device_max_packet(&self) -> u16 {
        self.device.max_packet
    }

    /// Speed latched at enumeration
    pub fn enumerated_speed(&self) -> PortSpeed {
        self.device.speed
    }
}
