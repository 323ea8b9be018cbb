//! Host transfer engine
//!
//! Channel records and the host-facing API: core setup for host mode, port
//! power and reset, channel configuration, URB submission and halting.
//! Channel interrupts are resolved in [`isr`] through the tables in
//! [`state`]: a raw event sets the channel status and halts the channel,
//! and the halt confirmation produces the [`UrbState`] callers poll.

pub(crate) mod isr;
pub mod state;

use embedded_hal::delay::DelayNs;
use heapless::Vec;

use crate::buffer::{Transfer, TransferBuffer};
use crate::class::HostPort;
use crate::config::{PhyInterface, MAX_HOST_CHANNELS};
use crate::controller::{words, write_packet, CoreHandle, CoreMode};
use crate::error::{Result, UsbError};
use crate::fifo::FifoPlan;
use crate::otg::{
    offsets, timeouts, ChannelCharacteristics, ChannelInterrupt, ChannelTransferSize,
    CoreInterrupt, Direction, EndpointType, FrameNumber, HostConfig, OtgBus, PortControl,
    PortSpeed, ResetControl, TxQueueStatus,
};

pub use state::{HcStatus, UrbState};

/// Largest packet count a single channel transfer may program
pub const MAX_PACKET_COUNT: usize = 256;

/// Largest max-packet size a channel accepts
const MAX_CHANNEL_PACKET: u16 = 1024;

/// Data PID a channel transfer starts with, in HCTSIZ.DPID encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataPid {
    /// DATA0
    Data0 = 0,
    /// DATA2 (high-bandwidth isochronous)
    Data2 = 1,
    /// DATA1
    Data1 = 2,
    /// SETUP (MDATA for non-control)
    Setup = 3,
}

impl DataPid {
    /// DPID field value
    pub const fn bits(self) -> u32 {
        self as u32
    }

    const fn from_toggle(toggle: bool) -> Self {
        if toggle {
            Self::Data1
        } else {
            Self::Data0
        }
    }
}

/// Pipe a channel is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelConfig {
    /// Device address on the bus
    pub dev_addr: u8,
    /// Endpoint address, bit 7 set for IN
    pub ep_addr: u8,
    /// Speed of the device
    pub speed: PortSpeed,
    /// Transfer type
    pub ep_type: EndpointType,
    /// Max-packet size in bytes
    pub max_packet: u16,
}

impl ChannelConfig {
    /// Full-speed pipe
    pub const fn new(dev_addr: u8, ep_addr: u8, ep_type: EndpointType, max_packet: u16) -> Self {
        Self {
            dev_addr,
            ep_addr,
            speed: PortSpeed::FullSpeed,
            ep_type,
            max_packet,
        }
    }

    /// Device speed
    pub const fn with_speed(mut self, speed: PortSpeed) -> Self {
        self.speed = speed;
        self
    }
}

/// One transfer submitted on a channel
#[derive(Debug)]
pub struct UrbRequest {
    /// Data to send, or space to receive into
    pub buffer: Option<TransferBuffer>,
    /// Bytes to move
    pub len: usize,
    /// Starting PID; `None` follows the channel's data toggle
    pub pid: Option<DataPid>,
    /// Answer a NYET with a PING (high-speed OUT)
    pub do_ping: bool,
}

impl UrbRequest {
    /// Data transfer following the channel toggle
    pub fn new(buffer: Option<TransferBuffer>, len: usize) -> Self {
        Self {
            buffer,
            len,
            pid: None,
            do_ping: false,
        }
    }

    /// SETUP stage carrying an 8-byte request
    pub fn setup(buffer: TransferBuffer) -> Self {
        Self {
            len: 8,
            buffer: Some(buffer),
            pid: Some(DataPid::Setup),
            do_ping: false,
        }
    }

    /// Force the starting PID
    pub fn with_pid(mut self, pid: DataPid) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Use the PING protocol after NYET
    pub fn with_ping(mut self) -> Self {
        self.do_ping = true;
        self
    }
}

/// One host channel
#[derive(Debug)]
pub struct Channel {
    pub(crate) num: u8,
    pub(crate) dev_addr: u8,
    pub(crate) ep_num: u8,
    pub(crate) ep_is_in: bool,
    pub(crate) speed: PortSpeed,
    pub(crate) ep_type: EndpointType,
    pub(crate) max_packet: u16,
    pub(crate) data_pid: DataPid,
    pub(crate) do_ping: bool,
    pub(crate) toggle_in: bool,
    pub(crate) toggle_out: bool,
    pub(crate) xfer: Transfer,
    /// Bytes programmed into HCTSIZ for the current transfer
    pub(crate) programmed: usize,
    pub(crate) status: HcStatus,
    pub(crate) urb_state: UrbState,
    pub(crate) error_count: u8,
}

impl Channel {
    const fn new(num: u8) -> Self {
        Self {
            num,
            dev_addr: 0,
            ep_num: 0,
            ep_is_in: false,
            speed: PortSpeed::FullSpeed,
            ep_type: EndpointType::Control,
            // Default control pipe size until the device descriptor is read
            max_packet: 8,
            data_pid: DataPid::Data0,
            do_ping: false,
            toggle_in: false,
            toggle_out: false,
            xfer: Transfer::new(),
            programmed: 0,
            status: HcStatus::Idle,
            urb_state: UrbState::Idle,
            error_count: 0,
        }
    }

    /// Channel number
    pub const fn number(&self) -> u8 {
        self.num
    }

    /// Device address
    pub const fn device_address(&self) -> u8 {
        self.dev_addr
    }

    /// Endpoint number
    pub const fn ep_num(&self) -> u8 {
        self.ep_num
    }

    /// IN (device to host) pipe
    pub const fn is_in(&self) -> bool {
        self.ep_is_in
    }

    /// Device speed
    pub const fn speed(&self) -> PortSpeed {
        self.speed
    }

    /// Transfer type
    pub const fn ep_type(&self) -> EndpointType {
        self.ep_type
    }

    /// Max-packet size
    pub const fn max_packet(&self) -> u16 {
        self.max_packet
    }

    /// PID of the current transfer
    pub const fn data_pid(&self) -> DataPid {
        self.data_pid
    }

    /// Data toggle of the IN direction, DATA1 when set
    pub const fn toggle_in(&self) -> bool {
        self.toggle_in
    }

    /// Data toggle of the OUT direction, DATA1 when set
    pub const fn toggle_out(&self) -> bool {
        self.toggle_out
    }

    /// Last transaction outcome
    pub const fn status(&self) -> HcStatus {
        self.status
    }

    /// URB state
    pub const fn urb_state(&self) -> UrbState {
        self.urb_state
    }

    /// Consecutive transaction errors
    pub const fn error_count(&self) -> u8 {
        self.error_count
    }

    /// Length of the current transfer
    pub const fn xfer_len(&self) -> usize {
        self.xfer.len()
    }

    /// Bytes moved so far
    pub const fn xfer_count(&self) -> usize {
        self.xfer.count()
    }
}

/// Host-mode software state
#[derive(Debug)]
pub struct HostState {
    pub(crate) channels: Vec<Channel, MAX_HOST_CHANNELS>,
    pub(crate) connected: bool,
}

impl HostState {
    pub(crate) const fn new() -> Self {
        Self {
            channels: Vec::new(),
            connected: false,
        }
    }
}

/// HCINTMSK for a pipe
///
/// The halt interrupt is left out; it is unmasked only while a halt is
/// pending.
pub(crate) fn channel_int_mask(
    ep_type: EndpointType,
    is_in: bool,
    high_speed: bool,
    dma: bool,
) -> ChannelInterrupt {
    let mut mask = ChannelInterrupt::TRANSFER_COMPLETE;
    if dma {
        mask |= ChannelInterrupt::AHB_ERROR;
    }
    match ep_type {
        EndpointType::Control | EndpointType::Bulk => {
            mask |= ChannelInterrupt::STALL
                | ChannelInterrupt::TRANSACTION_ERROR
                | ChannelInterrupt::DATA_TOGGLE_ERROR
                | ChannelInterrupt::NAK;
            if is_in {
                mask |= ChannelInterrupt::BABBLE;
            } else {
                mask |= ChannelInterrupt::NYET;
                if high_speed {
                    mask |= ChannelInterrupt::ACK;
                }
            }
        }
        EndpointType::Interrupt => {
            mask |= ChannelInterrupt::NAK
                | ChannelInterrupt::STALL
                | ChannelInterrupt::TRANSACTION_ERROR
                | ChannelInterrupt::DATA_TOGGLE_ERROR
                | ChannelInterrupt::FRAME_OVERRUN;
            if is_in {
                mask |= ChannelInterrupt::BABBLE;
            }
        }
        EndpointType::Isochronous => {
            mask |= ChannelInterrupt::FRAME_OVERRUN | ChannelInterrupt::ACK;
            if is_in {
                mask |= ChannelInterrupt::TRANSACTION_ERROR | ChannelInterrupt::BABBLE;
            }
        }
    }
    mask
}

impl<B: OtgBus, D: DelayNs> CoreHandle<B, D> {
    /// Bring the core up in host mode and power the port
    ///
    /// Fails before touching any register when the host FIFO table does not
    /// fit the core.
    pub fn init_host<P: HostPort<B, D>>(&mut self, port: &mut P) -> Result<()> {
        let plan = FifoPlan::host(
            &self.config().host_fifo,
            self.config().total_fifo_size,
            self.config().max_packet,
        )?;

        self.host = HostState::new();
        for num in 0..self.config().host_channels {
            // Capacity equals MAX_HOST_CHANNELS, checked by Config::validate
            let _ = self.host.channels.push(Channel::new(num));
        }

        self.disable_global_int();
        self.core_init();
        self.set_current_mode(CoreMode::Host);
        self.core_init_host(&plan, port);
        self.enable_global_int();
        Ok(())
    }

    fn core_init_host<P: HostPort<B, D>>(&mut self, plan: &FifoPlan, port: &mut P) {
        self.restart_phy_clock();

        let clock = match self.config().phy {
            PhyInterface::Ulpi => HostConfig::CLOCK_30_60_MHZ,
            _ => HostConfig::CLOCK_48_MHZ,
        };
        let mut hcfg = HostConfig(self.bus.read(offsets::HCFG));
        hcfg.set_fsls_clock(clock).set_fsls_only(false);
        self.bus.write(offsets::HCFG, hcfg.bits());
        self.reset_port();

        plan.program(&mut self.bus);
        let _ = self.flush_tx_fifo(ResetControl::ALL_TX_FIFOS);
        let _ = self.flush_rx_fifo();

        for num in 0..self.host.channels.len() {
            self.bus.write(offsets::hcint(num), u32::MAX);
            self.bus.write(offsets::hcintmsk(num), 0);
        }

        self.drive_vbus(port, true);
        self.enable_host_int();
    }

    fn enable_host_int(&mut self) {
        self.bus.write(offsets::GINTMSK, 0);
        self.bus.write(offsets::GINTSTS, u32::MAX);
        self.enable_common_int();

        let mut mask = CoreInterrupt::HOST_PORT
            | CoreInterrupt::HOST_CHANNEL
            | CoreInterrupt::DISCONNECT
            | CoreInterrupt::SOF
            | CoreInterrupt::INCOMPLETE_PERIODIC;
        if !self.config().dma_enable {
            mask |= CoreInterrupt::RX_FIFO_LEVEL;
        }
        self.bus.set_bits(offsets::GINTMSK, mask.bits());
    }

    /// HPRT0 with the write-1-to-clear bits masked out, safe to write back
    pub(crate) fn read_port(&mut self) -> PortControl {
        PortControl::from_bits_retain(self.bus.read(offsets::HPRT0))
            .difference(PortControl::WRITE_CLEAR)
    }

    /// Switch port power and the board VBUS supply, then let VBUS settle
    pub fn drive_vbus<P: HostPort<B, D>>(&mut self, port: &mut P, on: bool) {
        port.drive_vbus(on);

        let hprt = self.read_port();
        if hprt.contains(PortControl::POWER) != on {
            self.bus
                .write(offsets::HPRT0, hprt.symmetric_difference(PortControl::POWER).bits());
        }
        self.delay.delay_ms(timeouts::VBUS_SETTLE_MS);
    }

    /// Drive reset on the port
    pub fn reset_port(&mut self) {
        let hprt = self.read_port();
        self.bus
            .write(offsets::HPRT0, hprt.union(PortControl::RESET).bits());
        self.delay.delay_ms(timeouts::PORT_RESET_ASSERT_MS);
        self.bus
            .write(offsets::HPRT0, hprt.difference(PortControl::RESET).bits());
        self.delay.delay_ms(timeouts::PORT_RESET_RECOVERY_MS);
        self.diag.record_port_reset();

        #[cfg(feature = "defmt")]
        defmt::debug!("otg: port reset");
    }

    pub(crate) fn check_channel(&self, ch: u8) -> Result<usize> {
        let num = ch as usize;
        if num >= self.host.channels.len() {
            return Err(UsbError::InvalidParameter);
        }
        Ok(num)
    }

    /// Bind channel `ch` to a device endpoint
    ///
    /// Resets the channel's toggles, status and error count.
    pub fn hc_init(&mut self, ch: u8, cfg: ChannelConfig) -> Result<()> {
        let num = self.check_channel(ch)?;
        if cfg.max_packet == 0 || cfg.max_packet > MAX_CHANNEL_PACKET {
            return Err(UsbError::InvalidParameter);
        }
        let dma = self.config().dma_enable;
        let is_in = Direction::from_address(cfg.ep_addr) == Direction::In;

        let chan = &mut self.host.channels[num];
        chan.dev_addr = cfg.dev_addr;
        chan.ep_num = cfg.ep_addr & 0x0F;
        chan.ep_is_in = is_in;
        chan.speed = cfg.speed;
        chan.ep_type = cfg.ep_type;
        chan.max_packet = cfg.max_packet;
        chan.toggle_in = false;
        chan.toggle_out = false;
        chan.status = HcStatus::Idle;
        chan.urb_state = UrbState::Idle;
        chan.error_count = 0;

        self.bus.write(offsets::hcint(num), u32::MAX);
        let mask = channel_int_mask(
            cfg.ep_type,
            is_in,
            cfg.speed == PortSpeed::HighSpeed,
            dma,
        );
        self.bus.write(offsets::hcintmsk(num), mask.bits());
        self.bus.set_bits(offsets::HAINTMSK, 1 << num);
        self.bus
            .set_bits(offsets::GINTMSK, CoreInterrupt::HOST_CHANNEL.bits());

        let mut hcchar = ChannelCharacteristics(0);
        hcchar
            .set_device_address(cfg.dev_addr as u32)
            .set_ep_num((cfg.ep_addr & 0x0F) as u32)
            .set_ep_dir_in(is_in)
            .set_low_speed(cfg.speed == PortSpeed::LowSpeed)
            .set_ep_type(cfg.ep_type.bits())
            .set_max_packet(cfg.max_packet as u32)
            .set_odd_frame(cfg.ep_type == EndpointType::Interrupt);
        self.bus.write(offsets::hcchar(num), hcchar.bits());
        Ok(())
    }

    /// Start a transfer on channel `ch`
    ///
    /// The URB state goes back to `Idle` and the result arrives through the
    /// channel interrupts. An IN request needs a writable buffer.
    pub fn submit_request(&mut self, ch: u8, request: UrbRequest) -> Result<()> {
        let num = self.check_channel(ch)?;
        let chan = &mut self.host.channels[num];
        if chan.ep_is_in {
            chan.xfer.start_rx(request.buffer, request.len)?;
        } else {
            chan.xfer.start(request.buffer, request.len)?;
        }
        let toggle = if chan.ep_is_in {
            chan.toggle_in
        } else {
            chan.toggle_out
        };
        chan.data_pid = request.pid.unwrap_or(DataPid::from_toggle(toggle));
        chan.do_ping = request.do_ping;
        chan.status = HcStatus::Idle;
        chan.urb_state = UrbState::Idle;

        self.hc_start_xfer(num);
        Ok(())
    }

    fn hc_start_xfer(&mut self, num: usize) {
        let dma = self.config().dma_enable;
        let even = self.is_even_frame();
        let chan = &mut self.host.channels[num];
        let max_packet = chan.max_packet as usize;

        let mut packets = if chan.xfer.is_empty() {
            1
        } else {
            chan.xfer.len().div_ceil(max_packet)
        };
        if packets > MAX_PACKET_COUNT {
            packets = MAX_PACKET_COUNT;
            chan.xfer.truncate(packets * max_packet);
        }
        chan.programmed = if chan.ep_is_in {
            packets * max_packet
        } else {
            chan.xfer.len()
        };

        let mut tsiz = ChannelTransferSize(0);
        tsiz.set_xfer_size(chan.programmed as u32)
            .set_packet_count(packets as u32)
            .set_pid(chan.data_pid.bits());
        self.bus.write(offsets::hctsiz(num), tsiz.bits());
        if dma {
            self.bus.write(offsets::hcdma(num), chan.xfer.dma_address());
        }

        let mut hcchar = ChannelCharacteristics(self.bus.read(offsets::hcchar(num)));
        hcchar
            .set_odd_frame(even)
            .set_enable(true)
            .set_disable(false);
        self.bus.write(offsets::hcchar(num), hcchar.bits());

        if !dma && !chan.ep_is_in && !chan.xfer.is_empty() {
            self.write_channel_packets(num);
        }
    }

    /// Push OUT packets of channel `num` while its Tx FIFO has room
    ///
    /// Unmasks the matching FIFO-empty interrupt when data is left over and
    /// masks it before the last packet goes out.
    pub(crate) fn write_channel_packets(&mut self, num: usize) {
        let chan = &mut self.host.channels[num];
        let (status_offset, empty) = if chan.ep_type.is_periodic() {
            (offsets::HPTXSTS, CoreInterrupt::P_TX_FIFO_EMPTY)
        } else {
            (offsets::HNPTXSTS, CoreInterrupt::NP_TX_FIFO_EMPTY)
        };
        let max_packet = chan.max_packet as usize;

        loop {
            let remaining = chan.xfer.remaining();
            if remaining == 0 {
                break;
            }
            let len = remaining.min(max_packet);
            let status = TxQueueStatus(self.bus.read(status_offset));
            if (status.fifo_space() as usize) < words(len) || status.queue_space() == 0 {
                self.bus.set_bits(offsets::GINTMSK, empty.bits());
                break;
            }
            if len == remaining {
                self.bus.clear_bits(offsets::GINTMSK, empty.bits());
            }
            write_packet(&mut self.bus, num, chan.xfer.pending(len));
            chan.xfer.advance(len);
        }
    }

    /// Request a halt of channel `ch`
    pub fn halt_channel(&mut self, ch: u8) -> Result<()> {
        let num = self.check_channel(ch)?;
        self.halt(num);
        Ok(())
    }

    /// Disable a channel; without request queue space only CHDIS is set
    pub(crate) fn halt(&mut self, num: usize) {
        let queue = if self.host.channels[num].ep_type.is_periodic() {
            offsets::HPTXSTS
        } else {
            offsets::HNPTXSTS
        };
        let room = TxQueueStatus(self.bus.read(queue)).queue_space() != 0;

        let mut hcchar = ChannelCharacteristics(self.bus.read(offsets::hcchar(num)));
        hcchar.set_enable(room).set_disable(true);
        self.bus.write(offsets::hcchar(num), hcchar.bits());
        self.diag.record_channel_halt();
    }

    /// Issue a PING on channel `ch`
    pub fn do_ping(&mut self, ch: u8) -> Result<()> {
        let num = self.check_channel(ch)?;
        self.ping(num);
        Ok(())
    }

    pub(crate) fn ping(&mut self, num: usize) {
        let mut tsiz = ChannelTransferSize(0);
        tsiz.set_do_ping(true).set_packet_count(1);
        self.bus.write(offsets::hctsiz(num), tsiz.bits());

        let mut hcchar = ChannelCharacteristics(self.bus.read(offsets::hcchar(num)));
        hcchar.set_enable(true).set_disable(false);
        self.bus.write(offsets::hcchar(num), hcchar.bits());
    }

    /// Mask channel interrupts, halt every channel and flush the FIFOs
    pub fn stop_host(&mut self) {
        self.bus.write(offsets::HAINTMSK, 0);
        self.bus.write(offsets::HAINT, u32::MAX);

        for num in 0..self.host.channels.len() {
            let mut hcchar = ChannelCharacteristics(self.bus.read(offsets::hcchar(num)));
            hcchar
                .set_enable(false)
                .set_disable(true)
                .set_ep_dir_in(false);
            self.bus.write(offsets::hcchar(num), hcchar.bits());
        }

        let _ = self.flush_rx_fifo();
        let _ = self.flush_tx_fifo(ResetControl::ALL_TX_FIFOS);
    }

    /// Speed of the attached device
    pub fn current_speed(&mut self) -> Option<PortSpeed> {
        PortControl::from_bits_retain(self.bus.read(offsets::HPRT0)).speed()
    }

    /// Current (micro)frame number
    pub fn current_frame(&mut self) -> u16 {
        FrameNumber(self.bus.read(offsets::HFNUM)).frame() as u16
    }

    /// Current frame number is even
    pub fn is_even_frame(&mut self) -> bool {
        self.bus.read(offsets::HFNUM) & 1 == 0
    }

    /// A device is attached and the port is enabled
    pub fn is_device_connected(&self) -> bool {
        self.host.connected
    }

    /// Channel record for `ch`
    pub fn channel(&self, ch: u8) -> Option<&Channel> {
        self.host.channels.get(ch as usize)
    }

    /// URB state of channel `ch`
    pub fn urb_state(&self, ch: u8) -> Result<UrbState> {
        let num = self.check_channel(ch)?;
        Ok(self.host.channels[num].urb_state)
    }

    /// Last transaction status of channel `ch`
    pub fn hc_state(&self, ch: u8) -> Result<HcStatus> {
        let num = self.check_channel(ch)?;
        Ok(self.host.channels[num].status)
    }

    /// Bytes moved by the current transfer of channel `ch`
    pub fn xfer_count(&self, ch: u8) -> Result<usize> {
        let num = self.check_channel(ch)?;
        Ok(self.host.channels[num].xfer.count())
    }

    /// Consecutive transaction errors of channel `ch`
    pub fn error_count(&self, ch: u8) -> Result<u8> {
        let num = self.check_channel(ch)?;
        Ok(self.host.channels[num].error_count)
    }

    /// Data received on channel `ch` so far
    pub fn channel_data(&self, ch: u8) -> Result<&[u8]> {
        let num = self.check_channel(ch)?;
        Ok(self.host.channels[num].xfer.data())
    }

    /// Take the buffer of channel `ch` back
    pub fn take_buffer(&mut self, ch: u8) -> Result<Option<TransferBuffer>> {
        let num = self.check_channel(ch)?;
        Ok(self.host.channels[num].xfer.take_buffer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_masks() {
        let out = channel_int_mask(EndpointType::Bulk, false, false, false);
        assert!(out.contains(ChannelInterrupt::NYET));
        assert!(!out.contains(ChannelInterrupt::ACK));
        assert!(!out.contains(ChannelInterrupt::BABBLE));
        assert!(!out.contains(ChannelInterrupt::HALTED));

        let hs_out = channel_int_mask(EndpointType::Bulk, false, true, false);
        assert!(hs_out.contains(ChannelInterrupt::ACK));

        let input = channel_int_mask(EndpointType::Bulk, true, false, true);
        assert!(input.contains(ChannelInterrupt::BABBLE | ChannelInterrupt::AHB_ERROR));
        assert!(!input.contains(ChannelInterrupt::NYET));
    }

    #[test]
    fn test_periodic_masks() {
        let intr = channel_int_mask(EndpointType::Interrupt, true, false, false);
        assert!(intr.contains(ChannelInterrupt::FRAME_OVERRUN | ChannelInterrupt::NAK));

        let iso_out = channel_int_mask(EndpointType::Isochronous, false, false, false);
        assert_eq!(
            iso_out,
            ChannelInterrupt::TRANSFER_COMPLETE
                | ChannelInterrupt::FRAME_OVERRUN
                | ChannelInterrupt::ACK
        );
    }

    #[test]
    fn test_pid_from_toggle() {
        assert_eq!(DataPid::from_toggle(false), DataPid::Data0);
        assert_eq!(DataPid::from_toggle(true), DataPid::Data1);
        assert_eq!(DataPid::Setup.bits(), 3);
        assert_eq!(DataPid::Data1.bits(), 2);
    }

    #[test]
    fn test_channel_defaults() {
        let chan = Channel::new(0);
        assert_eq!(chan.max_packet(), 8);
        assert_eq!(chan.urb_state(), UrbState::Idle);
        assert_eq!(chan.status(), HcStatus::Idle);
        assert_eq!(chan.error_count(), 0);
    }
}
