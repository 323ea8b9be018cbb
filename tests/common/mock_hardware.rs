//! Simulated OTG register file for testing without hardware
//!
//! `MockOtg` implements [`OtgBus`] over a plain word array and adds the
//! register behaviour the driver relies on: write-1-to-clear status
//! registers, summary bits derived from the per-endpoint and per-channel
//! registers, self-clearing reset and flush requests, the Rx status queue
//! with its data FIFO, Tx FIFO capture with limited space, endpoint-control
//! action bits and HPRT0 semantics.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};

use embedded_hal::delay::DelayNs;
use stm32_usb_otg::otg::{
    offsets, ChannelInterrupt, CoreInterrupt, DevicePacketStatus, HostPacketStatus,
    InEndpointInterrupt, OutEndpointInterrupt, PortControl, ResetControl,
};
use stm32_usb_otg::{OtgBus, PortSpeed};

const REGISTER_WORDS: usize = 0x1000 / 4;
const FIFO_WINDOWS: usize = 16;

/// GINTSTS bits computed from other registers instead of stored
const DERIVED: u32 = CoreInterrupt::CURRENT_MODE.bits()
    | CoreInterrupt::RX_FIFO_LEVEL.bits()
    | CoreInterrupt::NP_TX_FIFO_EMPTY.bits()
    | CoreInterrupt::IN_ENDPOINT.bits()
    | CoreInterrupt::OUT_ENDPOINT.bits()
    | CoreInterrupt::HOST_PORT.bits()
    | CoreInterrupt::HOST_CHANNEL.bits()
    | CoreInterrupt::P_TX_FIFO_EMPTY.bits();

/// Endpoint-control bits that trigger an action and never read back
const EP_ACTION_BITS: u32 = (1 << 26) | (1 << 27) | (1 << 28) | (1 << 29) | (1 << 30);
const EP_NAK_STATUS: u32 = 1 << 17;
const EP_DATA_PID: u32 = 1 << 16;
const EP_ENABLE: u32 = 1 << 31;

const HCCHAR_ENABLE: u32 = 1 << 31;
const HCCHAR_DISABLE: u32 = 1 << 30;

/// Per-block register kinds inside a 0x20 stride
const BLOCK_CTL: usize = 0x00;
const BLOCK_INT: usize = 0x08;
const BLOCK_TX_STATUS: usize = 0x18;

/// Simulated register file of one OTG core
pub struct MockOtg {
    regs: Vec<u32>,
    host_mode: bool,
    ahb_stuck: bool,
    rx_status: VecDeque<u32>,
    rx_data: VecDeque<u32>,
    tx_fifo: Vec<Vec<u32>>,
    tx_level: [usize; FIFO_WINDOWS],
    tx_capacity: usize,
    np_level: usize,
    p_level: usize,
    np_capacity: usize,
    p_capacity: usize,
    queue_space: u32,
    np_top: u32,
    p_top: u32,
    port_resets: u32,
    core_resets: u32,
    writes: usize,
    last_written: HashMap<usize, u32>,
}

impl Default for MockOtg {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOtg {
    /// Idle core in device mode with roomy FIFOs
    pub fn new() -> Self {
        Self {
            regs: vec![0; REGISTER_WORDS],
            host_mode: false,
            ahb_stuck: false,
            rx_status: VecDeque::new(),
            rx_data: VecDeque::new(),
            tx_fifo: vec![Vec::new(); FIFO_WINDOWS],
            tx_level: [0; FIFO_WINDOWS],
            tx_capacity: 128,
            np_level: 0,
            p_level: 0,
            np_capacity: 128,
            p_capacity: 128,
            queue_space: 8,
            np_top: 0,
            p_top: 0,
            port_resets: 0,
            core_resets: 0,
            writes: 0,
            last_written: HashMap::new(),
        }
    }

    // ---- test controls ----------------------------------------------

    /// Never report the AHB master idle
    pub fn set_ahb_stuck(&mut self, stuck: bool) {
        self.ahb_stuck = stuck;
    }

    /// Raise stored GINTSTS bits
    pub fn raise(&mut self, bits: CoreInterrupt) {
        self.regs[offsets::GINTSTS / 4] |= bits.bits() & !DERIVED;
    }

    /// Raise DIEPINTn bits
    pub fn raise_in_ep(&mut self, ep: usize, bits: InEndpointInterrupt) {
        self.regs[offsets::diepint(ep) / 4] |= bits.bits();
    }

    /// Raise DOEPINTn bits
    pub fn raise_out_ep(&mut self, ep: usize, bits: OutEndpointInterrupt) {
        self.regs[offsets::doepint(ep) / 4] |= bits.bits();
    }

    /// Raise HCINTn bits
    pub fn raise_channel(&mut self, ch: usize, bits: ChannelInterrupt) {
        self.regs[offsets::hcint(ch) / 4] |= bits.bits();
    }

    /// Set HPRT0 status bits as the port hardware would
    pub fn set_port(&mut self, bits: PortControl) {
        self.regs[offsets::HPRT0 / 4] |= bits.bits();
    }

    /// Report the attached device's speed in HPRT0.PSPD
    pub fn set_port_speed(&mut self, speed: PortSpeed) {
        let code = match speed {
            PortSpeed::HighSpeed => 0,
            PortSpeed::FullSpeed => 1,
            PortSpeed::LowSpeed => 2,
        };
        let hprt = &mut self.regs[offsets::HPRT0 / 4];
        *hprt = (*hprt & !PortControl::SPEED_MASK.bits()) | (code << 17);
    }

    /// Queue a device-mode receive entry with its data
    pub fn push_device_rx(&mut self, ep: u32, status: DevicePacketStatus, data: &[u8]) {
        self.push_rx(ep, status as u32, data);
    }

    /// Queue a host-mode IN data entry for channel `ch`
    pub fn push_host_rx(&mut self, ch: u32, data: &[u8]) {
        self.push_rx(ch, HostPacketStatus::InData as u32, data);
    }

    fn push_rx(&mut self, num: u32, status: u32, data: &[u8]) {
        self.rx_status
            .push_back(num | ((data.len() as u32) << 4) | (status << 17));
        for chunk in data.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.rx_data.push_back(u32::from_le_bytes(word));
        }
    }

    /// Words still waiting in the Rx data FIFO
    pub fn rx_words_pending(&self) -> usize {
        self.rx_data.len()
    }

    /// Depth in words of each device Tx FIFO
    pub fn set_tx_capacity(&mut self, words: usize) {
        self.tx_capacity = words;
    }

    /// Depth in words of the host non-periodic Tx FIFO
    pub fn set_np_capacity(&mut self, words: usize) {
        self.np_capacity = words;
    }

    /// Channel reported at the top of the non-periodic request queue
    pub fn set_np_top(&mut self, ch: u32) {
        self.np_top = ch;
    }

    /// Channel reported at the top of the periodic request queue
    pub fn set_p_top(&mut self, ch: u32) {
        self.p_top = ch;
    }

    /// Free request queue entries for both host queues
    pub fn set_queue_space(&mut self, entries: u32) {
        self.queue_space = entries;
    }

    /// The bus took everything written to device Tx FIFO `fifo`
    pub fn drain_tx(&mut self, fifo: usize) {
        self.tx_level[fifo] = 0;
    }

    /// The bus took everything written to the host Tx FIFOs
    pub fn drain_host_tx(&mut self) {
        self.np_level = 0;
        self.p_level = 0;
    }

    /// Every word written to FIFO window `fifo`
    pub fn tx_words(&self, fifo: usize) -> &[u32] {
        &self.tx_fifo[fifo]
    }

    /// First `len` bytes written to FIFO window `fifo`
    pub fn tx_bytes(&self, fifo: usize, len: usize) -> Vec<u8> {
        let mut bytes: Vec<u8> = self.tx_fifo[fifo]
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .collect();
        bytes.truncate(len);
        bytes
    }

    /// Raw register content
    pub fn reg(&self, offset: usize) -> u32 {
        self.regs[offset / 4]
    }

    /// Overwrite a register behind the driver's back
    pub fn set_reg(&mut self, offset: usize, value: u32) {
        self.regs[offset / 4] = value;
    }

    /// Value of the last write to `offset`
    pub fn last_write(&self, offset: usize) -> Option<u32> {
        self.last_written.get(&offset).copied()
    }

    /// Number of register writes so far
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// PRST assertions seen on HPRT0
    pub fn port_resets(&self) -> u32 {
        self.port_resets
    }

    /// CSRST requests seen on GRSTCTL
    pub fn core_resets(&self) -> u32 {
        self.core_resets
    }

    /// Core reports host mode in GINTSTS.CMOD
    pub fn is_host_mode(&self) -> bool {
        self.host_mode
    }

    // ---- derived state ------------------------------------------------

    fn in_ep_int(&self, ep: usize) -> u32 {
        let mut value = self.regs[offsets::diepint(ep) / 4];
        if self.tx_level[ep] == 0 {
            value |= InEndpointInterrupt::TX_FIFO_EMPTY.bits();
        }
        value
    }

    fn daint(&self) -> u32 {
        let in_mask = self.regs[offsets::DIEPMSK / 4];
        let out_mask = self.regs[offsets::DOEPMSK / 4];
        let empty_mask = self.regs[offsets::DIEPEMPMSK / 4];
        let mut daint = 0;
        for ep in 0..FIFO_WINDOWS {
            let mut mask = in_mask;
            if empty_mask & (1 << ep) != 0 {
                mask |= InEndpointInterrupt::TX_FIFO_EMPTY.bits();
            }
            if self.in_ep_int(ep) & mask != 0 {
                daint |= 1 << ep;
            }
            if self.regs[offsets::doepint(ep) / 4] & out_mask != 0 {
                daint |= 1 << (16 + ep);
            }
        }
        daint
    }

    fn haint(&self) -> u32 {
        (0..FIFO_WINDOWS)
            .filter(|&ch| {
                self.regs[offsets::hcint(ch) / 4] & self.regs[offsets::hcintmsk(ch) / 4] != 0
            })
            .fold(0, |acc, ch| acc | (1 << ch))
    }

    fn gintsts(&self) -> u32 {
        let mut value = self.regs[offsets::GINTSTS / 4] & !DERIVED;
        if !self.rx_status.is_empty() {
            value |= CoreInterrupt::RX_FIFO_LEVEL.bits();
        }
        if self.host_mode {
            value |= CoreInterrupt::CURRENT_MODE.bits();
            if self.haint() & self.regs[offsets::HAINTMSK / 4] != 0 {
                value |= CoreInterrupt::HOST_CHANNEL.bits();
            }
            if self.regs[offsets::HPRT0 / 4] & PortControl::CHANGE_BITS.bits() != 0 {
                value |= CoreInterrupt::HOST_PORT.bits();
            }
            if self.np_level == 0 {
                value |= CoreInterrupt::NP_TX_FIFO_EMPTY.bits();
            }
            if self.p_level == 0 {
                value |= CoreInterrupt::P_TX_FIFO_EMPTY.bits();
            }
        } else {
            let daint = self.daint() & self.regs[offsets::DAINTMSK / 4];
            if daint & 0xFFFF != 0 {
                value |= CoreInterrupt::IN_ENDPOINT.bits();
            }
            if daint >> 16 != 0 {
                value |= CoreInterrupt::OUT_ENDPOINT.bits();
            }
        }
        value
    }

    fn queue_status(&self, capacity: usize, level: usize, top: u32) -> u32 {
        (capacity.saturating_sub(level) as u32) | (self.queue_space << 16) | (top << 27)
    }

    fn channel_is_periodic(&self, ch: usize) -> bool {
        let ep_type = (self.regs[offsets::hcchar(ch) / 4] >> 18) & 0b11;
        ep_type == 1 || ep_type == 3
    }

    // ---- write side effects -------------------------------------------

    fn write_endpoint_control(&mut self, offset: usize, int_offset: usize, value: u32) {
        let old = self.regs[offset / 4];
        let mut next = value & !EP_ACTION_BITS & !EP_NAK_STATUS & !EP_DATA_PID;

        let snak = value & (1 << 27) != 0;
        let cnak = value & (1 << 26) != 0;
        next |= if snak {
            EP_NAK_STATUS
        } else if cnak {
            0
        } else {
            old & EP_NAK_STATUS
        };

        next |= if value & (1 << 28) != 0 {
            0
        } else if value & (1 << 29) != 0 {
            EP_DATA_PID
        } else {
            old & EP_DATA_PID
        };

        if value & (1 << 30) != 0 && old & EP_ENABLE != 0 {
            next &= !EP_ENABLE;
            self.regs[int_offset / 4] |= 1 << 1;
        }
        self.regs[offset / 4] = next;
    }

    fn write_port(&mut self, value: u32) {
        let old = self.regs[offsets::HPRT0 / 4];
        let change = PortControl::CHANGE_BITS.bits();
        let read_only = (PortControl::CONNECT_STATUS
            | PortControl::OVERCURRENT_ACTIVE
            | PortControl::LINE_STATUS_MASK
            | PortControl::SPEED_MASK)
            .bits();
        let writable = (PortControl::RESUME
            | PortControl::SUSPEND
            | PortControl::RESET
            | PortControl::POWER
            | PortControl::TEST_CONTROL_MASK)
            .bits();
        let enabled = PortControl::ENABLED.bits();

        let mut next = (old & change & !value) | (old & read_only) | (value & writable);
        // Writing 1 to PENA disables the port
        if value & enabled == 0 {
            next |= old & enabled;
        }

        let reset = PortControl::RESET.bits();
        if value & reset != 0 && old & reset == 0 {
            self.port_resets += 1;
        }
        self.regs[offsets::HPRT0 / 4] = next;
    }

    fn write_fifo(&mut self, window: usize, value: u32) {
        self.tx_fifo[window].push(value);
        if self.host_mode {
            if self.channel_is_periodic(window) {
                self.p_level += 1;
            } else {
                self.np_level += 1;
            }
        } else {
            self.tx_level[window] += 1;
        }
    }
}

/// Offset inside an endpoint or channel block: (index, register)
fn block(offset: usize, base: usize) -> Option<(usize, usize)> {
    let span = offsets::SET_STRIDE * FIFO_WINDOWS;
    (base..base + span)
        .contains(&offset)
        .then(|| ((offset - base) / offsets::SET_STRIDE, (offset - base) % offsets::SET_STRIDE))
}

const HOST_CHANNEL_BASE: usize = 0x500;
const IN_EP_BASE: usize = 0x900;
const OUT_EP_BASE: usize = 0xB00;

impl OtgBus for MockOtg {
    fn read(&mut self, offset: usize) -> u32 {
        if offset >= offsets::dfifo(0) {
            return self.rx_data.pop_front().unwrap_or(0);
        }
        match offset {
            offsets::GRSTCTL => {
                let self_clearing = (ResetControl::CORE_SOFT_RESET
                    | ResetControl::RX_FIFO_FLUSH
                    | ResetControl::TX_FIFO_FLUSH)
                    .bits();
                let mut value = self.regs[offset / 4] & !self_clearing;
                if !self.ahb_stuck {
                    value |= ResetControl::AHB_IDLE.bits();
                }
                value
            }
            offsets::GINTSTS => self.gintsts(),
            offsets::GRXSTSR => self.rx_status.front().copied().unwrap_or(0),
            offsets::GRXSTSP => self.rx_status.pop_front().unwrap_or(0),
            offsets::HNPTXSTS => self.queue_status(self.np_capacity, self.np_level, self.np_top),
            offsets::HPTXSTS => self.queue_status(self.p_capacity, self.p_level, self.p_top),
            offsets::DAINT => self.daint(),
            offsets::HAINT => self.haint(),
            _ => match block(offset, IN_EP_BASE) {
                Some((ep, BLOCK_INT)) => self.in_ep_int(ep),
                Some((ep, BLOCK_TX_STATUS)) => {
                    self.tx_capacity.saturating_sub(self.tx_level[ep]) as u32
                }
                _ => self.regs[offset / 4],
            },
        }
    }

    fn write(&mut self, offset: usize, value: u32) {
        self.writes += 1;
        self.last_written.insert(offset, value);

        if offset >= offsets::dfifo(0) {
            let window = (offset - offsets::dfifo(0)) / offsets::FIFO_STRIDE;
            self.write_fifo(window, value);
            return;
        }

        match offset {
            offsets::GINTSTS | offsets::GOTGINT => self.regs[offset / 4] &= !value,
            offsets::DAINT | offsets::HAINT => {}
            offsets::GUSBCFG => {
                self.regs[offset / 4] = value;
                if value & (1 << 29) != 0 {
                    self.host_mode = true;
                }
                if value & (1 << 30) != 0 {
                    self.host_mode = false;
                }
            }
            offsets::GRSTCTL => {
                if value & ResetControl::CORE_SOFT_RESET.bits() != 0 {
                    self.core_resets += 1;
                }
                self.regs[offset / 4] = value;
            }
            offsets::HPRT0 => self.write_port(value),
            _ => {
                if let Some((ch, reg)) = block(offset, HOST_CHANNEL_BASE) {
                    match reg {
                        BLOCK_CTL if value & HCCHAR_DISABLE != 0 => {
                            self.regs[offset / 4] = value & !(HCCHAR_ENABLE | HCCHAR_DISABLE);
                            self.regs[offsets::hcint(ch) / 4] |= ChannelInterrupt::HALTED.bits();
                        }
                        BLOCK_INT => self.regs[offset / 4] &= !value,
                        _ => self.regs[offset / 4] = value,
                    }
                } else if let Some((ep, reg)) = block(offset, IN_EP_BASE) {
                    match reg {
                        BLOCK_CTL => self.write_endpoint_control(offset, offsets::diepint(ep), value),
                        BLOCK_INT => self.regs[offset / 4] &= !value,
                        _ => self.regs[offset / 4] = value,
                    }
                } else if let Some((ep, reg)) = block(offset, OUT_EP_BASE) {
                    match reg {
                        BLOCK_CTL => {
                            self.write_endpoint_control(offset, offsets::doepint(ep), value)
                        }
                        BLOCK_INT => self.regs[offset / 4] &= !value,
                        _ => self.regs[offset / 4] = value,
                    }
                } else {
                    self.regs[offset / 4] = value;
                }
            }
        }
    }
}

/// Delay provider that returns immediately and adds up the requested time
#[derive(Debug, Default)]
pub struct NoopDelay {
    total_ns: u64,
}

impl NoopDelay {
    /// Time requested so far in nanoseconds
    pub fn total_ns(&self) -> u64 {
        self.total_ns
    }
}

impl DelayNs for NoopDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += ns as u64;
    }
}
