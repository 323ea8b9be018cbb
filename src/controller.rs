//! Core handle and bring-up
//!
//! [`CoreHandle`] owns the register bus, the delay provider, the immutable
//! [`Config`] and the device/host transfer state. Every API call and every
//! interrupt handler takes it by exclusive reference.
//!
//! Bring-up polls (AHB idle, soft reset, FIFO flush) are iteration-capped:
//! on unresponsive hardware they give up, count the timeout and let
//! bring-up continue.

use embedded_hal::delay::DelayNs;

use crate::config::{Config, PhyInterface};
use crate::device::DeviceState;
use crate::error::Result;
use crate::host::HostState;
use crate::otg::{
    offsets, timeouts, AhbConfig, ClockGating, CoreConfig, CoreInterrupt, I2cControl, OtgBus,
    OtgInterrupt, PollBudget, ResetControl, UsbConfig,
};
use crate::perf::DiagCounters;

/// Operating mode requested from the core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CoreMode {
    /// Forced device mode
    Device,
    /// Forced host mode
    Host,
    /// Role follows the ID pin
    Otg,
}

/// One OTG core and all of its driver state
pub struct CoreHandle<B: OtgBus, D: DelayNs> {
    pub(crate) bus: B,
    pub(crate) delay: D,
    pub(crate) config: Config,
    pub(crate) device: DeviceState,
    pub(crate) host: HostState,
    pub(crate) diag: DiagCounters,
}

impl<B: OtgBus, D: DelayNs> CoreHandle<B, D> {
    /// Take ownership of a core
    ///
    /// Fails with the configuration error when `config` describes a core/PHY
    /// combination the hardware does not provide. No register is touched.
    pub fn new(bus: B, delay: D, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            bus,
            delay,
            config,
            device: DeviceState::new(),
            host: HostState::new(),
            diag: DiagCounters::new(),
        })
    }

    /// Driver configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Diagnostic counters
    pub fn diagnostics(&self) -> &DiagCounters {
        &self.diag
    }

    /// Direct register access
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Release the bus and delay provider
    pub fn free(self) -> (B, D) {
        (self.bus, self.delay)
    }

    /// Soft-reset the core
    ///
    /// Waits for the AHB master to go idle, requests a core soft reset and
    /// waits for the request to self-clear. Either wait gives up after
    /// [`timeouts::POLL_LIMIT`] checks with `Timeout`; the reset request is
    /// issued regardless of the AHB idle outcome.
    pub fn core_reset(&mut self) -> Result<()> {
        let bus = &mut self.bus;
        let delay = &mut self.delay;

        let idle = PollBudget::new(timeouts::POLL_LIMIT).wait_for(|| {
            delay.delay_us(timeouts::RESET_SETTLE_US);
            bus.read(offsets::GRSTCTL) & ResetControl::AHB_IDLE.bits() != 0
        });
        if idle.is_err() {
            self.diag.record_poll_timeout();
            #[cfg(feature = "defmt")]
            defmt::warn!("otg: AHB master never went idle");
        }

        self.bus
            .set_bits(offsets::GRSTCTL, ResetControl::CORE_SOFT_RESET.bits());
        let bus = &mut self.bus;
        let reset = PollBudget::new(timeouts::POLL_LIMIT).wait_for(|| {
            bus.read(offsets::GRSTCTL) & ResetControl::CORE_SOFT_RESET.bits() == 0
        });
        if reset.is_err() {
            self.diag.record_poll_timeout();
            #[cfg(feature = "defmt")]
            defmt::warn!("otg: core soft reset did not complete");
        }

        // Wait for 3 PHY clocks
        self.delay.delay_us(timeouts::RESET_SETTLE_US);
        idle.and(reset)
    }

    /// PHY selection, DMA and OTG capability setup
    pub fn core_init(&mut self) {
        match self.config.phy {
            PhyInterface::Ulpi => {
                // FS transceiver stays powered down
                let mut gccfg = CoreConfig::empty();
                if self.config.sof_output {
                    gccfg |= CoreConfig::SOF_OUTPUT;
                }
                self.bus.write(offsets::GCCFG, gccfg.bits());

                let mut usbcfg = UsbConfig(self.bus.read(offsets::GUSBCFG));
                usbcfg
                    .set_phy_select(false)
                    .set_ulpi_external_vbus_drive(self.config.external_vbus)
                    .set_term_sel_pulse(false)
                    .set_ulpi_fsls(false)
                    .set_ulpi_clock_suspend(false);
                self.bus.write(offsets::GUSBCFG, usbcfg.bits());

                // PHY switch only takes effect after a reset
                let _ = self.core_reset();
            }
            PhyInterface::Embedded | PhyInterface::I2c => {
                let mut usbcfg = UsbConfig(self.bus.read(offsets::GUSBCFG));
                usbcfg.set_phy_select(true);
                self.bus.write(offsets::GUSBCFG, usbcfg.bits());

                let _ = self.core_reset();

                let mut gccfg = CoreConfig::POWER_UP;
                if self.config.phy == PhyInterface::I2c {
                    gccfg |= CoreConfig::I2C_ENABLE;
                }
                if self.config.vbus_sensing {
                    gccfg |= CoreConfig::VBUS_SENSING_A | CoreConfig::VBUS_SENSING_B;
                } else {
                    gccfg |= CoreConfig::NO_VBUS_SENSING;
                }
                if self.config.sof_output {
                    gccfg |= CoreConfig::SOF_OUTPUT;
                }
                self.bus.write(offsets::GCCFG, gccfg.bits());
                self.delay.delay_ms(timeouts::PHY_POWER_UP_MS);

                if self.config.phy == PhyInterface::I2c {
                    self.init_i2c_phy();
                }
            }
        }

        if self.config.dma_enable {
            self.bus.modify(
                offsets::GAHBCFG,
                AhbConfig::BURST_LENGTH_MASK.bits(),
                (AhbConfig::BURST_INCR4 | AhbConfig::DMA_ENABLE).bits(),
            );
        }

        if self.config.otg_mode {
            let mut usbcfg = UsbConfig(self.bus.read(offsets::GUSBCFG));
            usbcfg.set_hnp_capable(true).set_srp_capable(true);
            self.bus.write(offsets::GUSBCFG, usbcfg.bits());
            self.enable_common_int();
        }
    }

    /// Point the serial interface at the external transceiver, then enable it
    fn init_i2c_phy(&mut self) {
        let mut usbcfg = UsbConfig(self.bus.read(offsets::GUSBCFG));
        usbcfg.set_fs_interface(true);
        self.bus.write(offsets::GUSBCFG, usbcfg.bits());

        let mut i2cctl = I2cControl(self.bus.read(offsets::GI2CCTL));
        i2cctl
            .set_device_address(1)
            .set_enable(false)
            .set_dat_se0(true)
            .set_address(0x2D);
        self.bus.write(offsets::GI2CCTL, i2cctl.bits());
        self.delay.delay_ms(timeouts::PHY_POWER_UP_MS);

        i2cctl.set_enable(true);
        self.bus.write(offsets::GI2CCTL, i2cctl.bits());
        self.delay.delay_ms(timeouts::PHY_POWER_UP_MS);
    }

    /// Force the core role, then wait for the switch to settle
    pub fn set_current_mode(&mut self, mode: CoreMode) {
        let mut usbcfg = UsbConfig(self.bus.read(offsets::GUSBCFG));
        usbcfg
            .set_force_host(mode == CoreMode::Host)
            .set_force_device(mode == CoreMode::Device);
        self.bus.write(offsets::GUSBCFG, usbcfg.bits());
        self.delay.delay_ms(timeouts::MODE_SWITCH_MS);
    }

    /// Role the core is currently operating in
    pub fn current_mode(&mut self) -> CoreMode {
        if self.is_host_mode() {
            CoreMode::Host
        } else {
            CoreMode::Device
        }
    }

    /// GINTSTS.CMOD reports device mode
    pub fn is_device_mode(&mut self) -> bool {
        !self.is_host_mode()
    }

    /// GINTSTS.CMOD reports host mode
    pub fn is_host_mode(&mut self) -> bool {
        self.bus.read(offsets::GINTSTS) & CoreInterrupt::CURRENT_MODE.bits() != 0
    }

    /// Unmask the core interrupt line (GAHBCFG.GINTMSK)
    pub fn enable_global_int(&mut self) {
        self.bus
            .set_bits(offsets::GAHBCFG, AhbConfig::GLOBAL_INTERRUPT.bits());
    }

    /// Mask the core interrupt line
    pub fn disable_global_int(&mut self) {
        self.bus
            .clear_bits(offsets::GAHBCFG, AhbConfig::GLOBAL_INTERRUPT.bits());
    }

    /// Clear pending interrupts and unmask the set shared by both roles
    pub(crate) fn enable_common_int(&mut self) {
        if !self.config.otg_mode {
            self.bus.write(offsets::GOTGINT, u32::MAX);
        }
        self.bus.write(offsets::GINTSTS, u32::MAX);

        let mut mask = CoreInterrupt::WAKEUP | CoreInterrupt::USB_SUSPEND;
        if self.config.otg_mode {
            mask |= CoreInterrupt::OTG
                | CoreInterrupt::SESSION_REQUEST
                | CoreInterrupt::CONNECTOR_ID_CHANGE;
        }
        self.bus.write(offsets::GINTMSK, mask.bits());
    }

    /// Flush Tx FIFO `num`, or every Tx FIFO with [`ResetControl::ALL_TX_FIFOS`]
    pub fn flush_tx_fifo(&mut self, num: u32) -> Result<()> {
        self.bus
            .write(offsets::GRSTCTL, ResetControl::tx_flush(num).bits());
        let bus = &mut self.bus;
        let result = PollBudget::new(timeouts::POLL_LIMIT).wait_for(|| {
            bus.read(offsets::GRSTCTL) & ResetControl::TX_FIFO_FLUSH.bits() == 0
        });
        if result.is_err() {
            self.diag.record_poll_timeout();
            #[cfg(feature = "defmt")]
            defmt::warn!("otg: Tx FIFO {} flush timed out", num);
        }
        self.delay.delay_us(timeouts::RESET_SETTLE_US);
        result
    }

    /// Flush the shared Rx FIFO
    pub fn flush_rx_fifo(&mut self) -> Result<()> {
        self.bus
            .write(offsets::GRSTCTL, ResetControl::RX_FIFO_FLUSH.bits());
        let bus = &mut self.bus;
        let result = PollBudget::new(timeouts::POLL_LIMIT).wait_for(|| {
            bus.read(offsets::GRSTCTL) & ResetControl::RX_FIFO_FLUSH.bits() == 0
        });
        if result.is_err() {
            self.diag.record_poll_timeout();
            #[cfg(feature = "defmt")]
            defmt::warn!("otg: Rx FIFO flush timed out");
        }
        self.delay.delay_us(timeouts::RESET_SETTLE_US);
        result
    }

    /// Pending and enabled core interrupts
    pub fn read_core_itr(&mut self) -> CoreInterrupt {
        let status = self.bus.read(offsets::GINTSTS);
        let mask = self.bus.read(offsets::GINTMSK);
        CoreInterrupt::from_bits_retain(status & mask)
    }

    /// Pending OTG interrupts
    pub fn read_otg_itr(&mut self) -> OtgInterrupt {
        OtgInterrupt::from_bits_retain(self.bus.read(offsets::GOTGINT))
    }

    /// Restart the PHY clock after a gated suspend
    pub(crate) fn restart_phy_clock(&mut self) {
        self.bus.write(offsets::PCGCCTL, 0);
    }

    /// Clear PCGCCTL gating (STPPCLK, GATEHCLK)
    pub(crate) fn ungate_core_clock(&mut self) {
        self.bus.clear_bits(
            offsets::PCGCCTL,
            (ClockGating::STOP_PHY_CLOCK | ClockGating::GATE_HCLK).bits(),
        );
    }
}

/// Push `data` into Tx FIFO window `fifo` as little-endian words
///
/// A trailing partial word is zero-padded.
pub(crate) fn write_packet<B: OtgBus>(bus: &mut B, fifo: usize, data: &[u8]) {
    let window = offsets::dfifo(fifo);
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        bus.write(window, u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut word = [0u8; 4];
        word[..tail.len()].copy_from_slice(tail);
        bus.write(window, u32::from_le_bytes(word));
    }
}

/// Pop a `byte_count` byte packet from the Rx FIFO into `dest`
///
/// Every word of the packet is popped even when `dest` is shorter; the
/// return value is the number of bytes actually stored.
pub(crate) fn read_packet<B: OtgBus>(bus: &mut B, dest: &mut [u8], byte_count: usize) -> usize {
    let window = offsets::dfifo(0);
    let stored = byte_count.min(dest.len());
    let words = byte_count.div_ceil(4);
    for i in 0..words {
        let word = bus.read(window).to_le_bytes();
        let start = i * 4;
        if start < stored {
            let end = (start + 4).min(stored);
            dest[start..end].copy_from_slice(&word[..end - start]);
        }
    }
    stored
}

/// Number of 32-bit words needed for `bytes`
#[inline(always)]
pub(crate) const fn words(bytes: usize) -> usize {
    bytes.div_ceil(4)
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::vec::Vec;

    /// Register file that records every FIFO push and serves queued FIFO pops
    #[derive(Default)]
    struct FifoBus {
        pushed: Vec<(usize, u32)>,
        rx: std::collections::VecDeque<u32>,
    }

    impl OtgBus for FifoBus {
        fn read(&mut self, _offset: usize) -> u32 {
            self.rx.pop_front().unwrap_or(0)
        }
        fn write(&mut self, offset: usize, value: u32) {
            self.pushed.push((offset, value));
        }
    }

    #[test]
    fn test_write_packet_pads_tail() {
        let mut bus = FifoBus::default();
        write_packet(&mut bus, 1, &[1, 2, 3, 4, 5, 6]);
        assert_eq!(
            bus.pushed,
            [(0x2000, 0x0403_0201), (0x2000, 0x0000_0605)]
        );
    }

    #[test]
    fn test_read_packet_drains_whole_packet() {
        let mut bus = FifoBus::default();
        bus.rx.extend([0x4433_2211, 0x8877_6655, 0x0000_0099, 0xDEAD_BEEF]);

        let mut dest = [0u8; 4];
        let stored = read_packet(&mut bus, &mut dest, 9);
        assert_eq!(stored, 4);
        assert_eq!(dest, [0x11, 0x22, 0x33, 0x44]);
        // Three words popped, the fourth still queued
        assert_eq!(bus.rx.len(), 1);
    }

    #[test]
    fn test_word_count() {
        assert_eq!(words(0), 0);
        assert_eq!(words(1), 1);
        assert_eq!(words(64), 16);
        assert_eq!(words(130), 33);
    }
}
