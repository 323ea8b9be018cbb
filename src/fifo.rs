//! Packet RAM partitioning
//!
//! The core's packet RAM (counted in 32-bit words) is split into one shared
//! Rx FIFO at address 0 followed by the Tx FIFOs, each starting where the
//! previous one ends. Device mode has one Tx FIFO per IN endpoint; host mode
//! has a non-periodic and a periodic Tx FIFO.
//!
//! Plans are computed by `const fn`, so the built-in tables are checked at
//! compile time and custom tables are rejected before bring-up touches any
//! register.

use crate::config::MAX_DEVICE_ENDPOINTS;
use crate::error::{Result, UsbError};
use crate::otg::{offsets, FifoSize, OtgBus};

/// Hardware minimum Tx FIFO depth in words
pub const MIN_TX_DEPTH: u16 = 16;

/// Device-mode FIFO sizes in words
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFifoTable {
    /// Shared Rx FIFO depth
    pub rx: u16,
    /// Tx FIFO depth per IN endpoint; 0 marks an unused FIFO (EP0 excepted)
    pub tx: [u16; MAX_DEVICE_ENDPOINTS],
}

impl DeviceFifoTable {
    /// OTG_FS defaults (320 words)
    pub const FULL_SPEED: Self = Self::new(128, [32, 128, 32, 0, 0, 0]);

    /// OTG_HS defaults (1280 words)
    pub const HIGH_SPEED: Self = Self::new(512, [128, 372, 64, 64, 0, 0]);

    /// Custom table
    pub const fn new(rx: u16, tx: [u16; MAX_DEVICE_ENDPOINTS]) -> Self {
        Self { rx, tx }
    }
}

/// Host-mode FIFO sizes in words
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostFifoTable {
    /// Shared Rx FIFO depth
    pub rx: u16,
    /// Non-periodic (control/bulk) Tx FIFO depth
    pub non_periodic: u16,
    /// Periodic (interrupt/isochronous) Tx FIFO depth; may be 0
    pub periodic: u16,
}

impl HostFifoTable {
    /// OTG_FS defaults
    pub const FULL_SPEED: Self = Self::new(128, 96, 96);

    /// OTG_HS defaults
    pub const HIGH_SPEED: Self = Self::new(512, 256, 256);

    /// Custom table
    pub const fn new(rx: u16, non_periodic: u16, periodic: u16) -> Self {
        Self {
            rx,
            non_periodic,
            periodic,
        }
    }
}

/// One region of packet RAM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FifoRegion {
    /// Start address in words
    pub start: u16,
    /// Depth in words
    pub depth: u16,
}

impl FifoRegion {
    /// First word after the region
    pub const fn end(&self) -> u32 {
        self.start as u32 + self.depth as u32
    }

    /// Value for a DIEPTXFx / HNPTXFSIZ / HPTXFSIZ register
    pub fn register_value(&self) -> u32 {
        let mut reg = FifoSize::default();
        reg.set_start_address(self.start as u32).set_depth(self.depth as u32);
        reg.bits()
    }
}

/// Which register set a plan is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlanKind {
    /// GRXFSIZ, DIEPTXF0, DIEPTXF1..n
    Device,
    /// GRXFSIZ, HNPTXFSIZ, HPTXFSIZ
    Host,
}

/// Validated packet RAM partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FifoPlan {
    kind: PlanKind,
    rx: FifoRegion,
    tx: [FifoRegion; MAX_DEVICE_ENDPOINTS],
    tx_count: usize,
    total: u16,
}

/// Minimum Rx FIFO depth: setup/status words, two max-size packets with
/// their status word, plus one word per OUT endpoint
pub const fn min_rx_depth(max_packet: u16, out_endpoints: u8) -> u32 {
    10 + (max_packet as u32 / 4 + 1) * 2 + out_endpoints as u32
}

/// Minimum depth of a used Tx FIFO
pub const fn min_tx_depth(max_packet: u16) -> u16 {
    let packet_words = max_packet / 4;
    if packet_words > MIN_TX_DEPTH {
        packet_words
    } else {
        MIN_TX_DEPTH
    }
}

impl FifoPlan {
    /// Partition for device mode with `endpoints` IN endpoints (EP0 included)
    pub const fn device(
        table: &DeviceFifoTable,
        endpoints: u8,
        total_words: u16,
        max_packet: u16,
    ) -> Result<Self> {
        let count = endpoints as usize;
        if count == 0 || count > MAX_DEVICE_ENDPOINTS {
            return Err(UsbError::InvalidParameter);
        }
        if (table.rx as u32) < min_rx_depth(max_packet, endpoints) {
            return Err(UsbError::FifoTooSmall);
        }
        if table.tx[0] == 0 {
            return Err(UsbError::FifoTooSmall);
        }

        let rx = FifoRegion { start: 0, depth: table.rx };
        let mut tx = [FifoRegion { start: 0, depth: 0 }; MAX_DEVICE_ENDPOINTS];
        let mut next = table.rx as u32;
        let mut i = 0;
        while i < count {
            let depth = table.tx[i];
            if depth != 0 && depth < min_tx_depth(max_packet) {
                return Err(UsbError::FifoTooSmall);
            }
            if next + depth as u32 > total_words as u32 {
                return Err(UsbError::FifoOverflow);
            }
            tx[i] = FifoRegion { start: next as u16, depth };
            next += depth as u32;
            i += 1;
        }

        Ok(Self {
            kind: PlanKind::Device,
            rx,
            tx,
            tx_count: count,
            total: total_words,
        })
    }

    /// Partition for host mode
    pub const fn host(table: &HostFifoTable, total_words: u16, max_packet: u16) -> Result<Self> {
        if (table.rx as u32) < min_rx_depth(max_packet, 1) {
            return Err(UsbError::FifoTooSmall);
        }
        if table.non_periodic < min_tx_depth(max_packet)
            || (table.periodic != 0 && table.periodic < min_tx_depth(max_packet))
        {
            return Err(UsbError::FifoTooSmall);
        }
        let used = table.rx as u32 + table.non_periodic as u32 + table.periodic as u32;
        if used > total_words as u32 {
            return Err(UsbError::FifoOverflow);
        }

        let mut tx = [FifoRegion { start: 0, depth: 0 }; MAX_DEVICE_ENDPOINTS];
        tx[0] = FifoRegion {
            start: table.rx,
            depth: table.non_periodic,
        };
        tx[1] = FifoRegion {
            start: table.rx + table.non_periodic,
            depth: table.periodic,
        };

        Ok(Self {
            kind: PlanKind::Host,
            rx: FifoRegion { start: 0, depth: table.rx },
            tx,
            tx_count: 2,
            total: total_words,
        })
    }

    /// Register set this plan programs
    pub const fn kind(&self) -> PlanKind {
        self.kind
    }

    /// Rx FIFO region
    pub const fn rx(&self) -> FifoRegion {
        self.rx
    }

    /// Tx FIFO regions: per IN endpoint (device) or non-periodic, periodic (host)
    pub fn tx(&self) -> &[FifoRegion] {
        &self.tx[..self.tx_count]
    }

    /// Words claimed by all regions
    pub fn used_words(&self) -> u32 {
        self.tx().iter().fold(self.rx.depth as u32, |acc, r| acc + r.depth as u32)
    }

    /// Words left unpartitioned
    pub fn free_words(&self) -> u32 {
        self.total as u32 - self.used_words()
    }

    /// Write the partition into the FIFO size registers
    pub fn program<B: OtgBus>(&self, bus: &mut B) {
        bus.write(offsets::GRXFSIZ, self.rx.depth as u32);
        match self.kind {
            PlanKind::Device => {
                bus.write(offsets::DIEPTXF0_HNPTXFSIZ, self.tx[0].register_value());
                for (n, region) in self.tx().iter().enumerate().skip(1) {
                    bus.write(offsets::dieptxf(n), region.register_value());
                }
            }
            PlanKind::Host => {
                bus.write(offsets::DIEPTXF0_HNPTXFSIZ, self.tx[0].register_value());
                bus.write(offsets::HPTXFSIZ, self.tx[1].register_value());
            }
        }
    }
}

// Built-in tables must fit their cores.
const _: () = {
    assert!(FifoPlan::device(&DeviceFifoTable::FULL_SPEED, 4, 320, 64).is_ok());
    assert!(FifoPlan::device(&DeviceFifoTable::HIGH_SPEED, 6, 1280, 64).is_ok());
    assert!(FifoPlan::host(&HostFifoTable::FULL_SPEED, 320, 64).is_ok());
    assert!(FifoPlan::host(&HostFifoTable::HIGH_SPEED, 1280, 64).is_ok());
};
