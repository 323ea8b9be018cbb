//! Core identity and driver configuration
//!
//! [`Config::for_core`] selects the capability table of an OTG core
//! (base address, channel and endpoint counts, packet RAM size, default PHY).
//! The remaining knobs are set with `const` builder methods before the
//! configuration is moved into a [`crate::CoreHandle`], after which it is
//! read-only.

use crate::error::{Result, UsbError};
use crate::fifo::{DeviceFifoTable, HostFifoTable};
use crate::otg::PortSpeed;

/// Largest device endpoint count of any supported core
pub const MAX_DEVICE_ENDPOINTS: usize = 6;

/// Largest host channel count of any supported core
pub const MAX_HOST_CHANNELS: usize = 12;

/// Max-packet size used for EP0 and at start-up
pub const FS_MAX_PACKET_SIZE: u16 = 64;

/// High-speed bulk max-packet size
pub const HS_MAX_PACKET_SIZE: u16 = 512;

/// OTG core instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CoreId {
    /// OTG_FS: full-speed core with embedded PHY
    FullSpeed,
    /// OTG_HS: high-speed core, ULPI or embedded FS PHY
    HighSpeed,
}

impl CoreId {
    /// Register block base address on STM32F2/F4
    pub const fn base_address(self) -> usize {
        match self {
            Self::FullSpeed => 0x5000_0000,
            Self::HighSpeed => 0x4004_0000,
        }
    }
}

/// PHY attached to the core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhyInterface {
    /// External high-speed PHY on the ULPI bus
    Ulpi,
    /// On-chip full-speed transceiver
    Embedded,
    /// External full-speed transceiver configured over I2C
    I2c,
}

/// Driver configuration and capability table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Core instance
    pub core_id: CoreId,
    /// Register block base address
    pub base_address: usize,
    /// Number of host channels
    pub host_channels: u8,
    /// Number of device endpoints per direction, EP0 included
    pub dev_endpoints: u8,
    /// Packet RAM size in 32-bit words
    pub total_fifo_size: u16,
    /// Max-packet size used at start-up and for FIFO sizing
    pub max_packet: u16,
    /// PHY kind
    pub phy: PhyInterface,
    /// Internal DMA mode (HS core only)
    pub dma_enable: bool,
    /// Gate core clocks while the bus is suspended
    pub low_power: bool,
    /// Drive the SOF pulse output pin
    pub sof_output: bool,
    /// Use VBUS sensing for session detection
    pub vbus_sensing: bool,
    /// Dual-role core: enable HNP/SRP capability and OTG interrupts
    pub otg_mode: bool,
    /// ULPI PHY drives VBUS from an external supply
    pub external_vbus: bool,
    /// Device-mode FIFO size table
    pub device_fifo: DeviceFifoTable,
    /// Host-mode FIFO size table
    pub host_fifo: HostFifoTable,
}

impl Config {
    /// Capability table for a core instance
    pub const fn for_core(core_id: CoreId) -> Self {
        match core_id {
            CoreId::FullSpeed => Self {
                core_id,
                base_address: core_id.base_address(),
                host_channels: 8,
                dev_endpoints: 4,
                total_fifo_size: 320,
                max_packet: FS_MAX_PACKET_SIZE,
                phy: PhyInterface::Embedded,
                dma_enable: false,
                low_power: false,
                sof_output: false,
                vbus_sensing: true,
                otg_mode: false,
                external_vbus: false,
                device_fifo: DeviceFifoTable::FULL_SPEED,
                host_fifo: HostFifoTable::FULL_SPEED,
            },
            CoreId::HighSpeed => Self {
                core_id,
                base_address: core_id.base_address(),
                host_channels: 12,
                dev_endpoints: 6,
                total_fifo_size: 1280,
                max_packet: FS_MAX_PACKET_SIZE,
                phy: PhyInterface::Ulpi,
                dma_enable: false,
                low_power: false,
                sof_output: false,
                vbus_sensing: true,
                otg_mode: false,
                external_vbus: false,
                device_fifo: DeviceFifoTable::HIGH_SPEED,
                host_fifo: HostFifoTable::HIGH_SPEED,
            },
        }
    }

    /// Select the PHY
    pub const fn with_phy(mut self, phy: PhyInterface) -> Self {
        self.phy = phy;
        self
    }

    /// Enable or disable internal DMA
    pub const fn with_dma(mut self, enabled: bool) -> Self {
        self.dma_enable = enabled;
        self
    }

    /// Enable or disable clock gating on suspend
    pub const fn with_low_power(mut self, enabled: bool) -> Self {
        self.low_power = enabled;
        self
    }

    /// Enable or disable the SOF output pin
    pub const fn with_sof_output(mut self, enabled: bool) -> Self {
        self.sof_output = enabled;
        self
    }

    /// Enable or disable VBUS sensing
    pub const fn with_vbus_sensing(mut self, enabled: bool) -> Self {
        self.vbus_sensing = enabled;
        self
    }

    /// Enable or disable dual-role (HNP/SRP) operation
    pub const fn with_otg(mut self, enabled: bool) -> Self {
        self.otg_mode = enabled;
        self
    }

    /// ULPI PHY uses an external VBUS supply
    pub const fn with_external_vbus(mut self, enabled: bool) -> Self {
        self.external_vbus = enabled;
        self
    }

    /// Replace the device-mode FIFO size table
    pub const fn with_device_fifo(mut self, table: DeviceFifoTable) -> Self {
        self.device_fifo = table;
        self
    }

    /// Replace the host-mode FIFO size table
    pub const fn with_host_fifo(mut self, table: HostFifoTable) -> Self {
        self.host_fifo = table;
        self
    }

    /// Speed the core runs at with the configured PHY
    pub const fn speed(&self) -> PortSpeed {
        match (self.core_id, self.phy) {
            (CoreId::HighSpeed, PhyInterface::Ulpi) => PortSpeed::HighSpeed,
            _ => PortSpeed::FullSpeed,
        }
    }

    /// Reject core/PHY/DMA combinations the hardware does not provide
    pub const fn validate(&self) -> Result<()> {
        match (self.core_id, self.phy) {
            (CoreId::FullSpeed, PhyInterface::Ulpi) => return Err(UsbError::Unsupported),
            (CoreId::HighSpeed, PhyInterface::I2c) => return Err(UsbError::Unsupported),
            _ => {}
        }
        if self.dma_enable && matches!(self.core_id, CoreId::FullSpeed) {
            return Err(UsbError::Unsupported);
        }
        if self.host_channels as usize > MAX_HOST_CHANNELS
            || self.dev_endpoints as usize > MAX_DEVICE_ENDPOINTS
            || self.dev_endpoints == 0
        {
            return Err(UsbError::InvalidParameter);
        }
        Ok(())
    }
}
