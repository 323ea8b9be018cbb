#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

//! USB 2.0 OTG driver for STM32F2/F4 class DWC2 cores
//!
//! Register-level device and host transfer engine for the OTG_FS and OTG_HS
//! controllers, with the FIFO partitioning and interrupt servicing a USB
//! stack builds on. Class code (device) or the enumeration layer (host)
//! plugs in through the [`class`] traits.
//!
//! # Getting Started
//!
//! 1. Pick the core with [`Config::for_core`] and adjust it with the
//!    `with_*` builders
//! 2. Wrap the register block in a [`CoreHandle`] together with a delay
//! 3. Call [`CoreHandle::init_device`] or [`CoreHandle::init_host`]
//! 4. Call [`CoreHandle::handle_device_isr`] / [`CoreHandle::handle_host_isr`]
//!    from the OTG interrupt
//!
//! # Core Components
//!
//! - [`otg`] - Register map, typed register views and bus access
//! - [`fifo`] - Packet RAM partitioning
//! - [`controller`] - Core handle, reset and PHY bring-up
//! - [`device`] - Device endpoints and the EP0 control pipe
//! - [`host`] - Host channels, URBs and the port
//! - [`dispatch`] - Interrupt entry points
//! - [`error`] - Error taxonomy

#[cfg(feature = "defmt")]
use defmt as _;

pub mod buffer;
pub mod class;
pub mod config;
pub mod controller;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod fifo;
pub mod host;
pub mod otg;
pub mod perf;

pub use buffer::{Transfer, TransferBuffer};
pub use class::{DeviceClass, HostPort};
pub use config::{Config, CoreId, PhyInterface};
pub use controller::{CoreHandle, CoreMode};
pub use device::{Ep0State, EpStatus, SetupPacket};
pub use error::{Result, UsbError};
pub use fifo::{DeviceFifoTable, FifoPlan, HostFifoTable};
pub use host::{ChannelConfig, DataPid, HcStatus, UrbRequest, UrbState};
pub use otg::register::{Mmio, OtgBus};
pub use otg::{Direction, EndpointType, PortSpeed};
