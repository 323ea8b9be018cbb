//! Shared test utilities for stm32-usb-otg tests
//!
//! A simulated register file plus recording collaborators for device class
//! and host port callbacks.

#![allow(dead_code)]

pub mod mock_hardware;

pub use mock_hardware::{MockOtg, NoopDelay};

use stm32_usb_otg::{
    Config, CoreHandle, CoreId, DeviceClass, HostPort, OtgBus, TransferBuffer,
};

/// Core handle over the simulated register file
pub type MockCore = CoreHandle<MockOtg, NoopDelay>;

/// Full-speed core with the default configuration
pub fn fs_core() -> MockCore {
    fs_core_with(Config::for_core(CoreId::FullSpeed))
}

/// Core with a custom configuration
pub fn fs_core_with(config: Config) -> MockCore {
    CoreHandle::new(MockOtg::new(), NoopDelay::default(), config).unwrap()
}

/// Zeroed buffer that lives for the rest of the test binary
pub fn leaked_buffer(len: usize) -> TransferBuffer {
    TransferBuffer::from_static(Box::leak(vec![0u8; len].into_boxed_slice()))
}

/// Buffer holding `0, 1, 2, ...` for transmit tests
pub fn pattern_buffer(len: usize) -> TransferBuffer {
    let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
    TransferBuffer::from_static(Box::leak(data.into_boxed_slice()))
}

/// Device class that records every callback
#[derive(Debug, Default)]
pub struct RecordingClass {
    pub setups: u32,
    pub data_in: Vec<u8>,
    pub data_out: Vec<u8>,
    pub resets: u32,
    pub suspends: u32,
    pub resumes: u32,
    pub sofs: u32,
    /// Payload to answer the next SETUP with, if any
    pub reply: Option<&'static [u8]>,
}

impl<B: OtgBus, D: embedded_hal::delay::DelayNs> DeviceClass<B, D> for RecordingClass {
    fn setup_stage(&mut self, core: &mut CoreHandle<B, D>) -> u8 {
        self.setups += 1;
        if let Some(reply) = self.reply.take() {
            let len = reply.len();
            let _ = core.ctl_send_data(Some(TransferBuffer::from_static_ref(reply)), len);
        }
        0
    }

    fn data_in_stage(&mut self, _core: &mut CoreHandle<B, D>, ep_num: u8) -> u8 {
        self.data_in.push(ep_num);
        0
    }

    fn data_out_stage(&mut self, _core: &mut CoreHandle<B, D>, ep_num: u8) -> u8 {
        self.data_out.push(ep_num);
        0
    }

    fn sof(&mut self, _core: &mut CoreHandle<B, D>) -> u8 {
        self.sofs += 1;
        0
    }

    fn reset(&mut self, _core: &mut CoreHandle<B, D>) -> u8 {
        self.resets += 1;
        0
    }

    fn suspend(&mut self, _core: &mut CoreHandle<B, D>) -> u8 {
        self.suspends += 1;
        0
    }

    fn resume(&mut self, _core: &mut CoreHandle<B, D>) -> u8 {
        self.resumes += 1;
        0
    }
}

/// Host port owner that records every callback
#[derive(Debug, Default)]
pub struct RecordingPort {
    pub connects: u32,
    pub disconnects: u32,
    pub sofs: u32,
    pub vbus: Vec<bool>,
    /// Status byte every callback returns
    pub status: u8,
}

impl<B: OtgBus, D: embedded_hal::delay::DelayNs> HostPort<B, D> for RecordingPort {
    fn connect(&mut self, _core: &mut CoreHandle<B, D>) -> u8 {
        self.connects += 1;
        self.status
    }

    fn disconnect(&mut self, _core: &mut CoreHandle<B, D>) -> u8 {
        self.disconnects += 1;
        self.status
    }

    fn sof(&mut self, _core: &mut CoreHandle<B, D>) -> u8 {
        self.sofs += 1;
        self.status
    }

    fn drive_vbus(&mut self, on: bool) {
        self.vbus.push(on);
    }
}
