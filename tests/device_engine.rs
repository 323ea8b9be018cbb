//! Device-mode behaviour against the simulated core

mod common;

use common::{fs_core, leaked_buffer, pattern_buffer, MockCore, RecordingClass};
use stm32_usb_otg::otg::{
    offsets, CoreInterrupt, DevicePacketStatus, InEndpointInterrupt, OutEndpointInterrupt,
};
use stm32_usb_otg::{DeviceFifoTable, Ep0State, EndpointType, EpStatus, FifoPlan, PortSpeed};

static DEVICE_DESCRIPTOR: [u8; 18] = [
    0x12, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x40, 0x83, 0x04, 0x40, 0x57, 0x00, 0x02, 0x01,
    0x02, 0x03, 0x01,
];

const GET_DEVICE_DESCRIPTOR: [u8; 8] = [0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00];

/// Initialised core that went through a bus reset and full-speed enumeration
fn enumerated_device() -> (MockCore, RecordingClass) {
    let mut core = fs_core();
    let mut class = RecordingClass::default();
    core.init_device().unwrap();

    core.bus_mut().raise(CoreInterrupt::USB_RESET);
    assert_eq!(core.handle_device_isr(&mut class), 1);

    // DSTS.ENUMSPD = full speed on the 48 MHz PHY clock
    core.bus_mut().set_reg(offsets::DSTS, 3 << 1);
    core.bus_mut().raise(CoreInterrupt::ENUM_DONE);
    assert_eq!(core.handle_device_isr(&mut class), 1);
    (core, class)
}

#[test]
fn test_init_device_selects_device_mode() {
    let mut core = fs_core();
    core.init_device().unwrap();
    assert!(core.is_device_mode());
    assert!(!core.bus_mut().is_host_mode());
    assert_eq!(core.bus_mut().core_resets(), 1);
}

#[test]
fn test_idle_dispatch_touches_nothing() {
    let mut core = fs_core();
    let mut class = RecordingClass::default();
    core.init_device().unwrap();

    let writes = core.bus_mut().write_count();
    assert_eq!(core.handle_device_isr(&mut class), 0);
    assert_eq!(core.bus_mut().write_count(), writes);
    assert_eq!(class.setups, 0);
}

#[test]
fn test_host_dispatch_ignored_in_device_mode() {
    let (mut core, _) = enumerated_device();
    let mut port = common::RecordingPort::default();
    core.bus_mut().raise(CoreInterrupt::SOF);
    assert_eq!(core.handle_host_isr(&mut port), 0);
    assert_eq!(port.sofs, 0);
}

#[test]
fn test_usb_reset_rearms_ep0() {
    let (mut core, mut class) = enumerated_device();
    assert_eq!(class.resets, 1);

    core.ep_set_address(5);
    assert_eq!((core.bus_mut().reg(offsets::DCFG) >> 4) & 0x7F, 5);

    core.bus_mut().raise(CoreInterrupt::USB_RESET);
    core.handle_device_isr(&mut class);
    assert_eq!(class.resets, 2);

    let bus = core.bus_mut();
    assert_eq!((bus.reg(offsets::DCFG) >> 4) & 0x7F, 0);
    let tsiz = bus.reg(offsets::doeptsiz(0));
    assert_eq!((tsiz >> 29) & 0b11, 3, "three back-to-back SETUPs");
    assert_eq!(tsiz & 0x7_FFFF, 24);
    assert_eq!(bus.reg(offsets::DAINTMSK), 1 | (1 << 16));
    assert_eq!(core.ep0_state(), Ep0State::Idle);
}

#[test]
fn test_set_address_replaces_previous() {
    let (mut core, _) = enumerated_device();
    core.ep_set_address(5);
    core.ep_set_address(2);

    let dcfg = core.bus_mut().reg(offsets::DCFG);
    assert_eq!((dcfg >> 4) & 0x7F, 2);
    // Speed bits survive the update
    assert_eq!(dcfg & 0b11, 3);
}

#[test]
fn test_enumeration_latches_full_speed() {
    let (core, _) = enumerated_device();
    assert_eq!(core.enumerated_speed(), PortSpeed::FullSpeed);
    assert_eq!(core.device_max_packet(), 64);
    assert_eq!(core.endpoint(0x80).unwrap().max_packet(), 64);
}

#[test]
fn test_control_read_sends_descriptor() {
    let (mut core, mut class) = enumerated_device();
    class.reply = Some(&DEVICE_DESCRIPTOR);

    core.bus_mut()
        .push_device_rx(0, DevicePacketStatus::SetupUpdate, &GET_DEVICE_DESCRIPTOR);
    core.handle_device_isr(&mut class);
    assert_eq!(class.setups, 0, "SETUP is delivered on the STUP event");
    assert_eq!(core.bus_mut().rx_words_pending(), 0);

    core.bus_mut().raise_out_ep(0, OutEndpointInterrupt::SETUP_DONE);
    core.handle_device_isr(&mut class);
    assert_eq!(class.setups, 1);
    assert_eq!(core.setup_packet().length, 18);
    assert_eq!(core.ep0_state(), Ep0State::DataIn);

    // FIFO-empty pushes the data stage
    core.handle_device_isr(&mut class);
    assert_eq!(core.bus_mut().tx_bytes(0, 18), DEVICE_DESCRIPTOR.to_vec());
    assert_eq!(core.bus_mut().tx_words(0).len(), 5);

    core.bus_mut()
        .raise_in_ep(0, InEndpointInterrupt::TRANSFER_COMPLETE);
    core.handle_device_isr(&mut class);
    assert_eq!(class.data_in, vec![0]);
    assert_eq!(core.ep0_state(), Ep0State::StatusOut);
    assert_eq!(class.setups, 1);
}

#[test]
fn test_control_read_capped_by_wlength() {
    let (mut core, mut class) = enumerated_device();
    class.reply = Some(&DEVICE_DESCRIPTOR);

    // wLength 8: only the first eight bytes go out
    let request = [0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x08, 0x00];
    core.bus_mut()
        .push_device_rx(0, DevicePacketStatus::SetupUpdate, &request);
    core.handle_device_isr(&mut class);
    core.bus_mut().raise_out_ep(0, OutEndpointInterrupt::SETUP_DONE);
    core.handle_device_isr(&mut class);
    core.handle_device_isr(&mut class);

    assert_eq!(core.bus_mut().tx_words(0).len(), 2);
    assert_eq!(core.ep_xfer_count(0x80).unwrap(), 8);
}

#[test]
fn test_bulk_in_refills_fifo_per_packet() {
    let (mut core, mut class) = enumerated_device();
    core.ep_open(0x81, 64, EndpointType::Bulk).unwrap();
    core.bus_mut().set_tx_capacity(20);
    core.ep_tx(0x81, Some(pattern_buffer(130)), 130).unwrap();
    assert_ne!(core.bus_mut().reg(offsets::DIEPEMPMSK) & (1 << 1), 0);

    core.handle_device_isr(&mut class);
    assert_eq!(core.ep_xfer_count(0x81).unwrap(), 64);

    // No room for another packet until the host drains the FIFO
    assert_eq!(core.handle_device_isr(&mut class), 0);
    assert_eq!(core.ep_xfer_count(0x81).unwrap(), 64);

    core.bus_mut().drain_tx(1);
    core.handle_device_isr(&mut class);
    assert_eq!(core.ep_xfer_count(0x81).unwrap(), 128);

    core.bus_mut().drain_tx(1);
    core.handle_device_isr(&mut class);
    assert_eq!(core.ep_xfer_count(0x81).unwrap(), 130);
    assert_eq!(core.bus_mut().reg(offsets::DIEPEMPMSK) & (1 << 1), 0);

    let expected: Vec<u8> = (0..130).map(|i| i as u8).collect();
    assert_eq!(core.bus_mut().tx_words(1).len(), 33);
    assert_eq!(core.bus_mut().tx_bytes(1, 130), expected);

    core.bus_mut()
        .raise_in_ep(1, InEndpointInterrupt::TRANSFER_COMPLETE);
    core.handle_device_isr(&mut class);
    assert_eq!(class.data_in, vec![1]);
}

#[test]
fn test_bulk_in_packet_fills_fifo_exactly() {
    // Smallest Tx depth the planner accepts for a 64-byte endpoint
    let table = DeviceFifoTable::new(128, [32, 16, 32, 0, 0, 0]);
    assert!(FifoPlan::device(&table, 4, 320, 64).is_ok());

    let (mut core, mut class) = enumerated_device();
    core.ep_open(0x81, 64, EndpointType::Bulk).unwrap();
    core.bus_mut().set_tx_capacity(16);
    core.ep_tx(0x81, Some(pattern_buffer(64)), 64).unwrap();

    assert_eq!(core.handle_device_isr(&mut class), 1);
    assert_eq!(core.ep_xfer_count(0x81).unwrap(), 64);
    assert_eq!(core.bus_mut().tx_words(1).len(), 16);
    assert_eq!(core.bus_mut().reg(offsets::DIEPEMPMSK) & (1 << 1), 0);

    let expected: Vec<u8> = (0..64).map(|i| i as u8).collect();
    assert_eq!(core.bus_mut().tx_bytes(1, 64), expected);
}

#[test]
fn test_bulk_out_collects_data() {
    let (mut core, mut class) = enumerated_device();
    core.ep_open(0x02, 64, EndpointType::Bulk).unwrap();
    core.ep_prepare_rx(0x02, Some(leaked_buffer(64)), 64).unwrap();

    let payload = [0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
    core.bus_mut()
        .push_device_rx(2, DevicePacketStatus::DataUpdate, &payload);
    core.handle_device_isr(&mut class);
    assert_eq!(core.ep_rx_data(0x02).unwrap(), &payload);

    core.bus_mut()
        .raise_out_ep(2, OutEndpointInterrupt::TRANSFER_COMPLETE);
    core.handle_device_isr(&mut class);
    assert_eq!(class.data_out, vec![2]);
}

#[test]
fn test_out_overflow_is_counted() {
    let (mut core, mut class) = enumerated_device();
    core.ep_open(0x02, 64, EndpointType::Bulk).unwrap();
    core.ep_prepare_rx(0x02, Some(leaked_buffer(4)), 4).unwrap();

    core.bus_mut()
        .push_device_rx(2, DevicePacketStatus::DataUpdate, &[1, 2, 3, 4, 5, 6, 7, 8]);
    core.handle_device_isr(&mut class);

    assert_eq!(core.ep_rx_data(0x02).unwrap(), &[1, 2, 3, 4]);
    assert_eq!(core.diagnostics().snapshot().rx_discarded_bytes, 4);
    assert_eq!(core.bus_mut().rx_words_pending(), 0);
}

#[test]
fn test_stall_and_valid_restore() {
    let (mut core, _) = enumerated_device();
    core.ep_open(0x81, 8, EndpointType::Interrupt).unwrap();

    core.ep_stall(0x81).unwrap();
    assert_eq!(core.ep_status(0x81).unwrap(), EpStatus::Stall);
    assert!(core.endpoint(0x81).unwrap().is_stalled());

    core.set_ep_status(0x81, EpStatus::Valid).unwrap();
    assert_eq!(core.ep_status(0x81).unwrap(), EpStatus::Valid);
    let ep = core.endpoint(0x81).unwrap();
    assert!(!ep.is_stalled());
    assert!(!ep.even_odd_frame());
    assert_eq!(core.bus_mut().reg(offsets::diepctl(1)) & (1 << 21), 0);
}

#[test]
fn test_clear_stall_is_idempotent() {
    let (mut core, _) = enumerated_device();
    core.ep_open(0x02, 64, EndpointType::Bulk).unwrap();
    core.ep_stall(0x02).unwrap();

    core.ep_clear_stall(0x02).unwrap();
    let once = core.bus_mut().reg(offsets::doepctl(2));
    core.ep_clear_stall(0x02).unwrap();
    let twice = core.bus_mut().reg(offsets::doepctl(2));

    assert_eq!(once, twice);
    assert_eq!(once & (1 << 21), 0);
    assert_eq!(once & (1 << 16), 0, "bulk restarts at DATA0");
}

#[test]
fn test_set_ep_status_nak() {
    let (mut core, _) = enumerated_device();
    core.ep_open(0x02, 64, EndpointType::Bulk).unwrap();
    core.set_ep_status(0x02, EpStatus::Nak).unwrap();
    assert_eq!(core.ep_status(0x02).unwrap(), EpStatus::Nak);

    core.set_ep_status(0x02, EpStatus::Disabled).unwrap();
    core.set_ep_status(0x02, EpStatus::Valid).unwrap();
    assert_eq!(core.ep_status(0x02).unwrap(), EpStatus::Valid);
}

#[test]
fn test_invalid_endpoint_rejected() {
    let (mut core, _) = enumerated_device();
    assert!(core.ep_open(0x85, 64, EndpointType::Bulk).is_err());
    assert!(core.ep_tx(0x84, None, 0).is_err());
    assert!(core.endpoint(0x07).is_none());
}

#[test]
fn test_suspend_and_resume_reach_class() {
    let (mut core, mut class) = enumerated_device();
    core.bus_mut().raise(CoreInterrupt::USB_SUSPEND);
    core.handle_device_isr(&mut class);
    assert_eq!(class.suspends, 1);

    core.bus_mut().raise(CoreInterrupt::WAKEUP);
    core.handle_device_isr(&mut class);
    assert_eq!(class.resumes, 1);

    core.bus_mut().raise(CoreInterrupt::SOF);
    core.handle_device_isr(&mut class);
    assert_eq!(class.sofs, 1);
    assert_eq!(core.bus_mut().reg(offsets::GINTSTS), 0);
}
