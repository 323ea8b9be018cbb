//! Register access for the OTG core
//!
//! All hardware access goes through [`OtgBus`], addressed by byte offset from
//! the core base. [`Mmio`] is the memory-mapped implementation used on target;
//! tests substitute a simulated register file.

use core::ptr::{read_volatile, write_volatile};

use crate::error::{Result, UsbError};

/// Word-wide access to the OTG register space
///
/// Reads take `&mut self` because several registers have read side effects
/// (GRXSTSP pops the receive status queue, FIFO windows pop data words).
pub trait OtgBus {
    /// Read the register at `offset`
    fn read(&mut self, offset: usize) -> u32;

    /// Write `value` to the register at `offset`
    fn write(&mut self, offset: usize, value: u32);

    /// Read-modify-write: clear the `clear` bits then set the `set` bits
    #[inline]
    fn modify(&mut self, offset: usize, clear: u32, set: u32) {
        let current = self.read(offset);
        self.write(offset, (current & !clear) | set);
    }

    /// Set bits in a register
    #[inline]
    fn set_bits(&mut self, offset: usize, mask: u32) {
        self.modify(offset, 0, mask);
    }

    /// Clear bits in a register
    #[inline]
    fn clear_bits(&mut self, offset: usize, mask: u32) {
        self.modify(offset, mask, 0);
    }

    /// Write-1-to-clear operation for status registers
    #[inline]
    fn write_1_to_clear(&mut self, offset: usize, mask: u32) {
        self.write(offset, mask);
    }
}

impl<T: OtgBus + ?Sized> OtgBus for &mut T {
    #[inline]
    fn read(&mut self, offset: usize) -> u32 {
        (**self).read(offset)
    }

    #[inline]
    fn write(&mut self, offset: usize, value: u32) {
        (**self).write(offset, value)
    }
}

/// Memory-mapped OTG core at a fixed base address
pub struct Mmio {
    base: usize,
}

impl Mmio {
    /// Create an accessor for the core at `base`
    ///
    /// # Safety
    ///
    /// `base` must be the address of an OTG core register block that stays
    /// mapped for the lifetime of this value, and the caller must ensure no
    /// other code accesses the same core concurrently.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    /// Base address of the register block
    pub const fn base(&self) -> usize {
        self.base
    }
}

// Barriers are emitted on bare-metal ARM only.
#[cfg(all(target_arch = "arm", target_os = "none"))]
#[inline(always)]
fn barrier_before() {
    cortex_m::asm::dmb();
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
#[inline(always)]
fn barrier_after_write() {
    cortex_m::asm::dsb();
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
#[inline(always)]
fn barrier_before() {}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
#[inline(always)]
fn barrier_after_write() {}

impl OtgBus for Mmio {
    #[inline(always)]
    fn read(&mut self, offset: usize) -> u32 {
        let addr = (self.base + offset) as *const u32;
        barrier_before();
        // SAFETY: `new` requires base to map a live OTG register block and all
        // offsets used by this crate lie within the 0x2_0000 byte core window.
        let value = unsafe { read_volatile(addr) };
        barrier_before();
        value
    }

    #[inline(always)]
    fn write(&mut self, offset: usize, value: u32) {
        let addr = (self.base + offset) as *mut u32;
        barrier_before();
        // SAFETY: see `read`.
        unsafe { write_volatile(addr, value) };
        barrier_after_write();
    }
}

/// Iteration-capped busy wait
///
/// Bring-up polls run inside interrupt context on possibly dead hardware, so
/// they are bounded by an iteration count instead of a clock.
pub struct PollBudget {
    remaining: u32,
}

impl PollBudget {
    /// Budget of `iterations` condition checks
    pub const fn new(iterations: u32) -> Self {
        Self { remaining: iterations }
    }

    /// Poll until `condition` holds or the budget runs out
    pub fn wait_for<F>(&mut self, mut condition: F) -> Result<()>
    where
        F: FnMut() -> bool,
    {
        loop {
            if condition() {
                return Ok(());
            }
            if self.remaining == 0 {
                return Err(UsbError::Timeout);
            }
            self.remaining -= 1;
        }
    }

    /// Checks left in the budget
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scratch([u32; 4]);

    impl OtgBus for Scratch {
        fn read(&mut self, offset: usize) -> u32 {
            self.0[offset / 4]
        }
        fn write(&mut self, offset: usize, value: u32) {
            self.0[offset / 4] = value;
        }
    }

    #[test]
    fn test_modify_clears_then_sets() {
        let mut bus = Scratch([0; 4]);
        bus.write(4, 0b1111);
        bus.modify(4, 0b0110, 0b1_0000);
        assert_eq!(bus.read(4), 0b1_1001);
        bus.set_bits(8, 1 << 31);
        bus.clear_bits(4, 1);
        assert_eq!(bus.read(8), 1 << 31);
        assert_eq!(bus.read(4), 0b1_1000);
    }

    #[test]
    fn test_poll_budget_gives_up() {
        let mut budget = PollBudget::new(10);
        let mut calls = 0;
        let result = budget.wait_for(|| {
            calls += 1;
            false
        });
        assert_eq!(result, Err(UsbError::Timeout));
        assert_eq!(calls, 11);
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_poll_budget_succeeds_early() {
        let mut budget = PollBudget::new(10);
        let mut calls = 0;
        assert!(budget
            .wait_for(|| {
                calls += 1;
                calls == 3
            })
            .is_ok());
        assert_eq!(budget.remaining(), 8);
    }
}
