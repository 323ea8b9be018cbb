//! Diagnostic counters
//!
//! Conditions that are acknowledged but never escalated as transfer failures
//! (AHB errors, endpoint-disabled events, bring-up poll timeouts) are counted
//! here so they stay observable.

use core::sync::atomic::{AtomicU32, Ordering};

/// Diagnostic counters for one OTG core
pub struct DiagCounters {
    /// AHB bus errors on endpoints or channels
    pub ahb_errors: AtomicU32,

    /// Endpoint-disabled interrupts acknowledged
    pub endpoint_disabled: AtomicU32,

    /// Device Tx FIFO underruns
    pub tx_underruns: AtomicU32,

    /// Bring-up polls (AHB idle, soft reset, FIFO flush) that hit their cap
    pub poll_timeouts: AtomicU32,

    /// Host channel halts requested
    pub channel_halts: AtomicU32,

    /// Host transaction errors
    pub transaction_errors: AtomicU32,

    /// Host babble errors
    pub babble_errors: AtomicU32,

    /// Host data toggle errors
    pub toggle_errors: AtomicU32,

    /// Host NAK handshakes
    pub naks: AtomicU32,

    /// Received bytes dropped because the transfer record was full
    pub rx_discarded_bytes: AtomicU32,

    /// Host port resets issued
    pub port_resets: AtomicU32,

    /// Collaborator callbacks that returned a non-zero status
    pub callback_failures: AtomicU32,
}

impl DiagCounters {
    /// Create a zeroed counter set
    pub const fn new() -> Self {
        Self {
            ahb_errors: AtomicU32::new(0),
            endpoint_disabled: AtomicU32::new(0),
            tx_underruns: AtomicU32::new(0),
            poll_timeouts: AtomicU32::new(0),
            channel_halts: AtomicU32::new(0),
            transaction_errors: AtomicU32::new(0),
            babble_errors: AtomicU32::new(0),
            toggle_errors: AtomicU32::new(0),
            naks: AtomicU32::new(0),
            rx_discarded_bytes: AtomicU32::new(0),
            port_resets: AtomicU32::new(0),
            callback_failures: AtomicU32::new(0),
        }
    }

    #[inline(always)]
    fn bump(counter: &AtomicU32) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an AHB error
    #[inline(always)]
    pub fn record_ahb_error(&self) {
        Self::bump(&self.ahb_errors);
    }

    /// Record an endpoint-disabled event
    #[inline(always)]
    pub fn record_endpoint_disabled(&self) {
        Self::bump(&self.endpoint_disabled);
    }

    /// Record a Tx FIFO underrun
    #[inline(always)]
    pub fn record_tx_underrun(&self) {
        Self::bump(&self.tx_underruns);
    }

    /// Record a poll that gave up
    #[inline(always)]
    pub fn record_poll_timeout(&self) {
        Self::bump(&self.poll_timeouts);
    }

    /// Record a channel halt request
    #[inline(always)]
    pub fn record_channel_halt(&self) {
        Self::bump(&self.channel_halts);
    }

    /// Record a transaction error
    #[inline(always)]
    pub fn record_transaction_error(&self) {
        Self::bump(&self.transaction_errors);
    }

    /// Record a babble error
    #[inline(always)]
    pub fn record_babble(&self) {
        Self::bump(&self.babble_errors);
    }

    /// Record a data toggle error
    #[inline(always)]
    pub fn record_toggle_error(&self) {
        Self::bump(&self.toggle_errors);
    }

    /// Record a NAK handshake
    #[inline(always)]
    pub fn record_nak(&self) {
        Self::bump(&self.naks);
    }

    /// Record a port reset
    #[inline(always)]
    pub fn record_port_reset(&self) {
        Self::bump(&self.port_resets);
    }

    /// Record the status byte returned by a class or port callback
    #[inline(always)]
    pub fn record_callback_status(&self, status: u8) {
        if status != 0 {
            Self::bump(&self.callback_failures);
            #[cfg(feature = "defmt")]
            defmt::warn!("otg: callback returned status {}", status);
        }
    }

    /// Record received bytes that did not fit the transfer
    #[inline(always)]
    pub fn record_rx_discarded(&self, bytes: usize) {
        // Saturate rather than wrap
        let _ = self.rx_discarded_bytes.fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |current| current.checked_add(bytes as u32).or(Some(u32::MAX)),
        );
    }

    /// Get current counter snapshot
    pub fn snapshot(&self) -> DiagSnapshot {
        DiagSnapshot {
            ahb_errors: self.ahb_errors.load(Ordering::Relaxed),
            endpoint_disabled: self.endpoint_disabled.load(Ordering::Relaxed),
            tx_underruns: self.tx_underruns.load(Ordering::Relaxed),
            poll_timeouts: self.poll_timeouts.load(Ordering::Relaxed),
            channel_halts: self.channel_halts.load(Ordering::Relaxed),
            transaction_errors: self.transaction_errors.load(Ordering::Relaxed),
            babble_errors: self.babble_errors.load(Ordering::Relaxed),
            toggle_errors: self.toggle_errors.load(Ordering::Relaxed),
            naks: self.naks.load(Ordering::Relaxed),
            rx_discarded_bytes: self.rx_discarded_bytes.load(Ordering::Relaxed),
            port_resets: self.port_resets.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counter in [
            &self.ahb_errors,
            &self.endpoint_disabled,
            &self.tx_underruns,
            &self.poll_timeouts,
            &self.channel_halts,
            &self.transaction_errors,
            &self.babble_errors,
            &self.toggle_errors,
            &self.naks,
            &self.rx_discarded_bytes,
            &self.port_resets,
            &self.callback_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for DiagCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable snapshot of diagnostic counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct DiagSnapshot {
    pub ahb_errors: u32,
    pub endpoint_disabled: u32,
    pub tx_underruns: u32,
    pub poll_timeouts: u32,
    pub channel_halts: u32,
    pub transaction_errors: u32,
    pub babble_errors: u32,
    pub toggle_errors: u32,
    pub naks: u32,
    pub rx_discarded_bytes: u32,
    pub port_resets: u32,
    pub callback_failures: u32,
}

impl DiagSnapshot {
    /// No infrastructure-level fault has been observed
    pub fn is_healthy(&self) -> bool {
        self.ahb_errors == 0 && self.poll_timeouts == 0 && self.tx_underruns == 0
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DiagSnapshot {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "DiagSnapshot {{ ahb: {}, poll_timeouts: {}, halts: {}, xacterr: {}, babble: {}, toggle: {}, nak: {}, port_resets: {}, callback_failures: {} }}",
            self.ahb_errors,
            self.poll_timeouts,
            self.channel_halts,
            self.transaction_errors,
            self.babble_errors,
            self.toggle_errors,
            self.naks,
            self.port_resets,
            self.callback_failures
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diag_counters() {
        let counters = DiagCounters::new();

        counters.record_ahb_error();
        counters.record_transaction_error();
        counters.record_transaction_error();
        counters.record_rx_discarded(12);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.ahb_errors, 1);
        assert_eq!(snapshot.transaction_errors, 2);
        assert_eq!(snapshot.rx_discarded_bytes, 12);
        assert!(!snapshot.is_healthy());
    }

    #[test]
    fn test_counter_reset() {
        let counters = DiagCounters::new();
        counters.record_poll_timeout();
        counters.record_port_reset();
        counters.reset();
        assert_eq!(counters.snapshot(), DiagSnapshot::default());
        assert!(counters.snapshot().is_healthy());
    }

    #[test]
    fn test_callback_status() {
        let counters = DiagCounters::new();
        counters.record_callback_status(0);
        assert_eq!(counters.snapshot().callback_failures, 0);
        counters.record_callback_status(2);
        counters.record_callback_status(1);
        assert_eq!(counters.snapshot().callback_failures, 2);
    }

    #[test]
    fn test_discarded_bytes_saturate() {
        let counters = DiagCounters::new();
        counters.rx_discarded_bytes.store(u32::MAX - 1, Ordering::Relaxed);
        counters.record_rx_discarded(10);
        assert_eq!(counters.snapshot().rx_discarded_bytes, u32::MAX);
    }
}
