//! USB OTG error types

use core::fmt;

/// USB OTG operation result type
pub type Result<T> = core::result::Result<T, UsbError>;

/// USB OTG error types
///
/// Protocol errors (stall, transaction error, toggle error, babble, NAK) are
/// never returned from interrupt handlers; they are recorded in the channel's
/// URB state and converted on request via [`crate::host::UrbState::as_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbError {
    /// Endpoint address, channel number or length out of range
    InvalidParameter,
    /// Operation not valid for the current endpoint/channel state
    InvalidState,
    /// Bounded hardware poll gave up
    Timeout,
    /// FIFO partition does not fit the core's packet RAM
    FifoOverflow,
    /// A FIFO region is smaller than the hardware or packet-size minimum
    FifoTooSmall,
    /// Core identity and PHY/DMA combination not supported
    Unsupported,
    /// Peer rejected the request (STALL handshake)
    Stall,
    /// Bus-level error persisted past the retry budget
    TransactionError,
    /// Data toggle resynchronization failed
    DataToggleError,
    /// Peer sent more data than the channel expected
    Babble,
    /// Peer not ready (NAK/NYET), caller should resubmit
    Nak,
}

impl UsbError {
    /// True for configuration-time errors that make bring-up impossible
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::FifoOverflow | Self::FifoTooSmall | Self::Unsupported)
    }

    /// True for terminal protocol outcomes reported by a host channel
    pub const fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::Stall | Self::TransactionError | Self::DataToggleError | Self::Babble | Self::Nak
        )
    }
}

impl fmt::Display for UsbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter => write!(f, "Invalid parameter"),
            Self::InvalidState => write!(f, "Invalid state"),
            Self::Timeout => write!(f, "Timeout"),
            Self::FifoOverflow => write!(f, "FIFO partition exceeds packet RAM"),
            Self::FifoTooSmall => write!(f, "FIFO region below minimum depth"),
            Self::Unsupported => write!(f, "Unsupported core configuration"),
            Self::Stall => write!(f, "USB stall"),
            Self::TransactionError => write!(f, "Transaction error"),
            Self::DataToggleError => write!(f, "Data toggle error"),
            Self::Babble => write!(f, "Babble detected"),
            Self::Nak => write!(f, "Device NAK"),
        }
    }
}
