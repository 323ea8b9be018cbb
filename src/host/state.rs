//! Host channel state tables
//!
//! A raw channel event first sets the software [`HcStatus`] and decides
//! how the channel reacts (usually a halt). Only the halt confirmation that
//! follows turns the status into a [`UrbState`]. Both steps are expressed
//! as pure tables so the interrupt handler only performs the register side.

use crate::error::UsbError;
use crate::otg::{ChannelInterrupt, EndpointType};

/// Transaction errors tolerated before a URB fails
pub const MAX_ERROR_COUNT: u8 = 3;

/// Outcome of the last transaction on a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HcStatus {
    /// Nothing happened yet
    #[default]
    Idle,
    /// Transfer completed
    Xfrc,
    /// Channel halted
    Halted,
    /// Peer answered NAK
    Nak,
    /// Peer answered NYET
    Nyet,
    /// Peer answered STALL
    Stall,
    /// Bus-level transaction error
    XactErr,
    /// Peer sent more data than requested
    BblErr,
    /// Data PID out of sequence
    DataTglErr,
}

impl HcStatus {
    /// Error equivalent of a failing status
    pub const fn as_error(self) -> Option<UsbError> {
        match self {
            Self::Nak => Some(UsbError::Nak),
            Self::Stall => Some(UsbError::Stall),
            Self::XactErr => Some(UsbError::TransactionError),
            Self::BblErr => Some(UsbError::Babble),
            Self::DataTglErr => Some(UsbError::DataToggleError),
            Self::Idle | Self::Xfrc | Self::Halted | Self::Nyet => None,
        }
    }
}

/// State of the URB submitted on a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UrbState {
    /// Submitted, no result yet
    #[default]
    Idle,
    /// Completed
    Done,
    /// Peer not ready; resubmit
    NotReady,
    /// Failed after exhausting retries, or on babble / toggle error
    Error,
    /// Peer stalled the endpoint
    Stall,
}

impl UrbState {
    /// Final for this submission
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Stall)
    }

    /// Error equivalent for callers that prefer `Result`
    pub const fn as_error(self) -> Option<UsbError> {
        match self {
            Self::Error => Some(UsbError::TransactionError),
            Self::Stall => Some(UsbError::Stall),
            Self::NotReady => Some(UsbError::Nak),
            Self::Idle | Self::Done => None,
        }
    }
}

/// One channel interrupt cause, in the order the handler examines them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelEvent {
    /// AHB error (DMA)
    AhbError,
    /// ACK handshake
    Ack,
    /// STALL handshake
    Stall,
    /// Data toggle error
    DataToggleError,
    /// Babble
    Babble,
    /// Frame overrun
    FrameOverrun,
    /// Transfer completed
    TransferComplete,
    /// Channel halted
    Halted,
    /// Transaction error
    TransactionError,
    /// NAK handshake
    Nak,
    /// NYET handshake
    Nyet,
}

impl ChannelEvent {
    /// Highest-priority event in a masked HCINT value; one event is
    /// serviced per interrupt
    pub fn first(pending: ChannelInterrupt, is_in: bool) -> Option<Self> {
        const IN_ORDER: [(ChannelInterrupt, ChannelEvent); 10] = [
            (ChannelInterrupt::AHB_ERROR, ChannelEvent::AhbError),
            (ChannelInterrupt::ACK, ChannelEvent::Ack),
            (ChannelInterrupt::STALL, ChannelEvent::Stall),
            (ChannelInterrupt::DATA_TOGGLE_ERROR, ChannelEvent::DataToggleError),
            (ChannelInterrupt::BABBLE, ChannelEvent::Babble),
            (ChannelInterrupt::FRAME_OVERRUN, ChannelEvent::FrameOverrun),
            (ChannelInterrupt::TRANSFER_COMPLETE, ChannelEvent::TransferComplete),
            (ChannelInterrupt::HALTED, ChannelEvent::Halted),
            (ChannelInterrupt::TRANSACTION_ERROR, ChannelEvent::TransactionError),
            (ChannelInterrupt::NAK, ChannelEvent::Nak),
        ];
        const OUT_ORDER: [(ChannelInterrupt, ChannelEvent); 11] = [
            (ChannelInterrupt::AHB_ERROR, ChannelEvent::AhbError),
            (ChannelInterrupt::ACK, ChannelEvent::Ack),
            (ChannelInterrupt::TRANSFER_COMPLETE, ChannelEvent::TransferComplete),
            (ChannelInterrupt::STALL, ChannelEvent::Stall),
            (ChannelInterrupt::NAK, ChannelEvent::Nak),
            (ChannelInterrupt::TRANSACTION_ERROR, ChannelEvent::TransactionError),
            (ChannelInterrupt::NYET, ChannelEvent::Nyet),
            (ChannelInterrupt::DATA_TOGGLE_ERROR, ChannelEvent::DataToggleError),
            (ChannelInterrupt::BABBLE, ChannelEvent::Babble),
            (ChannelInterrupt::FRAME_OVERRUN, ChannelEvent::FrameOverrun),
            (ChannelInterrupt::HALTED, ChannelEvent::Halted),
        ];

        let order: &[(ChannelInterrupt, ChannelEvent)] = if is_in { &IN_ORDER } else { &OUT_ORDER };
        order
            .iter()
            .find(|(bit, _)| pending.contains(*bit))
            .map(|(_, event)| *event)
    }

    /// HCINT bit acknowledging this event
    pub const fn bit(self) -> ChannelInterrupt {
        match self {
            Self::AhbError => ChannelInterrupt::AHB_ERROR,
            Self::Ack => ChannelInterrupt::ACK,
            Self::Stall => ChannelInterrupt::STALL,
            Self::DataToggleError => ChannelInterrupt::DATA_TOGGLE_ERROR,
            Self::Babble => ChannelInterrupt::BABBLE,
            Self::FrameOverrun => ChannelInterrupt::FRAME_OVERRUN,
            Self::TransferComplete => ChannelInterrupt::TRANSFER_COMPLETE,
            Self::Halted => ChannelInterrupt::HALTED,
            Self::TransactionError => ChannelInterrupt::TRANSACTION_ERROR,
            Self::Nak => ChannelInterrupt::NAK,
            Self::Nyet => ChannelInterrupt::NYET,
        }
    }
}

/// Effect of an event on the channel's error counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCount {
    /// Leave as is
    Keep,
    /// Back to zero
    Reset,
    /// One more transaction error
    Increment,
}

/// Register-level reaction to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// Clear the bit only
    Acknowledge,
    /// Halt the channel and wait for the halt confirmation
    Halt,
    /// Re-enable the channel in place (bulk/control IN NAK)
    Rearm,
    /// Periodic IN completion: the URB is done without a halt
    Complete,
    /// Resolve the halt confirmation
    ResolveHalt,
}

/// What a channel event does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventAction {
    /// New software status, if it changes
    pub status: Option<HcStatus>,
    /// Error counter update
    pub errors: ErrorCount,
    /// Register-level reaction
    pub reaction: Reaction,
}

impl EventAction {
    const fn new(status: Option<HcStatus>, errors: ErrorCount, reaction: Reaction) -> Self {
        Self {
            status,
            errors,
            reaction,
        }
    }
}

/// Event table for OUT channels
pub const fn out_event(event: ChannelEvent) -> EventAction {
    use ErrorCount::*;
    match event {
        ChannelEvent::AhbError | ChannelEvent::Ack => EventAction::new(None, Keep, Reaction::Acknowledge),
        ChannelEvent::TransferComplete => EventAction::new(Some(HcStatus::Xfrc), Reset, Reaction::Halt),
        ChannelEvent::Stall => EventAction::new(Some(HcStatus::Stall), Keep, Reaction::Halt),
        ChannelEvent::Nak => EventAction::new(Some(HcStatus::Nak), Reset, Reaction::Halt),
        ChannelEvent::TransactionError => {
            EventAction::new(Some(HcStatus::XactErr), Increment, Reaction::Halt)
        }
        ChannelEvent::Nyet => EventAction::new(Some(HcStatus::Nyet), Reset, Reaction::Halt),
        ChannelEvent::DataToggleError => {
            EventAction::new(Some(HcStatus::DataTglErr), Keep, Reaction::Halt)
        }
        ChannelEvent::Babble => EventAction::new(Some(HcStatus::BblErr), Keep, Reaction::Halt),
        ChannelEvent::FrameOverrun => EventAction::new(None, Keep, Reaction::Halt),
        ChannelEvent::Halted => EventAction::new(None, Keep, Reaction::ResolveHalt),
    }
}

/// Event table for IN channels
pub const fn in_event(event: ChannelEvent, ep_type: EndpointType) -> EventAction {
    use ErrorCount::*;
    let periodic = ep_type.is_periodic();
    match event {
        ChannelEvent::AhbError | ChannelEvent::Ack | ChannelEvent::Nyet => {
            EventAction::new(None, Keep, Reaction::Acknowledge)
        }
        ChannelEvent::Stall => EventAction::new(Some(HcStatus::Stall), Keep, Reaction::Halt),
        ChannelEvent::DataToggleError => {
            EventAction::new(Some(HcStatus::DataTglErr), Keep, Reaction::Halt)
        }
        ChannelEvent::Babble => EventAction::new(Some(HcStatus::BblErr), Keep, Reaction::Halt),
        ChannelEvent::FrameOverrun => EventAction::new(None, Keep, Reaction::Halt),
        ChannelEvent::TransferComplete => {
            let reaction = if periodic {
                Reaction::Complete
            } else {
                Reaction::Halt
            };
            EventAction::new(Some(HcStatus::Xfrc), Reset, reaction)
        }
        ChannelEvent::Halted => EventAction::new(None, Keep, Reaction::ResolveHalt),
        ChannelEvent::TransactionError => {
            EventAction::new(Some(HcStatus::XactErr), Increment, Reaction::Halt)
        }
        ChannelEvent::Nak => {
            let reaction = if periodic {
                Reaction::Halt
            } else {
                Reaction::Rearm
            };
            EventAction::new(Some(HcStatus::Nak), Keep, reaction)
        }
    }
}

/// URB state reached when a halt is confirmed
///
/// A transaction error below the retry budget reports `NotReady`, asking
/// the caller to resubmit; the budget is checked against the already
/// incremented counter.
pub const fn resolve_halt(status: HcStatus, error_count: u8) -> Option<UrbState> {
    match status {
        HcStatus::Xfrc => Some(UrbState::Done),
        HcStatus::Nak | HcStatus::Nyet => Some(UrbState::NotReady),
        HcStatus::Stall => Some(UrbState::Stall),
        HcStatus::XactErr => {
            if error_count >= MAX_ERROR_COUNT {
                Some(UrbState::Error)
            } else {
                Some(UrbState::NotReady)
            }
        }
        HcStatus::DataTglErr | HcStatus::BblErr => Some(UrbState::Error),
        HcStatus::Idle | HcStatus::Halted => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_transitions() {
        let xfrc = out_event(ChannelEvent::TransferComplete);
        assert_eq!(xfrc.status, Some(HcStatus::Xfrc));
        assert_eq!(xfrc.errors, ErrorCount::Reset);
        assert_eq!(xfrc.reaction, Reaction::Halt);

        let xact = out_event(ChannelEvent::TransactionError);
        assert_eq!(xact.errors, ErrorCount::Increment);
        assert_eq!(xact.reaction, Reaction::Halt);

        assert_eq!(out_event(ChannelEvent::Ack).reaction, Reaction::Acknowledge);
        assert_eq!(out_event(ChannelEvent::Halted).reaction, Reaction::ResolveHalt);
        assert_eq!(out_event(ChannelEvent::Stall).errors, ErrorCount::Keep);
    }

    #[test]
    fn test_in_nak_depends_on_type() {
        assert_eq!(in_event(ChannelEvent::Nak, EndpointType::Bulk).reaction, Reaction::Rearm);
        assert_eq!(in_event(ChannelEvent::Nak, EndpointType::Control).reaction, Reaction::Rearm);
        assert_eq!(in_event(ChannelEvent::Nak, EndpointType::Interrupt).reaction, Reaction::Halt);
    }

    #[test]
    fn test_in_completion_depends_on_type() {
        assert_eq!(
            in_event(ChannelEvent::TransferComplete, EndpointType::Bulk).reaction,
            Reaction::Halt
        );
        assert_eq!(
            in_event(ChannelEvent::TransferComplete, EndpointType::Interrupt).reaction,
            Reaction::Complete
        );
    }

    #[test]
    fn test_halt_resolution() {
        assert_eq!(resolve_halt(HcStatus::Xfrc, 0), Some(UrbState::Done));
        assert_eq!(resolve_halt(HcStatus::Nak, 0), Some(UrbState::NotReady));
        assert_eq!(resolve_halt(HcStatus::Nyet, 0), Some(UrbState::NotReady));
        assert_eq!(resolve_halt(HcStatus::Stall, 0), Some(UrbState::Stall));
        assert_eq!(resolve_halt(HcStatus::XactErr, 1), Some(UrbState::NotReady));
        assert_eq!(resolve_halt(HcStatus::XactErr, 2), Some(UrbState::NotReady));
        assert_eq!(resolve_halt(HcStatus::XactErr, 3), Some(UrbState::Error));
        assert_eq!(resolve_halt(HcStatus::DataTglErr, 0), Some(UrbState::Error));
        assert_eq!(resolve_halt(HcStatus::BblErr, 0), Some(UrbState::Error));
        assert_eq!(resolve_halt(HcStatus::Idle, 0), None);
    }

    #[test]
    fn test_event_priority() {
        // STALL wins over NAK on IN so the stall status is not overwritten
        let pending = ChannelInterrupt::STALL | ChannelInterrupt::NAK;
        assert_eq!(ChannelEvent::first(pending, true), Some(ChannelEvent::Stall));

        // Completion is examined before the halt confirmation on OUT
        let pending = ChannelInterrupt::HALTED | ChannelInterrupt::TRANSFER_COMPLETE;
        assert_eq!(ChannelEvent::first(pending, false), Some(ChannelEvent::TransferComplete));
        assert_eq!(ChannelEvent::first(ChannelInterrupt::empty(), false), None);
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(UrbState::Stall.as_error(), Some(UsbError::Stall));
        assert_eq!(UrbState::Done.as_error(), None);
        assert!(UrbState::Error.is_terminal());
        assert!(!UrbState::NotReady.is_terminal());
        assert_eq!(HcStatus::BblErr.as_error(), Some(UsbError::Babble));
        assert_eq!(HcStatus::DataTglErr.as_error(), Some(UsbError::DataToggleError));
    }
}
