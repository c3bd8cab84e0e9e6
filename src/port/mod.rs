// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Ports: the endpoints that move samples and events through a service.

pub mod listener;
pub mod notifier;
pub mod publisher;
pub mod subscriber;

use std::fmt;

/// What a publisher does when a subscriber queue is full and safe overflow
/// is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnableToDeliverStrategy {
    /// Wait until the subscriber makes room (or disconnects).
    #[default]
    Block,
    /// Drop the new sample for that subscriber.
    DiscardSample,
}

/// How a publisher's data segment reacts to a loan larger than it was sized
/// for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationStrategy {
    /// Never grow; oversize loans fail with `ExceedsMaxLoanSize`.
    #[default]
    Static,
    /// Grow to exactly the requested size.
    BestFit,
    /// Grow to the next power of two that fits the request.
    PowerOfTwo,
}

/// Identifies an event sent from a notifier to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EventId(usize);

impl EventId {
    pub const fn new(value: usize) -> Self {
        Self(value)
    }

    pub const fn as_value(&self) -> usize {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LoanError {
    #[error("out of memory: the data segment has no free chunk")]
    OutOfMemory,
    #[error("the publisher already holds its maximum number of loaned samples")]
    ExceedsMaxLoanedSamples,
    #[error("the requested size exceeds the maximum loan size")]
    ExceedsMaxLoanSize,
    #[error("internal failure while loaning a sample")]
    InternalFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionFailure {
    #[error("failed to establish a connection to a subscriber")]
    FailedToEstablishConnection,
    #[error("unable to map the publisher's data segment")]
    UnableToMapPublishersDataSegment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("send failed: {0}")]
    LoanError(#[from] LoanError),
    #[error("send failed: {0}")]
    ConnectionError(#[from] ConnectionFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReceiveError {
    #[error("the subscriber already holds its maximum number of borrowed samples")]
    ExceedsMaxBorrows,
    #[error("failed to establish a connection to a publisher")]
    FailedToEstablishConnection,
    #[error("unable to map the publisher's data segment")]
    UnableToMapPublishersDataSegment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PublisherCreateError {
    #[error("the service already has its maximum number of publishers")]
    ExceedsMaxSupportedPublishers,
    #[error("unable to create the publisher's data segment")]
    UnableToCreateDataSegment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubscriberCreateError {
    #[error("the service already has its maximum number of subscribers")]
    ExceedsMaxSupportedSubscribers,
    #[error("the requested buffer size exceeds the service's maximum buffer size")]
    BufferSizeExceedsMaxSupportedBufferSizeOfService,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NotifierCreateError {
    #[error("the service already has its maximum number of notifiers")]
    ExceedsMaxSupportedNotifiers,
    #[error("internal failure while creating the notifier")]
    InternalFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ListenerCreateError {
    #[error("the service already has its maximum number of listeners")]
    ExceedsMaxSupportedListeners,
    #[error("unable to create the listener's wake-up resources")]
    ResourceCreationFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NotifierNotifyError {
    #[error("the event id exceeds the service's maximum event id")]
    EventIdOutOfBounds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ListenerWaitError {
    #[error("the wait was interrupted by a signal")]
    InterruptSignal,
    #[error("internal failure while waiting for events")]
    InternalFailure,
}
