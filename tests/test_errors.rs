// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Every public error describes itself.

use std::error::Error;

use zcipc::node::{NodeCreationFailure, NodeListFailure, NodeWaitFailure};
use zcipc::port::*;
use zcipc::semantic_string::SemanticStringError;
use zcipc::service::builder::event::{EventCreateError, EventOpenError, EventOpenOrCreateError};
use zcipc::service::builder::publish_subscribe::{
    PublishSubscribeCreateError, PublishSubscribeOpenError, PublishSubscribeOpenOrCreateError,
};
use zcipc::service::{ServiceDetailsError, ServiceListError};
use zcipc::waitset::{WaitSetAttachmentError, WaitSetCreateError, WaitSetRunError};

fn described<E: Error>(errors: &[E]) {
    for e in errors {
        assert!(!e.to_string().is_empty(), "{e:?} has an empty message");
    }
}

#[test]
fn port_errors() {
    use LoanError::*;
    described(&[OutOfMemory, ExceedsMaxLoanedSamples, ExceedsMaxLoanSize, InternalFailure]);
    described(&[
        ConnectionFailure::FailedToEstablishConnection,
        ConnectionFailure::UnableToMapPublishersDataSegment,
    ]);
    described(&[
        SendError::LoanError(OutOfMemory),
        SendError::ConnectionError(ConnectionFailure::FailedToEstablishConnection),
    ]);
    described(&[
        ReceiveError::ExceedsMaxBorrows,
        ReceiveError::FailedToEstablishConnection,
        ReceiveError::UnableToMapPublishersDataSegment,
    ]);
    described(&[
        PublisherCreateError::ExceedsMaxSupportedPublishers,
        PublisherCreateError::UnableToCreateDataSegment,
    ]);
    described(&[
        SubscriberCreateError::ExceedsMaxSupportedSubscribers,
        SubscriberCreateError::BufferSizeExceedsMaxSupportedBufferSizeOfService,
    ]);
    described(&[
        NotifierCreateError::ExceedsMaxSupportedNotifiers,
        NotifierCreateError::InternalFailure,
    ]);
    described(&[
        ListenerCreateError::ExceedsMaxSupportedListeners,
        ListenerCreateError::ResourceCreationFailed,
    ]);
    described(&[NotifierNotifyError::EventIdOutOfBounds]);
    described(&[ListenerWaitError::InterruptSignal, ListenerWaitError::InternalFailure]);
}

#[test]
fn send_error_keeps_its_source_message() {
    let e = SendError::from(LoanError::ExceedsMaxLoanSize);
    assert!(e.to_string().contains(&LoanError::ExceedsMaxLoanSize.to_string()));
}

#[test]
fn publish_subscribe_builder_errors() {
    use PublishSubscribeOpenError::*;
    let open = [
        DoesNotExist,
        InternalFailure,
        IncompatibleTypes,
        IncompatibleMessagingPattern,
        IncompatibleAttributes,
        DoesNotSupportRequestedMinBufferSize,
        DoesNotSupportRequestedMinHistorySize,
        DoesNotSupportRequestedMinSubscriberBorrowedSamples,
        DoesNotSupportRequestedAmountOfPublishers,
        DoesNotSupportRequestedAmountOfSubscribers,
        DoesNotSupportRequestedAmountOfNodes,
        IncompatibleOverflowBehavior,
        InsufficientPermissions,
        ServiceInCorruptedState,
        HangsInCreation,
        ExceedsMaxNumberOfNodes,
        IsMarkedForDestruction,
        IncompatibleVersion,
    ];
    described(&open);

    let create = [
        PublishSubscribeCreateError::ServiceInCorruptedState,
        PublishSubscribeCreateError::SubscriberBufferMustBeLargerThanHistorySize,
        PublishSubscribeCreateError::AlreadyExists,
        PublishSubscribeCreateError::InsufficientPermissions,
        PublishSubscribeCreateError::InternalFailure,
        PublishSubscribeCreateError::IsBeingCreatedByAnotherInstance,
        PublishSubscribeCreateError::OldConnectionsStillActive,
        PublishSubscribeCreateError::HangsInCreation,
    ];
    described(&create);

    described(&[
        PublishSubscribeOpenOrCreateError::Open(DoesNotExist),
        PublishSubscribeOpenOrCreateError::Create(create[2]),
        PublishSubscribeOpenOrCreateError::SystemInFlux,
    ]);
}

#[test]
fn event_builder_errors() {
    use EventOpenError::*;
    described(&[
        DoesNotExist,
        InsufficientPermissions,
        ServiceInCorruptedState,
        IncompatibleMessagingPattern,
        IncompatibleAttributes,
        InternalFailure,
        HangsInCreation,
        DoesNotSupportRequestedAmountOfNotifiers,
        DoesNotSupportRequestedAmountOfListeners,
        DoesNotSupportRequestedMaxEventId,
        DoesNotSupportRequestedAmountOfNodes,
        ExceedsMaxNumberOfNodes,
        IsMarkedForDestruction,
        IncompatibleVersion,
        IncompatibleNotifierCreatedEvent,
        IncompatibleNotifierDroppedEvent,
    ]);
    described(&[
        EventCreateError::ServiceInCorruptedState,
        EventCreateError::InternalFailure,
        EventCreateError::IsBeingCreatedByAnotherInstance,
        EventCreateError::AlreadyExists,
        EventCreateError::HangsInCreation,
        EventCreateError::InsufficientPermissions,
        EventCreateError::OldConnectionsStillActive,
    ]);
    described(&[
        EventOpenOrCreateError::Open(DoesNotExist),
        EventOpenOrCreateError::Create(EventCreateError::AlreadyExists),
        EventOpenOrCreateError::SystemInFlux,
    ]);
}

#[test]
fn node_service_and_waitset_errors() {
    described(&[
        NodeCreationFailure::InsufficientPermissions,
        NodeCreationFailure::ExceedsMaxNumberOfNodes,
        NodeCreationFailure::InternalError,
    ]);
    described(&[NodeListFailure::InsufficientPermissions, NodeListFailure::InternalError]);
    described(&[NodeWaitFailure::TerminationRequest, NodeWaitFailure::Interrupt]);
    described(&[
        ServiceDetailsError::InsufficientPermissions,
        ServiceDetailsError::ServiceInCorruptedState,
        ServiceDetailsError::VersionMismatch,
        ServiceDetailsError::InternalError,
    ]);
    described(&[ServiceListError::InsufficientPermissions, ServiceListError::InternalError]);
    described(&[
        SemanticStringError::ExceedsMaximumLength,
        SemanticStringError::InvalidContent,
    ]);
    described(&[WaitSetCreateError::InternalError]);
    described(&[
        WaitSetAttachmentError::InsufficientCapacity,
        WaitSetAttachmentError::AlreadyAttached,
        WaitSetAttachmentError::InternalError,
    ]);
    described(&[
        WaitSetRunError::InsufficientPermissions,
        WaitSetRunError::InternalError,
        WaitSetRunError::NoAttachments,
    ]);
}
