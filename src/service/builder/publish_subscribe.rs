// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Builder for publish-subscribe services.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::node::NodeShared;
use crate::payload::{PayloadType, ZeroCopySend};
use crate::sample::Header;
use crate::service::attribute::{AttributeSet, AttributeSpecifier, AttributeVerifier};
use crate::service::builder::{
    create_service, open_or_create, open_service, CreateFailure, OpenFailure, OpenOrCreateFailure,
};
use crate::service::publish_subscribe::PortFactory;
use crate::service::service_name::ServiceName;
use crate::service::static_config::{
    MessageTypeDetails, MessagingPatternConfig, PublishSubscribeConfig, StaticConfig,
};
use crate::service::MessagingPattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PublishSubscribeOpenError {
    #[error("the service does not exist")]
    DoesNotExist,
    #[error("internal failure while opening the service")]
    InternalFailure,
    #[error("the service carries different payload or user header types")]
    IncompatibleTypes,
    #[error("the service uses a different messaging pattern")]
    IncompatibleMessagingPattern,
    #[error("the service attributes do not satisfy the requirements")]
    IncompatibleAttributes,
    #[error("the service does not support the requested subscriber buffer size")]
    DoesNotSupportRequestedMinBufferSize,
    #[error("the service does not support the requested history size")]
    DoesNotSupportRequestedMinHistorySize,
    #[error("the service does not support the requested number of borrowed samples")]
    DoesNotSupportRequestedMinSubscriberBorrowedSamples,
    #[error("the service does not support the requested number of publishers")]
    DoesNotSupportRequestedAmountOfPublishers,
    #[error("the service does not support the requested number of subscribers")]
    DoesNotSupportRequestedAmountOfSubscribers,
    #[error("the service does not support the requested number of nodes")]
    DoesNotSupportRequestedAmountOfNodes,
    #[error("the service uses a different overflow behavior")]
    IncompatibleOverflowBehavior,
    #[error("insufficient permissions to open the service")]
    InsufficientPermissions,
    #[error("the service is in a corrupted state")]
    ServiceInCorruptedState,
    #[error("the service is still being created")]
    HangsInCreation,
    #[error("the service already holds its maximum number of nodes")]
    ExceedsMaxNumberOfNodes,
    #[error("the service is being removed")]
    IsMarkedForDestruction,
    #[error("the service was created by an incompatible version")]
    IncompatibleVersion,
}

impl From<OpenFailure> for PublishSubscribeOpenError {
    fn from(e: OpenFailure) -> Self {
        match e {
            OpenFailure::DoesNotExist => Self::DoesNotExist,
            OpenFailure::HangsInCreation => Self::HangsInCreation,
            OpenFailure::IsMarkedForDestruction => Self::IsMarkedForDestruction,
            OpenFailure::ExceedsMaxNumberOfNodes => Self::ExceedsMaxNumberOfNodes,
            OpenFailure::ServiceInCorruptedState => Self::ServiceInCorruptedState,
            OpenFailure::IncompatibleVersion => Self::IncompatibleVersion,
            OpenFailure::InsufficientPermissions => Self::InsufficientPermissions,
            OpenFailure::InternalFailure => Self::InternalFailure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PublishSubscribeCreateError {
    #[error("the service is in a corrupted state")]
    ServiceInCorruptedState,
    #[error("the subscriber buffer must be at least as large as the history")]
    SubscriberBufferMustBeLargerThanHistorySize,
    #[error("the service already exists")]
    AlreadyExists,
    #[error("insufficient permissions to create the service")]
    InsufficientPermissions,
    #[error("internal failure while creating the service")]
    InternalFailure,
    #[error("another instance is creating the service")]
    IsBeingCreatedByAnotherInstance,
    #[error("ports of a previous instance of the service are still connected")]
    OldConnectionsStillActive,
    #[error("the service could not be created in time")]
    HangsInCreation,
}

impl From<CreateFailure> for PublishSubscribeCreateError {
    fn from(e: CreateFailure) -> Self {
        match e {
            CreateFailure::AlreadyExists => Self::AlreadyExists,
            CreateFailure::IsBeingCreatedByAnotherInstance => Self::IsBeingCreatedByAnotherInstance,
            CreateFailure::HangsInCreation => Self::HangsInCreation,
            CreateFailure::OldConnectionsStillActive => Self::OldConnectionsStillActive,
            CreateFailure::ServiceInCorruptedState => Self::ServiceInCorruptedState,
            CreateFailure::InsufficientPermissions => Self::InsufficientPermissions,
            CreateFailure::InternalFailure => Self::InternalFailure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PublishSubscribeOpenOrCreateError {
    #[error("open failed: {0}")]
    Open(#[from] PublishSubscribeOpenError),
    #[error("create failed: {0}")]
    Create(#[from] PublishSubscribeCreateError),
    #[error("the service kept appearing and disappearing")]
    SystemInFlux,
}

impl From<OpenOrCreateFailure<PublishSubscribeOpenError, PublishSubscribeCreateError>>
    for PublishSubscribeOpenOrCreateError
{
    fn from(
        e: OpenOrCreateFailure<PublishSubscribeOpenError, PublishSubscribeCreateError>,
    ) -> Self {
        match e {
            OpenOrCreateFailure::Open(e) => Self::Open(e),
            OpenOrCreateFailure::Create(e) => Self::Create(e),
            OpenOrCreateFailure::SystemInFlux => Self::SystemInFlux,
        }
    }
}

/// Values below 1 make no sense for capacities; they are raised to 1.
fn at_least_one(knob: &str, value: usize) -> usize {
    if value == 0 {
        log::warn!("{knob} must be at least 1, using 1");
        1
    } else {
        value
    }
}

/// Creates or opens a publish-subscribe service carrying `Payload` with a
/// `UserHeader` in front of every sample.
///
/// Settings that are not given explicitly come from the node's config when
/// creating and are not checked when opening.
pub struct Builder<Payload: ?Sized, UserHeader> {
    name: ServiceName,
    node: Arc<NodeShared>,
    max_publishers: Option<usize>,
    max_subscribers: Option<usize>,
    max_nodes: Option<usize>,
    history_size: Option<usize>,
    subscriber_max_buffer_size: Option<usize>,
    subscriber_max_borrowed_samples: Option<usize>,
    enable_safe_overflow: Option<bool>,
    _marker: PhantomData<(*const Payload, UserHeader)>,
}

impl<Payload: ?Sized, UserHeader> fmt::Debug for Builder<Payload, UserHeader> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("publish_subscribe::Builder")
            .field("name", &self.name)
            .field("max_publishers", &self.max_publishers)
            .field("max_subscribers", &self.max_subscribers)
            .field("history_size", &self.history_size)
            .finish_non_exhaustive()
    }
}

impl<Payload: ?Sized + PayloadType> Builder<Payload, ()> {
    pub(crate) fn new(name: ServiceName, node: Arc<NodeShared>) -> Self {
        Self {
            name,
            node,
            max_publishers: None,
            max_subscribers: None,
            max_nodes: None,
            history_size: None,
            subscriber_max_buffer_size: None,
            subscriber_max_borrowed_samples: None,
            enable_safe_overflow: None,
            _marker: PhantomData,
        }
    }
}

impl<Payload: ?Sized + PayloadType, UserHeader: ZeroCopySend> Builder<Payload, UserHeader> {
    /// Put a `NewHeader` in front of every sample.
    pub fn user_header<NewHeader: ZeroCopySend>(self) -> Builder<Payload, NewHeader> {
        Builder {
            name: self.name,
            node: self.node,
            max_publishers: self.max_publishers,
            max_subscribers: self.max_subscribers,
            max_nodes: self.max_nodes,
            history_size: self.history_size,
            subscriber_max_buffer_size: self.subscriber_max_buffer_size,
            subscriber_max_borrowed_samples: self.subscriber_max_borrowed_samples,
            enable_safe_overflow: self.enable_safe_overflow,
            _marker: PhantomData,
        }
    }

    pub fn max_publishers(mut self, value: usize) -> Self {
        self.max_publishers = Some(value);
        self
    }

    pub fn max_subscribers(mut self, value: usize) -> Self {
        self.max_subscribers = Some(value);
        self
    }

    pub fn max_nodes(mut self, value: usize) -> Self {
        self.max_nodes = Some(value);
        self
    }

    /// Samples replayed to a subscriber that connects late.
    pub fn history_size(mut self, value: usize) -> Self {
        self.history_size = Some(value);
        self
    }

    pub fn subscriber_max_buffer_size(mut self, value: usize) -> Self {
        self.subscriber_max_buffer_size = Some(value);
        self
    }

    pub fn subscriber_max_borrowed_samples(mut self, value: usize) -> Self {
        self.subscriber_max_borrowed_samples = Some(value);
        self
    }

    /// With safe overflow a full subscriber queue drops its oldest sample
    /// instead of refusing the new one.
    pub fn enable_safe_overflow(mut self, value: bool) -> Self {
        self.enable_safe_overflow = Some(value);
        self
    }

    fn type_details() -> MessageTypeDetails {
        MessageTypeDetails::new(
            <Header as PayloadType>::type_detail(),
            <UserHeader as PayloadType>::type_detail(),
            Payload::type_detail(),
        )
    }

    fn port_factory(
        state: crate::service::ServiceState,
    ) -> Result<PortFactory<Payload, UserHeader>, PublishSubscribeOpenError> {
        PortFactory::new(Arc::new(state)).ok_or(PublishSubscribeOpenError::ServiceInCorruptedState)
    }

    fn verify(
        &self,
        existing: &StaticConfig,
        verifier: &AttributeVerifier,
    ) -> Result<(), PublishSubscribeOpenError> {
        if existing.messaging_pattern() != MessagingPattern::PublishSubscribe {
            return Err(PublishSubscribeOpenError::IncompatibleMessagingPattern);
        }
        let Some(existing_ps) = existing.publish_subscribe() else {
            return Err(PublishSubscribeOpenError::ServiceInCorruptedState);
        };

        if let Err(key) = verifier.verify_requirements(existing.attributes()) {
            log::debug!("service {}: attribute {key} does not match", self.name);
            return Err(PublishSubscribeOpenError::IncompatibleAttributes);
        }

        if !Self::type_details().is_compatible_to(existing_ps.message_type_details()) {
            log::debug!(
                "service {}: requested types {:?} do not match {:?}",
                self.name,
                Self::type_details(),
                existing_ps.message_type_details()
            );
            return Err(PublishSubscribeOpenError::IncompatibleTypes);
        }

        let exceeds = |requested: Option<usize>, offered: usize| requested.is_some_and(|r| r > offered);
        if exceeds(self.max_publishers, existing_ps.max_publishers()) {
            return Err(PublishSubscribeOpenError::DoesNotSupportRequestedAmountOfPublishers);
        }
        if exceeds(self.max_subscribers, existing_ps.max_subscribers()) {
            return Err(PublishSubscribeOpenError::DoesNotSupportRequestedAmountOfSubscribers);
        }
        if exceeds(self.max_nodes, existing_ps.max_nodes()) {
            return Err(PublishSubscribeOpenError::DoesNotSupportRequestedAmountOfNodes);
        }
        if exceeds(self.history_size, existing_ps.history_size()) {
            return Err(PublishSubscribeOpenError::DoesNotSupportRequestedMinHistorySize);
        }
        if exceeds(self.subscriber_max_buffer_size, existing_ps.subscriber_max_buffer_size()) {
            return Err(PublishSubscribeOpenError::DoesNotSupportRequestedMinBufferSize);
        }
        if exceeds(
            self.subscriber_max_borrowed_samples,
            existing_ps.subscriber_max_borrowed_samples(),
        ) {
            return Err(PublishSubscribeOpenError::DoesNotSupportRequestedMinSubscriberBorrowedSamples);
        }
        if self
            .enable_safe_overflow
            .is_some_and(|v| v != existing_ps.has_safe_overflow())
        {
            return Err(PublishSubscribeOpenError::IncompatibleOverflowBehavior);
        }
        Ok(())
    }

    fn static_config(
        &self,
        attributes: AttributeSet,
    ) -> Result<StaticConfig, PublishSubscribeCreateError> {
        let defaults = &self.node.config().defaults.publish_subscribe;
        let enable_safe_overflow = self
            .enable_safe_overflow
            .unwrap_or(defaults.enable_safe_overflow);
        let history_size = self.history_size.unwrap_or(defaults.publisher_history_size);
        let subscriber_max_buffer_size = at_least_one(
            "subscriber_max_buffer_size",
            self.subscriber_max_buffer_size
                .unwrap_or(defaults.subscriber_max_buffer_size),
        );

        if !enable_safe_overflow && subscriber_max_buffer_size < history_size {
            log::debug!(
                "service {}: buffer size {subscriber_max_buffer_size} cannot hold a history of {history_size}",
                self.name
            );
            return Err(PublishSubscribeCreateError::SubscriberBufferMustBeLargerThanHistorySize);
        }

        let config = PublishSubscribeConfig {
            max_subscribers: at_least_one(
                "max_subscribers",
                self.max_subscribers.unwrap_or(defaults.max_subscribers),
            ),
            max_publishers: at_least_one(
                "max_publishers",
                self.max_publishers.unwrap_or(defaults.max_publishers),
            ),
            max_nodes: at_least_one("max_nodes", self.max_nodes.unwrap_or(defaults.max_nodes)),
            history_size,
            subscriber_max_buffer_size,
            subscriber_max_borrowed_samples: at_least_one(
                "subscriber_max_borrowed_samples",
                self.subscriber_max_borrowed_samples
                    .unwrap_or(defaults.subscriber_max_borrowed_samples),
            ),
            enable_safe_overflow,
            message_type_details: Self::type_details(),
        };
        Ok(StaticConfig::new(
            &self.name,
            attributes,
            MessagingPatternConfig::PublishSubscribe(config),
        ))
    }

    fn open_impl(
        &self,
        verifier: &AttributeVerifier,
    ) -> Result<PortFactory<Payload, UserHeader>, PublishSubscribeOpenError> {
        let state = open_service(
            &self.name,
            MessagingPattern::PublishSubscribe,
            &self.node,
            |existing| self.verify(existing, verifier),
        )?;
        Self::port_factory(state)
    }

    fn create_impl(
        &self,
        attributes: &AttributeSet,
    ) -> Result<PortFactory<Payload, UserHeader>, PublishSubscribeCreateError> {
        let static_config = self.static_config(attributes.clone())?;
        let state = create_service(static_config, &self.node)?;
        PortFactory::new(Arc::new(state)).ok_or(PublishSubscribeCreateError::InternalFailure)
    }

    /// Open an existing service.
    pub fn open(self) -> Result<PortFactory<Payload, UserHeader>, PublishSubscribeOpenError> {
        self.open_impl(&AttributeVerifier::new())
    }

    /// Open an existing service whose attributes satisfy `verifier`.
    pub fn open_with_attributes(
        self,
        verifier: &AttributeVerifier,
    ) -> Result<PortFactory<Payload, UserHeader>, PublishSubscribeOpenError> {
        self.open_impl(verifier)
    }

    /// Create a new service. Fails if it already exists.
    pub fn create(self) -> Result<PortFactory<Payload, UserHeader>, PublishSubscribeCreateError> {
        self.create_impl(&AttributeSet::new())
    }

    /// Create a new service carrying the attributes of `specifier`.
    pub fn create_with_attributes(
        self,
        specifier: &AttributeSpecifier,
    ) -> Result<PortFactory<Payload, UserHeader>, PublishSubscribeCreateError> {
        self.create_impl(specifier.attributes())
    }

    /// Open the service, or create it if it does not exist.
    pub fn open_or_create(
        self,
    ) -> Result<PortFactory<Payload, UserHeader>, PublishSubscribeOpenOrCreateError> {
        self.open_or_create_with_attributes(&AttributeVerifier::new())
    }

    /// Open the service if its attributes satisfy `verifier`, or create it
    /// with the attributes `verifier` requires.
    pub fn open_or_create_with_attributes(
        self,
        verifier: &AttributeVerifier,
    ) -> Result<PortFactory<Payload, UserHeader>, PublishSubscribeOpenOrCreateError> {
        open_or_create(
            &self.node,
            || self.open_impl(verifier),
            || self.create_impl(verifier.required_attributes()),
            |e| {
                matches!(
                    e,
                    PublishSubscribeOpenError::DoesNotExist
                        | PublishSubscribeOpenError::HangsInCreation
                        | PublishSubscribeOpenError::IsMarkedForDestruction
                )
            },
            |e| {
                matches!(
                    e,
                    PublishSubscribeCreateError::AlreadyExists
                        | PublishSubscribeCreateError::IsBeingCreatedByAnotherInstance
                )
            },
        )
        .map_err(Into::into)
    }
}
