// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Builder for event services.

use std::sync::Arc;

use crate::node::NodeShared;
use crate::port::EventId;
use crate::service::attribute::{AttributeSet, AttributeSpecifier, AttributeVerifier};
use crate::service::builder::{
    create_service, open_or_create, open_service, CreateFailure, OpenFailure, OpenOrCreateFailure,
};
use crate::service::event::PortFactory;
use crate::service::service_name::ServiceName;
use crate::service::static_config::{EventConfig, MessagingPatternConfig, StaticConfig};
use crate::service::{MessagingPattern, ServiceState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EventOpenError {
    #[error("the service does not exist")]
    DoesNotExist,
    #[error("insufficient permissions to open the service")]
    InsufficientPermissions,
    #[error("the service is in a corrupted state")]
    ServiceInCorruptedState,
    #[error("the service uses a different messaging pattern")]
    IncompatibleMessagingPattern,
    #[error("the service attributes do not satisfy the requirements")]
    IncompatibleAttributes,
    #[error("internal failure while opening the service")]
    InternalFailure,
    #[error("the service is still being created")]
    HangsInCreation,
    #[error("the service does not support the requested number of notifiers")]
    DoesNotSupportRequestedAmountOfNotifiers,
    #[error("the service does not support the requested number of listeners")]
    DoesNotSupportRequestedAmountOfListeners,
    #[error("the service does not support the requested maximum event id")]
    DoesNotSupportRequestedMaxEventId,
    #[error("the service does not support the requested number of nodes")]
    DoesNotSupportRequestedAmountOfNodes,
    #[error("the service already holds its maximum number of nodes")]
    ExceedsMaxNumberOfNodes,
    #[error("the service is being removed")]
    IsMarkedForDestruction,
    #[error("the service was created by an incompatible version")]
    IncompatibleVersion,
    #[error("the service emits a different event when a notifier is created")]
    IncompatibleNotifierCreatedEvent,
    #[error("the service emits a different event when a notifier is dropped")]
    IncompatibleNotifierDroppedEvent,
}

impl From<OpenFailure> for EventOpenError {
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
pub enum EventCreateError {
    #[error("the service is in a corrupted state")]
    ServiceInCorruptedState,
    #[error("internal failure while creating the service")]
    InternalFailure,
    #[error("another instance is creating the service")]
    IsBeingCreatedByAnotherInstance,
    #[error("the service already exists")]
    AlreadyExists,
    #[error("the service could not be created in time")]
    HangsInCreation,
    #[error("insufficient permissions to create the service")]
    InsufficientPermissions,
    #[error("ports of a previous instance of the service are still connected")]
    OldConnectionsStillActive,
}

impl From<CreateFailure> for EventCreateError {
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
pub enum EventOpenOrCreateError {
    #[error("open failed: {0}")]
    Open(#[from] EventOpenError),
    #[error("create failed: {0}")]
    Create(#[from] EventCreateError),
    #[error("the service kept appearing and disappearing")]
    SystemInFlux,
}

impl From<OpenOrCreateFailure<EventOpenError, EventCreateError>> for EventOpenOrCreateError {
    fn from(e: OpenOrCreateFailure<EventOpenError, EventCreateError>) -> Self {
        match e {
            OpenOrCreateFailure::Open(e) => Self::Open(e),
            OpenOrCreateFailure::Create(e) => Self::Create(e),
            OpenOrCreateFailure::SystemInFlux => Self::SystemInFlux,
        }
    }
}

/// Explicit choice for the created/dropped announcements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Announcement {
    Unset,
    Disabled,
    Event(EventId),
}

impl Announcement {
    fn resolve(self, default: Option<usize>) -> Option<usize> {
        match self {
            Self::Unset => default,
            Self::Disabled => None,
            Self::Event(id) => Some(id.as_value()),
        }
    }

    fn matches(self, existing: Option<EventId>) -> bool {
        match self {
            Self::Unset => true,
            Self::Disabled => existing.is_none(),
            Self::Event(id) => existing == Some(id),
        }
    }
}

/// Creates or opens an event service.
#[derive(Debug)]
pub struct Builder {
    name: ServiceName,
    node: Arc<NodeShared>,
    max_notifiers: Option<usize>,
    max_listeners: Option<usize>,
    max_nodes: Option<usize>,
    event_id_max_value: Option<usize>,
    notifier_created_event: Announcement,
    notifier_dropped_event: Announcement,
}

impl Builder {
    pub(crate) fn new(name: ServiceName, node: Arc<NodeShared>) -> Self {
        Self {
            name,
            node,
            max_notifiers: None,
            max_listeners: None,
            max_nodes: None,
            event_id_max_value: None,
            notifier_created_event: Announcement::Unset,
            notifier_dropped_event: Announcement::Unset,
        }
    }

    pub fn max_notifiers(mut self, value: usize) -> Self {
        self.max_notifiers = Some(value);
        self
    }

    pub fn max_listeners(mut self, value: usize) -> Self {
        self.max_listeners = Some(value);
        self
    }

    pub fn max_nodes(mut self, value: usize) -> Self {
        self.max_nodes = Some(value);
        self
    }

    /// Largest event id a notifier may send.
    pub fn event_id_max_value(mut self, value: usize) -> Self {
        self.event_id_max_value = Some(value);
        self
    }

    /// Event every listener receives when a notifier is created.
    pub fn notifier_created_event(mut self, value: EventId) -> Self {
        self.notifier_created_event = Announcement::Event(value);
        self
    }

    pub fn disable_notifier_created_event(mut self) -> Self {
        self.notifier_created_event = Announcement::Disabled;
        self
    }

    /// Event every listener receives when a notifier is dropped.
    pub fn notifier_dropped_event(mut self, value: EventId) -> Self {
        self.notifier_dropped_event = Announcement::Event(value);
        self
    }

    pub fn disable_notifier_dropped_event(mut self) -> Self {
        self.notifier_dropped_event = Announcement::Disabled;
        self
    }

    fn verify(
        &self,
        existing: &StaticConfig,
        verifier: &AttributeVerifier,
    ) -> Result<(), EventOpenError> {
        if existing.messaging_pattern() != MessagingPattern::Event {
            return Err(EventOpenError::IncompatibleMessagingPattern);
        }
        let Some(existing_event) = existing.event() else {
            return Err(EventOpenError::ServiceInCorruptedState);
        };

        if let Err(key) = verifier.verify_requirements(existing.attributes()) {
            log::debug!("service {}: attribute {key} does not match", self.name);
            return Err(EventOpenError::IncompatibleAttributes);
        }

        let exceeds = |requested: Option<usize>, offered: usize| requested.is_some_and(|r| r > offered);
        if exceeds(self.max_notifiers, existing_event.max_notifiers()) {
            return Err(EventOpenError::DoesNotSupportRequestedAmountOfNotifiers);
        }
        if exceeds(self.max_listeners, existing_event.max_listeners()) {
            return Err(EventOpenError::DoesNotSupportRequestedAmountOfListeners);
        }
        if exceeds(self.max_nodes, existing_event.max_nodes()) {
            return Err(EventOpenError::DoesNotSupportRequestedAmountOfNodes);
        }
        if exceeds(self.event_id_max_value, existing_event.event_id_max_value()) {
            return Err(EventOpenError::DoesNotSupportRequestedMaxEventId);
        }
        if !self
            .notifier_created_event
            .matches(existing_event.notifier_created_event())
        {
            return Err(EventOpenError::IncompatibleNotifierCreatedEvent);
        }
        if !self
            .notifier_dropped_event
            .matches(existing_event.notifier_dropped_event())
        {
            return Err(EventOpenError::IncompatibleNotifierDroppedEvent);
        }
        Ok(())
    }

    fn static_config(&self, attributes: AttributeSet) -> StaticConfig {
        let defaults = &self.node.config().defaults.event;
        let at_least_one = |knob: &str, value: usize| {
            if value == 0 {
                log::warn!("{knob} must be at least 1, using 1");
                1
            } else {
                value
            }
        };
        let event_id_max_value = self.event_id_max_value.unwrap_or(defaults.event_id_max_value);
        let announcement = |knob: &str, id: Option<usize>| match id {
            Some(id) if id > event_id_max_value => {
                log::warn!("{knob} {id} exceeds the maximum event id {event_id_max_value}, disabling it");
                None
            }
            id => id,
        };

        let config = EventConfig {
            max_notifiers: at_least_one(
                "max_notifiers",
                self.max_notifiers.unwrap_or(defaults.max_notifiers),
            ),
            max_listeners: at_least_one(
                "max_listeners",
                self.max_listeners.unwrap_or(defaults.max_listeners),
            ),
            max_nodes: at_least_one("max_nodes", self.max_nodes.unwrap_or(defaults.max_nodes)),
            event_id_max_value,
            notifier_created_event: announcement(
                "notifier_created_event",
                self.notifier_created_event
                    .resolve(defaults.notifier_created_event),
            ),
            notifier_dropped_event: announcement(
                "notifier_dropped_event",
                self.notifier_dropped_event
                    .resolve(defaults.notifier_dropped_event),
            ),
        };
        StaticConfig::new(&self.name, attributes, MessagingPatternConfig::Event(config))
    }

    fn open_impl(&self, verifier: &AttributeVerifier) -> Result<PortFactory, EventOpenError> {
        let state: ServiceState = open_service(
            &self.name,
            MessagingPattern::Event,
            &self.node,
            |existing| self.verify(existing, verifier),
        )?;
        PortFactory::new(Arc::new(state)).ok_or(EventOpenError::ServiceInCorruptedState)
    }

    fn create_impl(&self, attributes: &AttributeSet) -> Result<PortFactory, EventCreateError> {
        let state = create_service(self.static_config(attributes.clone()), &self.node)?;
        PortFactory::new(Arc::new(state)).ok_or(EventCreateError::InternalFailure)
    }

    /// Open an existing service.
    pub fn open(self) -> Result<PortFactory, EventOpenError> {
        self.open_impl(&AttributeVerifier::new())
    }

    /// Open an existing service whose attributes satisfy `verifier`.
    pub fn open_with_attributes(
        self,
        verifier: &AttributeVerifier,
    ) -> Result<PortFactory, EventOpenError> {
        self.open_impl(verifier)
    }

    /// Create a new service. Fails if it already exists.
    pub fn create(self) -> Result<PortFactory, EventCreateError> {
        self.create_impl(&AttributeSet::new())
    }

    /// Create a new service carrying the attributes of `specifier`.
    pub fn create_with_attributes(
        self,
        specifier: &AttributeSpecifier,
    ) -> Result<PortFactory, EventCreateError> {
        self.create_impl(specifier.attributes())
    }

    /// Open the service, or create it if it does not exist.
    pub fn open_or_create(self) -> Result<PortFactory, EventOpenOrCreateError> {
        self.open_or_create_with_attributes(&AttributeVerifier::new())
    }

    /// Open the service if its attributes satisfy `verifier`, or create it
    /// with the attributes `verifier` requires.
    pub fn open_or_create_with_attributes(
        self,
        verifier: &AttributeVerifier,
    ) -> Result<PortFactory, EventOpenOrCreateError> {
        open_or_create(
            &self.node,
            || self.open_impl(verifier),
            || self.create_impl(verifier.required_attributes()),
            |e| {
                matches!(
                    e,
                    EventOpenError::DoesNotExist
                        | EventOpenError::HangsInCreation
                        | EventOpenError::IsMarkedForDestruction
                )
            },
            |e| {
                matches!(
                    e,
                    EventCreateError::AlreadyExists
                        | EventCreateError::IsBeingCreatedByAnotherInstance
                )
            },
        )
        .map_err(Into::into)
    }
}
