// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Handle to an opened publish-subscribe service.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::identity::{NodeId, UniquePortId};
use crate::node::NodeState;
use crate::payload::{PayloadType, ZeroCopySend};
use crate::port::publisher::PublisherBuilder;
use crate::port::subscriber::SubscriberBuilder;
use crate::service::attribute::AttributeSet;
use crate::service::dynamic_config::PortSide;
use crate::service::service_name::ServiceName;
use crate::service::static_config::PublishSubscribeConfig;
use crate::service::{ServiceId, ServiceState};
use crate::CallbackProgression;

/// A publisher currently attached to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherDetails {
    pub publisher_id: UniquePortId,
    pub node_id: NodeId,
}

/// A subscriber currently attached to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberDetails {
    pub subscriber_id: UniquePortId,
    pub node_id: NodeId,
    pub buffer_size: usize,
}

/// Live view of the ports attached to a publish-subscribe service.
pub struct DynamicConfigView<'a> {
    service: &'a ServiceState,
}

impl DynamicConfigView<'_> {
    pub fn number_of_publishers(&self) -> usize {
        self.service.dynamic.ports(PortSide::Producer).len()
    }

    pub fn number_of_subscribers(&self) -> usize {
        self.service.dynamic.ports(PortSide::Consumer).len()
    }

    pub fn list_publishers<F>(&self, mut callback: F)
    where
        F: FnMut(&PublisherDetails) -> CallbackProgression,
    {
        for p in self.service.dynamic.ports(PortSide::Producer) {
            let details = PublisherDetails {
                publisher_id: p.port_id,
                node_id: p.node_id,
            };
            if callback(&details) == CallbackProgression::Stop {
                break;
            }
        }
    }

    pub fn list_subscribers<F>(&self, mut callback: F)
    where
        F: FnMut(&SubscriberDetails) -> CallbackProgression,
    {
        for s in self.service.dynamic.ports(PortSide::Consumer) {
            let details = SubscriberDetails {
                subscriber_id: s.port_id,
                node_id: s.node_id,
                buffer_size: s.buffer_size,
            };
            if callback(&details) == CallbackProgression::Stop {
                break;
            }
        }
    }
}

/// An opened publish-subscribe service. Creates publishers and subscribers
/// and keeps the service alive while it or any of its ports exist.
pub struct PortFactory<Payload: ?Sized, UserHeader> {
    service: Arc<ServiceState>,
    config: PublishSubscribeConfig,
    _marker: PhantomData<(*const Payload, UserHeader)>,
}

impl<Payload: ?Sized, UserHeader> fmt::Debug for PortFactory<Payload, UserHeader> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("publish_subscribe::PortFactory")
            .field("name", self.service.static_config.name())
            .field("service_id", &self.service.static_config.service_id())
            .field("config", &self.config)
            .finish()
    }
}

impl<Payload: ?Sized + PayloadType, UserHeader: ZeroCopySend> PortFactory<Payload, UserHeader> {
    /// `None` when `service` is not a publish-subscribe service.
    pub(crate) fn new(service: Arc<ServiceState>) -> Option<Self> {
        let config = service.static_config.publish_subscribe()?.clone();
        Some(Self {
            service,
            config,
            _marker: PhantomData,
        })
    }

    pub fn name(&self) -> &ServiceName {
        self.service.static_config.name()
    }

    pub fn service_id(&self) -> ServiceId {
        self.service.static_config.service_id()
    }

    pub fn attributes(&self) -> &AttributeSet {
        self.service.static_config.attributes()
    }

    /// Settings fixed when the service was created.
    pub fn static_config(&self) -> &PublishSubscribeConfig {
        &self.config
    }

    pub fn dynamic_config(&self) -> DynamicConfigView<'_> {
        DynamicConfigView {
            service: &self.service,
        }
    }

    /// Visit the nodes that have this service open.
    pub fn nodes<F>(&self, callback: F)
    where
        F: FnMut(NodeState) -> CallbackProgression,
    {
        self.service.nodes(callback)
    }

    pub fn subscriber_builder(&self) -> SubscriberBuilder<Payload, UserHeader> {
        SubscriberBuilder::new(Arc::clone(&self.service))
    }
}

impl<Payload: ?Sized + PayloadType, UserHeader: ZeroCopySend + Default>
    PortFactory<Payload, UserHeader>
{
    pub fn publisher_builder(&self) -> PublisherBuilder<Payload, UserHeader> {
        PublisherBuilder::new(Arc::clone(&self.service))
    }
}
