// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Handle to an opened event service.

use std::fmt;
use std::sync::Arc;

use crate::identity::{NodeId, UniquePortId};
use crate::node::NodeState;
use crate::port::listener::ListenerBuilder;
use crate::port::notifier::NotifierBuilder;
use crate::service::attribute::AttributeSet;
use crate::service::dynamic_config::PortSide;
use crate::service::service_name::ServiceName;
use crate::service::static_config::EventConfig;
use crate::service::{ServiceId, ServiceState};
use crate::CallbackProgression;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifierDetails {
    pub notifier_id: UniquePortId,
    pub node_id: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerDetails {
    pub listener_id: UniquePortId,
    pub node_id: NodeId,
}

/// Live view of the ports attached to an event service.
pub struct DynamicConfigView<'a> {
    service: &'a ServiceState,
}

impl DynamicConfigView<'_> {
    pub fn number_of_notifiers(&self) -> usize {
        self.service.dynamic.ports(PortSide::Producer).len()
    }

    pub fn number_of_listeners(&self) -> usize {
        self.service.dynamic.ports(PortSide::Consumer).len()
    }

    pub fn list_notifiers<F>(&self, mut callback: F)
    where
        F: FnMut(&NotifierDetails) -> CallbackProgression,
    {
        for n in self.service.dynamic.ports(PortSide::Producer) {
            let details = NotifierDetails {
                notifier_id: n.port_id,
                node_id: n.node_id,
            };
            if callback(&details) == CallbackProgression::Stop {
                break;
            }
        }
    }

    pub fn list_listeners<F>(&self, mut callback: F)
    where
        F: FnMut(&ListenerDetails) -> CallbackProgression,
    {
        for l in self.service.dynamic.ports(PortSide::Consumer) {
            let details = ListenerDetails {
                listener_id: l.port_id,
                node_id: l.node_id,
            };
            if callback(&details) == CallbackProgression::Stop {
                break;
            }
        }
    }
}

/// An opened event service. Creates notifiers and listeners.
pub struct PortFactory {
    service: Arc<ServiceState>,
    config: EventConfig,
}

impl fmt::Debug for PortFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("event::PortFactory")
            .field("name", self.service.static_config.name())
            .field("service_id", &self.service.static_config.service_id())
            .field("config", &self.config)
            .finish()
    }
}

impl PortFactory {
    /// `None` when `service` is not an event service.
    pub(crate) fn new(service: Arc<ServiceState>) -> Option<Self> {
        let config = service.static_config.event()?.clone();
        Some(Self { service, config })
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

    pub fn static_config(&self) -> &EventConfig {
        &self.config
    }

    pub fn dynamic_config(&self) -> DynamicConfigView<'_> {
        DynamicConfigView {
            service: &self.service,
        }
    }

    pub fn nodes<F>(&self, callback: F)
    where
        F: FnMut(NodeState) -> CallbackProgression,
    {
        self.service.nodes(callback)
    }

    pub fn notifier_builder(&self) -> NotifierBuilder {
        NotifierBuilder::new(Arc::clone(&self.service))
    }

    pub fn listener_builder(&self) -> ListenerBuilder {
        ListenerBuilder::new(Arc::clone(&self.service))
    }
}
