// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Services: named, typed channels discovered through shared memory.
//
// Every service owns two shared memory objects named after its `ServiceId`:
//
//   {prefix}{id}.s   immutable record (pattern, limits, types, attributes)
//   {prefix}{id}.d   live nodes and ports
//
// Neither is removed by the mapping counter. The node handle that drops the
// last registration marks the dynamic config for destruction and, still
// holding its lock, removes the registry entry, the static object and the
// dynamic object, in that order.

pub mod attribute;
pub mod builder;
pub mod event;
pub mod publish_subscribe;
pub mod service_name;
pub mod static_config;

pub(crate) mod dynamic_config;
pub(crate) mod registry;
pub(crate) mod static_segment;

use std::fmt;
use std::io;
use std::sync::Arc;

use crate::config::Config;
use crate::data_segment::DataSegment;
use crate::identity::UniquePortId;
use crate::node::{NodeShared, NodeState};
use crate::port::listener::remove_socket_file;
use crate::shm::ShmHandle;
use crate::shm_name::{self, fnv1a_64, to_hex};
use crate::CallbackProgression;

use dynamic_config::{DeadEntries, DynamicConfig, Liveness, PortSide};
use registry::Registry;
use service_name::ServiceName;
use static_config::StaticConfig;
use static_segment::{StaticReadError, StaticSegment, StaticState};

pub use dynamic_config::DynamicDetails;

/// How ports of a service communicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MessagingPattern {
    PublishSubscribe = 0,
    Event = 1,
}

impl MessagingPattern {
    pub(crate) fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::PublishSubscribe),
            1 => Some(Self::Event),
            _ => None,
        }
    }
}

impl fmt::Display for MessagingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PublishSubscribe => f.write_str("PublishSubscribe"),
            Self::Event => f.write_str("Event"),
        }
    }
}

/// Stable id of a service, derived from its name and messaging pattern.
///
/// Every process computes the same id for the same pair, which is what lets
/// them find each other's shared memory objects.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(u64);

impl ServiceId {
    pub fn new(name: &ServiceName, pattern: MessagingPattern) -> Self {
        let mut bytes = Vec::with_capacity(name.len() + 1);
        bytes.push(pattern as u8);
        bytes.extend_from_slice(name.as_bytes());
        Self(fnv1a_64(&bytes))
    }

    pub(crate) fn from_value(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Fixed-width hex form used in shared memory object names.
    pub fn as_hex(&self) -> String {
        to_hex(self.0)
    }
}

impl fmt::Debug for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceId({})", self.as_hex())
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_hex())
    }
}

/// Everything known about a service at one point in time.
#[derive(Debug, Clone)]
pub struct ServiceDetails {
    pub static_details: StaticConfig,
    pub dynamic_details: DynamicDetails,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ServiceDetailsError {
    #[error("insufficient permissions to read the service")]
    InsufficientPermissions,
    #[error("the service is in a corrupted state")]
    ServiceInCorruptedState,
    #[error("the service was created by an incompatible version")]
    VersionMismatch,
    #[error("internal failure while reading the service")]
    InternalError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ServiceListError {
    #[error("insufficient permissions to list services")]
    InsufficientPermissions,
    #[error("internal failure while listing services")]
    InternalError,
}

impl From<StaticReadError> for ServiceDetailsError {
    fn from(e: StaticReadError) -> Self {
        match e {
            StaticReadError::Corrupted => Self::ServiceInCorruptedState,
            StaticReadError::IncompatibleVersion => Self::VersionMismatch,
            StaticReadError::InsufficientPermissions => Self::InsufficientPermissions,
            StaticReadError::Internal => Self::InternalError,
        }
    }
}

fn details_by_id(
    config: &Config,
    id: ServiceId,
) -> Result<Option<ServiceDetails>, ServiceDetailsError> {
    let prefix = &config.global.prefix;
    let hex = id.as_hex();
    let static_details = match StaticSegment::inspect(&shm_name::static_config(prefix, &hex))? {
        StaticState::Ready(_, static_config) => static_config,
        StaticState::Missing | StaticState::InCreation { .. } => return Ok(None),
    };

    let dynamic = match DynamicConfig::open(&shm_name::dynamic_config(prefix, &hex)) {
        Ok(d) => d,
        Err(e) => {
            return match e.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::WouldBlock => Ok(None),
                io::ErrorKind::PermissionDenied => Err(ServiceDetailsError::InsufficientPermissions),
                io::ErrorKind::InvalidData => Err(ServiceDetailsError::ServiceInCorruptedState),
                _ => Err(ServiceDetailsError::InternalError),
            }
        }
    };
    if dynamic.is_marked_for_destruction() {
        return Ok(None);
    }

    Ok(Some(ServiceDetails {
        static_details,
        dynamic_details: dynamic.details(),
    }))
}

/// `true` when a usable service with this name and pattern exists.
///
/// Services that are still being created or already being removed do not
/// count.
pub fn does_exist(
    name: &ServiceName,
    config: &Config,
    pattern: MessagingPattern,
) -> Result<bool, ServiceDetailsError> {
    Ok(details(name, config, pattern)?.is_some())
}

/// Static and dynamic details of one service, `None` when it does not exist.
pub fn details(
    name: &ServiceName,
    config: &Config,
    pattern: MessagingPattern,
) -> Result<Option<ServiceDetails>, ServiceDetailsError> {
    let details = details_by_id(config, ServiceId::new(name, pattern))?;
    // a different name with the same hash is a different service
    Ok(details.filter(|d| d.static_details.name() == name))
}

/// Visit every service registered under `config` until the callback stops.
pub fn list<F>(config: &Config, mut callback: F) -> Result<(), ServiceListError>
where
    F: FnMut(ServiceDetails) -> CallbackProgression,
{
    let registry = Registry::open(config).map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => ServiceListError::InsufficientPermissions,
        _ => ServiceListError::InternalError,
    })?;

    for entry in registry.services() {
        let details = match details_by_id(config, entry.service_id) {
            Ok(Some(d)) => d,
            Ok(None) => continue,
            Err(e) => {
                log::debug!("skipping service {} while listing: {e}", entry.name);
                continue;
            }
        };
        if callback(details) == CallbackProgression::Stop {
            break;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared service handle
// ---------------------------------------------------------------------------

/// One node's registration on a service, shared by a port factory and all
/// ports created from it.
pub(crate) struct ServiceState {
    pub(crate) static_config: StaticConfig,
    pub(crate) dynamic: DynamicConfig,
    pub(crate) node: Arc<NodeShared>,
    _static_segment: StaticSegment,
}

impl ServiceState {
    pub(crate) fn new(
        node: Arc<NodeShared>,
        static_config: StaticConfig,
        dynamic: DynamicConfig,
        static_segment: StaticSegment,
    ) -> Self {
        Self {
            static_config,
            dynamic,
            node,
            _static_segment: static_segment,
        }
    }

    pub(crate) fn config(&self) -> &Config {
        self.node.config()
    }

    pub(crate) fn prefix(&self) -> &str {
        &self.node.config().global.prefix
    }

    pub(crate) fn id_hex(&self) -> String {
        self.static_config.service_id().as_hex()
    }

    /// Visit every node registered on this service.
    pub(crate) fn nodes<F>(&self, mut callback: F)
    where
        F: FnMut(NodeState) -> CallbackProgression,
    {
        let known = self.node.registry().nodes();
        for id in self.dynamic.node_ids() {
            let state = match known.iter().find(|n| n.node_id == id) {
                Some(record) => NodeState::from_record(record),
                None => NodeState::Inaccessible(id),
            };
            if callback(state) == CallbackProgression::Stop {
                break;
            }
        }
    }

    /// Purge ports of dead processes and remove what they left behind.
    pub(crate) fn purge_dead_ports(&self) {
        let dead = self.dynamic.purge_dead();
        if dead.nodes > 0 || !dead.producers.is_empty() || !dead.consumers.is_empty() {
            log::warn!(
                "service {}: removed {} dead node(s), {} producer(s), {} consumer(s)",
                self.static_config.name(),
                dead.nodes,
                dead.producers.len(),
                dead.consumers.len()
            );
            remove_dead_port_resources(
                self.config(),
                &self.static_config,
                Some(&self.dynamic),
                &dead,
            );
        }
    }
}

impl fmt::Debug for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceState")
            .field("name", self.static_config.name())
            .field("service_id", &self.static_config.service_id())
            .field("node", &self.node.id())
            .finish()
    }
}

impl Drop for ServiceState {
    fn drop(&mut self) {
        let config = self.node.config();
        let id = self.static_config.service_id();
        let removed = self.dynamic.deregister_node(self.node.id(), || {
            remove_service_objects(config, id, self.node.registry());
        });
        if removed {
            log::debug!("service {} removed", self.static_config.name());
        }
    }
}

/// Remove the registry entry and both service objects. Callers hold the
/// dynamic config lock and have marked the service for destruction.
pub(crate) fn remove_service_objects(config: &Config, id: ServiceId, registry: &Registry) {
    let prefix = &config.global.prefix;
    let hex = id.as_hex();
    registry.remove_service(id);
    ShmHandle::unlink_by_name(&shm_name::static_config(prefix, &hex));
    ShmHandle::unlink_by_name(&shm_name::dynamic_config(prefix, &hex));
}

/// Unlink the shared memory and sockets owned by ports whose process died.
///
/// `dynamic` supplies the surviving counterpart ports; pass `None` while its
/// lock is held, when every port is known to be dead.
pub(crate) fn remove_dead_port_resources(
    config: &Config,
    static_config: &StaticConfig,
    dynamic: Option<&DynamicConfig>,
    dead: &DeadEntries,
) {
    let prefix = &config.global.prefix;
    let hex = static_config.service_id().as_hex();

    match static_config.messaging_pattern() {
        MessagingPattern::PublishSubscribe => {
            let alive = |side| dynamic.map(|d| d.ports(side)).unwrap_or_default();
            let producers: Vec<UniquePortId> = alive(PortSide::Producer)
                .iter()
                .chain(dead.producers.iter())
                .map(|p| p.port_id)
                .collect();
            let consumers: Vec<UniquePortId> = alive(PortSide::Consumer)
                .iter()
                .chain(dead.consumers.iter())
                .map(|p| p.port_id)
                .collect();

            for publisher in &dead.producers {
                DataSegment::remove_all(prefix, &hex, publisher.port_id);
                for subscriber in &consumers {
                    ShmHandle::unlink_by_name(&shm_name::connection(
                        prefix,
                        &hex,
                        &publisher.port_id.to_hex(),
                        &subscriber.to_hex(),
                    ));
                }
            }
            for subscriber in &dead.consumers {
                for publisher in &producers {
                    ShmHandle::unlink_by_name(&shm_name::connection(
                        prefix,
                        &hex,
                        &publisher.to_hex(),
                        &subscriber.port_id.to_hex(),
                    ));
                }
            }
        }
        MessagingPattern::Event => {
            for listener in &dead.consumers {
                let lid = listener.port_id.to_hex();
                ShmHandle::unlink_by_name(&shm_name::listener_events(prefix, &hex, &lid));
                let path = config
                    .global
                    .root_path
                    .join(shm_name::listener_socket(prefix, &lid));
                if remove_socket_file(&path) {
                    log::debug!("removed socket of dead listener {lid}");
                }
            }
        }
    }
}

/// Remove services under `config` that no live process holds any more.
/// Returns the number of services removed.
pub(crate) fn reclaim_abandoned_services(config: &Config, registry: &Registry) -> usize {
    let prefix = &config.global.prefix;
    let mut reclaimed = 0;

    for entry in registry.services() {
        let hex = entry.service_id.as_hex();
        let static_config = match StaticSegment::inspect(&shm_name::static_config(prefix, &hex)) {
            Ok(StaticState::Ready(_, c)) => c,
            _ => continue,
        };
        let dynamic = match DynamicConfig::open(&shm_name::dynamic_config(prefix, &hex)) {
            Ok(d) => d,
            Err(_) => continue,
        };
        let (liveness, dead) = dynamic.reclaim_if_abandoned(|dead| {
            remove_dead_port_resources(config, &static_config, None, dead);
            remove_service_objects(config, entry.service_id, registry);
        });
        match liveness {
            Liveness::Reclaimed => {
                log::warn!("reclaimed abandoned service {}", entry.name);
                reclaimed += 1;
            }
            Liveness::InUse => {
                remove_dead_port_resources(config, &static_config, Some(&dynamic), &dead);
            }
            Liveness::MarkedForDestruction => {}
        }
    }
    reclaimed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_id_depends_on_name_and_pattern() {
        let a = ServiceName::new("a").unwrap();
        let b = ServiceName::new("b").unwrap();
        let ps = MessagingPattern::PublishSubscribe;
        assert_eq!(ServiceId::new(&a, ps), ServiceId::new(&a, ps));
        assert_ne!(ServiceId::new(&a, ps), ServiceId::new(&b, ps));
        assert_ne!(ServiceId::new(&a, ps), ServiceId::new(&a, MessagingPattern::Event));
        assert_eq!(ServiceId::new(&a, ps).as_hex().len(), 16);
    }

    #[test]
    fn pattern_round_trips_through_u8() {
        for p in [MessagingPattern::PublishSubscribe, MessagingPattern::Event] {
            assert_eq!(MessagingPattern::from_u8(p as u8), Some(p));
        }
        assert_eq!(MessagingPattern::from_u8(7), None);
    }
}
