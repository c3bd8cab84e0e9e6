// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Service creation and opening, shared by every messaging pattern.
//
// Creation order:
//
//   1. static object (exclusive create, not yet ready)
//   2. dynamic object (exclusive create)
//   3. register the creating node
//   4. registry entry
//   5. mark the static object ready
//
// An opener that finds the static object not ready waits up to the
// configured creation timeout. A creator that finds leftovers of a service
// whose holders all died removes them and starts over.

pub mod event;
pub mod publish_subscribe;

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::node::NodeShared;
use crate::payload::PayloadType;
use crate::service::dynamic_config::{DynamicConfig, Liveness, RegisterNodeError};
use crate::service::service_name::ServiceName;
use crate::service::static_config::StaticConfig;
use crate::service::static_segment::{StaticReadError, StaticSegment, StaticState};
use crate::service::{
    remove_dead_port_resources, remove_service_objects, MessagingPattern, ServiceId, ServiceState,
};
use crate::shm::ShmHandle;
use crate::shm_name;

const RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Selects the messaging pattern of a service.
#[derive(Debug)]
pub struct Builder {
    name: ServiceName,
    node: Arc<NodeShared>,
}

impl Builder {
    pub(crate) fn new(name: &ServiceName, node: Arc<NodeShared>) -> Self {
        Self {
            name: name.clone(),
            node,
        }
    }

    /// Publish-subscribe service carrying `Payload`.
    pub fn publish_subscribe<Payload: ?Sized + PayloadType>(
        self,
    ) -> publish_subscribe::Builder<Payload, ()> {
        publish_subscribe::Builder::new(self.name, self.node)
    }

    /// Event service.
    pub fn event(self) -> event::Builder {
        event::Builder::new(self.name, self.node)
    }
}

// ---------------------------------------------------------------------------
// Pattern independent failures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenFailure {
    DoesNotExist,
    HangsInCreation,
    IsMarkedForDestruction,
    ExceedsMaxNumberOfNodes,
    ServiceInCorruptedState,
    IncompatibleVersion,
    InsufficientPermissions,
    InternalFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CreateFailure {
    AlreadyExists,
    IsBeingCreatedByAnotherInstance,
    HangsInCreation,
    OldConnectionsStillActive,
    ServiceInCorruptedState,
    InsufficientPermissions,
    InternalFailure,
}

impl From<StaticReadError> for OpenFailure {
    fn from(e: StaticReadError) -> Self {
        match e {
            StaticReadError::Corrupted => Self::ServiceInCorruptedState,
            StaticReadError::IncompatibleVersion => Self::IncompatibleVersion,
            StaticReadError::InsufficientPermissions => Self::InsufficientPermissions,
            StaticReadError::Internal => Self::InternalFailure,
        }
    }
}

impl From<StaticReadError> for CreateFailure {
    fn from(e: StaticReadError) -> Self {
        match e {
            StaticReadError::Corrupted | StaticReadError::IncompatibleVersion => {
                Self::ServiceInCorruptedState
            }
            StaticReadError::InsufficientPermissions => Self::InsufficientPermissions,
            StaticReadError::Internal => Self::InternalFailure,
        }
    }
}

fn create_failure_from_io(e: io::Error) -> CreateFailure {
    match e.kind() {
        io::ErrorKind::PermissionDenied => CreateFailure::InsufficientPermissions,
        io::ErrorKind::AlreadyExists => CreateFailure::AlreadyExists,
        _ => CreateFailure::InternalFailure,
    }
}

/// Result of `open_or_create` before it is mapped to a pattern's error type.
pub(crate) enum OpenOrCreateFailure<O, C> {
    Open(O),
    Create(C),
    SystemInFlux,
}

// ---------------------------------------------------------------------------
// Open
// ---------------------------------------------------------------------------

/// Open the service `name`, check it with `verify` and register `node` on it.
pub(crate) fn open_service<E, V>(
    name: &ServiceName,
    pattern: MessagingPattern,
    node: &Arc<NodeShared>,
    verify: V,
) -> Result<ServiceState, E>
where
    E: From<OpenFailure>,
    V: FnOnce(&StaticConfig) -> Result<(), E>,
{
    let config = node.config();
    let prefix = &config.global.prefix;
    let hex = ServiceId::new(name, pattern).as_hex();
    let static_name = shm_name::static_config(prefix, &hex);
    let deadline = Instant::now() + config.global.service.creation_timeout;

    let (static_segment, static_config) = loop {
        match StaticSegment::inspect(&static_name).map_err(OpenFailure::from)? {
            StaticState::Missing => return Err(OpenFailure::DoesNotExist.into()),
            StaticState::InCreation { stale } => {
                if stale || Instant::now() >= deadline {
                    log::debug!("service {name} hangs in creation (stale: {stale})");
                    return Err(OpenFailure::HangsInCreation.into());
                }
                std::thread::sleep(RETRY_INTERVAL);
            }
            StaticState::Ready(segment, static_config) => break (segment, static_config),
        }
    };

    // same id, different name: not the service we are looking for
    if static_config.name() != name {
        return Err(OpenFailure::DoesNotExist.into());
    }
    verify(&static_config)?;

    let dynamic = DynamicConfig::open(&shm_name::dynamic_config(prefix, &hex)).map_err(|e| {
        match e.kind() {
            io::ErrorKind::NotFound => OpenFailure::DoesNotExist,
            io::ErrorKind::PermissionDenied => OpenFailure::InsufficientPermissions,
            io::ErrorKind::WouldBlock | io::ErrorKind::InvalidData => {
                OpenFailure::ServiceInCorruptedState
            }
            _ => {
                log::error!("unable to open dynamic config of service {name}: {e}");
                OpenFailure::InternalFailure
            }
        }
    })?;
    dynamic.register_node(node.id()).map_err(|e| match e {
        RegisterNodeError::MarkedForDestruction => OpenFailure::IsMarkedForDestruction,
        RegisterNodeError::ExceedsMaxNumberOfNodes => OpenFailure::ExceedsMaxNumberOfNodes,
    })?;

    let state = ServiceState::new(Arc::clone(node), static_config, dynamic, static_segment);
    state.purge_dead_ports();
    log::debug!("service {name} opened");
    Ok(state)
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// Remove a ready service whose holders all died. Returns `true` when the
/// name is free (or about to be) and creation should be retried.
fn reclaim_ready_service(
    node: &NodeShared,
    existing: &StaticConfig,
    static_name: &str,
    dynamic_name: &str,
) -> bool {
    let config = node.config();
    match DynamicConfig::open(dynamic_name) {
        Ok(dynamic) => {
            let (liveness, dead) = dynamic.reclaim_if_abandoned(|dead| {
                remove_dead_port_resources(config, existing, None, dead);
                remove_service_objects(config, existing.service_id(), node.registry());
            });
            match liveness {
                Liveness::InUse => {
                    remove_dead_port_resources(config, existing, Some(&dynamic), &dead);
                    false
                }
                Liveness::Reclaimed => {
                    log::warn!("removed abandoned service {}", existing.name());
                    true
                }
                Liveness::MarkedForDestruction => true,
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            // a teardown that died between its two unlinks
            log::warn!("removing static config of service {} without dynamic config", existing.name());
            ShmHandle::unlink_by_name(static_name);
            true
        }
        Err(e) => {
            log::debug!("dynamic config of service {} not usable: {e}", existing.name());
            false
        }
    }
}

/// Create the service described by `static_config` and register `node` on it.
pub(crate) fn create_service(
    static_config: StaticConfig,
    node: &Arc<NodeShared>,
) -> Result<ServiceState, CreateFailure> {
    let config = node.config();
    let prefix = &config.global.prefix;
    let id = static_config.service_id();
    let hex = id.as_hex();
    let name = static_config.name().clone();
    let static_name = shm_name::static_config(prefix, &hex);
    let dynamic_name = shm_name::dynamic_config(prefix, &hex);
    let record = static_config.encode();
    let deadline = Instant::now() + config.global.service.creation_timeout;

    let static_segment = loop {
        match StaticSegment::create(&static_name, &record) {
            Ok(segment) => break segment,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                log::error!("unable to create static config of service {name}: {e}");
                return Err(create_failure_from_io(e));
            }
        }

        match StaticSegment::inspect(&static_name)? {
            StaticState::Missing => {}
            StaticState::InCreation { stale: true } => {
                log::warn!("removing service {name} left behind by a crashed creator");
                ShmHandle::unlink_by_name(&static_name);
                ShmHandle::unlink_by_name(&dynamic_name);
            }
            StaticState::InCreation { stale: false } => {
                return Err(CreateFailure::IsBeingCreatedByAnotherInstance)
            }
            StaticState::Ready(_, existing) => {
                if existing.name() != &name
                    || !reclaim_ready_service(node, &existing, &static_name, &dynamic_name)
                {
                    return Err(CreateFailure::AlreadyExists);
                }
            }
        }

        if Instant::now() >= deadline {
            return Err(CreateFailure::HangsInCreation);
        }
        std::thread::sleep(RETRY_INTERVAL);
    };

    // from here on the static object is ours and must go on every failure
    let fail = |e: CreateFailure| {
        static_segment.unlink();
        e
    };

    let dynamic = loop {
        match DynamicConfig::create(
            &dynamic_name,
            static_config.max_nodes(),
            static_config.max_producers(),
            static_config.max_consumers(),
        ) {
            Ok(dynamic) => break dynamic,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                log::error!("unable to create dynamic config of service {name}: {e}");
                return Err(fail(create_failure_from_io(e)));
            }
        }

        // only the owner of the static object creates the dynamic one, so a
        // leftover can be removed once nobody alive holds it
        match DynamicConfig::open(&dynamic_name) {
            Ok(old) => {
                let (liveness, dead) = old.reclaim_if_abandoned(|_| {});
                if liveness == Liveness::InUse {
                    log::warn!("service {name}: old connections are still active");
                    return Err(fail(CreateFailure::OldConnectionsStillActive));
                }
                log::warn!(
                    "service {name}: removing old dynamic config ({} dead port(s))",
                    dead.producers.len() + dead.consumers.len()
                );
                ShmHandle::unlink_by_name(&dynamic_name);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                log::warn!("service {name}: removing unusable dynamic config: {e}");
                ShmHandle::unlink_by_name(&dynamic_name);
            }
        }

        if Instant::now() >= deadline {
            return Err(fail(CreateFailure::HangsInCreation));
        }
        std::thread::sleep(RETRY_INTERVAL);
    };

    if let Err(e) = dynamic.register_node(node.id()) {
        log::error!("service {name}: creator cannot register: {e:?}");
        dynamic.unlink();
        return Err(fail(CreateFailure::InternalFailure));
    }
    if !node
        .registry()
        .add_service(id, static_config.messaging_pattern(), name.as_str())
    {
        log::warn!("service registry is full; {name} will not be listed");
    }
    static_segment.mark_ready();
    log::debug!("service {name} created");

    Ok(ServiceState::new(
        Arc::clone(node),
        static_config,
        dynamic,
        static_segment,
    ))
}

// ---------------------------------------------------------------------------
// Open or create
// ---------------------------------------------------------------------------

/// Alternate between `open` and `create` until one succeeds, a failure is
/// final, or the creation timeout expires.
///
/// `may_create` decides which open failures lead to a create attempt;
/// `lost_race` decides which create failures lead to another open attempt.
pub(crate) fn open_or_create<T, O, C>(
    node: &NodeShared,
    mut open: impl FnMut() -> Result<T, O>,
    mut create: impl FnMut() -> Result<T, C>,
    may_create: impl Fn(&O) -> bool,
    lost_race: impl Fn(&C) -> bool,
) -> Result<T, OpenOrCreateFailure<O, C>> {
    let deadline = Instant::now() + node.config().global.service.creation_timeout;
    loop {
        match open() {
            Ok(service) => return Ok(service),
            Err(e) if may_create(&e) => {}
            Err(e) => return Err(OpenOrCreateFailure::Open(e)),
        }
        match create() {
            Ok(service) => return Ok(service),
            Err(e) if lost_race(&e) => {}
            Err(e) => return Err(OpenOrCreateFailure::Create(e)),
        }
        if Instant::now() >= deadline {
            return Err(OpenOrCreateFailure::SystemInFlux);
        }
        std::thread::sleep(RETRY_INTERVAL);
    }
}
