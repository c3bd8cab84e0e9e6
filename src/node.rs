// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Nodes: the per-process entry point that owns service handles.
//
// Every node is listed in the shared registry of its config prefix together
// with its pid, so other processes can tell live nodes from dead ones.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::identity::NodeId;
use crate::platform;
use crate::semantic_string::semantic_string;
use crate::service::builder::Builder;
use crate::service::registry::{NodeRecord, Registry, MAX_NODE_NAME_LEN};
use crate::service::reclaim_abandoned_services;
use crate::service::service_name::ServiceName;
use crate::signal::{self, SignalHandlingMode, SignalState};
use crate::CallbackProgression;

semantic_string!(
    /// Human readable node name. May be empty; need not be unique.
    NodeName,
    max = MAX_NODE_NAME_LEN,
    allow_empty = true
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NodeCreationFailure {
    #[error("insufficient permissions to create the node")]
    InsufficientPermissions,
    #[error("the node registry is full")]
    ExceedsMaxNumberOfNodes,
    #[error("internal failure while creating the node")]
    InternalError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NodeListFailure {
    #[error("insufficient permissions to read the node registry")]
    InsufficientPermissions,
    #[error("internal failure while reading the node registry")]
    InternalError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NodeWaitFailure {
    #[error("the process received a termination request")]
    TerminationRequest,
    #[error("the wait was interrupted by a signal")]
    Interrupt,
}

fn list_failure_from_io(e: io::Error) -> NodeListFailure {
    match e.kind() {
        io::ErrorKind::PermissionDenied => NodeListFailure::InsufficientPermissions,
        _ => NodeListFailure::InternalError,
    }
}

/// A node as seen in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeView {
    id: NodeId,
    pid: i32,
    name: NodeName,
}

impl NodeView {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Process that owns the node.
    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn name(&self) -> &NodeName {
        &self.name
    }
}

/// Liveness of a node found in the registry or on a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Alive(NodeView),
    /// The owning process is gone; its resources can be cleaned up.
    Dead(NodeView),
    /// Registered on a service but missing from the registry.
    Inaccessible(NodeId),
}

impl NodeState {
    pub(crate) fn from_record(record: &NodeRecord) -> Self {
        let view = NodeView {
            id: record.node_id,
            pid: record.pid,
            // registry names were validated on the way in
            name: NodeName::new(&record.name).unwrap_or_else(|_| NodeName(String::new())),
        };
        if platform::is_pid_alive(record.pid) {
            Self::Alive(view)
        } else {
            Self::Dead(view)
        }
    }

    pub fn id(&self) -> NodeId {
        match self {
            Self::Alive(v) | Self::Dead(v) => v.id,
            Self::Inaccessible(id) => *id,
        }
    }
}

/// Process-local state shared by a node and every service it opened.
pub(crate) struct NodeShared {
    id: NodeId,
    name: NodeName,
    config: Config,
    registry: Registry,
    signal_handling_mode: SignalHandlingMode,
}

impl NodeShared {
    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl fmt::Debug for NodeShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeShared")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("prefix", &self.config.global.prefix)
            .finish()
    }
}

impl Drop for NodeShared {
    fn drop(&mut self) {
        self.registry.remove_node(self.id);
        log::debug!("node {} ({}) removed", self.id, self.name);
    }
}

/// Builds a [`Node`].
#[derive(Debug, Default)]
pub struct NodeBuilder {
    name: Option<NodeName>,
    config: Option<Config>,
    signal_handling_mode: SignalHandlingMode,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, value: &NodeName) -> Self {
        self.name = Some(value.clone());
        self
    }

    /// Config the node and all its services use. Defaults to
    /// [`Config::global_config`].
    pub fn config(mut self, value: &Config) -> Self {
        self.config = Some(value.clone());
        self
    }

    pub fn signal_handling_mode(mut self, value: SignalHandlingMode) -> Self {
        self.signal_handling_mode = value;
        self
    }

    pub fn create(self) -> Result<Node, NodeCreationFailure> {
        let config = self
            .config
            .unwrap_or_else(|| Config::global_config().clone());
        let name = self.name.unwrap_or_else(|| NodeName(String::new()));

        let registry = Registry::open(&config).map_err(|e| {
            log::error!("unable to open node registry of prefix {}: {e}", config.global.prefix);
            match e.kind() {
                io::ErrorKind::PermissionDenied => NodeCreationFailure::InsufficientPermissions,
                _ => NodeCreationFailure::InternalError,
            }
        })?;

        let id = NodeId::new();
        if !registry.add_node(id, name.as_str()) {
            log::warn!("node registry of prefix {} is full", config.global.prefix);
            return Err(NodeCreationFailure::ExceedsMaxNumberOfNodes);
        }
        if self.signal_handling_mode == SignalHandlingMode::HandleTerminationRequests {
            signal::install_handlers();
        }
        log::debug!("node {id} ({name}) created");

        Ok(Node {
            shared: Arc::new(NodeShared {
                id,
                name,
                config,
                registry,
                signal_handling_mode: self.signal_handling_mode,
            }),
        })
    }
}

/// Entry point of a process into the middleware.
///
/// Services opened through a node keep a reference to it, so the node stays
/// registered until its last service handle and port are gone.
#[derive(Debug)]
pub struct Node {
    shared: Arc<NodeShared>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.shared.id
    }

    pub fn name(&self) -> &NodeName {
        &self.shared.name
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn signal_handling_mode(&self) -> SignalHandlingMode {
        self.shared.signal_handling_mode
    }

    /// Start building a service named `name`.
    pub fn service_builder(&self, name: &ServiceName) -> Builder {
        Builder::new(name, Arc::clone(&self.shared))
    }

    /// Sleep for `cycle_time`, then report a pending termination request or
    /// interrupt.
    pub fn wait(&self, cycle_time: Duration) -> Result<(), NodeWaitFailure> {
        let mode = self.shared.signal_handling_mode;
        let report = |state| match state {
            SignalState::None => Ok(()),
            SignalState::Interrupt => Err(NodeWaitFailure::Interrupt),
            SignalState::TerminationRequest => Err(NodeWaitFailure::TerminationRequest),
        };
        report(signal::check(mode))?;
        std::thread::sleep(cycle_time);
        report(signal::check(mode))
    }

    /// Visit every node registered under `config` until the callback stops.
    pub fn list<F>(config: &Config, mut callback: F) -> Result<(), NodeListFailure>
    where
        F: FnMut(NodeState) -> CallbackProgression,
    {
        let registry = Registry::open(config).map_err(list_failure_from_io)?;
        for record in registry.nodes() {
            if callback(NodeState::from_record(&record)) == CallbackProgression::Stop {
                break;
            }
        }
        Ok(())
    }

    /// Remove registry entries of dead nodes, and services no live process
    /// holds any more. Returns how many dead nodes were removed.
    pub fn cleanup_dead_nodes(config: &Config) -> Result<usize, NodeListFailure> {
        let registry = Registry::open(config).map_err(list_failure_from_io)?;
        let removed = registry.remove_dead_nodes();
        for node in &removed {
            log::warn!("removed dead node {} ({}) of pid {}", node.node_id, node.name, node.pid);
        }
        let services = reclaim_abandoned_services(config, &registry);
        if services > 0 {
            log::warn!("removed {services} abandoned service(s)");
        }
        Ok(removed.len())
    }
}
