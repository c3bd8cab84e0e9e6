// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// SHM-backed registry of services and nodes.
//
// One segment per configuration prefix. Every process that opens a
// `Registry` with the same prefix sees the same services and nodes. The
// segment is created zero-filled on first use and unlinked when the last
// mapping goes away.

use std::io;

use crate::config::Config;
use crate::identity::{NodeId, UNIQUE_PORT_ID_LENGTH};
use crate::platform;
use crate::service::service_name::MAX_SERVICE_NAME_LENGTH;
use crate::service::{MessagingPattern, ServiceId};
use crate::shm::{ShmHandle, ShmOpenMode};
use crate::shm_name;
use crate::spin_lock::SpinLock;

pub(crate) const MAX_SERVICES: usize = 256;
pub(crate) const MAX_NODES: usize = 256;
pub(crate) const MAX_NODE_NAME_LEN: usize = 128;

// ---------------------------------------------------------------------------
// Shared memory layout
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Clone, Copy)]
struct ServiceEntry {
    active: u32,
    pattern: u32,
    service_id: u64,
    name_len: u32,
    name: [u8; MAX_SERVICE_NAME_LENGTH],
}

impl ServiceEntry {
    fn name_str(&self) -> &str {
        let len = (self.name_len as usize).min(MAX_SERVICE_NAME_LENGTH);
        std::str::from_utf8(&self.name[..len]).unwrap_or("")
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
struct NodeEntry {
    pid: i32,
    name_len: u32,
    node_id: [u8; UNIQUE_PORT_ID_LENGTH],
    name: [u8; MAX_NODE_NAME_LEN],
}

impl NodeEntry {
    fn active(&self) -> bool {
        self.pid > 0
    }

    fn name_str(&self) -> &str {
        let len = (self.name_len as usize).min(MAX_NODE_NAME_LEN);
        std::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    fn record(&self) -> Option<NodeRecord> {
        Some(NodeRecord {
            node_id: NodeId::from_bytes(self.node_id)?,
            pid: self.pid,
            name: self.name_str().to_owned(),
        })
    }
}

#[repr(C)]
struct RegistryData {
    lock: SpinLock,
    _reserved: u32,
    services: [ServiceEntry; MAX_SERVICES],
    nodes: [NodeEntry; MAX_NODES],
}

fn copy_str(dst: &mut [u8], src: &str) -> u32 {
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src.as_bytes()[..n]);
    dst[n..].fill(0);
    n as u32
}

// ---------------------------------------------------------------------------
// Records handed out to callers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServiceRecord {
    pub(crate) service_id: ServiceId,
    pub(crate) pattern: MessagingPattern,
    pub(crate) name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NodeRecord {
    pub(crate) node_id: NodeId,
    pub(crate) pid: i32,
    pub(crate) name: String,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub(crate) struct Registry {
    _shm: ShmHandle,
    data: *mut RegistryData,
}

// Safety: every access to `data` goes through the in-segment spin lock.
unsafe impl Send for Registry {}
unsafe impl Sync for Registry {}

impl Registry {
    /// Open or create the registry of `config`'s prefix.
    pub(crate) fn open(config: &Config) -> io::Result<Self> {
        let name = shm_name::registry(&config.global.prefix);
        let shm = ShmHandle::acquire(
            &name,
            std::mem::size_of::<RegistryData>(),
            ShmOpenMode::CreateOrOpen,
        )?;
        let data = shm.get() as *mut RegistryData;
        Ok(Self { _shm: shm, data })
    }

    fn with_locked<R>(&self, f: impl FnOnce(&mut RegistryData) -> R) -> R {
        let lock = unsafe { &(*self.data).lock };
        let _guard = lock.lock();
        f(unsafe { &mut *self.data })
    }

    // -----------------------------------------------------------------------
    // Services
    // -----------------------------------------------------------------------

    /// Add or refresh the entry of a service. Returns `false` when full.
    pub(crate) fn add_service(&self, id: ServiceId, pattern: MessagingPattern, name: &str) -> bool {
        self.with_locked(|reg| {
            let slot = reg
                .services
                .iter()
                .position(|e| e.active != 0 && e.service_id == id.value())
                .or_else(|| reg.services.iter().position(|e| e.active == 0));
            let Some(i) = slot else {
                return false;
            };
            let e = &mut reg.services[i];
            e.service_id = id.value();
            e.pattern = pattern as u32;
            e.name_len = copy_str(&mut e.name, name);
            e.active = 1;
            true
        })
    }

    pub(crate) fn remove_service(&self, id: ServiceId) -> bool {
        self.with_locked(|reg| {
            for e in reg.services.iter_mut() {
                if e.active != 0 && e.service_id == id.value() {
                    e.active = 0;
                    e.name_len = 0;
                    return true;
                }
            }
            false
        })
    }

    pub(crate) fn services(&self) -> Vec<ServiceRecord> {
        self.with_locked(|reg| {
            reg.services
                .iter()
                .filter(|e| e.active != 0)
                .filter_map(|e| {
                    Some(ServiceRecord {
                        service_id: ServiceId::from_value(e.service_id),
                        pattern: MessagingPattern::from_u8(e.pattern as u8)?,
                        name: e.name_str().to_owned(),
                    })
                })
                .collect()
        })
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    /// Register a node of the calling process. Slots of dead processes are
    /// reused. Returns `false` when the table is full.
    pub(crate) fn add_node(&self, node_id: NodeId, name: &str) -> bool {
        self.add_node_as(node_id, name, platform::current_pid())
    }

    pub(crate) fn add_node_as(&self, node_id: NodeId, name: &str, pid: i32) -> bool {
        self.with_locked(|reg| {
            let slot = reg
                .nodes
                .iter()
                .position(|e| !e.active())
                .or_else(|| reg.nodes.iter().position(|e| !platform::is_pid_alive(e.pid)));
            let Some(i) = slot else {
                return false;
            };
            let e = &mut reg.nodes[i];
            e.pid = pid;
            e.node_id = *node_id.bytes();
            e.name_len = copy_str(&mut e.name, name);
            true
        })
    }

    pub(crate) fn remove_node(&self, node_id: NodeId) -> bool {
        self.with_locked(|reg| {
            for e in reg.nodes.iter_mut() {
                if e.active() && e.node_id == *node_id.bytes() {
                    e.pid = 0;
                    e.node_id = [0; UNIQUE_PORT_ID_LENGTH];
                    e.name_len = 0;
                    return true;
                }
            }
            false
        })
    }

    /// All registered nodes, dead ones included.
    pub(crate) fn nodes(&self) -> Vec<NodeRecord> {
        self.with_locked(|reg| {
            reg.nodes
                .iter()
                .filter(|e| e.active())
                .filter_map(NodeEntry::record)
                .collect()
        })
    }

    /// Remove nodes whose process no longer exists and return them.
    pub(crate) fn remove_dead_nodes(&self) -> Vec<NodeRecord> {
        self.with_locked(|reg| {
            let mut removed = Vec::new();
            for e in reg.nodes.iter_mut() {
                if e.active() && !platform::is_pid_alive(e.pid) {
                    if let Some(r) = e.record() {
                        removed.push(r);
                    }
                    e.pid = 0;
                    e.node_id = [0; UNIQUE_PORT_ID_LENGTH];
                    e.name_len = 0;
                }
            }
            removed
        })
    }
}
