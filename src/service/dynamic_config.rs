// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Live state of a service: which nodes hold it and which ports are attached.
//
// Shared-memory layout:
//
//   [ Header ]
//   [ NodeSlot ] × max_nodes
//   [ PortSlot ] × max_producers   (publishers / notifiers)
//   [ PortSlot ] × max_consumers   (subscribers / listeners)
//
// Every access to the slot tables happens under `Header::lock`. The change
// counter is bumped whenever the port tables change so ports can refresh
// their connections lazily.

use std::io;
use std::ptr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::identity::{NodeId, UniquePortId, UNIQUE_PORT_ID_LENGTH};
use crate::platform;
use crate::shm::{ShmHandle, ShmOpenMode};
use crate::spin_lock::SpinLock;

/// Written last by the creator; an opener that sees it knows the capacities
/// are valid.
const READY_MAGIC: u64 = 0x7a63_6970_6479_6e31;

#[repr(C)]
struct Header {
    lock: SpinLock,
    marked_for_destruction: AtomicU32,
    change_counter: AtomicU64,
    magic: AtomicU64,
    max_nodes: u32,
    max_producers: u32,
    max_consumers: u32,
    _reserved: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct NodeSlot {
    pid: i32,
    handles: u32,
    node_id: [u8; UNIQUE_PORT_ID_LENGTH],
}

#[repr(C)]
#[derive(Clone, Copy)]
struct PortSlot {
    pid: i32,
    active: u32,
    buffer_size: u64,
    port_id: [u8; UNIQUE_PORT_ID_LENGTH],
    node_id: [u8; UNIQUE_PORT_ID_LENGTH],
}

impl PortSlot {
    fn record(&self) -> Option<PortRecord> {
        if self.active == 0 {
            return None;
        }
        Some(PortRecord {
            port_id: UniquePortId::from_bytes(self.port_id)?,
            node_id: NodeId::from_bytes(self.node_id)?,
            pid: self.pid,
            buffer_size: self.buffer_size as usize,
        })
    }
}

const fn align_up(v: usize, a: usize) -> usize {
    (v + a - 1) / a * a
}

fn nodes_offset() -> usize {
    align_up(std::mem::size_of::<Header>(), std::mem::align_of::<PortSlot>())
}

fn producers_offset(max_nodes: usize) -> usize {
    align_up(
        nodes_offset() + max_nodes * std::mem::size_of::<NodeSlot>(),
        std::mem::align_of::<PortSlot>(),
    )
}

fn consumers_offset(max_nodes: usize, max_producers: usize) -> usize {
    producers_offset(max_nodes) + max_producers * std::mem::size_of::<PortSlot>()
}

fn segment_size(max_nodes: usize, max_producers: usize, max_consumers: usize) -> usize {
    consumers_offset(max_nodes, max_producers) + max_consumers * std::mem::size_of::<PortSlot>()
}

/// Which table of ports an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PortSide {
    /// Publishers or notifiers.
    Producer,
    /// Subscribers or listeners.
    Consumer,
}

/// A port as stored in the dynamic config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PortRecord {
    pub(crate) port_id: UniquePortId,
    pub(crate) node_id: NodeId,
    pub(crate) pid: i32,
    /// Queue capacity a subscriber asked for; unused for other ports.
    pub(crate) buffer_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegisterNodeError {
    MarkedForDestruction,
    ExceedsMaxNumberOfNodes,
}

/// Entries removed because their owning process no longer exists.
#[derive(Debug, Default)]
pub(crate) struct DeadEntries {
    pub(crate) nodes: usize,
    pub(crate) producers: Vec<PortRecord>,
    pub(crate) consumers: Vec<PortRecord>,
}

/// Result of checking a service that might have been abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Liveness {
    /// At least one live node holds the service.
    InUse,
    /// Another process is already tearing it down.
    MarkedForDestruction,
    /// Every holder was dead; the service was marked and the removal callback ran.
    Reclaimed,
}

/// Snapshot of a service's live state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicDetails {
    nodes: Vec<NodeId>,
    number_of_producers: usize,
    number_of_consumers: usize,
}

impl DynamicDetails {
    /// Nodes currently holding the service.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Publishers or notifiers, depending on the messaging pattern.
    pub fn number_of_producers(&self) -> usize {
        self.number_of_producers
    }

    /// Subscribers or listeners, depending on the messaging pattern.
    pub fn number_of_consumers(&self) -> usize {
        self.number_of_consumers
    }
}

/// Handle to the dynamic config segment of one service.
pub(crate) struct DynamicConfig {
    shm: ShmHandle,
    max_nodes: usize,
    max_producers: usize,
    max_consumers: usize,
}

// Safety: all shared state is accessed through atomics or under the spin lock.
unsafe impl Send for DynamicConfig {}
unsafe impl Sync for DynamicConfig {}

impl DynamicConfig {
    /// Create the segment exclusively. Fails with `AlreadyExists` when a
    /// leftover segment of the same name is present.
    pub(crate) fn create(
        name: &str,
        max_nodes: usize,
        max_producers: usize,
        max_consumers: usize,
    ) -> io::Result<Self> {
        let size = segment_size(max_nodes, max_producers, max_consumers);
        let mut shm = ShmHandle::acquire(name, size, ShmOpenMode::Create)?;
        shm.keep_on_drop();

        let hdr = shm.get() as *mut Header;
        unsafe {
            (*hdr).max_nodes = max_nodes as u32;
            (*hdr).max_producers = max_producers as u32;
            (*hdr).max_consumers = max_consumers as u32;
            (*hdr).magic.store(READY_MAGIC, Ordering::Release);
        }

        Ok(Self {
            shm,
            max_nodes,
            max_producers,
            max_consumers,
        })
    }

    /// Open an existing segment. `WouldBlock` while its creator is still
    /// initialising it, `InvalidData` when the contents do not add up.
    pub(crate) fn open(name: &str) -> io::Result<Self> {
        let mut shm = ShmHandle::open_existing(name)?;
        shm.keep_on_drop();
        if shm.user_size() < std::mem::size_of::<Header>() {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "dynamic config not sized"));
        }

        let hdr = unsafe { &*(shm.get() as *const Header) };
        if hdr.magic.load(Ordering::Acquire) != READY_MAGIC {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "dynamic config not ready"));
        }
        let max_nodes = hdr.max_nodes as usize;
        let max_producers = hdr.max_producers as usize;
        let max_consumers = hdr.max_consumers as usize;
        if segment_size(max_nodes, max_producers, max_consumers) > shm.user_size() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "dynamic config capacities exceed the segment",
            ));
        }

        Ok(Self {
            shm,
            max_nodes,
            max_producers,
            max_consumers,
        })
    }

    fn hdr(&self) -> &Header {
        unsafe { &*(self.shm.get() as *const Header) }
    }

    fn node_slot(&self, i: usize) -> *mut NodeSlot {
        debug_assert!(i < self.max_nodes);
        unsafe { (self.shm.get().add(nodes_offset()) as *mut NodeSlot).add(i) }
    }

    fn port_slot(&self, side: PortSide, i: usize) -> *mut PortSlot {
        let (offset, len) = match side {
            PortSide::Producer => (producers_offset(self.max_nodes), self.max_producers),
            PortSide::Consumer => (
                consumers_offset(self.max_nodes, self.max_producers),
                self.max_consumers,
            ),
        };
        debug_assert!(i < len);
        unsafe { (self.shm.get().add(offset) as *mut PortSlot).add(i) }
    }

    fn capacity(&self, side: PortSide) -> usize {
        match side {
            PortSide::Producer => self.max_producers,
            PortSide::Consumer => self.max_consumers,
        }
    }

    fn bump(&self) {
        self.hdr().change_counter.fetch_add(1, Ordering::AcqRel);
    }

    /// Monotonic counter of port table changes.
    pub(crate) fn change_counter(&self) -> u64 {
        self.hdr().change_counter.load(Ordering::Acquire)
    }

    pub(crate) fn is_marked_for_destruction(&self) -> bool {
        self.hdr().marked_for_destruction.load(Ordering::Acquire) != 0
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    /// Count one more handle of `node_id` on this service.
    pub(crate) fn register_node(&self, node_id: NodeId) -> Result<(), RegisterNodeError> {
        let hdr = self.hdr();
        let _guard = hdr.lock.lock();
        if hdr.marked_for_destruction.load(Ordering::Relaxed) != 0 {
            return Err(RegisterNodeError::MarkedForDestruction);
        }

        let mut free = None;
        for i in 0..self.max_nodes {
            let slot = unsafe { &mut *self.node_slot(i) };
            if slot.handles > 0 && slot.node_id == *node_id.bytes() {
                slot.handles += 1;
                return Ok(());
            }
            if slot.handles == 0 && free.is_none() {
                free = Some(i);
            }
        }

        let i = free.ok_or(RegisterNodeError::ExceedsMaxNumberOfNodes)?;
        unsafe {
            ptr::write(
                self.node_slot(i),
                NodeSlot {
                    pid: platform::current_pid(),
                    handles: 1,
                    node_id: *node_id.bytes(),
                },
            );
        }
        Ok(())
    }

    /// Drop one handle of `node_id`. When no node is left, the service is
    /// marked for destruction and `on_last` runs while the lock is still held.
    pub(crate) fn deregister_node<F: FnOnce()>(&self, node_id: NodeId, on_last: F) -> bool {
        let hdr = self.hdr();
        let _guard = hdr.lock.lock();

        for i in 0..self.max_nodes {
            let slot = unsafe { &mut *self.node_slot(i) };
            if slot.handles > 0 && slot.node_id == *node_id.bytes() {
                slot.handles -= 1;
                if slot.handles == 0 {
                    slot.pid = 0;
                    slot.node_id = [0; UNIQUE_PORT_ID_LENGTH];
                }
                break;
            }
        }

        if self.active_nodes_locked() > 0 || hdr.marked_for_destruction.load(Ordering::Relaxed) != 0
        {
            return false;
        }
        hdr.marked_for_destruction.store(1, Ordering::Release);
        self.bump();
        on_last();
        true
    }

    fn active_nodes_locked(&self) -> usize {
        (0..self.max_nodes)
            .filter(|&i| unsafe { (*self.node_slot(i)).handles > 0 })
            .count()
    }

    pub(crate) fn node_ids(&self) -> Vec<NodeId> {
        let _guard = self.hdr().lock.lock();
        (0..self.max_nodes)
            .filter_map(|i| {
                let slot = unsafe { &*self.node_slot(i) };
                if slot.handles > 0 {
                    NodeId::from_bytes(slot.node_id)
                } else {
                    None
                }
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Ports
    // -----------------------------------------------------------------------

    /// Returns `false` when every slot of `side` is taken.
    pub(crate) fn add_port(&self, side: PortSide, record: PortRecord) -> bool {
        let _guard = self.hdr().lock.lock();
        for i in 0..self.capacity(side) {
            let slot = unsafe { &mut *self.port_slot(side, i) };
            if slot.active == 0 {
                *slot = PortSlot {
                    pid: record.pid,
                    active: 1,
                    buffer_size: record.buffer_size as u64,
                    port_id: *record.port_id.bytes(),
                    node_id: *record.node_id.bytes(),
                };
                self.bump();
                return true;
            }
        }
        false
    }

    pub(crate) fn remove_port(&self, side: PortSide, port_id: UniquePortId) {
        let _guard = self.hdr().lock.lock();
        for i in 0..self.capacity(side) {
            let slot = unsafe { &mut *self.port_slot(side, i) };
            if slot.active != 0 && slot.port_id == *port_id.bytes() {
                slot.active = 0;
                self.bump();
                return;
            }
        }
    }

    pub(crate) fn ports(&self, side: PortSide) -> Vec<PortRecord> {
        let _guard = self.hdr().lock.lock();
        (0..self.capacity(side))
            .filter_map(|i| unsafe { (*self.port_slot(side, i)).record() })
            .collect()
    }

    pub(crate) fn contains_port(&self, side: PortSide, port_id: UniquePortId) -> bool {
        let _guard = self.hdr().lock.lock();
        (0..self.capacity(side)).any(|i| {
            let slot = unsafe { &*self.port_slot(side, i) };
            slot.active != 0 && slot.port_id == *port_id.bytes()
        })
    }

    // -----------------------------------------------------------------------
    // Liveness
    // -----------------------------------------------------------------------

    fn purge_dead_locked(&self) -> DeadEntries {
        let mut dead = DeadEntries::default();
        let mut pid_cache: Vec<(i32, bool)> = Vec::new();
        let mut alive = |pid: i32| -> bool {
            if let Some(&(_, a)) = pid_cache.iter().find(|(p, _)| *p == pid) {
                return a;
            }
            let a = platform::is_pid_alive(pid);
            pid_cache.push((pid, a));
            a
        };

        for i in 0..self.max_nodes {
            let slot = unsafe { &mut *self.node_slot(i) };
            if slot.handles > 0 && !alive(slot.pid) {
                *slot = NodeSlot {
                    pid: 0,
                    handles: 0,
                    node_id: [0; UNIQUE_PORT_ID_LENGTH],
                };
                dead.nodes += 1;
            }
        }
        for side in [PortSide::Producer, PortSide::Consumer] {
            for i in 0..self.capacity(side) {
                let slot = unsafe { &mut *self.port_slot(side, i) };
                if slot.active != 0 && !alive(slot.pid) {
                    if let Some(record) = slot.record() {
                        match side {
                            PortSide::Producer => dead.producers.push(record),
                            PortSide::Consumer => dead.consumers.push(record),
                        }
                    }
                    slot.active = 0;
                }
            }
        }
        if !dead.producers.is_empty() || !dead.consumers.is_empty() {
            self.bump();
        }
        dead
    }

    /// Remove nodes and ports whose process is gone.
    pub(crate) fn purge_dead(&self) -> DeadEntries {
        let _guard = self.hdr().lock.lock();
        self.purge_dead_locked()
    }

    /// Purge dead holders; if nobody is left, mark the service and run
    /// `on_abandoned` under the lock.
    pub(crate) fn reclaim_if_abandoned<F: FnOnce(&DeadEntries)>(
        &self,
        on_abandoned: F,
    ) -> (Liveness, DeadEntries) {
        let hdr = self.hdr();
        let _guard = hdr.lock.lock();
        if hdr.marked_for_destruction.load(Ordering::Relaxed) != 0 {
            return (Liveness::MarkedForDestruction, DeadEntries::default());
        }
        let dead = self.purge_dead_locked();
        if self.active_nodes_locked() > 0 {
            return (Liveness::InUse, dead);
        }
        hdr.marked_for_destruction.store(1, Ordering::Release);
        self.bump();
        on_abandoned(&dead);
        (Liveness::Reclaimed, dead)
    }

    pub(crate) fn details(&self) -> DynamicDetails {
        let _guard = self.hdr().lock.lock();
        let count = |side| {
            (0..self.capacity(side))
                .filter(|&i| unsafe { (*self.port_slot(side, i)).active != 0 })
                .count()
        };
        DynamicDetails {
            nodes: (0..self.max_nodes)
                .filter_map(|i| {
                    let slot = unsafe { &*self.node_slot(i) };
                    if slot.handles > 0 {
                        NodeId::from_bytes(slot.node_id)
                    } else {
                        None
                    }
                })
                .collect(),
            number_of_producers: count(PortSide::Producer),
            number_of_consumers: count(PortSide::Consumer),
        }
    }

    pub(crate) fn unlink(&self) {
        self.shm.unlink();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn unique_name() -> String {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("zcipc_ut_dyn_{}_{n}", std::process::id())
    }

    fn record(buffer_size: usize) -> PortRecord {
        PortRecord {
            port_id: UniquePortId::new(),
            node_id: NodeId::new(),
            pid: platform::current_pid(),
            buffer_size,
        }
    }

    #[test]
    fn layout_keeps_port_slots_aligned() {
        for nodes in 0..5 {
            assert_eq!(producers_offset(nodes) % std::mem::align_of::<PortSlot>(), 0);
        }
    }

    #[test]
    fn port_tables_respect_capacity_and_bump_counter() {
        let name = unique_name();
        let dc = DynamicConfig::create(&name, 2, 1, 2).unwrap();
        let before = dc.change_counter();

        let p = record(0);
        assert!(dc.add_port(PortSide::Producer, p));
        assert!(!dc.add_port(PortSide::Producer, record(0)));
        assert!(dc.add_port(PortSide::Consumer, record(7)));
        assert!(dc.change_counter() > before);

        assert_eq!(dc.ports(PortSide::Consumer)[0].buffer_size, 7);
        assert!(dc.contains_port(PortSide::Producer, p.port_id));
        dc.remove_port(PortSide::Producer, p.port_id);
        assert!(!dc.contains_port(PortSide::Producer, p.port_id));
        assert_eq!(dc.details().number_of_consumers(), 1);
        dc.unlink();
    }

    #[test]
    fn last_node_marks_for_destruction() {
        let name = unique_name();
        let dc = DynamicConfig::create(&name, 1, 1, 1).unwrap();
        let a = NodeId::new();
        dc.register_node(a).unwrap();
        dc.register_node(a).unwrap();
        assert_eq!(
            dc.register_node(NodeId::new()),
            Err(RegisterNodeError::ExceedsMaxNumberOfNodes)
        );

        let mut ran = false;
        assert!(!dc.deregister_node(a, || ran = true));
        assert!(!ran);
        assert!(dc.deregister_node(a, || ran = true));
        assert!(ran);
        assert!(dc.is_marked_for_destruction());
        assert_eq!(
            dc.register_node(a),
            Err(RegisterNodeError::MarkedForDestruction)
        );
        dc.unlink();
    }

    #[test]
    fn open_sees_creator_state() {
        let name = unique_name();
        let dc = DynamicConfig::create(&name, 3, 2, 2).unwrap();
        dc.register_node(NodeId::new()).unwrap();
        let other = DynamicConfig::open(&name).unwrap();
        assert_eq!(other.details().nodes().len(), 1);
        assert_eq!(
            other.reclaim_if_abandoned(|_| {}).0,
            Liveness::InUse
        );
        dc.unlink();
    }
}
