// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Listener: receives event ids from notifiers.
//
// Each listener owns two resources:
//
//   {prefix}{service}_{listener}.l   shared bitset, one bit per event id
//   {root_path}/{prefix}{listener}.evt   datagram socket used as a doorbell
//
// A notifier sets the bit of the id, then sends one byte to the socket.
// The listener drains the socket before it collects the bits, so a doorbell
// is never lost; at worst a wake-up finds nothing new. Pending ids form a
// set: notifying the same id twice before a wait yields it once.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::identity::UniquePortId;
use crate::platform;
use crate::port::{EventId, ListenerCreateError, ListenerWaitError};
use crate::service::dynamic_config::{PortRecord, PortSide};
use crate::service::ServiceState;
use crate::shm::{ShmHandle, ShmOpenMode};
use crate::shm_name;

// ---------------------------------------------------------------------------
// Shared bitset
// ---------------------------------------------------------------------------

#[repr(C)]
struct BitsHeader {
    ready: AtomicU32,
    _reserved: u32,
    bit_count: u64,
}

/// Pending event ids of one listener, in shared memory.
pub(crate) struct EventBits {
    shm: ShmHandle,
    words: usize,
    bit_count: usize,
}

// Safety: every word is an atomic.
unsafe impl Send for EventBits {}
unsafe impl Sync for EventBits {}

impl EventBits {
    fn size_for(bit_count: usize) -> usize {
        std::mem::size_of::<BitsHeader>() + bit_count.div_ceil(64) * 8
    }

    pub(crate) fn create(name: &str, bit_count: usize) -> io::Result<Self> {
        let shm = ShmHandle::acquire(name, Self::size_for(bit_count), ShmOpenMode::Create)?;
        let hdr = shm.get() as *mut BitsHeader;
        unsafe {
            (*hdr).bit_count = bit_count as u64;
            (*hdr).ready.store(1, Ordering::Release);
        }
        Ok(Self {
            shm,
            words: bit_count.div_ceil(64),
            bit_count,
        })
    }

    pub(crate) fn open(name: &str) -> io::Result<Self> {
        let shm = ShmHandle::open_existing(name)?;
        if shm.user_size() < std::mem::size_of::<BitsHeader>() {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "event bits not sized"));
        }
        let hdr = unsafe { &*(shm.get() as *const BitsHeader) };
        if hdr.ready.load(Ordering::Acquire) == 0 {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "event bits not ready"));
        }
        let bit_count = hdr.bit_count as usize;
        if Self::size_for(bit_count) > shm.user_size() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "event bit count does not match its size",
            ));
        }
        Ok(Self {
            shm,
            words: bit_count.div_ceil(64),
            bit_count,
        })
    }

    fn word(&self, i: usize) -> &AtomicU64 {
        debug_assert!(i < self.words);
        unsafe {
            let base = self.shm.get().add(std::mem::size_of::<BitsHeader>()) as *const AtomicU64;
            &*base.add(i)
        }
    }

    /// Returns `false` when `id` does not fit.
    pub(crate) fn set(&self, id: usize) -> bool {
        if id >= self.bit_count {
            return false;
        }
        self.word(id / 64).fetch_or(1 << (id % 64), Ordering::AcqRel);
        true
    }

    /// Clear every bit, handing the ids that were set to `f` in ascending order.
    pub(crate) fn take_all<F: FnMut(usize)>(&self, mut f: F) {
        for i in 0..self.words {
            let mut bits = self.word(i).swap(0, Ordering::AcqRel);
            while bits != 0 {
                let bit = bits.trailing_zeros() as usize;
                f(i * 64 + bit);
                bits &= bits - 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Path of a listener's doorbell socket.
pub(crate) fn socket_path(service: &ServiceState, listener: UniquePortId) -> PathBuf {
    service
        .config()
        .global
        .root_path
        .join(shm_name::listener_socket(service.prefix(), &listener.to_hex()))
}

/// Creates a [`Listener`] for an event service.
#[derive(Debug)]
pub struct ListenerBuilder {
    service: Arc<ServiceState>,
}

impl ListenerBuilder {
    pub(crate) fn new(service: Arc<ServiceState>) -> Self {
        Self { service }
    }

    pub fn create(self) -> Result<Listener, ListenerCreateError> {
        let event_id_max_value = self
            .service
            .static_config
            .event()
            .map(|e| e.event_id_max_value)
            .ok_or(ListenerCreateError::ResourceCreationFailed)?;

        let port_id = UniquePortId::new();
        let bits_name = shm_name::listener_events(
            self.service.prefix(),
            &self.service.id_hex(),
            &port_id.to_hex(),
        );
        let bits = EventBits::create(&bits_name, event_id_max_value + 1).map_err(|e| {
            log::error!("unable to create event bits {bits_name}: {e}");
            ListenerCreateError::ResourceCreationFailed
        })?;

        let path = socket_path(&self.service, port_id);
        let socket = bind_socket(&path).map_err(|e| {
            log::error!("unable to bind listener socket {}: {e}", path.display());
            ListenerCreateError::ResourceCreationFailed
        })?;

        let added = self.service.dynamic.add_port(
            PortSide::Consumer,
            PortRecord {
                port_id,
                node_id: self.service.node.id(),
                pid: platform::current_pid(),
                buffer_size: 0,
            },
        );
        if !added {
            remove_socket_file(&path);
            return Err(ListenerCreateError::ExceedsMaxSupportedListeners);
        }
        log::debug!(
            "listener {port_id} created on service {}",
            self.service.static_config.name()
        );

        Ok(Listener {
            service: self.service,
            port_id,
            bits,
            socket,
            path,
            pending: Mutex::new(VecDeque::new()),
        })
    }
}

/// Unlink a doorbell socket. A missing file is fine; other failures are
/// logged and otherwise ignored. Returns whether a file was removed.
pub(crate) fn remove_socket_file(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            log::debug!("unable to remove listener socket {}: {e}", path.display());
            false
        }
    }
}

fn bind_socket(path: &Path) -> io::Result<UnixDatagram> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    match std::fs::remove_file(path) {
        Ok(()) => log::warn!("removed stale listener socket {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    let socket = UnixDatagram::bind(path)?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// Receiving port of an event service.
pub struct Listener {
    service: Arc<ServiceState>,
    port_id: UniquePortId,
    bits: EventBits,
    socket: UnixDatagram,
    path: PathBuf,
    pending: Mutex<VecDeque<EventId>>,
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.port_id)
            .field("service", &self.service.static_config.name())
            .finish()
    }
}

impl Listener {
    pub fn id(&self) -> UniquePortId {
        self.port_id
    }

    /// Drain the doorbell and move newly set ids into the local queue.
    fn collect(&self, pending: &mut VecDeque<EventId>) -> Result<(), ListenerWaitError> {
        let mut buf = [0u8; 64];
        loop {
            match self.socket.recv(&mut buf) {
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    return Err(ListenerWaitError::InterruptSignal)
                }
                Err(e) => {
                    log::error!("listener {}: doorbell receive failed: {e}", self.port_id);
                    return Err(ListenerWaitError::InternalFailure);
                }
            }
        }
        self.bits.take_all(|id| {
            let id = EventId::new(id);
            if !pending.contains(&id) {
                pending.push_back(id);
            }
        });
        Ok(())
    }

    /// Block until the doorbell rings or `timeout` passes. `false` on timeout.
    fn wait_readable(&self, timeout: Option<Duration>) -> Result<bool, ListenerWaitError> {
        match platform::poll_readable(&[self.socket.as_raw_fd()], timeout) {
            Ok(ready) => Ok(ready.first().copied().unwrap_or(false)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                Err(ListenerWaitError::InterruptSignal)
            }
            Err(e) => {
                log::error!("listener {}: poll failed: {e}", self.port_id);
                Err(ListenerWaitError::InternalFailure)
            }
        }
    }

    /// Take one pending id without blocking.
    pub fn try_wait_one(&self) -> Result<Option<EventId>, ListenerWaitError> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            self.collect(&mut pending)?;
        }
        Ok(pending.pop_front())
    }

    /// Take one id, waiting at most `timeout` for it.
    pub fn timed_wait_one(&self, timeout: Duration) -> Result<Option<EventId>, ListenerWaitError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(id) = self.try_wait_one()? {
                return Ok(Some(id));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !self.wait_readable(Some(remaining))? {
                return self.try_wait_one();
            }
        }
    }

    /// Take one id, waiting as long as it takes.
    pub fn blocking_wait_one(&self) -> Result<Option<EventId>, ListenerWaitError> {
        loop {
            if let Some(id) = self.try_wait_one()? {
                return Ok(Some(id));
            }
            self.wait_readable(None)?;
        }
    }

    /// Hand every pending id to `callback` without blocking.
    pub fn try_wait_all<F: FnMut(EventId)>(&self, mut callback: F) -> Result<(), ListenerWaitError> {
        let ids: Vec<EventId> = {
            let mut pending = self.pending.lock();
            self.collect(&mut pending)?;
            pending.drain(..).collect()
        };
        ids.into_iter().for_each(&mut callback);
        Ok(())
    }

    /// Like [`try_wait_all`](Self::try_wait_all), waiting at most `timeout`
    /// for the first id.
    pub fn timed_wait_all<F: FnMut(EventId)>(
        &self,
        mut callback: F,
        timeout: Duration,
    ) -> Result<(), ListenerWaitError> {
        if let Some(first) = self.timed_wait_one(timeout)? {
            callback(first);
        }
        self.try_wait_all(callback)
    }

    /// Like [`try_wait_all`](Self::try_wait_all), waiting for the first id
    /// as long as it takes.
    pub fn blocking_wait_all<F: FnMut(EventId)>(
        &self,
        mut callback: F,
    ) -> Result<(), ListenerWaitError> {
        if let Some(first) = self.blocking_wait_one()? {
            callback(first);
        }
        self.try_wait_all(callback)
    }
}

impl AsRawFd for Listener {
    /// Readable whenever a notifier rang since the last wait.
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.service
            .dynamic
            .remove_port(PortSide::Consumer, self.port_id);
        if !remove_socket_file(&self.path) {
            log::debug!("listener {}: socket already gone", self.port_id);
        }
        log::debug!("listener {} dropped", self.port_id);
    }
}
