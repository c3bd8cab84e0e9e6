// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Single-producer single-consumer queue of chunk offsets between one
// publisher and one subscriber, over shared memory.
//
// The publisher creates the queue and is its only writer; the subscriber
// opens it lazily and is its only reader. Capacity is chosen at runtime by
// the subscriber's buffer size. With safe overflow the writer may also
// claim the oldest entry, so the reader commits with a CAS on `read_idx`.

use std::io;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::shm::{ShmHandle, ShmOpenMode};

/// Cache-line-padded header stored at the start of the segment.
#[repr(C)]
struct Header {
    write_idx: AtomicU64,
    _pad0: [u8; 64 - 8],
    read_idx: AtomicU64,
    _pad1: [u8; 64 - 8],
    capacity: u64,
    constructed: AtomicU32,
    _pad2: [u8; 64 - 12],
}

const _: () = assert!(std::mem::size_of::<Header>() == 192);

pub(crate) struct Connection {
    shm: ShmHandle,
    capacity: u64,
}

// Safety: indices are atomics; slot ownership follows the SPSC protocol.
unsafe impl Send for Connection {}
unsafe impl Sync for Connection {}

impl Connection {
    fn layout_size(capacity: usize) -> usize {
        std::mem::size_of::<Header>() + std::mem::size_of::<AtomicU64>() * capacity
    }

    /// Create the queue as its writer. A leftover object of the same name is
    /// replaced.
    pub(crate) fn create(name: &str, capacity: usize) -> io::Result<Self> {
        if capacity == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "capacity is 0"));
        }
        let shm = match ShmHandle::acquire(name, Self::layout_size(capacity), ShmOpenMode::Create) {
            Ok(shm) => shm,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                log::warn!("replacing stale connection {name}");
                ShmHandle::unlink_by_name(name);
                ShmHandle::acquire(name, Self::layout_size(capacity), ShmOpenMode::Create)?
            }
            Err(e) => return Err(e),
        };
        let hdr = shm.get() as *mut Header;
        unsafe {
            (*hdr).capacity = capacity as u64;
            (*hdr).constructed.store(1, Ordering::Release);
        }
        Ok(Self {
            shm,
            capacity: capacity as u64,
        })
    }

    /// Open the queue as its reader. `WouldBlock` while the writer is still
    /// setting it up.
    pub(crate) fn open(name: &str) -> io::Result<Self> {
        let shm = ShmHandle::open_existing(name)?;
        if shm.user_size() < std::mem::size_of::<Header>() {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "connection not sized"));
        }
        let hdr = unsafe { &*(shm.get() as *const Header) };
        if hdr.constructed.load(Ordering::Acquire) == 0 {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "connection not ready"));
        }
        let capacity = hdr.capacity;
        if capacity == 0 || Self::layout_size(capacity as usize) > shm.user_size() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "connection capacity does not match its size",
            ));
        }
        Ok(Self { shm, capacity })
    }

    fn hdr(&self) -> &Header {
        unsafe { &*(self.shm.get() as *const Header) }
    }

    fn slot(&self, idx: u64) -> &AtomicU64 {
        unsafe {
            let base = self.shm.get().add(std::mem::size_of::<Header>()) as *const AtomicU64;
            &*base.add((idx % self.capacity) as usize)
        }
    }

    /// Number of handles mapping the queue, across processes.
    pub(crate) fn mapping_count(&self) -> i32 {
        self.shm.ref_count()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity as usize
    }

    pub(crate) fn len(&self) -> usize {
        let hdr = self.hdr();
        let w = hdr.write_idx.load(Ordering::Acquire);
        let r = hdr.read_idx.load(Ordering::Acquire);
        w.wrapping_sub(r) as usize
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn is_full(&self) -> bool {
        self.len() >= self.capacity as usize
    }

    // --- Producer API (single writer) ---

    /// Append `value`. Returns `false` if the queue is full.
    pub(crate) fn push(&self, value: u64) -> bool {
        let hdr = self.hdr();
        let w = hdr.write_idx.load(Ordering::Relaxed);
        let r = hdr.read_idx.load(Ordering::Acquire);
        if w.wrapping_sub(r) >= self.capacity {
            return false;
        }
        self.slot(w).store(value, Ordering::Relaxed);
        hdr.write_idx.store(w.wrapping_add(1), Ordering::Release);
        true
    }

    /// Append `value`, evicting the oldest entry when full. The evicted
    /// value is returned so its owner can release it.
    pub(crate) fn push_overwrite(&self, value: u64) -> Option<u64> {
        let hdr = self.hdr();
        let w = hdr.write_idx.load(Ordering::Relaxed);
        let mut evicted = None;
        loop {
            let r = hdr.read_idx.load(Ordering::Acquire);
            if w.wrapping_sub(r) < self.capacity {
                break;
            }
            let oldest = self.slot(r).load(Ordering::Relaxed);
            if hdr
                .read_idx
                .compare_exchange(r, r.wrapping_add(1), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                evicted = Some(oldest);
                break;
            }
        }
        self.slot(w).store(value, Ordering::Relaxed);
        hdr.write_idx.store(w.wrapping_add(1), Ordering::Release);
        evicted
    }

    // --- Consumer API (single reader) ---

    /// Take the oldest entry.
    pub(crate) fn pop(&self) -> Option<u64> {
        let hdr = self.hdr();
        loop {
            let r = hdr.read_idx.load(Ordering::Acquire);
            let w = hdr.write_idx.load(Ordering::Acquire);
            if r == w {
                return None;
            }
            let value = self.slot(r).load(Ordering::Relaxed);
            if hdr
                .read_idx
                .compare_exchange(r, r.wrapping_add(1), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(value);
            }
        }
    }

    pub(crate) fn unlink(&self) {
        self.shm.unlink();
    }
}
