// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named, reference-counted shared memory handle.
// Delegates to platform::PlatformShm.

use std::io;

use crate::platform::posix::ShmMode;
use crate::platform::PlatformShm;

/// Open mode for shared memory segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmOpenMode {
    /// Create exclusively; fail if it already exists.
    Create,
    /// Open existing; fail if it does not exist.
    Open,
    /// Create if missing, open if it already exists.
    CreateOrOpen,
}

/// A named, inter-process shared memory region.
///
/// The memory layout includes a trailing `AtomicI32` reference counter that is
/// shared between all processes mapping the same segment. By default the last
/// handle to go away removes the name.
pub struct ShmHandle {
    inner: PlatformShm,
}

impl ShmHandle {
    /// Acquire a named shared memory region of `size` bytes (user-visible).
    ///
    /// The actual mapped region is slightly larger to hold the ref counter.
    pub fn acquire(name: &str, size: usize, mode: ShmOpenMode) -> io::Result<Self> {
        let platform_mode = match mode {
            ShmOpenMode::Create => ShmMode::Create,
            ShmOpenMode::Open => ShmMode::Open,
            ShmOpenMode::CreateOrOpen => ShmMode::CreateOrOpen,
        };
        let inner = PlatformShm::acquire(name, size, platform_mode)?;
        Ok(Self { inner })
    }

    /// Map an existing region without knowing its size up front.
    ///
    /// Fails with `WouldBlock` while the creator has not sized it yet.
    pub fn open_existing(name: &str) -> io::Result<Self> {
        let inner = PlatformShm::open_existing(name)?;
        Ok(Self { inner })
    }

    /// Pointer to the start of the user-visible shared memory region.
    pub fn as_ptr(&self) -> *const u8 {
        self.inner.as_ptr()
    }

    /// Mutable pointer to the start of the user-visible shared memory region.
    pub fn get(&self) -> *mut u8 {
        self.inner.as_mut_ptr()
    }

    /// Total mapped size (including the trailing ref counter).
    pub fn mapped_size(&self) -> usize {
        self.inner.mapped_size()
    }

    /// Usable size.
    pub fn user_size(&self) -> usize {
        self.inner.user_size()
    }

    /// The platform name used to open the segment.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// `true` when this handle was the first mapping of the segment.
    pub fn is_first_mapping(&self) -> bool {
        self.inner.prev_ref_count() == 0
    }

    /// Current reference count (number of processes/handles mapping this segment).
    pub fn ref_count(&self) -> i32 {
        self.inner.ref_count()
    }

    /// Keep the name alive after the last mapping goes away.
    pub fn keep_on_drop(&mut self) {
        self.inner.set_unlink_on_drop(false);
    }

    /// Force-remove the backing object.
    pub fn unlink(&self) {
        self.inner.unlink();
    }

    /// Remove a named shm segment by name without needing an open handle.
    /// Returns `false` when nothing was removed.
    pub fn unlink_by_name(name: &str) -> bool {
        PlatformShm::unlink_by_name(name)
    }
}
