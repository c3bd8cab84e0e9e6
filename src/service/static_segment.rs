// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Shared memory object holding a service's immutable record.
//
//   [ Header { ready, creator_pid, magic, version, len } ][ record bytes ]
//
// The creator fills everything and sets `ready` last; readers never look at
// the record before they observe `ready` with acquire ordering.

use std::io;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use crate::platform;
use crate::service::static_config::StaticConfig;
use crate::shm::{ShmHandle, ShmOpenMode};
use crate::version::PackageVersion;

const STATIC_MAGIC: u64 = 0x7a63_6970_7374_6331;

#[repr(C)]
struct Header {
    ready: AtomicU32,
    creator_pid: AtomicI32,
    magic: u64,
    version: u64,
    len: u64,
}

const HEADER_SIZE: usize = std::mem::size_of::<Header>();

/// What a reader found under a static config name.
pub(crate) enum StaticState {
    Missing,
    /// The creator has not published the record yet. `stale` is set when the
    /// creating process no longer exists.
    InCreation { stale: bool },
    Ready(StaticSegment, StaticConfig),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StaticReadError {
    Corrupted,
    IncompatibleVersion,
    InsufficientPermissions,
    Internal,
}

pub(crate) struct StaticSegment {
    shm: ShmHandle,
}

impl StaticSegment {
    /// Create the object exclusively and write `record`; the record stays
    /// invisible until [`mark_ready`](Self::mark_ready).
    pub(crate) fn create(name: &str, record: &[u8]) -> io::Result<Self> {
        let mut shm = ShmHandle::acquire(name, HEADER_SIZE + record.len(), ShmOpenMode::Create)?;
        shm.keep_on_drop();

        let hdr = shm.get() as *mut Header;
        unsafe {
            (*hdr)
                .creator_pid
                .store(platform::current_pid(), Ordering::Relaxed);
            (*hdr).magic = STATIC_MAGIC;
            (*hdr).version = PackageVersion::get().to_u64();
            (*hdr).len = record.len() as u64;
            std::ptr::copy_nonoverlapping(record.as_ptr(), shm.get().add(HEADER_SIZE), record.len());
        }
        Ok(Self { shm })
    }

    pub(crate) fn mark_ready(&self) {
        self.hdr().ready.store(1, Ordering::Release);
    }

    pub(crate) fn unlink(&self) {
        self.shm.unlink();
    }

    fn hdr(&self) -> &Header {
        unsafe { &*(self.shm.get() as *const Header) }
    }

    /// Look at `name` without waiting.
    pub(crate) fn inspect(name: &str) -> Result<StaticState, StaticReadError> {
        let mut shm = match ShmHandle::open_existing(name) {
            Ok(shm) => shm,
            Err(e) => {
                return match e.kind() {
                    io::ErrorKind::NotFound => Ok(StaticState::Missing),
                    // exists but not sized yet
                    io::ErrorKind::WouldBlock => Ok(StaticState::InCreation { stale: false }),
                    io::ErrorKind::PermissionDenied => Err(StaticReadError::InsufficientPermissions),
                    _ => {
                        log::error!("unable to open static config {name}: {e}");
                        Err(StaticReadError::Internal)
                    }
                }
            }
        };
        shm.keep_on_drop();

        if shm.user_size() < HEADER_SIZE {
            return Err(StaticReadError::Corrupted);
        }
        let segment = Self { shm };
        let hdr = segment.hdr();

        if hdr.ready.load(Ordering::Acquire) == 0 {
            let pid = hdr.creator_pid.load(Ordering::Relaxed);
            // pid 0: the creator has mapped the object but not stamped it yet
            let stale = pid != 0 && !platform::is_pid_alive(pid);
            return Ok(StaticState::InCreation { stale });
        }

        if hdr.magic != STATIC_MAGIC {
            return Err(StaticReadError::Corrupted);
        }
        if hdr.version != PackageVersion::get().to_u64() {
            log::debug!(
                "static config {name} was written by version {}",
                PackageVersion::from_u64(hdr.version)
            );
            return Err(StaticReadError::IncompatibleVersion);
        }
        let len = hdr.len as usize;
        if HEADER_SIZE + len > segment.shm.user_size() {
            return Err(StaticReadError::Corrupted);
        }

        let bytes = unsafe { std::slice::from_raw_parts(segment.shm.as_ptr().add(HEADER_SIZE), len) };
        match StaticConfig::decode(bytes) {
            Ok(config) => Ok(StaticState::Ready(segment, config)),
            Err(e) => {
                log::warn!("static config {name} cannot be decoded: {e}");
                Err(StaticReadError::Corrupted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::attribute::AttributeSet;
    use crate::service::service_name::ServiceName;
    use crate::service::static_config::{EventConfig, MessagingPatternConfig};
    use std::sync::atomic::AtomicUsize;

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn unique_name() -> String {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("zcipc_ut_static_{}_{n}", std::process::id())
    }

    fn sample_config() -> StaticConfig {
        StaticConfig::new(
            &ServiceName::new("static/test").unwrap(),
            AttributeSet::new(),
            MessagingPatternConfig::Event(EventConfig {
                max_notifiers: 1,
                max_listeners: 2,
                max_nodes: 3,
                event_id_max_value: 4,
                notifier_created_event: None,
                notifier_dropped_event: Some(1),
            }),
        )
    }

    #[test]
    fn record_is_hidden_until_ready() {
        let name = unique_name();
        let config = sample_config();
        let seg = StaticSegment::create(&name, &config.encode()).unwrap();

        assert!(matches!(
            StaticSegment::inspect(&name),
            Ok(StaticState::InCreation { stale: false })
        ));
        seg.mark_ready();
        match StaticSegment::inspect(&name) {
            Ok(StaticState::Ready(_, read)) => assert_eq!(read, config),
            _ => panic!("expected a ready record"),
        }
        seg.unlink();
        assert!(matches!(StaticSegment::inspect(&name), Ok(StaticState::Missing)));
    }

    #[test]
    fn exclusive_create_fails_on_existing_name() {
        let name = unique_name();
        let seg = StaticSegment::create(&name, b"x").unwrap();
        let err = StaticSegment::create(&name, b"x").err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        seg.unlink();
    }

    #[test]
    fn garbage_record_reports_corruption() {
        let name = unique_name();
        let seg = StaticSegment::create(&name, &[0xab; 24]).unwrap();
        seg.mark_ready();
        assert!(matches!(
            StaticSegment::inspect(&name),
            Err(StaticReadError::Corrupted)
        ));
        seg.unlink();
    }
}
