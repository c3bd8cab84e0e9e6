// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named shared memory handles: modes, reference counting, lifetime.

use std::sync::atomic::{AtomicUsize, Ordering};

use zcipc::{ShmHandle, ShmOpenMode};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("zshm{}_{prefix}_{n}", std::process::id())
}

#[test]
fn create_is_exclusive() {
    let name = unique_name("exclusive");
    let first = ShmHandle::acquire(&name, 1024, ShmOpenMode::Create).expect("create");
    assert!(first.is_first_mapping());
    assert!(first.user_size() >= 1024);
    assert!(ShmHandle::acquire(&name, 1024, ShmOpenMode::Create).is_err());
}

#[test]
fn open_requires_an_existing_object() {
    let name = unique_name("missing");
    assert!(ShmHandle::acquire(&name, 64, ShmOpenMode::Open).is_err());
    assert!(ShmHandle::open_existing(&name).is_err());

    let created = ShmHandle::acquire(&name, 64, ShmOpenMode::CreateOrOpen).unwrap();
    let opened = ShmHandle::acquire(&name, 64, ShmOpenMode::CreateOrOpen).unwrap();
    assert!(created.is_first_mapping());
    assert!(!opened.is_first_mapping());
}

#[test]
fn handles_share_memory() {
    let name = unique_name("shared");
    let writer = ShmHandle::acquire(&name, 256, ShmOpenMode::Create).unwrap();
    let reader = ShmHandle::open_existing(&name).unwrap();
    assert!(reader.user_size() >= 256);

    unsafe {
        for i in 0..256 {
            *writer.get().add(i) = i as u8;
        }
        for i in 0..256 {
            assert_eq!(*reader.as_ptr().add(i), i as u8);
        }
    }
}

#[test]
fn reference_count_follows_handles() {
    let name = unique_name("refs");
    let a = ShmHandle::acquire(&name, 128, ShmOpenMode::Create).unwrap();
    assert_eq!(a.ref_count(), 1);
    let b = ShmHandle::acquire(&name, 128, ShmOpenMode::Open).unwrap();
    let c = ShmHandle::acquire(&name, 128, ShmOpenMode::Open).unwrap();
    assert_eq!(a.ref_count(), 3);
    drop(b);
    assert_eq!(c.ref_count(), 2);
}

#[test]
fn last_handle_removes_the_name() {
    let name = unique_name("last");
    let a = ShmHandle::acquire(&name, 128, ShmOpenMode::Create).unwrap();
    drop(a);
    assert!(ShmHandle::acquire(&name, 128, ShmOpenMode::Open).is_err());
}

#[test]
fn kept_object_survives_its_handles() {
    let name = unique_name("kept");
    let mut a = ShmHandle::acquire(&name, 128, ShmOpenMode::Create).unwrap();
    a.keep_on_drop();
    unsafe { *a.get() = 0x5a };
    drop(a);

    let b = ShmHandle::acquire(&name, 128, ShmOpenMode::Open).expect("object kept");
    assert_eq!(unsafe { *b.as_ptr() }, 0x5a);
    assert!(ShmHandle::unlink_by_name(&name));
    assert!(!ShmHandle::unlink_by_name(&name));
}

#[test]
fn unlinked_name_can_not_be_opened() {
    let name = unique_name("unlinked");
    let a = ShmHandle::acquire(&name, 64, ShmOpenMode::Create).unwrap();
    a.unlink();
    assert!(ShmHandle::acquire(&name, 64, ShmOpenMode::Open).is_err());
    // the mapping itself stays valid
    unsafe { *a.get() = 1 };
}

#[test]
fn invalid_requests_fail() {
    assert!(ShmHandle::acquire("", 64, ShmOpenMode::Create).is_err());
    assert!(ShmHandle::acquire(&unique_name("zero"), 0, ShmOpenMode::Create).is_err());
}
