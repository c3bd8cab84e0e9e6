// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Spin lock that lives inside shared memory, with adaptive backoff:
// spin → pause → yield → sleep.

use std::sync::atomic::{AtomicU32, Ordering};

/// Adaptive backoff.
///
/// - k < 4:  busy spin (do nothing)
/// - k < 16: CPU pause hint
/// - k < 32: thread yield
/// - k >= 32: sleep 1ms
#[inline]
pub(crate) fn adaptive_yield(k: &mut u32) {
    if *k < 4 {
        // busy spin
    } else if *k < 16 {
        std::hint::spin_loop();
    } else if *k < 32 {
        std::thread::yield_now();
    } else {
        std::thread::sleep(std::time::Duration::from_millis(1));
        return;
    }
    *k += 1;
}

/// A spin lock over an `AtomicU32` that may be placed in a shared segment.
///
/// A zero-filled word is an unlocked lock, so freshly truncated shared memory
/// needs no initialisation.
#[repr(transparent)]
pub(crate) struct SpinLock {
    lc: AtomicU32,
}

impl SpinLock {
    /// Acquire the lock (spinning with adaptive backoff).
    pub(crate) fn lock(&self) -> SpinGuard<'_> {
        let mut k = 0u32;
        while self
            .lc
            .compare_exchange_weak(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            adaptive_yield(&mut k);
        }
        SpinGuard { lock: self }
    }

    fn unlock(&self) {
        self.lc.store(0, Ordering::Release);
    }
}

pub(crate) struct SpinGuard<'a> {
    lock: &'a SpinLock,
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn zeroed_word_is_unlocked() {
        let lock: SpinLock = unsafe { std::mem::zeroed() };
        drop(lock.lock());
        drop(lock.lock());
    }

    #[test]
    fn guards_serialise_threads() {
        struct Shared {
            lock: SpinLock,
            value: std::cell::UnsafeCell<u64>,
        }
        unsafe impl Sync for Shared {}

        let shared = Arc::new(Shared {
            lock: SpinLock { lc: AtomicU32::new(0) },
            value: std::cell::UnsafeCell::new(0),
        });
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let s = Arc::clone(&shared);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let _g = s.lock.lock();
                        unsafe { *s.value.get() += 1 };
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(unsafe { *shared.value.get() }, 4000);
    }
}
