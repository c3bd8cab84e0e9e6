// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Zero-copy inter-process communication over POSIX shared memory.
//
// Processes create nodes, open or create named services through a shared
// registry, and exchange typed samples (publish-subscribe) or event ids
// (event) through ports. A WaitSet multiplexes listeners and timers.

#[cfg(not(unix))]
compile_error!("zcipc requires a unix platform (POSIX shared memory)");

pub mod config;
pub mod identity;
pub mod node;
pub mod payload;
pub mod port;
pub mod prelude;
pub mod sample;
pub mod semantic_string;
pub mod service;
pub mod shm_name;
pub mod signal;
pub mod version;
pub mod waitset;

mod connection;
mod data_segment;
mod platform;
mod shm;
mod spin_lock;

pub use shm::{ShmHandle, ShmOpenMode};

/// Decision returned by enumeration callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackProgression {
    Continue,
    Stop,
}
