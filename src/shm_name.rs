// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Shared memory object naming. Every object a service owns is derived from
// the configured prefix, the service id and, for per-port resources, the
// port ids involved, so any process can compute the name of any segment.

/// FNV-1a 64-bit hash.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

const DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Convert a 64-bit value to a fixed-width 16-char lowercase hex string.
pub(crate) fn to_hex(val: u64) -> String {
    let mut buf = String::with_capacity(16);
    for i in (0..16).rev() {
        buf.push(DIGITS[((val >> (i * 4)) & 0xf) as usize] as char);
    }
    buf
}

/// Lowercase hex of an arbitrary byte string.
pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut buf = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        buf.push(DIGITS[(b >> 4) as usize] as char);
        buf.push(DIGITS[(b & 0xf) as usize] as char);
    }
    buf
}

/// Maximum length for POSIX shm names. Set to 0 to disable truncation.
///
/// On macOS `PSHMNAMLEN` is 31. On Linux the limit is typically 255.
#[cfg(target_os = "macos")]
pub const SHM_NAME_MAX: usize = 31;

#[cfg(not(target_os = "macos"))]
pub const SHM_NAME_MAX: usize = 0; // 0 = no truncation

/// Produce a POSIX shm-safe name (with leading '/').
///
/// When `SHM_NAME_MAX > 0`, names whose POSIX form (including the leading '/')
/// would exceed that limit are shortened to:
///     `/<prefix>_<16-hex-FNV-1a-hash>`
/// where `<prefix>` is a truncated portion of the original name for debuggability.
pub fn make_shm_name(name: &str) -> String {
    let result = if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    };

    if SHM_NAME_MAX == 0 || result.len() <= SHM_NAME_MAX {
        return result;
    }

    // 1 (underscore) + 16 (hex hash)
    const HASH_SUFFIX_LEN: usize = 1 + 16;
    let prefix_len = if SHM_NAME_MAX > HASH_SUFFIX_LEN + 1 {
        SHM_NAME_MAX - HASH_SUFFIX_LEN - 1 // -1 for leading '/'
    } else {
        0
    };

    let hash = fnv1a_64(result.as_bytes());

    let mut shortened = String::with_capacity(SHM_NAME_MAX);
    shortened.push('/');
    if prefix_len > 0 {
        let original_body = &result[1..];
        let mut take = prefix_len.min(original_body.len());
        while !original_body.is_char_boundary(take) {
            take -= 1;
        }
        shortened.push_str(&original_body[..take]);
    }
    shortened.push('_');
    shortened.push_str(&to_hex(hash));
    shortened
}

// ---------------------------------------------------------------------------
// Service object names
// ---------------------------------------------------------------------------

pub(crate) fn registry(prefix: &str) -> String {
    format!("{prefix}registry")
}

pub(crate) fn static_config(prefix: &str, service: &str) -> String {
    format!("{prefix}{service}.s")
}

pub(crate) fn dynamic_config(prefix: &str, service: &str) -> String {
    format!("{prefix}{service}.d")
}

pub(crate) fn data_segment(prefix: &str, service: &str, publisher: &str, index: u32) -> String {
    format!("{prefix}{service}_{publisher}_{index}.p")
}

pub(crate) fn connection(prefix: &str, service: &str, publisher: &str, subscriber: &str) -> String {
    format!("{prefix}{service}_{publisher}_{subscriber}.c")
}

pub(crate) fn listener_events(prefix: &str, service: &str, listener: &str) -> String {
    format!("{prefix}{service}_{listener}.l")
}

/// File name (not a shm object) of a listener's wake-up socket.
pub(crate) fn listener_socket(prefix: &str, listener: &str) -> String {
    format!("{prefix}{listener}.evt")
}
