// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Random, collision-resistant identities for ports and nodes.

use std::fmt;

use crate::shm_name::bytes_to_hex;

/// Length in bytes of every port and node identifier.
pub const UNIQUE_PORT_ID_LENGTH: usize = 16;

fn random_non_zero() -> [u8; UNIQUE_PORT_ID_LENGTH] {
    loop {
        let value: u128 = rand::random();
        if value != 0 {
            return value.to_be_bytes();
        }
    }
}

macro_rules! unique_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name([u8; UNIQUE_PORT_ID_LENGTH]);

        impl $name {
            /// A fresh random id. Never all zero.
            pub fn new() -> Self {
                Self(random_non_zero())
            }

            pub fn bytes(&self) -> &[u8; UNIQUE_PORT_ID_LENGTH] {
                &self.0
            }

            pub fn value(&self) -> u128 {
                u128::from_be_bytes(self.0)
            }

            pub(crate) fn from_bytes(bytes: [u8; UNIQUE_PORT_ID_LENGTH]) -> Option<Self> {
                if bytes == [0u8; UNIQUE_PORT_ID_LENGTH] {
                    None
                } else {
                    Some(Self(bytes))
                }
            }

            /// Lowercase hex, used in shared memory object names.
            pub(crate) fn to_hex(&self) -> String {
                bytes_to_hex(&self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }
    };
}

unique_id!(
    /// Identity of a publisher, subscriber, notifier or listener.
    ///
    /// Every received sample carries the id of the publisher that sent it.
    UniquePortId
);

unique_id!(
    /// Identity of a node.
    NodeId
);
