// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Length-bounded UTF-8 names shared with other processes.

/// Failure to build a bounded name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SemanticStringError {
    #[error("the string exceeds the maximum supported length")]
    ExceedsMaximumLength,
    #[error("the string content is not valid for this kind of name")]
    InvalidContent,
}

/// Defines a newtype over `String` holding at most `$max` bytes.
macro_rules! semantic_string {
    ($(#[$meta:meta])* $name:ident, max = $max:expr, allow_empty = $allow_empty:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Maximum length in bytes.
            pub const fn max_len() -> usize {
                $max
            }

            pub fn new(value: &str) -> Result<Self, $crate::semantic_string::SemanticStringError> {
                if value.len() > $max {
                    return Err($crate::semantic_string::SemanticStringError::ExceedsMaximumLength);
                }
                if !$allow_empty && value.is_empty() {
                    return Err($crate::semantic_string::SemanticStringError::InvalidContent);
                }
                if value.contains('\0') {
                    return Err($crate::semantic_string::SemanticStringError::InvalidContent);
                }
                Ok(Self(value.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = $crate::semantic_string::SemanticStringError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }
    };
}

pub(crate) use semantic_string;
