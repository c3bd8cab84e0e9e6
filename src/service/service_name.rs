// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

use crate::semantic_string::semantic_string;

/// Maximum length of a [`ServiceName`] in bytes.
pub const MAX_SERVICE_NAME_LENGTH: usize = 255;

semantic_string!(
    /// Name under which a service is discovered. Non-empty UTF-8, at most
    /// [`MAX_SERVICE_NAME_LENGTH`] bytes.
    ServiceName,
    max = MAX_SERVICE_NAME_LENGTH,
    allow_empty = false
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic_string::SemanticStringError;

    #[test]
    fn accepts_up_to_the_bound() {
        let name = "a".repeat(MAX_SERVICE_NAME_LENGTH);
        assert_eq!(ServiceName::new(&name).map(|n| n.len()), Ok(MAX_SERVICE_NAME_LENGTH));
        assert!(ServiceName::new("My/Funky/Service").is_ok());
    }

    #[test]
    fn rejects_everything_above_the_bound() {
        for extra in 1..10 {
            let name = "b".repeat(MAX_SERVICE_NAME_LENGTH + extra);
            assert_eq!(
                ServiceName::new(&name),
                Err(SemanticStringError::ExceedsMaximumLength)
            );
        }
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(ServiceName::new(""), Err(SemanticStringError::InvalidContent));
    }
}
