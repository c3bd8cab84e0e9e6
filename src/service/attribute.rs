// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Key/value metadata attached to a service at creation and checked on open.

use crate::semantic_string::semantic_string;
use crate::CallbackProgression;

pub const MAX_ATTRIBUTE_KEY_LENGTH: usize = 64;
pub const MAX_ATTRIBUTE_VALUE_LENGTH: usize = 256;

semantic_string!(
    /// Attribute key, non-empty.
    AttributeKey,
    max = MAX_ATTRIBUTE_KEY_LENGTH,
    allow_empty = false
);

semantic_string!(
    /// Attribute value, may be empty.
    AttributeValue,
    max = MAX_ATTRIBUTE_VALUE_LENGTH,
    allow_empty = true
);

/// One key/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    key: AttributeKey,
    value: AttributeValue,
}

impl Attribute {
    pub fn key(&self) -> &AttributeKey {
        &self.key
    }

    pub fn value(&self) -> &AttributeValue {
        &self.value
    }
}

/// Ordered multimap of attributes. Keys may repeat; definition order is kept.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttributeSet(Vec<Attribute>);

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, key: AttributeKey, value: AttributeValue) {
        self.0.push(Attribute { key, value });
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }

    /// Number of values stored under `key`.
    pub fn number_of_key_values(&self, key: &AttributeKey) -> usize {
        self.0.iter().filter(|a| &a.key == key).count()
    }

    /// The `idx`-th value stored under `key`, in definition order.
    pub fn key_value(&self, key: &AttributeKey, idx: usize) -> Option<&AttributeValue> {
        self.0
            .iter()
            .filter(|a| &a.key == key)
            .nth(idx)
            .map(|a| &a.value)
    }

    /// Visit every value of `key` in definition order until the callback stops.
    pub fn iter_key_values<F>(&self, key: &AttributeKey, mut callback: F)
    where
        F: FnMut(&AttributeValue) -> CallbackProgression,
    {
        for a in self.0.iter().filter(|a| &a.key == key) {
            if callback(&a.value) == CallbackProgression::Stop {
                break;
            }
        }
    }

    fn contains(&self, key: &AttributeKey, value: &AttributeValue) -> bool {
        self.0.iter().any(|a| &a.key == key && &a.value == value)
    }

    fn contains_key(&self, key: &AttributeKey) -> bool {
        self.0.iter().any(|a| &a.key == key)
    }
}

impl<'a> IntoIterator for &'a AttributeSet {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Builds the attribute set of a service that is about to be created.
#[derive(Debug, Clone, Default)]
pub struct AttributeSpecifier(AttributeSet);

impl AttributeSpecifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair. Defining a key again adds another value.
    pub fn define(mut self, key: &AttributeKey, value: &AttributeValue) -> Self {
        self.0.push(key.clone(), value.clone());
        self
    }

    pub fn attributes(&self) -> &AttributeSet {
        &self.0
    }
}

/// Requirements an existing service's attributes must satisfy on open.
#[derive(Debug, Clone, Default)]
pub struct AttributeVerifier {
    required_attributes: AttributeSet,
    required_keys: Vec<AttributeKey>,
}

impl AttributeVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// The service must carry exactly this pair.
    pub fn require(mut self, key: &AttributeKey, value: &AttributeValue) -> Self {
        self.required_attributes.push(key.clone(), value.clone());
        self
    }

    /// The service must carry at least one value for `key`.
    pub fn require_key(mut self, key: &AttributeKey) -> Self {
        self.required_keys.push(key.clone());
        self
    }

    pub fn required_attributes(&self) -> &AttributeSet {
        &self.required_attributes
    }

    pub fn required_keys(&self) -> &[AttributeKey] {
        &self.required_keys
    }

    /// `Err` carries the first requirement that `rhs` does not meet; required
    /// pairs are checked before required keys.
    pub fn verify_requirements(&self, rhs: &AttributeSet) -> Result<(), AttributeKey> {
        for required in self.required_attributes.iter() {
            if !rhs.contains(&required.key, &required.value) {
                return Err(required.key.clone());
            }
        }
        for key in &self.required_keys {
            if !rhs.contains_key(key) {
                return Err(key.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(s: &str) -> AttributeKey {
        AttributeKey::new(s).unwrap()
    }

    fn v(s: &str) -> AttributeValue {
        AttributeValue::new(s).unwrap()
    }

    #[test]
    fn specifier_keeps_definition_order() {
        let specifier = AttributeSpecifier::new()
            .define(&k("zeta"), &v("1"))
            .define(&k("alpha"), &v("2"))
            .define(&k("zeta"), &v("3"));
        let keys: Vec<&str> = specifier.attributes().iter().map(|a| a.key().as_str()).collect();
        assert_eq!(keys, ["zeta", "alpha", "zeta"]);

        let mut values = Vec::new();
        specifier.attributes().iter_key_values(&k("zeta"), |value| {
            values.push(value.to_string());
            CallbackProgression::Continue
        });
        assert_eq!(values, ["1", "3"]);
        assert_eq!(specifier.attributes().number_of_key_values(&k("zeta")), 2);
        assert_eq!(specifier.attributes().key_value(&k("zeta"), 1), Some(&v("3")));
        assert_eq!(specifier.attributes().key_value(&k("zeta"), 2), None);
    }

    #[test]
    fn iter_key_values_stops_when_asked() {
        let specifier = AttributeSpecifier::new()
            .define(&k("a"), &v("1"))
            .define(&k("a"), &v("2"));
        let mut seen = 0;
        specifier.attributes().iter_key_values(&k("a"), |_| {
            seen += 1;
            CallbackProgression::Stop
        });
        assert_eq!(seen, 1);
    }

    #[test]
    fn verifier_reports_first_missing_requirement() {
        let set = AttributeSpecifier::new()
            .define(&k("color"), &v("red"))
            .define(&k("size"), &v("xl"));

        let ok = AttributeVerifier::new()
            .require(&k("color"), &v("red"))
            .require_key(&k("size"));
        assert_eq!(ok.verify_requirements(set.attributes()), Ok(()));

        let wrong_value = AttributeVerifier::new()
            .require(&k("size"), &v("xl"))
            .require(&k("color"), &v("blue"))
            .require_key(&k("shape"));
        assert_eq!(wrong_value.verify_requirements(set.attributes()), Err(k("color")));

        let missing_key = AttributeVerifier::new().require_key(&k("shape"));
        assert_eq!(missing_key.verify_requirements(set.attributes()), Err(k("shape")));
    }

    #[test]
    fn empty_verifier_accepts_anything() {
        assert_eq!(
            AttributeVerifier::new().verify_requirements(&AttributeSet::new()),
            Ok(())
        );
    }
}
