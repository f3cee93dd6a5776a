//! Operator-editable message texts, published as an immutable snapshot.

use std::collections::HashMap;

/// The `messages` table contents for one configuration domain.
///
/// Equality is elementwise; the refresh path uses it to decide whether a
/// newly read set replaces the published one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Messages {
    items: HashMap<String, String>,
}

impl Messages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.items.insert(name.into(), value.into());
    }

    /// Message text for `name`, empty when not configured.
    pub fn get(&self, name: &str) -> &str {
        self.items.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_defaults_to_empty() {
        let messages = Messages::new();
        assert_eq!(messages.get("BLOB_STATUS_WITHDRAWN"), "");
        assert!(messages.is_empty());
    }

    #[test]
    fn test_set_then_get() {
        let mut messages = Messages::new();
        messages.set("BLOB_STATUS_SUPPRESSED", "Blob is suppressed");
        assert_eq!(messages.get("BLOB_STATUS_SUPPRESSED"), "Blob is suppressed");
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn test_equality_is_elementwise() {
        let mut a = Messages::new();
        a.set("X", "1");
        a.set("Y", "2");
        let mut b = Messages::new();
        b.set("Y", "2");
        b.set("X", "1");
        assert_eq!(a, b);
        b.set("X", "changed");
        assert_ne!(a, b);
    }
}
