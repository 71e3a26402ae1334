//! Resource-capacity model.
//!
//! Maps a shareable operation class (`load`, `mul`, ...) to the maximum
//! number of instances that may be issued in the same cycle (or, for
//! pipelined schedules, the same MRT column).
//!
//! Entries are validated one by one against a fixed allow-list: a bad
//! entry is reported and skipped, the rest of the map still applies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{error, warn};

use super::OpKind;

/// Operation classes that may carry a capacity limit.
pub const ALLOWED_RESOURCES: [&str; 8] =
    ["load", "store", "add", "sub", "mul", "div", "zext", "sext"];

/// A rejected capacity entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceConfigError {
    /// The name is not a schedulable resource class.
    #[error("resource '{name}' is not allowed (allowed resources = {allowed:?})")]
    UnknownType {
        name: String,
        allowed: &'static [&'static str],
    },

    /// Capacities must be positive integers.
    #[error("resource '{name}' has invalid capacity {value}; expected a positive integer")]
    InvalidCapacity { name: String, value: i64 },

    /// The capacity is not an integer at all (a string, a fraction, ...).
    #[error("resource '{name}' has malformed capacity {value}; expected a positive integer")]
    MalformedCapacity { name: String, value: String },
}

/// Per-class capacity limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    limits: BTreeMap<String, u32>,
}

impl ResourceLimits {
    /// Creates an empty (unconstrained) map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from raw entries, returning the rejected ones.
    pub fn from_entries<I, K>(entries: I) -> (Self, Vec<ResourceConfigError>)
    where
        I: IntoIterator<Item = (K, i64)>,
        K: AsRef<str>,
    {
        let mut limits = Self::new();
        let errors = limits.extend(entries);
        (limits, errors)
    }

    /// Builder: sets one entry. A rejected entry is logged and skipped,
    /// like in [`extend`](Self::extend); use [`set`](Self::set) to see the
    /// error.
    pub fn with(mut self, class: &str, capacity: u32) -> Self {
        self.extend([(class, i64::from(capacity))]);
        self
    }

    /// Sets the capacity of one class.
    ///
    /// Returns the previous capacity, if any.
    pub fn set(&mut self, class: &str, capacity: i64) -> Result<Option<u32>, ResourceConfigError> {
        if !ALLOWED_RESOURCES.contains(&class) {
            return Err(ResourceConfigError::UnknownType {
                name: class.to_string(),
                allowed: &ALLOWED_RESOURCES,
            });
        }
        let cap = u32::try_from(capacity)
            .ok()
            .filter(|&c| c > 0)
            .ok_or_else(|| ResourceConfigError::InvalidCapacity {
                name: class.to_string(),
                value: capacity,
            })?;
        let old = self.limits.insert(class.to_string(), cap);
        if let Some(old) = old {
            warn!(
                resource = class,
                old, new = cap, "resource already present, overriding capacity"
            );
        }
        Ok(old)
    }

    /// Applies raw entries; bad entries are logged, skipped and returned.
    pub fn extend<I, K>(&mut self, entries: I) -> Vec<ResourceConfigError>
    where
        I: IntoIterator<Item = (K, i64)>,
        K: AsRef<str>,
    {
        let mut errors = Vec::new();
        for (name, capacity) in entries {
            if let Err(e) = self.set(name.as_ref(), capacity) {
                error!(%e, "rejected resource entry");
                errors.push(e);
            }
        }
        errors
    }

    /// Capacity of a class, if limited.
    pub fn capacity(&self, class: &str) -> Option<u32> {
        self.limits.get(class).copied()
    }

    /// Capacity applying to an operation kind, if limited.
    pub fn capacity_for(&self, kind: OpKind) -> Option<u32> {
        kind.resource_class().and_then(|c| self.capacity(c))
    }

    /// Limited classes with their capacities, in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.limits.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// Number of limited classes.
    pub fn len(&self) -> usize {
        self.limits.len()
    }

    /// Whether no class is limited.
    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_lookup() {
        let limits = ResourceLimits::new().with("mul", 1).with("add", 2);
        assert_eq!(limits.capacity("mul"), Some(1));
        assert_eq!(limits.capacity_for(OpKind::Add), Some(2));
        assert_eq!(limits.capacity_for(OpKind::Load), None);
        assert_eq!(limits.len(), 2);
    }

    #[test]
    fn test_unknown_entry_skipped_rest_applied() {
        let (limits, errors) =
            ResourceLimits::from_entries([("mul", 1), ("fmul", 2), ("add", 3)]);
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            ResourceConfigError::UnknownType { name, .. } if name == "fmul"
        ));
        assert_eq!(limits.capacity("mul"), Some(1));
        assert_eq!(limits.capacity("add"), Some(3));
    }

    #[test]
    fn test_non_positive_capacity_rejected() {
        let (limits, errors) = ResourceLimits::from_entries([("mul", 0), ("add", -2)]);
        assert_eq!(errors.len(), 2);
        assert!(limits.is_empty());
        assert_eq!(
            errors[1],
            ResourceConfigError::InvalidCapacity {
                name: "add".into(),
                value: -2
            }
        );
    }

    #[test]
    fn test_builder_skips_rejected_entry() {
        let limits = ResourceLimits::new()
            .with("fpu", 2)
            .with("mul", 0)
            .with("load", 1);
        assert_eq!(limits.len(), 1);
        assert_eq!(limits.capacity("fpu"), None);
        assert_eq!(limits.capacity("mul"), None);
        assert_eq!(limits.capacity("load"), Some(1));
    }

    #[test]
    fn test_override_returns_old_value() {
        let mut limits = ResourceLimits::new();
        assert_eq!(limits.set("div", 1).unwrap(), None);
        assert_eq!(limits.set("div", 4).unwrap(), Some(1));
        assert_eq!(limits.capacity_for(OpKind::SDiv), Some(4));
    }

    #[test]
    fn test_error_message_lists_allowed() {
        let err = ResourceLimits::new().set("phi", 1).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("phi"));
        assert!(msg.contains("zext"));
    }
}
