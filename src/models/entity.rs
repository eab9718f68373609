//! Entity Identity
//!
//! Named entities producing metric samples (e.g., partitions, brokers), each
//! tagged with the group it belongs to. Groups are the alternative
//! granularity for completeness analysis.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a sample-producing entity
///
/// Equality and the group tag are stable for the lifetime of the entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    name: String,
    group: String,
}

impl EntityId {
    /// Create a new entity identity with its group tag.
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }

    /// Entity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Group this entity belongs to.
    pub fn group(&self) -> &str {
        &self.group
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_entity_equality_includes_group() {
        let a = EntityId::new("topic-0", "rack-a");
        let b = EntityId::new("topic-0", "rack-a");
        let c = EntityId::new("topic-0", "rack-b");
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        set.insert(c);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_display_format() {
        let e = EntityId::new("topic-3", "rack-b");
        assert_eq!(e.to_string(), "topic-3[rack-b]");
    }
}
