//! Dependency types -- relationships between issues.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::DependencyType;

/// Represents a relationship between issues.
///
/// `issue_id` is the subject and `depends_on_id` the object: the subject is
/// blocked by (or, for `parent-child`, contained in) the object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub issue_id: String,

    pub depends_on_id: String,

    /// Dependency type (serialised as "type" in JSON).
    #[serde(rename = "type")]
    pub dep_type: DependencyType,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_by: String,

    /// Type-specific edge data (JSON blob).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metadata: String,
}

impl Dependency {
    pub fn new(
        issue_id: impl Into<String>,
        depends_on_id: impl Into<String>,
        dep_type: DependencyType,
    ) -> Self {
        Self {
            issue_id: issue_id.into(),
            depends_on_id: depends_on_id.into(),
            dep_type,
            created_at: Utc::now(),
            created_by: String::new(),
            metadata: String::new(),
        }
    }

    pub fn created_by(mut self, actor: impl Into<String>) -> Self {
        self.created_by = actor.into();
        self
    }

    /// The identity of this edge. Two dependencies with the same key are the
    /// same edge regardless of timestamps or metadata.
    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            subject: self.issue_id.clone(),
            object: self.depends_on_id.clone(),
            kind: self.dep_type.clone(),
        }
    }
}

/// The `(subject, object, kind)` triple that uniquely identifies an edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub subject: String,
    pub object: String,
    #[serde(rename = "type")]
    pub kind: DependencyType,
}

impl EdgeKey {
    pub fn new(subject: impl Into<String>, object: impl Into<String>, kind: DependencyType) -> Self {
        Self {
            subject: subject.into(),
            object: object.into(),
            kind,
        }
    }

    /// Converts the key into a fresh dependency record attributed to `actor`.
    pub fn into_dependency(self, actor: &str) -> Dependency {
        Dependency::new(self.subject, self.object, self.kind).created_by(actor)
    }
}

impl From<&Dependency> for EdgeKey {
    fn from(dep: &Dependency) -> Self {
        dep.key()
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} --{}--> {}", self.subject, self.kind, self.object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_serializes_type_field() {
        let dep = Dependency::new("bd-abc", "bd-def", DependencyType::Blocks).created_by("alice");

        let json = serde_json::to_string(&dep).unwrap();
        assert!(json.contains(r#""type":"blocks""#));
        assert!(!json.contains("metadata"));

        let back: Dependency = serde_json::from_str(&json).unwrap();
        assert_eq!(back.dep_type, DependencyType::Blocks);
        assert_eq!(back.created_by, "alice");
    }

    #[test]
    fn key_ignores_timestamps() {
        let a = Dependency::new("a", "b", DependencyType::WaitsFor);
        let mut b = a.clone();
        b.created_at = b.created_at + chrono::Duration::seconds(5);
        b.metadata = "{}".into();
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), EdgeKey::new("a", "b", DependencyType::Blocks));
    }

    #[test]
    fn edge_key_display() {
        let k = EdgeKey::new("h", "t", DependencyType::Blocks);
        assert_eq!(k.to_string(), "h --blocks--> t");
        assert_eq!(k.into_dependency("bob").created_by, "bob");
    }
}
