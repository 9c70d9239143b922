//! Enum types for the beads system.
//!
//! Open enums (`Status`, `IssueType`, `DependencyType`, `EventType`) keep a
//! catch-all variant so rows written by newer tools still load. Closed enums
//! (`ItemKind`, `DependencyClass`, `BondPolicy`, `AttachType`, `OperandKind`)
//! reject unknown strings.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Macro: defines an enum with known string variants + a Custom(String) fallback.
// ---------------------------------------------------------------------------
macro_rules! define_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident, custom_variant = $custom_variant:ident,
        variants: [
            $( ($variant:ident, $str:expr) ),+ $(,)?
        ]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $( $variant, )+
            $custom_variant(String),
        }

        impl $name {
            /// Returns the string representation.
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $str, )+
                    Self::$custom_variant(s) => s.as_str(),
                }
            }

            /// Returns `true` if this is the default variant.
            pub fn is_default(&self) -> bool {
                *self == Self::$default
            }

            /// Returns `true` if this is a built-in (non-custom) variant.
            pub fn is_builtin(&self) -> bool {
                !matches!(self, Self::$custom_variant(_))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Ok(Self::from(s))
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                match s {
                    $( $str => Self::$variant, )+
                    other => Self::$custom_variant(other.to_owned()),
                }
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                match s.as_str() {
                    $( $str => Self::$variant, )+
                    _ => Self::$custom_variant(s),
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro: closed enum, no fallback. Parsing an unknown string is an error.
// ---------------------------------------------------------------------------
macro_rules! define_closed_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident,
        variants: [
            $( ($variant:ident, $str:expr) ),+ $(,)?
        ]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $( $variant, )+
        }

        impl $name {
            /// All variants in declaration order.
            pub const ALL: &'static [Self] = &[ $( Self::$variant, )+ ];

            /// Returns the string representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $str, )+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $str => Ok(Self::$variant), )+
                    other => Err(ParseEnumError {
                        kind: stringify!($name),
                        value: other.to_owned(),
                        expected: Self::ALL.iter().map(|v| v.as_str()).collect(),
                    }),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Returned when a string does not name a variant of a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} '{value}' (expected one of: {})", expected.join(", "))]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
    expected: Vec<&'static str>,
}

// ===========================================================================
// Status
// ===========================================================================

define_enum! {
    /// Current state of an item.
    Status, default = Open, custom_variant = Custom,
    variants: [
        (Open, "open"),
        (InProgress, "in_progress"),
        (Blocked, "blocked"),
        (Deferred, "deferred"),
        (Closed, "closed"),
    ]
}

impl Status {
    /// Only `closed` releases the items blocked by this one.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

// ===========================================================================
// IssueType
// ===========================================================================

define_enum! {
    /// Categorises the kind of work.
    IssueType, default = Task, custom_variant = Custom,
    variants: [
        (Bug, "bug"),
        (Feature, "feature"),
        (Task, "task"),
        (Epic, "epic"),
        (Chore, "chore"),
        (Molecule, "molecule"),
        (Gate, "gate"),
    ]
}

impl IssueType {
    /// Normalises aliases to their canonical form.
    pub fn normalize(&self) -> Self {
        match self.as_str() {
            "enhancement" | "feat" => Self::Feature,
            "mol" => Self::Molecule,
            _ => self.clone(),
        }
    }

    /// Maps the open issue type onto the closed item kind the graph reasons about.
    pub fn item_kind(&self) -> ItemKind {
        match self.normalize() {
            Self::Epic | Self::Molecule => ItemKind::Container,
            Self::Gate => ItemKind::Gate,
            _ => ItemKind::Task,
        }
    }
}

// ===========================================================================
// ItemKind
// ===========================================================================

define_closed_enum! {
    /// What an item is to the dependency graph.
    ItemKind, default = Task,
    variants: [
        (Container, "container"),
        (Task, "task"),
        (Gate, "gate"),
    ]
}

impl ItemKind {
    /// Containers group children and are never boundary steps.
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Container)
    }
}

// ===========================================================================
// DependencyType
// ===========================================================================

define_enum! {
    /// Relationship type between items.
    DependencyType, default = Blocks, custom_variant = Custom,
    variants: [
        (Blocks, "blocks"),
        (ParentChild, "parent-child"),
        (ConditionalBlocks, "conditional-blocks"),
        (WaitsFor, "waits-for"),
        (Related, "related"),
        (DiscoveredFrom, "discovered-from"),
        (RepliesTo, "replies-to"),
        (RelatesTo, "relates-to"),
        (Duplicates, "duplicates"),
        (Supersedes, "supersedes"),
        (Tracks, "tracks"),
        (CausedBy, "caused-by"),
        (Validates, "validates"),
    ]
}

impl DependencyType {
    /// Static classification of the built-in kinds. `None` for custom kinds,
    /// which only a [`Classifier`](crate::classify::Classifier) can resolve.
    pub fn builtin_class(&self) -> Option<DependencyClass> {
        match self {
            Self::Blocks | Self::ConditionalBlocks | Self::WaitsFor => {
                Some(DependencyClass::Blocking)
            }
            Self::ParentChild => Some(DependencyClass::Containment),
            Self::Custom(_) => None,
            _ => Some(DependencyClass::Informational),
        }
    }

    /// Returns `true` if this dependency type blocks work (affects ready calculation).
    ///
    /// Containment is not blocking by itself.
    pub fn affects_ready_work(&self) -> bool {
        self.builtin_class() == Some(DependencyClass::Blocking)
    }

    /// Returns `true` for the parent/child grouping edge.
    pub fn is_containment(&self) -> bool {
        matches!(self, Self::ParentChild)
    }
}

// ===========================================================================
// DependencyClass
// ===========================================================================

define_closed_enum! {
    /// How a dependency kind participates in readiness.
    DependencyClass, default = Informational,
    variants: [
        (Blocking, "blocking"),
        (Containment, "containment"),
        (Informational, "informational"),
    ]
}

// ===========================================================================
// Bond policy and operands
// ===========================================================================

define_closed_enum! {
    /// How a spawned subgraph is wired to its head.
    BondPolicy, default = Default,
    variants: [
        (Default, "default"),
        (Require, "require"),
    ]
}

define_closed_enum! {
    /// Blocking kind of the single edge a `default` bond creates.
    AttachType, default = Sequential,
    variants: [
        (Sequential, "sequential"),
        (Conditional, "conditional"),
    ]
}

impl AttachType {
    /// The dependency type written for this attachment.
    pub fn dependency_type(&self) -> DependencyType {
        match self {
            Self::Sequential => DependencyType::Blocks,
            Self::Conditional => DependencyType::ConditionalBlocks,
        }
    }
}

define_closed_enum! {
    /// Where a bond operand came from.
    OperandKind, default = Proto,
    variants: [
        (Formula, "formula"),
        (Proto, "proto"),
    ]
}

// ===========================================================================
// EventType
// ===========================================================================

define_enum! {
    /// Categorises audit trail events.
    EventType, default = Created, custom_variant = Other,
    variants: [
        (Created, "created"),
        (StatusChanged, "status_changed"),
        (Closed, "closed"),
        (Reopened, "reopened"),
        (DependencyAdded, "dependency_added"),
        (DependencyRemoved, "dependency_removed"),
    ]
}
