//! Enum types for issue templates.
//!
//! Each enum has:
//! - Custom Serialize (as lowercase string)
//! - Custom Deserialize (known variants only, unknown strings are rejected)
//! - `as_str()`, `is_default()`, `Display` and `FromStr` impls

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Error returned when a string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
    pub expected: String,
}

// ---------------------------------------------------------------------------
// Macro: defines a closed enum with string variants and optional aliases.
// ---------------------------------------------------------------------------
macro_rules! define_enum {
    (
        $(#[$meta:meta])*
        $name:ident, kind = $kind:expr, default = $default:ident,
        variants: [
            $( ($variant:ident, $str:literal $(, aliases = [$($alias:literal),* $(,)?])? ) ),+ $(,)?
        ]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $( $variant, )+
        }

        impl $name {
            /// All variants in declaration order.
            pub const ALL: &'static [$name] = &[ $( Self::$variant, )+ ];

            /// Returns the string representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $str, )+
                }
            }

            /// Returns `true` if this is the default variant.
            pub fn is_default(&self) -> bool {
                *self == Self::$default
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
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let lowered = s.trim().to_ascii_lowercase();
                match lowered.as_str() {
                    $(
                        $str => Ok(Self::$variant),
                        $( $( $alias => Ok(Self::$variant), )* )?
                    )+
                    _ => Err(UnknownVariant {
                        kind: $kind,
                        value: s.to_owned(),
                        expected: [$( $str ),+].join(", "),
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

// ===========================================================================
// IssueType
// ===========================================================================

define_enum! {
    /// Jira issue type a template produces.
    IssueType, kind = "issue type", default = Task,
    variants: [
        (Epic, "epic"),
        (Task, "task"),
        (Subtask, "subtask", aliases = ["sub-task"]),
    ]
}

impl IssueType {
    /// Returns `true` if an issue of this type may be the parent of `child`.
    ///
    /// Epics hold tasks, tasks hold subtasks. Nothing else nests.
    pub fn can_parent(&self, child: IssueType) -> bool {
        matches!(
            (*self, child),
            (Self::Epic, Self::Task) | (Self::Task, Self::Subtask)
        )
    }

    /// Whether an issue of this type must have a parent.
    pub fn requires_parent(&self) -> bool {
        *self == Self::Subtask
    }
}

// ===========================================================================
// OnRespin
// ===========================================================================

define_enum! {
    /// What happens to an already-created issue when the erratum is respun.
    OnRespin, kind = "on_respin action", default = Close,
    variants: [
        (Close, "close"),
        (Keep, "keep"),
    ]
}

// ===========================================================================
// TransitionCategory
// ===========================================================================

define_enum! {
    /// Category of Jira status labels an issue can be moved into.
    TransitionCategory, kind = "transition category", default = Closed,
    variants: [
        (Closed, "closed"),
        (Dropped, "dropped"),
        (Processed, "processed"),
        (Passed, "passed"),
    ]
}
