//! Pivot references for id-relative positioning.
//!
//! A pivot names the existing stack item an insertion or move is anchored
//! to. In configuration files it appears either as a bare id string or as a
//! single-key map (`{ before = "id" }` / `{ after = "id" }`).

use crate::error::StackError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference point for positioning an insertion or move relative to an
/// existing item id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PivotRepr", into = "PivotRepr")]
pub enum Pivot {
    /// Bare id, shorthand for inserting immediately after that id.
    Id(String),
    /// Position immediately before the item with this id.
    Before(String),
    /// Position immediately after the item with this id.
    After(String),
}

impl Pivot {
    pub fn id(id: impl Into<String>) -> Self {
        Pivot::Id(id.into())
    }

    pub fn before(id: impl Into<String>) -> Self {
        Pivot::Before(id.into())
    }

    pub fn after(id: impl Into<String>) -> Self {
        Pivot::After(id.into())
    }

    /// The id of the item this pivot is anchored to.
    pub fn anchor(&self) -> &str {
        match self {
            Pivot::Id(id) | Pivot::Before(id) | Pivot::After(id) => id,
        }
    }
}

impl fmt::Display for Pivot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pivot::Id(id) => write!(f, "\"{id}\""),
            Pivot::Before(id) => write!(f, "before \"{id}\""),
            Pivot::After(id) => write!(f, "after \"{id}\""),
        }
    }
}

/// Wire shape of a pivot. A keyed map carrying both `before` and `after`
/// resolves to `before`, matching the source system; a map with neither key
/// is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum PivotRepr {
    Id(String),
    Keyed {
        #[serde(skip_serializing_if = "Option::is_none")]
        before: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        after: Option<String>,
    },
}

impl TryFrom<PivotRepr> for Pivot {
    type Error = StackError;

    fn try_from(repr: PivotRepr) -> Result<Self, StackError> {
        match repr {
            PivotRepr::Id(id) => Ok(Pivot::Id(id)),
            PivotRepr::Keyed {
                before: Some(id), ..
            } => Ok(Pivot::Before(id)),
            PivotRepr::Keyed {
                after: Some(id), ..
            } => Ok(Pivot::After(id)),
            PivotRepr::Keyed {
                before: None,
                after: None,
            } => Err(StackError::InvalidPivot(
                "expected a bare id or a \"before\"/\"after\" key".to_string(),
            )),
        }
    }
}

impl From<Pivot> for PivotRepr {
    fn from(pivot: Pivot) -> Self {
        match pivot {
            Pivot::Id(id) => PivotRepr::Id(id),
            Pivot::Before(id) => PivotRepr::Keyed {
                before: Some(id),
                after: None,
            },
            Pivot::After(id) => PivotRepr::Keyed {
                before: None,
                after: Some(id),
            },
        }
    }
}
