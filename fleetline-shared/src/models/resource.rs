use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::UnknownVariant;

/// The two kinds of schedulable resource. Checks are symmetric across both.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Driver,
    Bus,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Driver, ResourceKind::Bus];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Driver => "driver",
            ResourceKind::Bus => "bus",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "driver" | "drivers" => Ok(ResourceKind::Driver),
            "bus" | "buses" => Ok(ResourceKind::Bus),
            _ => Err(UnknownVariant {
                kind: "resource kind",
                value: s.to_string(),
            }),
        }
    }
}

/// A driver or a bus owned by one manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resource {
    pub id: Uuid,
    pub kind: ResourceKind,
    pub manager_id: Uuid,
    /// Driver name or bus plate number
    pub label: String,
    /// Seat count; only buses carry one
    pub capacity: Option<u32>,
    /// Soft-deleted: kept for history, excluded from new assignments
    pub archived: bool,
}

impl Resource {
    pub fn driver(manager_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ResourceKind::Driver,
            manager_id,
            label: name.into(),
            capacity: None,
            archived: false,
        }
    }

    pub fn bus(manager_id: Uuid, plate_number: impl Into<String>, capacity: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ResourceKind::Bus,
            manager_id,
            label: plate_number.into(),
            capacity: Some(capacity),
            archived: false,
        }
    }
}
