//! Effect - Side effects represented as values
//!
//! An Effect describes one change to the infrastructure. Nothing happens
//! until an Interpreter executes it.

use crate::resource::{Resource, ResourceId, State};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Look up an external entity (data source)
    Read(Resource),
    Create(Resource),
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
    },
    /// Create the new declaration, then delete the old physical resource
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
    },
    Delete {
        id: ResourceId,
        identifier: String,
    },
    /// Stop managing the resource but leave it in place
    Retain { id: ResourceId },
}

impl Effect {
    /// Returns true if this effect changes infrastructure
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Effect::Create(_) | Effect::Update { .. } | Effect::Replace { .. } | Effect::Delete { .. }
        )
    }

    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Read(r) | Effect::Create(r) => &r.id,
            Effect::Update { id, .. }
            | Effect::Replace { id, .. }
            | Effect::Delete { id, .. }
            | Effect::Retain { id } => id,
        }
    }

    /// Declaration carried by this effect, if any
    pub fn resource(&self) -> Option<&Resource> {
        match self {
            Effect::Read(r) | Effect::Create(r) => Some(r),
            Effect::Update { to, .. } | Effect::Replace { to, .. } => Some(to),
            Effect::Delete { .. } | Effect::Retain { .. } => None,
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Read(r) => write!(f, "Read {}", r.id),
            Effect::Create(r) => write!(f, "Create {}", r.id),
            Effect::Update { id, .. } => write!(f, "Update {}", id),
            Effect::Replace { id, .. } => write!(f, "Replace {}", id),
            Effect::Delete { id, .. } => write!(f, "Delete {}", id),
            Effect::Retain { id } => write!(f, "Retain {}", id),
        }
    }
}
