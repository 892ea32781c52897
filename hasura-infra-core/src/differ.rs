//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the "desired state" emitted by the topology builders with the
//! "current state" fetched from the Provider, and generates a list of
//! required Effects (Plan).

use std::collections::{HashMap, HashSet};

use crate::effect::Effect;
use crate::interpreter::{Bindings, bind_state};
use crate::plan::Plan;
use crate::resource::{RemovalPolicy, Resource, ResourceId, State, Value};

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Immutable resource exists with differences -> needs replacement
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes);

    if changed.is_empty() {
        Diff::NoChange(desired.id.clone())
    } else if desired.immutable && desired.removal_policy != RemovalPolicy::Retain {
        // Retained resources are never replaced: replacement would delete them
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Find changed attributes between desired and current state
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
) -> Vec<String> {
    let mut changed = Vec::new();

    for (key, desired_value) in desired {
        // Skip internal attributes (starting with _)
        if key.starts_with('_') {
            continue;
        }

        match current.get(key) {
            Some(current_value) if current_value == desired_value => {}
            _ => changed.push(key.clone()),
        }
    }

    changed.sort();
    changed
}

/// Compute Diff for multiple resources and generate a Plan
///
/// Data sources always produce a Read so that their lookup is part of every run.
/// References are compared by the value they had when last applied, taken from
/// `current_states` (which may also hold states of earlier units). Effects
/// keep the references so they resolve against the bindings of the run itself.
///
/// A declaration referencing one that gets a new identity in this plan is
/// changed too, even when its recorded values still match.
pub fn create_plan(desired: &[Resource], current_states: &HashMap<ResourceId, State>) -> Plan {
    let mut bindings = Bindings::new();
    for state in current_states.values().filter(|s| s.exists) {
        bind_state(&mut bindings, state);
    }

    let mut plan = Plan::new();
    let mut renewed: HashSet<String> = HashSet::new();

    for resource in desired {
        if resource.is_data_source() {
            plan.add(Effect::Read(resource.clone()));
            continue;
        }

        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        let mut comparable = resource.clone();
        for value in comparable.attributes.values_mut() {
            *value = value.resolve(&bindings);
        }

        let mut outcome = diff(&comparable, &current);
        if let Diff::NoChange(id) = &outcome
            && let Some(dependency) = resource
                .dependencies()
                .into_iter()
                .find(|d| renewed.contains(d))
        {
            log::debug!("{} follows replaced dependency {}", id, dependency);
            outcome = forced_change(resource, current);
        }

        match outcome {
            Diff::Create(_) => {
                renewed.insert(resource.binding().to_string());
                plan.add(Effect::Create(resource.clone()));
            }
            Diff::Update { id, from, .. } => plan.add(Effect::Update {
                id,
                from,
                to: resource.clone(),
            }),
            Diff::Replace { id, from, .. } => {
                renewed.insert(resource.binding().to_string());
                plan.add(Effect::Replace {
                    id,
                    from,
                    to: resource.clone(),
                });
            }
            Diff::NoChange(_) => {}
        }
    }

    plan
}

/// Change for a declaration whose own values match but whose dependency is renewed
fn forced_change(resource: &Resource, current: State) -> Diff {
    let id = resource.id.clone();
    let to = resource.clone();
    if resource.immutable && resource.removal_policy != RemovalPolicy::Retain {
        Diff::Replace {
            id,
            from: current,
            to,
            changed_attributes: Vec::new(),
        }
    } else {
        Diff::Update {
            id,
            from: current,
            to,
            changed_attributes: Vec::new(),
        }
    }
}

/// Generate a Plan tearing down the given resources in reverse dependency order
///
/// `resources` must be in creation (topological) order. Retained resources are
/// released from management instead of deleted.
pub fn destroy_plan(resources: &[Resource], current_states: &HashMap<ResourceId, State>) -> Plan {
    let mut plan = Plan::new();

    for resource in resources.iter().rev() {
        if resource.is_data_source() {
            continue;
        }
        let Some(state) = current_states.get(&resource.id).filter(|s| s.exists) else {
            continue;
        };

        match resource.removal_policy {
            RemovalPolicy::Retain => plan.add(Effect::Retain {
                id: resource.id.clone(),
            }),
            RemovalPolicy::Destroy => plan.add(Effect::Delete {
                id: resource.id.clone(),
                identifier: state.identifier.clone().unwrap_or_default(),
            }),
        }
    }

    plan
}
