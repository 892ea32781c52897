//! Plan - Collection of Effects
//!
//! A Plan is an ordered list of Effects to be executed.
//! No side effects occur until the Plan is applied.

use std::collections::BTreeMap;

use crate::effect::Effect;

/// Plan containing Effects to be executed
#[derive(Debug, Clone, Default)]
pub struct Plan {
    effects: Vec<Effect>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Number of mutating Effects
    pub fn mutation_count(&self) -> usize {
        self.effects.iter().filter(|e| e.is_mutating()).count()
    }

    /// True when applying this plan would not touch any infrastructure
    pub fn is_noop(&self) -> bool {
        self.mutation_count() == 0 && !self.effects.iter().any(|e| matches!(e, Effect::Retain { .. }))
    }

    /// Append all effects of another plan
    pub fn extend(&mut self, other: Plan) {
        self.effects.extend(other.effects);
    }

    /// Generate a summary of the Plan for display
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for effect in &self.effects {
            match effect {
                Effect::Read(_) => summary.read += 1,
                Effect::Create(_) => summary.create += 1,
                Effect::Update { .. } => summary.update += 1,
                Effect::Replace { .. } => summary.replace += 1,
                Effect::Delete { .. } => summary.delete += 1,
                Effect::Retain { .. } => summary.retain += 1,
            }
        }
        summary
    }

    /// Group effect indices by the unit of their declaration.
    /// Effects without a declaration (delete/retain) are grouped under `None`.
    pub fn group_by_unit(&self) -> BTreeMap<Option<String>, Vec<usize>> {
        let mut groups: BTreeMap<Option<String>, Vec<usize>> = BTreeMap::new();
        for (idx, effect) in self.effects.iter().enumerate() {
            let unit = effect
                .resource()
                .and_then(|r| r.unit())
                .map(str::to_string);
            groups.entry(unit).or_default().push(idx);
        }
        groups
    }

    /// Display effects grouped by unit
    pub fn display_by_unit(&self) -> String {
        let mut output = String::new();
        for (unit, indices) in self.group_by_unit() {
            match unit {
                Some(name) => output.push_str(&format!("Unit: {}\n", name)),
                None => output.push_str("Unassigned:\n"),
            }
            for idx in indices {
                output.push_str(&format!("  {}\n", format_effect_brief(&self.effects[idx])));
            }
            output.push('\n');
        }
        output.push_str(&format!("Summary: {}\n", self.summary()));
        output
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub read: usize,
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
    pub retain: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to replace, {} to delete, {} to retain",
            self.create, self.update, self.replace, self.delete, self.retain
        )
    }
}

/// Format an effect briefly for display
pub fn format_effect_brief(effect: &Effect) -> String {
    match effect {
        Effect::Create(r) => format!("+ {}", r.id),
        Effect::Update { id, .. } => format!("~ {}", id),
        Effect::Replace { id, .. } => format!("-/+ {}", id),
        Effect::Delete { id, .. } => format!("- {}", id),
        Effect::Read(r) => format!("? {}", r.id),
        Effect::Retain { id } => format!("= {}", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Resource, ResourceId, Value};

    #[test]
    fn empty_plan() {
        let plan = Plan::new();
        assert!(plan.is_empty());
        assert!(plan.is_noop());
        assert_eq!(plan.mutation_count(), 0);
    }

    #[test]
    fn plan_summary() {
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("ec2_subnet", "a")));
        plan.add(Effect::Create(Resource::new("ec2_subnet", "b")));
        plan.add(Effect::Delete {
            id: ResourceId::new("ec2_subnet", "c"),
            identifier: "subnet-c".to_string(),
        });
        plan.add(Effect::Retain {
            id: ResourceId::new("rds_db_instance", "d"),
        });

        let summary = plan.summary();
        assert_eq!(summary.create, 2);
        assert_eq!(summary.delete, 1);
        assert_eq!(summary.retain, 1);
        assert_eq!(plan.mutation_count(), 3);
    }

    #[test]
    fn plan_with_only_reads_is_noop() {
        let mut plan = Plan::new();
        plan.add(Effect::Read(
            Resource::new("route53_hosted_zone", "example.com").with_read_only(true),
        ));
        assert!(plan.is_noop());
    }

    #[test]
    fn group_by_unit() {
        let mut plan = Plan::new();
        plan.add(Effect::Create(
            Resource::new("ec2_vpc", "vpc").with_attribute("_unit", Value::string("network")),
        ));
        plan.add(Effect::Create(
            Resource::new("ecs_cluster", "cluster").with_attribute("_unit", Value::string("service")),
        ));
        plan.add(Effect::Create(
            Resource::new("ec2_subnet", "subnet").with_attribute("_unit", Value::string("network")),
        ));

        let groups = plan.group_by_unit();
        assert_eq!(groups.get(&Some("network".to_string())), Some(&vec![0, 2]));
        assert_eq!(groups.get(&Some("service".to_string())), Some(&vec![1]));

        let display = plan.display_by_unit();
        assert!(display.contains("Unit: network"));
        assert!(display.contains("+ ecs_cluster.cluster"));
    }
}
