//! State file structures for persisting deployed resources

use std::collections::HashMap;

use hasura_infra_core::resource::{ResourceId, State, Value};
use serde::{Deserialize, Serialize};

/// Everything recorded about one deployment, across both units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Monotonically increasing number for each state modification
    pub serial: u64,
    /// Unique identifier for this state lineage (prevents accidental overwrites)
    pub lineage: String,
    /// Version of the tool that last wrote this state
    pub tool_version: String,
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self::with_lineage(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_lineage(lineage: String) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    /// Bump the serial before a write
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.tool_version = env!("CARGO_PKG_VERSION").to_string();
    }

    pub fn find_resource(&self, id: &ResourceId) -> Option<&ResourceState> {
        self.resources.iter().find(|r| r.matches(id))
    }

    /// Add or replace the entry for a resource
    pub fn upsert_resource(&mut self, resource: ResourceState) {
        let id = resource.resource_id();
        if let Some(existing) = self.resources.iter_mut().find(|r| r.matches(&id)) {
            *existing = resource;
        } else {
            self.resources.push(resource);
        }
    }

    pub fn remove_resource(&mut self, id: &ResourceId) -> Option<ResourceState> {
        let pos = self.resources.iter().position(|r| r.matches(id))?;
        Some(self.resources.remove(pos))
    }

    /// Entries belonging to one deployment unit
    pub fn unit_resources<'a>(&'a self, unit: &'a str) -> impl Iterator<Item = &'a ResourceState> {
        self.resources.iter().filter(move |r| r.unit == unit)
    }

    /// Current state of every recorded resource, keyed by identity
    pub fn states(&self) -> HashMap<ResourceId, State> {
        self.resources
            .iter()
            .map(|r| (r.resource_id(), r.to_state()))
            .collect()
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub resource_type: String,
    pub name: String,
    /// Provider that created the resource (e.g., "awscc")
    pub provider: String,
    /// Deployment unit that owns the resource
    pub unit: String,
    /// Provider internal identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub attributes: HashMap<String, serde_json::Value>,
    /// Retained on destroy
    #[serde(default)]
    pub protected: bool,
}

impl ResourceState {
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            provider: provider.into(),
            unit: unit.into(),
            identifier: None,
            attributes: HashMap::new(),
            protected: false,
        }
    }

    /// Record a provider state; internal `_` attributes are not persisted
    pub fn from_state(state: &State, provider: &str, unit: &str) -> Self {
        let attributes = state
            .attributes
            .iter()
            .filter(|(k, _)| !k.starts_with('_'))
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        Self {
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            provider: provider.to_string(),
            unit: unit.to_string(),
            identifier: state.identifier.clone(),
            attributes,
            protected: false,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }

    pub fn resource_id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    fn matches(&self, id: &ResourceId) -> bool {
        self.resource_type == id.resource_type && self.name == id.name
    }

    pub fn to_state(&self) -> State {
        let attributes = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect();
        let state = State::existing(self.resource_id(), attributes);
        match &self.identifier {
            Some(identifier) => state.with_identifier(identifier),
            None => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vpc() -> ResourceState {
        ResourceState::new("ec2_vpc", "hasura-dev-vpc", "awscc", "network")
            .with_identifier("vpc-0abc")
            .with_attribute("cidr_block", serde_json::json!("192.168.0.0/16"))
    }

    #[test]
    fn new_state_file_is_empty() {
        let state = StateFile::new();
        assert_eq!(state.version, StateFile::CURRENT_VERSION);
        assert_eq!(state.serial, 0);
        assert!(!state.lineage.is_empty());
        assert!(state.resources.is_empty());
    }

    #[test]
    fn upsert_replaces_by_identity() {
        let mut state = StateFile::new();
        state.upsert_resource(vpc());
        state.upsert_resource(
            vpc().with_attribute("cidr_block", serde_json::json!("10.0.0.0/16")),
        );

        assert_eq!(state.resources.len(), 1);
        assert_eq!(
            state.resources[0].attributes["cidr_block"],
            serde_json::json!("10.0.0.0/16")
        );

        let id = ResourceId::new("ec2_vpc", "hasura-dev-vpc");
        assert!(state.remove_resource(&id).is_some());
        assert!(state.remove_resource(&id).is_none());
    }

    #[test]
    fn states_round_trip_provider_state() {
        let id = ResourceId::new("ec2_vpc", "hasura-dev-vpc");
        let original = State::existing(
            id.clone(),
            HashMap::from([
                ("cidr_block".to_string(), Value::string("192.168.0.0/16")),
                ("_unit".to_string(), Value::string("network")),
            ]),
        )
        .with_identifier("vpc-0abc");

        let mut file = StateFile::new();
        file.upsert_resource(ResourceState::from_state(&original, "awscc", "network"));

        let states = file.states();
        let restored = &states[&id];
        assert!(restored.exists);
        assert_eq!(restored.identifier.as_deref(), Some("vpc-0abc"));
        assert_eq!(restored.attributes.len(), 1);
        assert_eq!(restored.attributes["cidr_block"], Value::string("192.168.0.0/16"));
    }

    #[test]
    fn unit_filter() {
        let mut state = StateFile::new();
        state.upsert_resource(vpc());
        state.upsert_resource(ResourceState::new("ecs_cluster", "hasura-dev-ecs-cluster", "awscc", "service"));

        assert_eq!(state.unit_resources("network").count(), 1);
        assert_eq!(state.unit_resources("service").count(), 1);
    }

    #[test]
    fn serialization_keeps_protection() {
        let mut state = StateFile::new();
        state.upsert_resource(
            ResourceState::new("rds_db_instance", "hasura-dev", "awscc", "network").with_protected(true),
        );

        let json = serde_json::to_string_pretty(&state).unwrap();
        let deserialized: StateFile = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.lineage, state.lineage);
        assert!(deserialized.resources[0].protected);
        assert_eq!(deserialized.resources[0].identifier, None);
    }
}
