//! Resource - Representing resource declarations and their state

use std::collections::HashMap;

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    /// Resource type (e.g., "ec2_vpc", "rds_db_instance")
    pub resource_type: String,
    /// Deployment-unique name produced by the naming function
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    /// Reference to another resource's attribute (binding_name, attribute_name)
    ResourceRef(String, String),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Build a map value from key/value pairs
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a list of strings
    pub fn strings<S: Into<String>>(items: impl IntoIterator<Item = S>) -> Self {
        Value::List(items.into_iter().map(|s| Value::String(s.into())).collect())
    }

    /// Collect the binding names this value refers to
    pub fn collect_refs<'a>(&'a self, refs: &mut Vec<(&'a str, &'a str)>) {
        match self {
            Value::ResourceRef(binding, attr) => refs.push((binding.as_str(), attr.as_str())),
            Value::List(items) => {
                for item in items {
                    item.collect_refs(refs);
                }
            }
            Value::Map(map) => {
                for v in map.values() {
                    v.collect_refs(refs);
                }
            }
            _ => {}
        }
    }

    /// Returns true if a reference is still present anywhere in this value
    pub fn has_unresolved_ref(&self) -> bool {
        let mut refs = Vec::new();
        self.collect_refs(&mut refs);
        !refs.is_empty()
    }

    /// Replace references with the bound values, leaving unknown ones as-is
    pub fn resolve(&self, bindings: &HashMap<String, HashMap<String, Value>>) -> Value {
        match self {
            Value::ResourceRef(binding, attr) => {
                if let Some(attrs) = bindings.get(binding)
                    && let Some(value) = attrs.get(attr)
                    && value != self
                {
                    return value.resolve(bindings);
                }
                self.clone()
            }
            Value::List(items) => Value::List(items.iter().map(|v| v.resolve(bindings)).collect()),
            Value::Map(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.resolve(bindings)))
                    .collect(),
            ),
            _ => self.clone(),
        }
    }

    /// Convert to JSON for persistence. References are kept in `${binding.attr}` form.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(n) => serde_json::Value::Number((*n).into()),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::ResourceRef(binding, attr) => {
                serde_json::Value::String(format!("${{{}.{}}}", binding, attr))
            }
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Number(n) => Value::Int(n.as_i64().unwrap_or(0)),
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
            serde_json::Value::Null => Value::String(String::new()),
        }
    }
}

/// What happens to the physical resource when its declaration is destroyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemovalPolicy {
    #[default]
    Destroy,
    /// The physical resource survives; only management is dropped
    Retain,
}

/// Desired state declared by a topology builder
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: HashMap<String, Value>,
    /// If true, this is a data source (read-only lookup of an external entity)
    pub read_only: bool,
    pub removal_policy: RemovalPolicy,
    /// If true, changes are applied by replacement instead of in-place update
    pub immutable: bool,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
            read_only: false,
            removal_policy: RemovalPolicy::Destroy,
            immutable: false,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = policy;
        self
    }

    pub fn with_immutable(mut self, immutable: bool) -> Self {
        self.immutable = immutable;
        self
    }

    /// Returns true if this resource is a data source (read-only)
    pub fn is_data_source(&self) -> bool {
        self.read_only
    }

    /// Binding name other declarations use to reference this one
    pub fn binding(&self) -> &str {
        &self.id.name
    }

    /// Unit this declaration belongs to, from the internal `_unit` attribute
    pub fn unit(&self) -> Option<&str> {
        self.attributes.get("_unit").and_then(Value::as_str)
    }

    /// Binding names this resource depends on, in first-seen order
    pub fn dependencies(&self) -> Vec<String> {
        let mut keys: Vec<&String> = self.attributes.keys().collect();
        keys.sort();

        let mut deps: Vec<String> = Vec::new();
        for key in keys {
            let mut refs = Vec::new();
            self.attributes[key].collect_refs(&mut refs);
            for (binding, _) in refs {
                if !deps.iter().any(|d| d == binding) {
                    deps.push(binding.to_string());
                }
            }
        }
        deps
    }

    /// Attributes sent to the provider (internal `_` attributes removed)
    pub fn provider_attributes(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.attributes.iter().filter(|(k, _)| !k.starts_with('_'))
    }
}

/// Current state fetched from actual infrastructure
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Provider internal identifier (e.g., vpc-xxx, an ARN)
    pub identifier: Option<String>,
    pub attributes: HashMap<String, Value>,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: HashMap::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: HashMap<String, Value>) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_are_collected_from_nested_values() {
        let resource = Resource::new("ec2_security_group_ingress", "rule")
            .with_attribute("group_id", Value::ResourceRef("db".into(), "id".into()))
            .with_attribute(
                "nested",
                Value::List(vec![Value::map([(
                    "source",
                    Value::ResourceRef("bastion".into(), "id".into()),
                )])]),
            )
            .with_attribute("again", Value::ResourceRef("db".into(), "arn".into()));

        let deps = resource.dependencies();
        assert_eq!(deps.len(), 2);
        assert!(deps.contains(&"db".to_string()));
        assert!(deps.contains(&"bastion".to_string()));
    }

    #[test]
    fn resolve_replaces_known_refs_only() {
        let mut bindings = HashMap::new();
        bindings.insert(
            "vpc".to_string(),
            HashMap::from([("id".to_string(), Value::string("vpc-123"))]),
        );

        let value = Value::List(vec![
            Value::ResourceRef("vpc".into(), "id".into()),
            Value::ResourceRef("subnet".into(), "id".into()),
        ]);
        let resolved = value.resolve(&bindings);

        assert_eq!(
            resolved,
            Value::List(vec![
                Value::string("vpc-123"),
                Value::ResourceRef("subnet".into(), "id".into()),
            ])
        );
        assert!(resolved.has_unresolved_ref());
    }

    #[test]
    fn json_conversion_keeps_structure() {
        let value = Value::map([
            ("port", Value::Int(5432)),
            ("open", Value::Bool(true)),
            ("names", Value::strings(["a", "b"])),
        ]);
        assert_eq!(Value::from_json(&value.to_json()), value);
    }

    #[test]
    fn unit_is_read_from_internal_attribute() {
        let resource =
            Resource::new("ec2_vpc", "hasura-dev-vpc").with_attribute("_unit", Value::string("network"));
        assert_eq!(resource.unit(), Some("network"));
        assert_eq!(resource.provider_attributes().count(), 0);
    }
}
