//! Schema - Define type schemas for resources
//!
//! Providers define schemas for each resource type,
//! enabling type validation before any plan is computed.

use std::collections::HashMap;
use std::fmt;

use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    String,
    Int,
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    List(Box<AttributeType>),
    Map(Box<AttributeType>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            // References resolve to identifiers or ARNs at apply time
            (AttributeType::String, Value::String(_) | Value::ResourceRef(_, _)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { base, .. }, Value::ResourceRef(_, _)) => base.validate(value),

            (AttributeType::Custom { validate, .. }, v) => {
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },

    #[error("Attribute '{name}': {inner}")]
    AttributeError { name: String, inner: Box<TypeError> },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
            Value::ResourceRef(binding, attr) => format!("ResourceRef({}.{})", binding, attr),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    pub description: Option<String>,
    /// Provider-side property name when it is not the PascalCase form of `name`
    pub provider_name: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            description: None,
            provider_name: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Validate resource attributes
    ///
    /// Internal attributes (leading `_`) and attributes the schema does not
    /// list are accepted as-is.
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        let mut names: Vec<&String> = self.attributes.keys().collect();
        names.sort();
        for name in names {
            if self.attributes[name].required && !attributes.contains_key(name) {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        let mut keys: Vec<&String> = attributes.keys().collect();
        keys.sort();
        for name in keys {
            if let Some(schema) = self.attributes.get(name)
                && let Err(e) = schema.attr_type.validate(&attributes[name])
            {
                errors.push(TypeError::AttributeError {
                    name: name.clone(),
                    inner: Box::new(e),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| {
                if let Value::Int(n) = value {
                    if *n > 0 {
                        Ok(())
                    } else {
                        Err("Value must be positive".to_string())
                    }
                } else {
                    Err("Expected integer".to_string())
                }
            },
        }
    }

    /// TCP/UDP port number (1-65535)
    pub fn port() -> AttributeType {
        AttributeType::Custom {
            name: "Port".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| match value {
                Value::Int(n) if (1..=65535).contains(n) => Ok(()),
                Value::Int(n) => Err(format!("Port {} is out of range 1-65535", n)),
                _ => Err("Expected integer".to_string()),
            },
        }
    }

    /// CIDR block type (e.g., "10.0.0.0/16")
    pub fn cidr() -> AttributeType {
        AttributeType::Custom {
            name: "Cidr".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| {
                if let Value::String(s) = value {
                    validate_cidr(s)
                } else {
                    Err("Expected string".to_string())
                }
            },
        }
    }
}

/// Validate CIDR block format (e.g., "10.0.0.0/16")
pub fn validate_cidr(cidr: &str) -> Result<(), String> {
    parse_cidr(cidr).map(|_| ())
}

/// Parse a CIDR block into its network address and prefix length
pub fn parse_cidr(cidr: &str) -> Result<(u32, u8), String> {
    let Some((ip, prefix)) = cidr.split_once('/') else {
        return Err(format!("Invalid CIDR format '{}': expected IP/prefix", cidr));
    };

    let octets: Vec<&str> = ip.split('.').collect();
    if octets.len() != 4 {
        return Err(format!("Invalid IP address '{}': expected 4 octets", ip));
    }

    let mut address: u32 = 0;
    for octet in &octets {
        match octet.parse::<u8>() {
            Ok(n) => address = (address << 8) | u32::from(n),
            Err(_) => {
                return Err(format!(
                    "Invalid octet '{}' in IP address: must be 0-255",
                    octet
                ));
            }
        }
    }

    match prefix.parse::<u8>() {
        Ok(p) if p <= 32 => Ok((address, p)),
        Ok(p) => Err(format!("Invalid prefix length '{}': must be 0-32", p)),
        Err(_) => Err(format!(
            "Invalid prefix length '{}': must be a number",
            prefix
        )),
    }
}

/// True when `inner` lies entirely within `outer`
pub fn cidr_contains(outer: &str, inner: &str) -> Result<bool, String> {
    let (outer_addr, outer_prefix) = parse_cidr(outer)?;
    let (inner_addr, inner_prefix) = parse_cidr(inner)?;
    if inner_prefix < outer_prefix {
        return Ok(false);
    }
    let mask = if outer_prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(outer_prefix))
    };
    Ok(outer_addr & mask == inner_addr & mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::ResourceRef("vpc".into(), "id".into())).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_enum_type() {
        let t = AttributeType::Enum(vec!["tcp".to_string(), "udp".to_string()]);
        assert!(t.validate(&Value::String("tcp".to_string())).is_ok());
        assert!(t.validate(&Value::String("icmp".to_string())).is_err());
    }

    #[test]
    fn validate_positive_int_and_port() {
        let t = types::positive_int();
        assert!(t.validate(&Value::Int(1)).is_ok());
        assert!(t.validate(&Value::Int(0)).is_err());

        let p = types::port();
        assert!(p.validate(&Value::Int(5432)).is_ok());
        assert!(p.validate(&Value::Int(0)).is_err());
        assert!(p.validate(&Value::Int(70000)).is_err());
    }

    #[test]
    fn validate_resource_schema() {
        let schema = ResourceSchema::new("ec2_security_group_ingress")
            .attribute(AttributeSchema::new("group_id", AttributeType::String).required())
            .attribute(AttributeSchema::new("from_port", types::port()))
            .attribute(AttributeSchema::new("cidr_ip", types::cidr()));

        let mut attrs = HashMap::new();
        attrs.insert("group_id".to_string(), Value::ResourceRef("sg".into(), "id".into()));
        attrs.insert("from_port".to_string(), Value::Int(5432));
        attrs.insert("cidr_ip".to_string(), Value::string("192.168.0.0/16"));
        attrs.insert("_unit".to_string(), Value::string("network"));

        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn errors_name_the_attribute() {
        let schema = ResourceSchema::new("ec2_vpc")
            .attribute(AttributeSchema::new("cidr_block", types::cidr()).required())
            .attribute(AttributeSchema::new("enable_dns_support", AttributeType::Bool));

        let attrs = HashMap::from([("enable_dns_support".to_string(), Value::string("yes"))]);
        let errors = schema.validate(&attrs).unwrap_err();

        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], TypeError::MissingRequired { .. }));
        assert!(errors[1].to_string().starts_with("Attribute 'enable_dns_support'"));
    }

    #[test]
    fn validate_cidr_type() {
        let t = types::cidr();

        assert!(t.validate(&Value::String("10.0.0.0/16".to_string())).is_ok());
        assert!(t.validate(&Value::String("0.0.0.0/0".to_string())).is_ok());
        assert!(t.validate(&Value::String("255.255.255.255/32".to_string())).is_ok());

        assert!(t.validate(&Value::String("10.0.0.0".to_string())).is_err());
        assert!(t.validate(&Value::String("10.0.0.0/33".to_string())).is_err());
        assert!(t.validate(&Value::String("10.0.0.256/16".to_string())).is_err());
        assert!(t.validate(&Value::String("10.0.0/16".to_string())).is_err());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn cidr_containment() {
        assert_eq!(cidr_contains("192.168.0.0/16", "192.168.3.0/24"), Ok(true));
        assert_eq!(cidr_contains("192.168.0.0/16", "10.0.0.0/24"), Ok(false));
        assert_eq!(cidr_contains("192.168.1.0/24", "192.168.0.0/16"), Ok(false));
        assert_eq!(cidr_contains("0.0.0.0/0", "10.0.0.0/8"), Ok(true));
    }
}
