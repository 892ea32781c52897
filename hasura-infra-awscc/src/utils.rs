//! Conversion between declared values and Cloud Control JSON

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use heck::{ToSnakeCase, ToUpperCamelCase};
use hasura_infra_core::resource::Value;
use hasura_infra_core::schema::AttributeType;
use serde_json::json;

/// Nested keys whose property name is not the UpperCamelCase form
const NESTED_NAMES: &[(&str, &str)] = &[("iam_auth", "IAMAuth"), ("dns_name", "DNSName")];

/// Keys whose contents are sent exactly as written (policy documents, log driver options)
const VERBATIM_KEYS: &[&str] = &["assume_role_policy_document", "policy_document", "options"];

/// Integer attributes the engine models as strings
const STRING_INTEGERS: &[(&str, &str)] = &[
    ("rds_db_instance", "allocated_storage"),
    ("autoscaling_auto_scaling_group", "min_size"),
    ("autoscaling_auto_scaling_group", "desired_capacity"),
    ("autoscaling_auto_scaling_group", "max_size"),
];

/// Property name for a nested attribute key (e.g., "container_port" -> "ContainerPort")
pub fn property_name(key: &str) -> String {
    NESTED_NAMES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, p)| p.to_string())
        .unwrap_or_else(|| key.to_upper_camel_case())
}

/// Attribute key for a nested property name (e.g., "IAMAuth" -> "iam_auth")
pub fn attribute_name(property: &str) -> String {
    property.to_snake_case()
}

pub fn is_string_integer(resource_type: &str, attr: &str) -> bool {
    STRING_INTEGERS
        .iter()
        .any(|(t, a)| *t == resource_type && *a == attr)
}

/// Convert a resolved attribute value to its Cloud Control form
pub fn to_cfn(key: &str, value: &Value) -> serde_json::Value {
    if VERBATIM_KEYS.contains(&key) {
        return value.to_json();
    }
    match value {
        Value::String(s) if key == "user_data" => json!(STANDARD.encode(s)),
        Value::List(items) => {
            serde_json::Value::Array(items.iter().map(|v| to_cfn(key, v)).collect())
        }
        Value::Map(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let object = keys
                .into_iter()
                .map(|k| (property_name(k), to_cfn(k, &map[k])))
                .collect();
            serde_json::Value::Object(object)
        }
        other => other.to_json(),
    }
}

/// Convert a Cloud Control property value back to its declared form
pub fn from_cfn(key: &str, json: &serde_json::Value) -> Value {
    if VERBATIM_KEYS.contains(&key) {
        return Value::from_json(json);
    }
    match json {
        serde_json::Value::String(s) if key == "user_data" => STANDARD
            .decode(s)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .map(Value::String)
            .unwrap_or_else(|| Value::String(s.clone())),
        serde_json::Value::Array(items) => {
            Value::List(items.iter().map(|v| from_cfn(key, v)).collect())
        }
        serde_json::Value::Object(map) => Value::Map(
            map.iter()
                .map(|(k, v)| {
                    let name = attribute_name(k);
                    let value = from_cfn(&name, v);
                    (name, value)
                })
                .collect(),
        ),
        other => Value::from_json(other),
    }
}

/// Undo string-modelled integers so a read compares equal to the declaration
pub fn coerce(value: Value, attr_type: &AttributeType) -> Value {
    let is_int = match attr_type {
        AttributeType::Int => true,
        AttributeType::Custom { base, .. } => matches!(**base, AttributeType::Int),
        _ => false,
    };
    match value {
        Value::String(s) if is_int => s.parse().map(Value::Int).unwrap_or(Value::String(s)),
        other => other,
    }
}

/// Secrets Manager dynamic reference resolved by the engine at deploy time
pub fn secret_reference(secret_arn: &str, json_key: &str) -> String {
    format!(
        "{{{{resolve:secretsmanager:{}:SecretString:{}}}}}",
        secret_arn, json_key
    )
}

/// Build tags array for CloudFormation format, sorted by key
pub fn build_tags(user_tags: Option<&Value>) -> Vec<serde_json::Value> {
    let mut tags = Vec::new();
    if let Some(Value::Map(user_tags)) = user_tags {
        let mut keys: Vec<&String> = user_tags.keys().collect();
        keys.sort();
        for key in keys {
            if let Value::String(v) = &user_tags[key] {
                tags.push(json!({"Key": key, "Value": v}));
            }
        }
    }
    tags
}

/// Parse tags from CloudFormation format to map
pub fn parse_tags(tags_array: &[serde_json::Value]) -> HashMap<String, Value> {
    let mut tags_map = HashMap::new();
    for tag in tags_array {
        if let (Some(key), Some(value)) = (
            tag.get("Key").and_then(|v| v.as_str()),
            tag.get("Value").and_then(|v| v.as_str()),
        ) {
            tags_map.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
    tags_map
}

#[cfg(test)]
mod tests {
    use super::*;
    use hasura_infra_core::schema::types;

    #[test]
    fn nested_keys_become_properties() {
        let value = Value::map([
            ("container_port", Value::Int(8080)),
            ("iam_auth", Value::string("DISABLED")),
            ("dns_name", Value::string("lb.example")),
        ]);
        assert_eq!(
            to_cfn("load_balancers", &value),
            json!({"ContainerPort": 8080, "IAMAuth": "DISABLED", "DNSName": "lb.example"})
        );
    }

    #[test]
    fn log_options_keep_their_keys() {
        let value = Value::map([(
            "log_configuration",
            Value::map([
                ("log_driver", Value::string("awslogs")),
                (
                    "options",
                    Value::map([("awslogs-stream-prefix", Value::string("ecs"))]),
                ),
            ]),
        )]);
        assert_eq!(
            to_cfn("container_definitions", &value),
            json!({"LogConfiguration": {
                "LogDriver": "awslogs",
                "Options": {"awslogs-stream-prefix": "ecs"}
            }})
        );
    }

    #[test]
    fn policy_documents_are_verbatim() {
        let value = Value::map([("Version", Value::string("2012-10-17"))]);
        assert_eq!(
            to_cfn("policy_document", &value),
            json!({"Version": "2012-10-17"})
        );
        assert_eq!(from_cfn("policy_document", &json!({"Version": "2012-10-17"})), value);
    }

    #[test]
    fn user_data_is_base64_at_any_depth() {
        let data = Value::map([("user_data", Value::string("#!/bin/bash"))]);
        let json = to_cfn("launch_template_data", &data);
        assert_eq!(json, json!({"UserData": "IyEvYmluL2Jhc2g="}));
        assert_eq!(from_cfn("launch_template_data", &json), data);
    }

    #[test]
    fn read_back_restores_attribute_keys() {
        let json = json!([{"AuthScheme": "SECRETS", "IAMAuth": "DISABLED"}]);
        assert_eq!(
            from_cfn("auth", &json),
            Value::List(vec![Value::map([
                ("auth_scheme", Value::string("SECRETS")),
                ("iam_auth", Value::string("DISABLED")),
            ])])
        );
    }

    #[test]
    fn string_integers() {
        assert!(is_string_integer("rds_db_instance", "allocated_storage"));
        assert!(!is_string_integer("ecs_service", "desired_count"));
        assert_eq!(
            coerce(Value::string("20"), &types::positive_int()),
            Value::Int(20)
        );
        assert_eq!(
            coerce(Value::string("20"), &AttributeType::String),
            Value::string("20")
        );
    }

    #[test]
    fn dynamic_secret_reference() {
        assert_eq!(
            secret_reference("arn:aws:secretsmanager:us-east-1:1:secret:db", "password"),
            "{{resolve:secretsmanager:arn:aws:secretsmanager:us-east-1:1:secret:db:SecretString:password}}"
        );
    }

    #[test]
    fn tags_round_trip() {
        let tags = Value::map([
            ("Project", Value::string("hasura")),
            ("Environment", Value::string("dev")),
        ]);
        let built = build_tags(Some(&tags));
        assert_eq!(built[0], json!({"Key": "Environment", "Value": "dev"}));
        assert_eq!(Value::Map(parse_tags(&built)), tags);
    }
}
