//! Cloud Control schema definitions
//!
//! One [`AwsccSchemaConfig`] per resource type declared by the topology,
//! grouped by AWS service.

use hasura_infra_core::resource::Resource;
use hasura_infra_core::schema::{AttributeType, ResourceSchema, TypeError};

pub mod compute;
pub mod data;
pub mod edge;
pub mod network;

/// Cloud Control schema configuration
#[derive(Debug)]
pub struct AwsccSchemaConfig {
    /// CloudFormation type name (e.g., "AWS::EC2::VPC")
    pub aws_type_name: &'static str,
    /// Resource type used in declarations (e.g., "ec2_vpc")
    pub resource_type_name: &'static str,
    /// Whether this resource type takes `Tags`
    pub has_tags: bool,
    /// Read-only properties exposed as attributes: (attribute, property)
    pub outputs: &'static [(&'static str, &'static str)],
    pub schema: ResourceSchema,
}

/// Tags as a map of strings
pub fn tags_type() -> AttributeType {
    AttributeType::Map(Box::new(AttributeType::String))
}

/// List of strings (identifiers, ARNs, CIDRs)
pub fn string_list() -> AttributeType {
    AttributeType::List(Box::new(AttributeType::String))
}

/// Nested structure or IAM policy document
pub fn document() -> AttributeType {
    AttributeType::Map(Box::new(AttributeType::Custom {
        name: "Any".to_string(),
        base: Box::new(AttributeType::String),
        validate: |_| Ok(()),
    }))
}

/// List of nested structures
pub fn document_list() -> AttributeType {
    AttributeType::List(Box::new(document()))
}

/// Returns all schema configs
pub fn configs() -> Vec<AwsccSchemaConfig> {
    let mut configs = network::configs();
    configs.extend(data::configs());
    configs.extend(compute::configs());
    configs.extend(edge::configs());
    configs
}

/// Schema config for a declared resource type
pub fn get(resource_type: &str) -> Option<AwsccSchemaConfig> {
    configs()
        .into_iter()
        .find(|c| c.resource_type_name == resource_type)
}

/// Check a declaration against its schema
///
/// Data sources are looked up, not created, so only their type is checked.
pub fn validate(resource: &Resource) -> Result<(), Vec<TypeError>> {
    let Some(config) = get(&resource.id.resource_type) else {
        return Err(vec![TypeError::ValidationFailed {
            message: format!("Unsupported resource type: {}", resource.id.resource_type),
        }]);
    };
    if resource.is_data_source() {
        return Ok(());
    }
    config.schema.validate(&resource.attributes)
}
