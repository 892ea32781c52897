//! AWS Cloud Control Provider implementation
//!
//! Every resource type is created, read, updated and deleted through the
//! generic Cloud Control resource API. Property naming and value shape come
//! from [`crate::schemas`]; the few properties that do not map one-to-one are
//! handled here.

use std::collections::HashMap;
use std::time::Duration;

use aws_config::Region;
use aws_sdk_cloudcontrol::Client as CloudControlClient;
use aws_sdk_cloudcontrol::types::OperationStatus;
use hasura_infra_core::provider::{ProviderError, ProviderResult};
use hasura_infra_core::resource::{Resource, ResourceId, State, Value};
use serde_json::json;

use crate::schemas::{self, AwsccSchemaConfig};
use crate::utils::{build_tags, coerce, from_cfn, is_string_integer, parse_tags, secret_reference, to_cfn};

/// Polling interval for long-running operations
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Ten minutes at the polling interval
const MAX_POLL_ATTEMPTS: u32 = 120;

/// Ninety minutes, for types whose provisioning routinely outlasts the default
const SLOW_POLL_ATTEMPTS: u32 = 1080;

/// Database instances and proxies take tens of minutes; certificates wait on
/// DNS validation
const SLOW_TYPES: &[&str] = &[
    "AWS::RDS::DBInstance",
    "AWS::RDS::DBProxy",
    "AWS::RDS::DBProxyTargetGroup",
    "AWS::CertificateManager::Certificate",
];

fn poll_attempts(type_name: &str) -> u32 {
    if SLOW_TYPES.contains(&type_name) {
        SLOW_POLL_ATTEMPTS
    } else {
        MAX_POLL_ATTEMPTS
    }
}

fn schema_config(id: &ResourceId) -> ProviderResult<AwsccSchemaConfig> {
    schemas::get(&id.resource_type).ok_or_else(|| {
        ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
            .for_resource(id.clone())
    })
}

/// Hosted zone names are stored with a trailing dot
fn same_zone_name(a: &str, b: &str) -> bool {
    a.trim_end_matches('.')
        .eq_ignore_ascii_case(b.trim_end_matches('.'))
}

fn timed_out(request_token: &str, identifier: Option<String>) -> ProviderResult<String> {
    let error = ProviderError::new(format!(
        "Operation timed out; request {} is still running",
        request_token
    ));
    Err(match identifier {
        Some(identifier) => error.with_pending_identifier(identifier),
        None => error,
    })
}

// =============================================================================
// Property Mapping
// =============================================================================

/// Cloud Control desired state for a resolved declaration
fn desired_properties(
    config: &AwsccSchemaConfig,
    resource: &Resource,
) -> serde_json::Map<String, serde_json::Value> {
    let mut desired_state = serde_json::Map::new();

    for (name, attr_schema) in &config.schema.attributes {
        if name == "tags" {
            continue;
        }
        let (Some(property), Some(value)) =
            (&attr_schema.provider_name, resource.attributes.get(name))
        else {
            continue;
        };
        let json = match value {
            Value::Int(n) if is_string_integer(&resource.id.resource_type, name) => {
                json!(n.to_string())
            }
            _ => to_cfn(name, value),
        };
        desired_state.insert(property.clone(), json);
    }

    special_properties(resource, &mut desired_state);

    if config.has_tags {
        let tags = build_tags(resource.attributes.get("tags"));
        if !tags.is_empty() {
            desired_state.insert("Tags".to_string(), json!(tags));
        }
    }

    set_default_values(&resource.id.resource_type, &mut desired_state);

    desired_state
}

/// Properties that are not a plain rename of one attribute
fn special_properties(
    resource: &Resource,
    desired_state: &mut serde_json::Map<String, serde_json::Value>,
) {
    if resource.id.resource_type == "rds_db_instance"
        && let Some(arn) = resource
            .attributes
            .get("master_user_secret_arn")
            .and_then(Value::as_str)
    {
        desired_state.insert(
            "MasterUsername".to_string(),
            json!(secret_reference(arn, "username")),
        );
        desired_state.insert(
            "MasterUserPassword".to_string(),
            json!(secret_reference(arn, "password")),
        );
    }
}

fn set_default_values(
    resource_type: &str,
    desired_state: &mut serde_json::Map<String, serde_json::Value>,
) {
    if resource_type == "ec2_eip" && !desired_state.contains_key("Domain") {
        desired_state.insert("Domain".to_string(), json!("vpc"));
    }
}

/// Declared attributes as currently stored by the engine
fn declared_attributes(
    config: &AwsccSchemaConfig,
    props: &serde_json::Value,
) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();

    for (name, attr_schema) in &config.schema.attributes {
        if name == "tags" {
            continue;
        }
        if let Some(property) = &attr_schema.provider_name
            && let Some(value) = props.get(property.as_str())
        {
            let value = coerce(from_cfn(name, value), &attr_schema.attr_type);
            attributes.insert(name.clone(), value);
        }
    }

    if config.has_tags
        && let Some(tags_array) = props.get("Tags").and_then(|v| v.as_array())
    {
        let tags = parse_tags(tags_array);
        if !tags.is_empty() {
            attributes.insert("tags".to_string(), Value::Map(tags));
        }
    }

    attributes
}

/// Read-only properties other declarations may reference
fn output_attributes(config: &AwsccSchemaConfig, props: &serde_json::Value) -> HashMap<String, Value> {
    config
        .outputs
        .iter()
        .filter_map(|(attr, property)| {
            props
                .get(*property)
                .map(|value| (attr.to_string(), Value::from_json(value)))
        })
        .collect()
}

/// AWS Cloud Control Provider
pub struct AwsccProvider {
    cloudcontrol_client: CloudControlClient,
    region: String,
}

impl AwsccProvider {
    /// Create a new AwsccProvider for the specified region
    pub async fn new(region: &str) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Self {
            cloudcontrol_client: CloudControlClient::new(&config),
            region: region.to_string(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    // =========================================================================
    // Cloud Control API Methods
    // =========================================================================

    /// Get a resource's properties by identifier
    pub async fn cc_get_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> ProviderResult<Option<serde_json::Value>> {
        let result = self
            .cloudcontrol_client
            .get_resource()
            .type_name(type_name)
            .identifier(identifier)
            .send()
            .await;

        match result {
            Ok(response) => match response.resource_description().and_then(|d| d.properties()) {
                Some(props) => serde_json::from_str(props).map(Some).map_err(|e| {
                    ProviderError::new(format!("Invalid properties for {}", identifier))
                        .with_cause(e)
                }),
                None => Ok(None),
            },
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception()) =>
            {
                Ok(None)
            }
            Err(e) => Err(ProviderError::new(format!(
                "Failed to get resource {}: {}",
                identifier, e
            ))
            .with_cause(e)),
        }
    }

    /// List every resource of a type as (identifier, properties)
    pub async fn cc_list_resources(
        &self,
        type_name: &str,
    ) -> ProviderResult<Vec<(String, serde_json::Value)>> {
        let mut found = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = self
                .cloudcontrol_client
                .list_resources()
                .type_name(type_name)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| {
                    ProviderError::new(format!("Failed to list {}: {}", type_name, e)).with_cause(e)
                })?;

            for desc in response.resource_descriptions() {
                let Some(identifier) = desc.identifier() else {
                    continue;
                };
                let props = desc
                    .properties()
                    .and_then(|p| serde_json::from_str(p).ok())
                    .unwrap_or_else(|| json!({}));
                found.push((identifier.to_string(), props));
            }

            match response.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(found)
    }

    /// Create a resource, returning its primary identifier
    pub async fn cc_create_resource(
        &self,
        type_name: &str,
        desired_state: serde_json::Value,
    ) -> ProviderResult<String> {
        let result = self
            .cloudcontrol_client
            .create_resource()
            .type_name(type_name)
            .desired_state(desired_state.to_string())
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to create resource: {}", e)).with_cause(e)
            })?;

        let progress = result
            .progress_event()
            .ok_or_else(|| ProviderError::new("No progress event returned"))?;
        let request_token = progress
            .request_token()
            .ok_or_else(|| ProviderError::new("No request token returned"))?;

        self.wait_for_operation(request_token, poll_attempts(type_name), progress.identifier())
            .await
    }

    /// Apply a JSON patch to a resource
    pub async fn cc_update_resource(
        &self,
        type_name: &str,
        identifier: &str,
        patch_ops: Vec<serde_json::Value>,
    ) -> ProviderResult<()> {
        if patch_ops.is_empty() {
            return Ok(());
        }

        let patch_document = serde_json::to_string(&patch_ops)
            .map_err(|e| ProviderError::new("Failed to build patch").with_cause(e))?;

        let result = self
            .cloudcontrol_client
            .update_resource()
            .type_name(type_name)
            .identifier(identifier)
            .patch_document(patch_document)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to update resource: {}", e)).with_cause(e)
            })?;

        if let Some(request_token) = result.progress_event().and_then(|p| p.request_token()) {
            self.wait_for_operation(request_token, poll_attempts(type_name), Some(identifier))
                .await?;
        }

        Ok(())
    }

    pub async fn cc_delete_resource(&self, type_name: &str, identifier: &str) -> ProviderResult<()> {
        let result = self
            .cloudcontrol_client
            .delete_resource()
            .type_name(type_name)
            .identifier(identifier)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to delete resource: {}", e)).with_cause(e)
            })?;

        if let Some(request_token) = result.progress_event().and_then(|p| p.request_token()) {
            self.wait_for_operation(request_token, poll_attempts(type_name), Some(identifier))
                .await?;
        }

        Ok(())
    }

    /// Wait for a Cloud Control operation to complete
    ///
    /// On timeout the error carries the resource's identifier when the engine
    /// has reported one, so the caller can record a resource that is still
    /// being provisioned.
    async fn wait_for_operation(
        &self,
        request_token: &str,
        max_attempts: u32,
        known_identifier: Option<&str>,
    ) -> ProviderResult<String> {
        let mut identifier = known_identifier.map(str::to_string);
        for attempt in 0..max_attempts {
            let status = self
                .cloudcontrol_client
                .get_resource_request_status()
                .request_token(request_token)
                .send()
                .await
                .map_err(|e| {
                    ProviderError::new(format!("Failed to get operation status: {}", e))
                        .with_cause(e)
                })?;

            if let Some(progress) = status.progress_event() {
                match progress.operation_status() {
                    Some(OperationStatus::Success) => {
                        return Ok(progress.identifier().unwrap_or("").to_string());
                    }
                    Some(OperationStatus::Failed) => {
                        let msg = progress.status_message().unwrap_or("Unknown error");
                        return Err(ProviderError::new(format!("Operation failed: {}", msg)));
                    }
                    Some(OperationStatus::CancelComplete) => {
                        return Err(ProviderError::new("Operation was cancelled"));
                    }
                    _ => {
                        if let Some(reported) = progress.identifier() {
                            identifier = Some(reported.to_string());
                        }
                        log::debug!(
                            "Operation {} in progress (poll {}/{})",
                            request_token,
                            attempt + 1,
                            max_attempts
                        );
                    }
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        timed_out(request_token, identifier)
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Read a resource by identifier
    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> ProviderResult<State> {
        let config = schema_config(id)?;

        let Some(identifier) = identifier else {
            return Ok(State::not_found(id.clone()));
        };

        let Some(props) = self
            .cc_get_resource(config.aws_type_name, identifier)
            .await
            .map_err(|e| e.for_resource(id.clone()))?
        else {
            return Ok(State::not_found(id.clone()));
        };

        let mut attributes = declared_attributes(&config, &props);
        attributes.extend(output_attributes(&config, &props));

        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    /// Resolve a data source against existing resources
    pub async fn lookup_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let config = schema_config(id)?;

        match id.resource_type.as_str() {
            "route53_hosted_zone" => {
                let name = resource
                    .attributes
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ProviderError::new("Hosted zone lookup needs a name").for_resource(id.clone())
                    })?;

                let zones = self
                    .cc_list_resources(config.aws_type_name)
                    .await
                    .map_err(|e| e.for_resource(id.clone()))?;
                for (identifier, mut props) in zones {
                    if props.get("Name").is_none()
                        && let Some(full) = self
                            .cc_get_resource(config.aws_type_name, &identifier)
                            .await?
                    {
                        props = full;
                    }
                    if props
                        .get("Name")
                        .and_then(|n| n.as_str())
                        .is_some_and(|n| same_zone_name(n, name))
                    {
                        log::debug!("Hosted zone {} is {}", name, identifier);
                        let attributes =
                            HashMap::from([("name".to_string(), Value::string(name))]);
                        return Ok(State::existing(id.clone(), attributes).with_identifier(identifier));
                    }
                }
                Ok(State::not_found(id.clone()))
            }
            "secretsmanager_secret" => {
                let arn = resource
                    .attributes
                    .get("arn")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ProviderError::new("Secret lookup needs an arn").for_resource(id.clone())
                    })?;

                match self
                    .cc_get_resource(config.aws_type_name, arn)
                    .await
                    .map_err(|e| e.for_resource(id.clone()))?
                {
                    Some(_) => {
                        let attributes = HashMap::from([("arn".to_string(), Value::string(arn))]);
                        Ok(State::existing(id.clone(), attributes).with_identifier(arn))
                    }
                    None => Ok(State::not_found(id.clone())),
                }
            }
            other => Err(ProviderError::new(format!("{} cannot be looked up", other))
                .for_resource(id.clone())),
        }
    }

    /// Create a resource; the returned state records the declared attributes
    /// together with engine-generated outputs
    pub async fn create_resource(&self, resource: Resource) -> ProviderResult<State> {
        let config = schema_config(&resource.id)?;
        let desired_state = desired_properties(&config, &resource);

        log::debug!("Creating {} as {}", resource.id, config.aws_type_name);
        let identifier = self
            .cc_create_resource(
                config.aws_type_name,
                serde_json::Value::Object(desired_state),
            )
            .await
            .map_err(|e| e.for_resource(resource.id.clone()))?;

        self.applied_state(&config, &resource, &identifier).await
    }

    /// Update a resource in place with one replace operation per property
    pub async fn update_resource(
        &self,
        id: ResourceId,
        identifier: &str,
        to: Resource,
    ) -> ProviderResult<State> {
        let config = schema_config(&id)?;

        let patch_ops: Vec<serde_json::Value> = desired_properties(&config, &to)
            .into_iter()
            .map(|(property, value)| {
                json!({
                    "op": "replace",
                    "path": format!("/{}", property),
                    "value": value
                })
            })
            .collect();

        self.cc_update_resource(config.aws_type_name, identifier, patch_ops)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;

        self.applied_state(&config, &to, identifier).await
    }

    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let config = schema_config(id)?;

        self.cc_delete_resource(config.aws_type_name, identifier)
            .await
            .map_err(|e| e.for_resource(id.clone()))
    }

    /// State after a successful create or update
    async fn applied_state(
        &self,
        config: &AwsccSchemaConfig,
        resource: &Resource,
        identifier: &str,
    ) -> ProviderResult<State> {
        let mut attributes: HashMap<String, Value> = resource
            .provider_attributes()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if !config.outputs.is_empty()
            && let Some(props) = self
                .cc_get_resource(config.aws_type_name, identifier)
                .await
                .map_err(|e| e.for_resource(resource.id.clone()))?
        {
            attributes.extend(output_attributes(config, &props));
        }

        Ok(State::existing(resource.id.clone(), attributes).with_identifier(identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_types_get_a_longer_budget() {
        assert_eq!(poll_attempts("AWS::RDS::DBInstance"), SLOW_POLL_ATTEMPTS);
        assert_eq!(poll_attempts("AWS::CertificateManager::Certificate"), SLOW_POLL_ATTEMPTS);
        assert_eq!(poll_attempts("AWS::EC2::VPC"), MAX_POLL_ATTEMPTS);
        assert!(POLL_INTERVAL * SLOW_POLL_ATTEMPTS >= Duration::from_secs(60 * 60));
    }

    #[test]
    fn timeout_keeps_the_reported_identifier() {
        let err = timed_out("req-1", Some("hasura-dev".to_string())).unwrap_err();
        assert_eq!(err.pending_identifier.as_deref(), Some("hasura-dev"));
        assert!(err.to_string().contains("req-1"));

        let err = timed_out("req-2", None).unwrap_err();
        assert!(err.pending_identifier.is_none());
    }

    #[test]
    fn zone_names_ignore_trailing_dot_and_case() {
        assert!(same_zone_name("example.com.", "example.com"));
        assert!(same_zone_name("Example.COM", "example.com."));
        assert!(!same_zone_name("api.example.com.", "example.com"));
    }

    fn config(resource_type: &str) -> AwsccSchemaConfig {
        schemas::get(resource_type).unwrap()
    }

    #[test]
    fn database_credentials_are_dynamic_references() {
        let resource = Resource::new("rds_db_instance", "hasura-dev-db")
            .with_attribute("engine", Value::string("postgres"))
            .with_attribute("allocated_storage", Value::Int(20))
            .with_attribute(
                "master_user_secret_arn",
                Value::string("arn:aws:secretsmanager:us-east-1:1:secret:db"),
            )
            .with_attribute("_unit", Value::string("network"));

        let desired = desired_properties(&config("rds_db_instance"), &resource);

        assert_eq!(desired["Engine"], json!("postgres"));
        assert_eq!(desired["AllocatedStorage"], json!("20"));
        assert_eq!(
            desired["MasterUserPassword"],
            json!("{{resolve:secretsmanager:arn:aws:secretsmanager:us-east-1:1:secret:db:SecretString:password}}")
        );
        assert!(!desired.contains_key("MasterUserSecretArn"));
        assert!(!desired.contains_key("Unit"));
    }

    #[test]
    fn tags_and_defaults() {
        let resource = Resource::new("ec2_eip", "hasura-dev-nat-eip-1").with_attribute(
            "tags",
            Value::map([("Project", Value::string("hasura"))]),
        );

        let desired = desired_properties(&config("ec2_eip"), &resource);

        assert_eq!(desired["Domain"], json!("vpc"));
        assert_eq!(desired["Tags"], json!([{"Key": "Project", "Value": "hasura"}]));
    }

    #[test]
    fn untagged_types_drop_tags() {
        let resource = Resource::new("ec2_route", "r")
            .with_attribute("tags", Value::map([("Project", Value::string("hasura"))]));
        assert!(!desired_properties(&config("ec2_route"), &resource).contains_key("Tags"));
    }

    #[test]
    fn read_back_matches_declaration() {
        let props = json!({
            "DBInstanceIdentifier": "hasura-dev-db",
            "AllocatedStorage": "20",
            "VPCSecurityGroups": ["sg-1"],
            "Endpoint": {"Address": "db.example"},
            "Tags": [{"Key": "Project", "Value": "hasura"}]
        });

        let attributes = declared_attributes(&config("rds_db_instance"), &props);

        assert_eq!(attributes["allocated_storage"], Value::Int(20));
        assert_eq!(attributes["vpc_security_groups"], Value::strings(["sg-1"]));
        assert_eq!(
            attributes["tags"],
            Value::map([("Project", Value::string("hasura"))])
        );
        assert!(!attributes.contains_key("endpoint"));
    }

    #[test]
    fn outputs_are_exposed_under_attribute_names() {
        let props = json!({
            "DNSName": "lb-1.elb.amazonaws.com",
            "CanonicalHostedZoneID": "Z35SXDOTRQ7X7K",
            "Scheme": "internet-facing"
        });

        let outputs = output_attributes(&config("elbv2_load_balancer"), &props);

        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs["dns_name"], Value::string("lb-1.elb.amazonaws.com"));
        assert_eq!(outputs["canonical_hosted_zone_id"], Value::string("Z35SXDOTRQ7X7K"));
    }

    #[test]
    fn unknown_types_are_rejected() {
        let err = schema_config(&ResourceId::new("s3_bucket", "b")).unwrap_err();
        assert_eq!(err.to_string(), "[s3_bucket.b] Unknown resource type: s3_bucket");
    }
}
