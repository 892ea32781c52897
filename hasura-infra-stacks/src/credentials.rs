//! Credential secrets
//!
//! Secrets are generated by the provisioning engine from a [`SecretPolicy`];
//! declarations only ever carry the policy and, afterwards, the secret ARN.

use hasura_infra_core::resource::{Resource, Value};
use rand::Rng;
use rand::distr::Alphanumeric;

use crate::config::is_secret_arn;
use crate::error::BuildError;
use crate::stack::{Handle, Stack};
use crate::network::TrustBoundary;

/// Username stored alongside the generated database password
pub const DATABASE_USERNAME: &str = "syscdk";

/// Shape of generated secret material
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretPolicy {
    pub length: usize,
    pub exclude_punctuation: bool,
    pub include_space: bool,
    /// JSON template the generated value is merged into, under `generate_key`
    pub username_template: Option<String>,
    pub generate_key: Option<String>,
}

impl Default for SecretPolicy {
    fn default() -> Self {
        Self {
            length: 32,
            exclude_punctuation: true,
            include_space: false,
            username_template: None,
            generate_key: None,
        }
    }
}

impl SecretPolicy {
    /// Policy for database credentials: `{"username": "syscdk", "password": <generated>}`
    pub fn database_credentials() -> Self {
        Self {
            username_template: Some(
                serde_json::json!({ "username": DATABASE_USERNAME }).to_string(),
            ),
            generate_key: Some("password".to_string()),
            ..Self::default()
        }
    }

    /// Generate secret material satisfying this policy
    ///
    /// Only alphanumeric characters are produced, so the result never holds
    /// punctuation or whitespace regardless of the flags.
    pub fn generate(&self) -> String {
        let mut rng = rand::rng();
        std::iter::repeat_with(|| rng.sample(Alphanumeric) as char)
            .take(self.length)
            .collect()
    }

    /// Full secret string: the template with the generated key filled in
    pub fn render(&self) -> String {
        let generated = self.generate();
        match (&self.username_template, &self.generate_key) {
            (Some(template), Some(key)) => {
                let mut document: serde_json::Map<String, serde_json::Value> =
                    serde_json::from_str(template).unwrap_or_default();
                document.insert(key.clone(), serde_json::Value::String(generated));
                serde_json::Value::Object(document).to_string()
            }
            _ => generated,
        }
    }

    /// Engine-side generation settings
    pub fn to_value(&self) -> Value {
        let mut entries = vec![
            ("password_length", Value::Int(self.length as i64)),
            ("exclude_punctuation", Value::Bool(self.exclude_punctuation)),
            ("include_space", Value::Bool(self.include_space)),
        ];
        if let Some(template) = &self.username_template {
            entries.push(("secret_string_template", Value::string(template)));
        }
        if let Some(key) = &self.generate_key {
            entries.push(("generate_string_key", Value::string(key)));
        }
        Value::map(entries)
    }

    /// Read back the engine-side settings written by [`SecretPolicy::to_value`]
    pub fn from_value(value: &Value) -> Option<Self> {
        let Value::Map(map) = value else {
            return None;
        };
        let length = match map.get("password_length")? {
            Value::Int(n) if *n > 0 => *n as usize,
            _ => return None,
        };
        let flag = |key: &str| matches!(map.get(key), Some(Value::Bool(true)));
        let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            length,
            exclude_punctuation: flag("exclude_punctuation"),
            include_space: flag("include_space"),
            username_template: text("secret_string_template"),
            generate_key: text("generate_string_key"),
        })
    }
}

/// Declare a secret generated by the engine
pub fn declare_secret(
    stack: &mut Stack<'_>,
    role: &str,
    description: &str,
    policy: &SecretPolicy,
) -> Handle {
    let name = stack.config().name(role);
    stack.declare(
        Resource::new("secretsmanager_secret", name.as_str())
            .with_attribute("name", Value::string(name.as_str()))
            .with_attribute("description", Value::string(description))
            .with_attribute("generate_secret_string", policy.to_value()),
    )
}

/// Reference a secret created outside this deployment, by ARN
pub fn reference_secret(stack: &mut Stack<'_>, role: &str, arn: &str) -> Result<Handle, BuildError> {
    let name = stack.config().name(role);
    if !is_secret_arn(arn) {
        return Err(BuildError::Validation(format!(
            "{} must reference a Secrets Manager secret ARN, got '{}'",
            name, arn
        )));
    }
    Ok(stack.declare(
        Resource::new("secretsmanager_secret", name)
            .with_attribute("arn", Value::string(arn))
            .with_read_only(true),
    ))
}

/// The foundation unit's secrets
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Database master credentials, also used by the proxy
    pub primary: Handle,
    pub serverless: Handle,
    pub endpoint: Handle,
}

/// Declare the database credential secrets and the Secrets Manager endpoint
pub fn declare_credentials(
    stack: &mut Stack<'_>,
    vpc: &Handle,
    private_subnets: &[Handle],
    endpoint_boundary: &TrustBoundary,
) -> Credentials {
    let policy = SecretPolicy::database_credentials();
    let primary = declare_secret(stack, "rds-credentials", "Database master credentials", &policy);
    let serverless = declare_secret(
        stack,
        "rds-sls",
        "Database credentials for serverless clients",
        &policy,
    );

    let region = stack.config().region.clone();
    let endpoint = stack.declare(
        Resource::new("ec2_vpc_endpoint", stack.config().name("secrets-manager-endpoint"))
            .with_attribute("vpc_id", vpc.id())
            .with_attribute(
                "service_name",
                Value::string(format!("com.amazonaws.{}.secretsmanager", region)),
            )
            .with_attribute("vpc_endpoint_type", Value::string("Interface"))
            .with_attribute("private_dns_enabled", Value::Bool(true))
            .with_attribute(
                "subnet_ids",
                Value::List(private_subnets.iter().map(Handle::id).collect()),
            )
            .with_attribute(
                "security_group_ids",
                Value::List(vec![endpoint_boundary.handle().id()]),
            ),
    );

    Credentials {
        primary,
        serverless,
        endpoint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_material_matches_policy() {
        let policy = SecretPolicy::default();
        let secret = policy.generate();
        assert_eq!(secret.len(), 32);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn database_credentials_render_into_template() {
        let rendered = SecretPolicy::database_credentials().render();
        let document: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(document["username"], "syscdk");
        assert_eq!(document["password"].as_str().unwrap().len(), 32);
    }

    #[test]
    fn engine_settings_carry_no_material() {
        let value = SecretPolicy::database_credentials().to_value();
        let Value::Map(map) = value else {
            panic!("expected map");
        };
        assert_eq!(map["password_length"], Value::Int(32));
        assert_eq!(map["exclude_punctuation"], Value::Bool(true));
        assert_eq!(map["include_space"], Value::Bool(false));
        assert_eq!(map["generate_string_key"], Value::string("password"));
    }

    #[test]
    fn engine_settings_read_back() {
        let policy = SecretPolicy::database_credentials();
        assert_eq!(SecretPolicy::from_value(&policy.to_value()), Some(policy));
        assert_eq!(SecretPolicy::from_value(&Value::string("x")), None);
    }
}
