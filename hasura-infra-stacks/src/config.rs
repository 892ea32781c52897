//! Configuration for a deployment
//!
//! Values come from command-line flags, environment variables and an optional
//! JSON context file, in that order of precedence.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hasura_infra_core::naming;

pub const DEFAULT_PROJECT: &str = "hasura";
pub const DEFAULT_REGION: &str = "us-east-1";

const SECRET_ARN_PATTERN: &str = r"^arn:aws[a-zA-Z-]*:secretsmanager:[a-z0-9-]+:\d{12}:secret:.+$";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration value: {0}")]
    Missing(&'static str),

    #[error("{field} is not a Secrets Manager ARN: '{value}'")]
    InvalidArn { field: &'static str, value: String },

    #[error("Invalid environment '{0}', expected 'dev' or 'prod'")]
    InvalidEnvironment(String),

    #[error("Invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },

    #[error("Failed to read context file {path}: {source}")]
    ReadContext {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse context file {path}: {source}")]
    ParseContext {
        path: String,
        source: serde_json::Error,
    },
}

/// Target environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size of the container host group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityConfig {
    pub instance_type: String,
    pub min: u32,
    pub desired: u32,
    pub max: u32,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            instance_type: "t2.micro".to_string(),
            min: 0,
            desired: 1,
            max: 1,
        }
    }
}

impl CapacityConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.min > self.desired || self.desired > self.max {
            return Err(ConfigError::Invalid {
                field: "capacity",
                message: format!(
                    "expected min <= desired <= max, got {} / {} / {}",
                    self.min, self.desired, self.max
                ),
            });
        }
        Ok(())
    }
}

/// Complete, validated configuration for one deployment
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyConfig {
    pub environment: Environment,
    pub project: String,
    pub account: Option<String>,
    pub region: String,
    pub jwt_secret_arn: String,
    pub db_secret_arn: String,
    pub domain_name: String,
    pub subdomain_name: String,
    pub capacity: CapacityConfig,
}

impl TopologyConfig {
    /// Deployment-unique name for a role, e.g. `hasura-dev-proxy`
    pub fn name(&self, role: &str) -> String {
        naming::name(role, self.environment.as_str(), &self.project)
    }

    /// Public host name served by the ingress chain
    pub fn fqdn(&self) -> String {
        naming::fqdn(&self.subdomain_name, &self.domain_name)
    }

    pub fn availability_zones(&self) -> [String; 2] {
        [format!("{}a", self.region), format!("{}b", self.region)]
    }

    /// Tags carried by every taggable resource
    pub fn tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("environment", self.environment.to_string()),
            ("projectId", self.project.clone()),
        ]
    }
}

/// Builder collecting configuration from several sources
///
/// Setters only fill values that are still unset, so sources must be applied
/// from highest to lowest precedence.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    environment: Option<String>,
    project: Option<String>,
    account: Option<String>,
    region: Option<String>,
    jwt_secret_arn: Option<String>,
    db_secret_arn: Option<String>,
    domain_name: Option<String>,
    subdomain_name: Option<String>,
    capacity: Option<CapacityConfig>,
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none()
        && let Some(v) = value
        && !v.is_empty()
    {
        *slot = Some(v);
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn environment(mut self, value: Option<String>) -> Self {
        fill(&mut self.environment, value);
        self
    }

    pub fn project(mut self, value: Option<String>) -> Self {
        fill(&mut self.project, value);
        self
    }

    pub fn account(mut self, value: Option<String>) -> Self {
        fill(&mut self.account, value);
        self
    }

    pub fn region(mut self, value: Option<String>) -> Self {
        fill(&mut self.region, value);
        self
    }

    pub fn jwt_secret_arn(mut self, value: Option<String>) -> Self {
        fill(&mut self.jwt_secret_arn, value);
        self
    }

    pub fn db_secret_arn(mut self, value: Option<String>) -> Self {
        fill(&mut self.db_secret_arn, value);
        self
    }

    pub fn domain_name(mut self, value: Option<String>) -> Self {
        fill(&mut self.domain_name, value);
        self
    }

    pub fn subdomain_name(mut self, value: Option<String>) -> Self {
        fill(&mut self.subdomain_name, value);
        self
    }

    pub fn capacity(mut self, capacity: CapacityConfig) -> Self {
        if self.capacity.is_none() {
            self.capacity = Some(capacity);
        }
        self
    }

    /// Fill unset values from a context document
    ///
    /// Accepts either `{"context": {...}}` or a flat object. Keys are the
    /// environment variable names (`JWT_SECRET_ARN`, `DOMAIN_NAME`, ...).
    pub fn context_str(self, json: &str, origin: &str) -> Result<Self, ConfigError> {
        let document: serde_json::Value =
            serde_json::from_str(json).map_err(|source| ConfigError::ParseContext {
                path: origin.to_string(),
                source,
            })?;
        let object = document.get("context").unwrap_or(&document);

        let values: HashMap<String, String> = object
            .as_object()
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| match v {
                        serde_json::Value::String(s) => Some((k.clone(), s.clone())),
                        serde_json::Value::Number(n) => Some((k.clone(), n.to_string())),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let get = |key: &str| values.get(key).cloned();
        Ok(self
            .environment(get("CDK_ENV"))
            .project(get("PROJECT_ID"))
            .account(get("CDK_DEFAULT_ACCOUNT"))
            .region(get("AWS_REGION"))
            .jwt_secret_arn(get("JWT_SECRET_ARN"))
            .db_secret_arn(get("RDS_FOR_HASURA_SECRET_ARN"))
            .domain_name(get("DOMAIN_NAME"))
            .subdomain_name(get("SUBDOMAIN_NAME")))
    }

    pub fn context_file(self, path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadContext {
            path: path.display().to_string(),
            source,
        })?;
        self.context_str(&content, &path.display().to_string())
    }

    /// Validate and produce the final configuration
    pub fn build(self) -> Result<TopologyConfig, ConfigError> {
        let environment = match self.environment {
            Some(env) => env.parse()?,
            None => Environment::default(),
        };
        let project = self.project.unwrap_or_else(|| DEFAULT_PROJECT.to_string());
        validate_label("project", &project)?;
        validate_name_lengths(environment, &project)?;

        let jwt_secret_arn = self.jwt_secret_arn.ok_or(ConfigError::Missing("JWT_SECRET_ARN"))?;
        validate_secret_arn("JWT_SECRET_ARN", &jwt_secret_arn)?;
        let db_secret_arn = self
            .db_secret_arn
            .ok_or(ConfigError::Missing("RDS_FOR_HASURA_SECRET_ARN"))?;
        validate_secret_arn("RDS_FOR_HASURA_SECRET_ARN", &db_secret_arn)?;

        let domain_name = self.domain_name.ok_or(ConfigError::Missing("DOMAIN_NAME"))?;
        let subdomain_name = self.subdomain_name.ok_or(ConfigError::Missing("SUBDOMAIN_NAME"))?;
        validate_domain("DOMAIN_NAME", &domain_name)?;
        validate_domain("SUBDOMAIN_NAME", &subdomain_name)?;

        let capacity = self.capacity.unwrap_or_default();
        capacity.validate()?;

        Ok(TopologyConfig {
            environment,
            project,
            account: self.account,
            region: self.region.unwrap_or_else(|| DEFAULT_REGION.to_string()),
            jwt_secret_arn,
            db_secret_arn,
            domain_name: domain_name.trim_end_matches('.').to_string(),
            subdomain_name,
            capacity,
        })
    }
}

/// True if the value has the shape of a Secrets Manager secret ARN
pub fn is_secret_arn(value: &str) -> bool {
    Regex::new(SECRET_ARN_PATTERN)
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

fn validate_secret_arn(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if is_secret_arn(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidArn {
            field,
            value: value.to_string(),
        })
    }
}

/// Role suffixes of the names the engine caps at [`SHORT_NAME_LIMIT`] characters
pub const LOAD_BALANCER_ROLE: &str = "alb";
pub const TARGET_GROUP_ROLE: &str = "target-group";
const SHORT_NAME_ROLES: [&str; 2] = [LOAD_BALANCER_ROLE, TARGET_GROUP_ROLE];
pub const SHORT_NAME_LIMIT: usize = 32;

/// The project ends up in resource names and, joined by `_`, in the database
/// name, which only takes letters, digits and underscores
fn validate_label(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let valid = !value.is_empty()
        && value.starts_with(|c: char| c.is_ascii_lowercase())
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            message: format!(
                "'{}' must start with a lowercase letter and contain only lowercase letters and digits",
                value
            ),
        })
    }
}

fn validate_name_lengths(environment: Environment, project: &str) -> Result<(), ConfigError> {
    for role in SHORT_NAME_ROLES {
        let name = naming::name(role, environment.as_str(), project);
        if name.len() > SHORT_NAME_LIMIT {
            return Err(ConfigError::Invalid {
                field: "project",
                message: format!(
                    "'{}' makes the name '{}' longer than {} characters",
                    project, name, SHORT_NAME_LIMIT
                ),
            });
        }
    }
    Ok(())
}

fn validate_domain(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let value = value.trim_end_matches('.');
    let valid = !value.is_empty()
        && value.split('.').all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
    if valid {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            message: format!("'{}' is not a valid DNS name", value),
        })
    }
}
