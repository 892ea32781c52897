//! Local simulation of the provisioning engine
//!
//! Resources live in a JSON file under a working directory. Identifiers and
//! the attributes the engine would compute (ARNs, DNS names, ...) are
//! synthesized. Generated secret material is written to `secrets/`, one file
//! per secret, and never appears in the resource file or the state.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use hasura_infra_awscc::schemas;
use hasura_infra_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult};
use hasura_infra_core::resource::{Resource, ResourceId, State, Value};
use hasura_infra_stacks::credentials::SecretPolicy;
use serde_json::json;

const RESOURCES_FILE: &str = "resources.json";
const SECRETS_DIR: &str = "secrets";

/// File-backed Provider for running a deployment without an account
pub struct FileProvider {
    root: PathBuf,
}

impl FileProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resources_file(&self) -> PathBuf {
        self.root.join(RESOURCES_FILE)
    }

    fn secret_file(&self, name: &str) -> PathBuf {
        self.root.join(SECRETS_DIR).join(format!("{}.json", name))
    }

    /// `{"next": n, "resources": {identifier: {"type", "name", "attributes"}}}`
    ///
    /// A missing file is an empty store. Anything unreadable is an error, so a
    /// later save never overwrites resources it could not see.
    fn load(&self) -> ProviderResult<serde_json::Value> {
        let path = self.resources_file();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(json!({"next": 1, "resources": {}}));
            }
            Err(e) => {
                return Err(ProviderError::new(format!(
                    "Failed to read {}",
                    path.display()
                ))
                .with_cause(e));
            }
        };
        let store: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            ProviderError::new(format!("Corrupt resource file {}", path.display())).with_cause(e)
        })?;
        if !store["next"].is_u64() || !store["resources"].is_object() {
            return Err(ProviderError::new(format!(
                "Corrupt resource file {}: expected `next` and `resources`",
                path.display()
            )));
        }
        Ok(store)
    }

    fn save(&self, store: &serde_json::Value) -> ProviderResult<()> {
        fs::create_dir_all(&self.root)
            .map_err(|e| ProviderError::new("Failed to create working directory").with_cause(e))?;
        let content = serde_json::to_string_pretty(store)
            .map_err(|e| ProviderError::new("Failed to serialize resources").with_cause(e))?;
        let path = self.resources_file();
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, content)
            .map_err(|e| ProviderError::new("Failed to save resources").with_cause(e))?;
        fs::rename(&temp, &path)
            .map_err(|e| ProviderError::new("Failed to save resources").with_cause(e))
    }

    fn next_identifier(store: &mut serde_json::Value, id: &ResourceId) -> String {
        let next = store["next"].as_u64().unwrap_or(1);
        store["next"] = json!(next + 1);
        format!("{}-{:08x}", id.resource_type.replace('_', "-"), next)
    }

    fn find(store: &serde_json::Value, identifier: &str) -> Option<HashMap<String, Value>> {
        let entry = store["resources"].get(identifier)?;
        let serde_json::Value::Object(attrs) = &entry["attributes"] else {
            return None;
        };
        Some(
            attrs
                .iter()
                .map(|(k, v)| (k.clone(), Value::from_json(v)))
                .collect(),
        )
    }

    fn record(
        store: &mut serde_json::Value,
        identifier: &str,
        id: &ResourceId,
        attributes: &HashMap<String, Value>,
    ) {
        let attrs: serde_json::Map<String, serde_json::Value> = attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        store["resources"][identifier] = json!({
            "type": id.resource_type,
            "name": id.name,
            "attributes": attrs,
        });
    }

    /// Write freshly generated material for a secret that asks for it
    fn generate_secret(&self, resource: &Resource) -> ProviderResult<()> {
        let Some(policy) = resource
            .attributes
            .get("generate_secret_string")
            .and_then(SecretPolicy::from_value)
        else {
            return Ok(());
        };
        let path = self.secret_file(&resource.id.name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ProviderError::new("Failed to create secrets directory")
                    .with_cause(e)
                    .for_resource(resource.id.clone())
            })?;
        }
        fs::write(&path, policy.render()).map_err(|e| {
            ProviderError::new("Failed to write secret material")
                .with_cause(e)
                .for_resource(resource.id.clone())
        })?;
        log::debug!("Generated secret material for {}", resource.id);
        Ok(())
    }
}

/// Attributes the engine computes on create
fn synthesized_outputs(resource_type: &str, identifier: &str) -> HashMap<String, Value> {
    let Some(config) = schemas::get(resource_type) else {
        return HashMap::new();
    };
    config
        .outputs
        .iter()
        .map(|(attr, _)| {
            let value = match *attr {
                "arn" => Value::String(format!("arn:local:{}:{}", resource_type, identifier)),
                "dns_name" => Value::String(format!("{}.local", identifier)),
                "canonical_hosted_zone_id" => Value::string("ZLOCALALIAS"),
                "latest_version_number" => Value::string("1"),
                _ => Value::String(format!("{}-{}", identifier, attr)),
            };
            (attr.to_string(), value)
        })
        .collect()
}

fn stored_attributes(resource: &Resource) -> HashMap<String, Value> {
    resource
        .provider_attributes()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl Provider for FileProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(str::to_string);
        Box::pin(async move {
            let store = self.load().map_err(|e| e.for_resource(id.clone()))?;
            let found = identifier
                .as_deref()
                .and_then(|identifier| Self::find(&store, identifier).map(|a| (identifier, a)));
            Ok(match found {
                Some((identifier, attributes)) => {
                    State::existing(id, attributes).with_identifier(identifier)
                }
                None => State::not_found(id),
            })
        })
    }

    fn lookup(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            let identifier = match resource.id.resource_type.as_str() {
                "route53_hosted_zone" => match resource.attributes.get("name") {
                    Some(Value::String(name)) => {
                        format!("ZLOCAL{}", name.replace('.', "").to_uppercase())
                    }
                    _ => {
                        return Err(ProviderError::new("Hosted zone lookup requires a name")
                            .for_resource(resource.id.clone()));
                    }
                },
                "secretsmanager_secret" => match resource.attributes.get("arn") {
                    Some(Value::String(arn)) => arn.clone(),
                    _ => {
                        return Err(ProviderError::new("Secret lookup requires an ARN")
                            .for_resource(resource.id.clone()));
                    }
                },
                other => {
                    return Err(ProviderError::new(format!("Cannot look up {}", other))
                        .for_resource(resource.id.clone()));
                }
            };
            Ok(State::existing(resource.id.clone(), stored_attributes(&resource))
                .with_identifier(identifier))
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            let mut store = self.load().map_err(|e| e.for_resource(resource.id.clone()))?;
            let identifier = Self::next_identifier(&mut store, &resource.id);

            let mut attributes = stored_attributes(&resource);
            attributes.extend(synthesized_outputs(&resource.id.resource_type, &identifier));

            self.generate_secret(&resource)?;
            Self::record(&mut store, &identifier, &resource.id, &attributes);
            self.save(&store)
                .map_err(|e| e.for_resource(resource.id.clone()))?;

            log::info!("Created {} as {}", resource.id, identifier);
            Ok(State::existing(resource.id.clone(), attributes).with_identifier(identifier))
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        _from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let to = to.clone();
        Box::pin(async move {
            let mut store = self.load().map_err(|e| e.for_resource(id.clone()))?;
            let Some(mut attributes) = Self::find(&store, &identifier) else {
                return Err(ProviderError::new(format!("{} does not exist", identifier))
                    .for_resource(id));
            };
            attributes.extend(stored_attributes(&to));

            Self::record(&mut store, &identifier, &id, &attributes);
            self.save(&store).map_err(|e| e.for_resource(id.clone()))?;

            log::info!("Updated {} ({})", id, identifier);
            Ok(State::existing(id, attributes).with_identifier(identifier))
        })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            let mut store = self.load().map_err(|e| e.for_resource(id.clone()))?;
            if let Some(resources) = store["resources"].as_object_mut() {
                resources.remove(&identifier);
            }
            self.save(&store).map_err(|e| e.for_resource(id.clone()))?;

            let secret = self.secret_file(&id.name);
            if secret.exists() {
                fs::remove_file(&secret).map_err(|e| {
                    ProviderError::new("Failed to remove secret material")
                        .with_cause(e)
                        .for_resource(id.clone())
                })?;
            }

            log::info!("Deleted {} ({})", id, identifier);
            Ok(())
        })
    }
}

/// Working directory of the local provider for a given state file
pub fn working_dir(state_path: &Path) -> PathBuf {
    state_path
        .parent()
        .unwrap_or(Path::new("."))
        .join(".hasura-infra")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn provider() -> (TempDir, FileProvider) {
        let dir = TempDir::new().unwrap();
        let provider = FileProvider::new(dir.path().join("local"));
        (dir, provider)
    }

    fn load_balancer() -> Resource {
        Resource::new("elbv2_load_balancer", "hasura-dev-alb")
            .with_attribute("name", Value::string("hasura-dev-alb"))
            .with_attribute("subnets", Value::strings(["subnet-1", "subnet-2"]))
            .with_attribute("_unit", Value::string("service"))
    }

    #[tokio::test]
    async fn create_then_read() {
        let (_dir, provider) = provider();
        let created = provider.create(&load_balancer()).await.unwrap();
        let identifier = created.identifier.clone().unwrap();

        assert!(created.attributes.contains_key("dns_name"));
        assert!(!created.attributes.contains_key("_unit"));

        let read = provider
            .read(&created.id, Some(&identifier))
            .await
            .unwrap();
        assert!(read.exists);
        assert_eq!(read.attributes, created.attributes);
    }

    #[tokio::test]
    async fn identifiers_are_unique() {
        let (_dir, provider) = provider();
        let a = provider.create(&load_balancer()).await.unwrap();
        let b = provider.create(&load_balancer()).await.unwrap();
        assert_ne!(a.identifier, b.identifier);
    }

    #[tokio::test]
    async fn update_keeps_outputs() {
        let (_dir, provider) = provider();
        let created = provider.create(&load_balancer()).await.unwrap();
        let identifier = created.identifier.clone().unwrap();

        let to = load_balancer().with_attribute("subnets", Value::strings(["subnet-3"]));
        let updated = provider
            .update(&created.id, &identifier, &created, &to)
            .await
            .unwrap();
        assert_eq!(updated.attributes["subnets"], Value::strings(["subnet-3"]));
        assert_eq!(updated.attributes["dns_name"], created.attributes["dns_name"]);
    }

    #[tokio::test]
    async fn delete_removes_resource() {
        let (_dir, provider) = provider();
        let created = provider.create(&load_balancer()).await.unwrap();
        let identifier = created.identifier.clone().unwrap();

        provider.delete(&created.id, &identifier).await.unwrap();
        let read = provider.read(&created.id, Some(&identifier)).await.unwrap();
        assert!(!read.exists);
    }

    #[tokio::test]
    async fn secret_material_stays_out_of_state() {
        let (dir, provider) = provider();
        let secret = Resource::new("secretsmanager_secret", "hasura-dev-db-credentials")
            .with_attribute("name", Value::string("hasura-dev-db-credentials"))
            .with_attribute(
                "generate_secret_string",
                SecretPolicy::database_credentials().to_value(),
            );
        let created = provider.create(&secret).await.unwrap();

        let path = dir
            .path()
            .join("local/secrets/hasura-dev-db-credentials.json");
        let material: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let password = material["password"].as_str().unwrap();
        assert_eq!(password.len(), 32);

        let stored = fs::read_to_string(dir.path().join("local/resources.json")).unwrap();
        assert!(!stored.contains(password));
        assert!(!format!("{:?}", created.attributes).contains(password));

        provider
            .delete(&created.id, created.identifier.as_deref().unwrap())
            .await
            .unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn corrupt_resource_file_is_never_overwritten() {
        let (dir, provider) = provider();
        let vpc = Resource::new("ec2_vpc", "hasura-dev-vpc")
            .with_attribute("cidr_block", Value::string("10.0.0.0/16"));
        let created = provider.create(&vpc).await.unwrap();

        let path = dir.path().join("local/resources.json");
        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str("garbage");
        fs::write(&path, &content).unwrap();

        let subnet = Resource::new("ec2_subnet", "hasura-dev-subnet");
        let err = provider.create(&subnet).await.unwrap_err();
        assert_eq!(err.resource_id, Some(subnet.id.clone()));
        assert!(err.to_string().contains("Corrupt resource file"));
        assert!(
            provider
                .read(&created.id, created.identifier.as_deref())
                .await
                .is_err()
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
    }

    #[tokio::test]
    async fn missing_resource_file_is_an_empty_store() {
        let (_dir, provider) = provider();
        let id = ResourceId::new("ec2_vpc", "hasura-dev-vpc");
        let state = provider.read(&id, Some("ec2-vpc-00000001")).await.unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn lookups() {
        let (_dir, provider) = provider();
        let zone = Resource::new("route53_hosted_zone", "zone")
            .with_attribute("name", Value::string("example.com"))
            .with_read_only(true);
        let state = provider.lookup(&zone).await.unwrap();
        assert_eq!(state.identifier.as_deref(), Some("ZLOCALEXAMPLECOM"));

        let arn = "arn:aws:secretsmanager:us-east-1:123456789012:secret:jwt-AbCdEf";
        let secret = Resource::new("secretsmanager_secret", "jwt")
            .with_attribute("arn", Value::string(arn))
            .with_read_only(true);
        let state = provider.lookup(&secret).await.unwrap();
        assert_eq!(state.identifier.as_deref(), Some(arn));

        let unnamed = Resource::new("route53_hosted_zone", "zone").with_read_only(true);
        assert!(provider.lookup(&unnamed).await.is_err());
    }
}
