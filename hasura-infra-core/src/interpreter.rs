//! Interpreter - Execute Effects using a Provider
//!
//! The Interpreter executes Effects contained in a Plan in order,
//! collecting the results. This is where side effects actually occur.
//!
//! References between resources are resolved just before each effect runs,
//! using the attributes of everything created, updated or read so far.
//!
//! A replacement creates the new resource in place of the old one. The old
//! identities are deleted once the whole plan has succeeded, so dependents
//! have moved to the new identity before the old one disappears.

use std::collections::HashMap;

use crate::effect::Effect;
use crate::plan::Plan;
use crate::provider::{Provider, ProviderError, ProviderResult};
use crate::resource::{Resource, ResourceId, State, Value};

/// Attributes of each binding known so far, keyed by binding name
pub type Bindings = HashMap<String, HashMap<String, Value>>;

/// Result of executing each Effect
#[derive(Debug)]
pub enum EffectOutcome {
    Read { state: State },
    Created { state: State },
    Updated { state: State },
    Replaced { state: State },
    Deleted { id: ResourceId },
    /// Old identity of a replaced resource, deleted after the plan
    Superseded { id: ResourceId, identifier: String },
    /// Released from management, physical resource kept
    Retained { id: ResourceId },
    /// Skipped (e.g., dry-run)
    Skipped { reason: String },
}

impl EffectOutcome {
    /// State to persist for this outcome, if any
    pub fn state(&self) -> Option<&State> {
        match self {
            EffectOutcome::Read { state }
            | EffectOutcome::Created { state }
            | EffectOutcome::Updated { state }
            | EffectOutcome::Replaced { state } => Some(state),
            _ => None,
        }
    }
}

/// Result of executing the entire Plan
#[derive(Debug)]
pub struct ApplyResult {
    pub outcomes: Vec<Result<EffectOutcome, ProviderError>>,
    pub success_count: usize,
    pub failure_count: usize,
    /// Bindings after the run, including everything read or written
    pub bindings: Bindings,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.failure_count == 0
    }

    /// States of the resources that now exist under management
    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.outcomes
            .iter()
            .filter_map(|o| o.as_ref().ok())
            .filter_map(EffectOutcome::state)
    }

    /// Resources that left management (deleted or retained)
    pub fn released(&self) -> impl Iterator<Item = &ResourceId> {
        self.outcomes
            .iter()
            .filter_map(|o| o.as_ref().ok())
            .filter_map(|o| match o {
                EffectOutcome::Deleted { id } | EffectOutcome::Retained { id } => Some(id),
                _ => None,
            })
    }

    pub fn errors(&self) -> impl Iterator<Item = &ProviderError> {
        self.outcomes.iter().filter_map(|o| o.as_ref().err())
    }

    /// Resources the engine was still working on when their effect failed
    pub fn pending(&self) -> impl Iterator<Item = (&ResourceId, &str)> {
        self.errors().filter_map(|e| {
            Some((e.resource_id.as_ref()?, e.pending_identifier.as_deref()?))
        })
    }
}

/// Interpreter configuration
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    /// If true, skip actual side effects
    pub dry_run: bool,
    /// Continue on error
    pub continue_on_error: bool,
}

/// Interpreter that executes Effects using a Provider
pub struct Interpreter<P: Provider> {
    provider: P,
    config: InterpreterConfig,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: InterpreterConfig::default(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Execute a Plan, interpreting all Effects and causing side effects
    ///
    /// `bindings` seeds reference resolution with the attributes of resources
    /// that already exist (including those of earlier units).
    pub async fn apply(&self, plan: &Plan, bindings: Bindings) -> ApplyResult {
        let mut bindings = bindings;
        let mut outcomes = Vec::new();
        let mut success_count = 0;
        let mut failure_count = 0;
        let mut superseded: Vec<(ResourceId, String)> = Vec::new();

        for effect in plan.effects() {
            log::debug!("Executing {}", effect);
            let result = self.execute_effect(effect, &bindings).await;

            match &result {
                Ok(outcome) => {
                    success_count += 1;
                    if let Some(state) = outcome.state() {
                        bind_state(&mut bindings, state);
                    }
                    if let (EffectOutcome::Replaced { .. }, Effect::Replace { id, from, .. }) =
                        (outcome, effect)
                        && let Some(identifier) = &from.identifier
                    {
                        superseded.push((id.clone(), identifier.clone()));
                    }
                }
                Err(e) => {
                    log::warn!("{} failed: {}", effect, e);
                    failure_count += 1;
                    if !self.config.continue_on_error {
                        outcomes.push(result);
                        break;
                    }
                }
            }

            outcomes.push(result);
        }

        if failure_count == 0 {
            for (id, identifier) in superseded.into_iter().rev() {
                log::debug!("Deleting superseded {} ({})", id, identifier);
                match self.provider.delete(&id, &identifier).await {
                    Ok(()) => {
                        success_count += 1;
                        outcomes.push(Ok(EffectOutcome::Superseded { id, identifier }));
                    }
                    Err(e) => {
                        log::warn!("Deleting superseded {} failed: {}", id, e);
                        failure_count += 1;
                        outcomes.push(Err(e));
                    }
                }
            }
        } else {
            for (id, identifier) in &superseded {
                log::warn!(
                    "Superseded {} ({}) left in place after a failed run",
                    id,
                    identifier
                );
            }
        }

        ApplyResult {
            outcomes,
            success_count,
            failure_count,
            bindings,
        }
    }

    /// Execute a single Effect
    async fn execute_effect(
        &self,
        effect: &Effect,
        bindings: &Bindings,
    ) -> ProviderResult<EffectOutcome> {
        if self.config.dry_run && effect.is_mutating() {
            return Ok(EffectOutcome::Skipped {
                reason: "dry-run mode".to_string(),
            });
        }

        match effect {
            Effect::Read(resource) => {
                let resource = resolve_resource(resource, bindings)?;
                let state = self.provider.lookup(&resource).await?;
                if !state.exists {
                    return Err(ProviderError::new("Data source not found")
                        .for_resource(resource.id.clone()));
                }
                Ok(EffectOutcome::Read { state })
            }
            Effect::Create(resource) => {
                let resource = resolve_resource(resource, bindings)?;
                let state = self.provider.create(&resource).await?;
                Ok(EffectOutcome::Created { state })
            }
            Effect::Update { id, from, to } => {
                let to = resolve_resource(to, bindings)?;
                let identifier = from.identifier.as_deref().unwrap_or("");
                let state = self.provider.update(id, identifier, from, &to).await?;
                Ok(EffectOutcome::Updated { state })
            }
            Effect::Replace { id, from, to } => {
                let to = resolve_resource(to, bindings)?;
                log::debug!("Replacing {} ({:?})", id, from.identifier);
                let state = self.provider.create(&to).await?;
                Ok(EffectOutcome::Replaced { state })
            }
            Effect::Delete { id, identifier } => {
                self.provider.delete(id, identifier).await?;
                Ok(EffectOutcome::Deleted { id: id.clone() })
            }
            Effect::Retain { id } => {
                log::info!("{} retained; the physical resource is left in place", id);
                Ok(EffectOutcome::Retained { id: id.clone() })
            }
        }
    }
}

/// Record a state's attributes (and its identifier as `id`) under its binding
pub fn bind_state(bindings: &mut Bindings, state: &State) {
    let mut attrs = state.attributes.clone();
    if let Some(identifier) = &state.identifier {
        attrs
            .entry("id".to_string())
            .or_insert_with(|| Value::String(identifier.clone()));
    }
    bindings.insert(state.id.name.clone(), attrs);
}

/// Substitute references; an unresolved reference is never sent to the provider
pub fn resolve_resource(resource: &Resource, bindings: &Bindings) -> ProviderResult<Resource> {
    let mut resolved = resource.clone();
    for (key, value) in &resource.attributes {
        let value = value.resolve(bindings);
        if value.has_unresolved_ref() {
            let mut refs = Vec::new();
            value.collect_refs(&mut refs);
            let names: Vec<String> = refs.iter().map(|(b, a)| format!("{}.{}", b, a)).collect();
            return Err(ProviderError::new(format!(
                "Unresolved reference in '{}': {}",
                key,
                names.join(", ")
            ))
            .for_resource(resource.id.clone()));
        }
        resolved.attributes.insert(key.clone(), value);
    }
    Ok(resolved)
}
