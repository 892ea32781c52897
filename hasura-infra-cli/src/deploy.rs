//! Running plans unit by unit against a provider and a state backend

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use hasura_infra_core::differ::{create_plan, destroy_plan};
use hasura_infra_core::interpreter::{
    ApplyResult, Bindings, Interpreter, InterpreterConfig, bind_state,
};
use hasura_infra_core::plan::Plan;
use hasura_infra_core::provider::Provider;
use hasura_infra_core::resource::{RemovalPolicy, Resource, ResourceId, State};
use hasura_infra_stacks::{Topology, Unit};
use hasura_infra_state::lock::LOCK_RENEW_INTERVAL_SECS;
use hasura_infra_state::{LockInfo, ResourceState, StateBackend, StateFile};

/// Seed reference resolution with everything already deployed
pub fn bindings(states: &HashMap<ResourceId, State>) -> Bindings {
    let mut bindings = Bindings::new();
    for state in states.values().filter(|s| s.exists) {
        bind_state(&mut bindings, state);
    }
    bindings
}

pub struct Deployer {
    interpreter: Interpreter<Box<dyn Provider>>,
    backend: Box<dyn StateBackend>,
    dry_run: bool,
    renew_every: Duration,
}

impl Deployer {
    pub fn new(provider: Box<dyn Provider>, backend: Box<dyn StateBackend>) -> Self {
        Self {
            interpreter: Interpreter::new(provider),
            backend,
            dry_run: false,
            renew_every: Duration::from_secs(LOCK_RENEW_INTERVAL_SECS),
        }
    }

    pub fn with_lock_renewal(mut self, every: Duration) -> Self {
        self.renew_every = every;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.interpreter = self.interpreter.with_config(InterpreterConfig {
            dry_run,
            continue_on_error: false,
        });
        self.dry_run = dry_run;
        self
    }

    fn provider(&self) -> &dyn Provider {
        &**self.interpreter.provider()
    }

    pub async fn lock(&self, operation: &str) -> Result<LockInfo, String> {
        self.backend
            .acquire_lock(operation)
            .await
            .map_err(|e| format!("Failed to acquire state lock: {}", e))
    }

    pub async fn unlock(&self, lock: &LockInfo) -> Result<(), String> {
        self.backend
            .release_lock(lock)
            .await
            .map_err(|e| format!("Failed to release state lock: {}", e))
    }

    /// Run `work` while renewing `lock`, so a long run never looks abandoned
    pub async fn while_locked<F: Future>(&self, lock: &LockInfo, work: F) -> F::Output {
        tokio::pin!(work);
        let mut ticker = tokio::time::interval(self.renew_every);
        ticker.tick().await;
        loop {
            tokio::select! {
                output = &mut work => return output,
                _ = ticker.tick() => {
                    if let Err(e) = self.backend.renew_lock(lock).await {
                        log::warn!("Failed to renew state lock {}: {}", lock.id, e);
                    }
                }
            }
        }
    }

    pub async fn load_state(&self) -> Result<StateFile, String> {
        self.backend
            .read_state()
            .await
            .map(Option::unwrap_or_default)
            .map_err(|e| format!("Failed to read state: {}", e))
    }

    async fn save_state(&self, state: &mut StateFile) -> Result<(), String> {
        state.increment_serial();
        self.backend
            .write_state(state)
            .await
            .map_err(|e| format!("Failed to write state: {}", e))
    }

    /// Recorded states with the unit's entries refreshed from the provider
    ///
    /// Attributes the provider does not return (write-only properties) are
    /// carried over from the record. Entries that no longer exist are dropped,
    /// so the plan creates them again.
    pub async fn current_states(
        &self,
        state: &StateFile,
        unit: Unit,
        declarations: &[Resource],
    ) -> Result<HashMap<ResourceId, State>, String> {
        let mut states = HashMap::new();

        for entry in &state.resources {
            let recorded = entry.to_state();
            let is_data_source = declarations
                .iter()
                .any(|r| r.id == recorded.id && r.is_data_source());
            if entry.unit != unit.as_str() || is_data_source {
                states.insert(recorded.id.clone(), recorded);
                continue;
            }

            let live = self
                .provider()
                .read(&recorded.id, recorded.identifier.as_deref())
                .await
                .map_err(|e| format!("Failed to refresh {}: {}", recorded.id, e))?;
            if !live.exists {
                log::info!("{} no longer exists", recorded.id);
                continue;
            }

            let mut attributes = recorded.attributes.clone();
            attributes.extend(live.attributes);
            let identifier = live.identifier.or(recorded.identifier);
            let mut refreshed = State::existing(recorded.id.clone(), attributes);
            refreshed.identifier = identifier;
            states.insert(recorded.id, refreshed);
        }

        Ok(states)
    }

    /// Plan one unit against the given states
    pub fn plan(topology: &Topology, unit: Unit, states: &HashMap<ResourceId, State>) -> Plan {
        create_plan(topology.resources(unit), states)
    }

    /// Apply a unit's plan and record the outcome
    ///
    /// State is written even when an effect fails, so a re-run resumes from
    /// whatever was already created.
    pub async fn apply(
        &self,
        state: &mut StateFile,
        topology: &Topology,
        unit: Unit,
        plan: &Plan,
        states: &HashMap<ResourceId, State>,
    ) -> Result<ApplyResult, String> {
        let result = self.interpreter.apply(plan, bindings(states)).await;
        if self.dry_run {
            return Ok(result);
        }

        let provider = self.provider().name();
        for applied in result.states() {
            state.upsert_resource(
                ResourceState::from_state(applied, provider, unit.as_str())
                    .with_protected(protected(topology, unit, &applied.id)),
            );
        }
        for id in result.released() {
            state.remove_resource(id);
        }
        for (id, identifier) in result.pending() {
            if let Some(recorded) = state.find_resource(id) {
                log::warn!(
                    "{} is still changing as {}; keeping the recorded {:?}",
                    id,
                    identifier,
                    recorded.identifier
                );
                continue;
            }
            log::warn!(
                "{} is still being created as {}; recorded so the next run picks it up",
                id,
                identifier
            );
            state.upsert_resource(
                ResourceState::from_state(
                    &State::existing(id.clone(), HashMap::new()).with_identifier(identifier),
                    provider,
                    unit.as_str(),
                )
                .with_protected(protected(topology, unit, id)),
            );
        }

        self.save_state(state).await?;
        Ok(result)
    }

    /// Plan the teardown of one unit from its recorded states
    pub fn destroy_plan(topology: &Topology, unit: Unit, states: &HashMap<ResourceId, State>) -> Plan {
        destroy_plan(topology.resources(unit), states)
    }

    /// Tear a unit down and forget it
    pub async fn destroy(
        &self,
        state: &mut StateFile,
        unit: Unit,
        plan: &Plan,
        states: &HashMap<ResourceId, State>,
    ) -> Result<ApplyResult, String> {
        let result = self.interpreter.apply(plan, bindings(states)).await;

        for id in result.released() {
            state.remove_resource(id);
        }
        if result.is_success() {
            // Data source lookups and entries already gone leave with the unit
            state.resources.retain(|r| r.unit != unit.as_str());
        }

        self.save_state(state).await?;
        Ok(result)
    }

    pub async fn force_unlock(&self, lock_id: &str) -> Result<(), String> {
        self.backend
            .force_unlock(lock_id)
            .await
            .map_err(|e| format!("Failed to unlock state: {}", e))
    }
}

fn protected(topology: &Topology, unit: Unit, id: &ResourceId) -> bool {
    topology
        .resources(unit)
        .iter()
        .find(|r| &r.id == id)
        .is_some_and(|r| r.removal_policy == RemovalPolicy::Retain)
}

/// Entries a unit still has under management
pub fn managed_count(state: &StateFile, unit: Unit) -> usize {
    state.unit_resources(unit.as_str()).count()
}

/// First failure of a run, naming the resource it happened on
pub fn first_failure(result: &ApplyResult) -> Option<String> {
    result.errors().next().map(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_provider::FileProvider;
    use hasura_infra_core::provider::{BoxFuture, ProviderError, ProviderResult};
    use hasura_infra_stacks::{ConfigBuilder, TopologyConfig};
    use hasura_infra_state::LocalBackend;
    use tempfile::TempDir;

    fn config() -> TopologyConfig {
        ConfigBuilder::new()
            .jwt_secret_arn(Some(
                "arn:aws:secretsmanager:us-east-1:123456789012:secret:jwt-AbCdEf".to_string(),
            ))
            .db_secret_arn(Some(
                "arn:aws:secretsmanager:us-east-1:123456789012:secret:db-AbCdEf".to_string(),
            ))
            .domain_name(Some("example.com".to_string()))
            .subdomain_name(Some("api".to_string()))
            .build()
            .unwrap()
    }

    fn deployer(dir: &TempDir) -> Deployer {
        let state_path = dir.path().join(LocalBackend::DEFAULT_STATE_FILE);
        Deployer::new(
            Box::new(FileProvider::new(dir.path().join("local"))),
            Box::new(LocalBackend::with_path(state_path)),
        )
    }

    /// Apply the given units in order; returns the mutation count per unit
    async fn deploy(deployer: &Deployer, topology: &Topology, units: &[Unit]) -> Vec<usize> {
        let mut mutations = Vec::new();
        for &unit in units {
            let mut state = deployer.load_state().await.unwrap();
            let states = deployer
                .current_states(&state, unit, topology.resources(unit))
                .await
                .unwrap();
            let plan = Deployer::plan(topology, unit, &states);
            mutations.push(plan.mutation_count());
            let result = deployer
                .apply(&mut state, topology, unit, &plan, &states)
                .await
                .unwrap();
            assert!(result.is_success(), "{:?}", first_failure(&result));
        }
        mutations
    }

    async fn destroy(deployer: &Deployer, topology: &Topology, unit: Unit) -> ApplyResult {
        let mut state = deployer.load_state().await.unwrap();
        let states = deployer
            .current_states(&state, unit, topology.resources(unit))
            .await
            .unwrap();
        let plan = Deployer::destroy_plan(topology, unit, &states);
        deployer.destroy(&mut state, unit, &plan, &states).await.unwrap()
    }

    #[tokio::test]
    async fn second_apply_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let deployer = deployer(&dir);
        let topology = Topology::build(&config()).unwrap();

        let first = deploy(&deployer, &topology, &Unit::all()).await;
        assert!(first.iter().all(|&n| n > 0));

        let second = deploy(&deployer, &topology, &Unit::all()).await;
        assert_eq!(second, vec![0, 0]);
    }

    #[tokio::test]
    async fn state_records_units_and_retention() {
        let dir = TempDir::new().unwrap();
        let deployer = deployer(&dir);
        let topology = Topology::build(&config()).unwrap();
        deploy(&deployer, &topology, &Unit::all()).await;

        let state = deployer.load_state().await.unwrap();
        assert_eq!(state.serial, 2);
        assert_eq!(
            managed_count(&state, Unit::Network),
            topology.resources(Unit::Network).len()
        );
        assert_eq!(
            managed_count(&state, Unit::Service),
            topology.resources(Unit::Service).len()
        );

        let database = state
            .resources
            .iter()
            .find(|r| r.resource_type == "rds_db_instance")
            .unwrap();
        assert!(database.protected);
        assert!(database.identifier.is_some());
    }

    #[tokio::test]
    async fn destroying_service_leaves_network_untouched() {
        let dir = TempDir::new().unwrap();
        let deployer = deployer(&dir);
        let topology = Topology::build(&config()).unwrap();
        deploy(&deployer, &topology, &Unit::all()).await;

        let before: Vec<ResourceState> = deployer
            .load_state()
            .await
            .unwrap()
            .unit_resources("network")
            .cloned()
            .collect();

        let result = destroy(&deployer, &topology, Unit::Service).await;
        assert!(result.is_success());

        let state = deployer.load_state().await.unwrap();
        assert_eq!(managed_count(&state, Unit::Service), 0);
        let after: Vec<ResourceState> = state.unit_resources("network").cloned().collect();
        assert_eq!(before, after);

        // Network is still current, service comes back in full
        let again = deploy(&deployer, &topology, &Unit::all()).await;
        assert_eq!(again[0], 0);
        assert!(again[1] > 0);
    }

    #[tokio::test]
    async fn destroying_network_retains_the_database() {
        let dir = TempDir::new().unwrap();
        let deployer = deployer(&dir);
        let topology = Topology::build(&config()).unwrap();
        deploy(&deployer, &topology, &[Unit::Network]).await;

        let result = destroy(&deployer, &topology, Unit::Network).await;
        assert!(result.is_success(), "{:?}", first_failure(&result));
        assert!(
            result
                .outcomes
                .iter()
                .filter_map(|o| o.as_ref().ok())
                .any(|o| matches!(
                    o,
                    hasura_infra_core::interpreter::EffectOutcome::Retained { id }
                        if id.resource_type == "rds_db_instance"
                ))
        );

        let state = deployer.load_state().await.unwrap();
        assert_eq!(managed_count(&state, Unit::Network), 0);
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let deployer = deployer(&dir).with_dry_run(true);
        let topology = Topology::build(&config()).unwrap();

        let mut state = deployer.load_state().await.unwrap();
        let states = deployer
            .current_states(&state, Unit::Network, topology.resources(Unit::Network))
            .await
            .unwrap();
        let plan = Deployer::plan(&topology, Unit::Network, &states);
        deployer
            .apply(&mut state, &topology, Unit::Network, &plan, &states)
            .await
            .unwrap();

        assert!(deployer.backend.read_state().await.unwrap().is_none());
        assert!(!dir.path().join("local/resources.json").exists());
    }

    #[tokio::test]
    async fn vanished_resources_are_planned_again() {
        let dir = TempDir::new().unwrap();
        let deployer = deployer(&dir);
        let topology = Topology::build(&config()).unwrap();
        deploy(&deployer, &topology, &[Unit::Network]).await;

        std::fs::remove_file(dir.path().join("local/resources.json")).unwrap();

        let state = deployer.load_state().await.unwrap();
        let states = deployer
            .current_states(&state, Unit::Network, topology.resources(Unit::Network))
            .await
            .unwrap();
        let plan = Deployer::plan(&topology, Unit::Network, &states);
        let managed = topology
            .resources(Unit::Network)
            .iter()
            .filter(|r| !r.is_data_source())
            .count();
        assert_eq!(plan.summary().create, managed);
    }

    /// Creates the resource but gives up waiting on one type, as a timed-out poll does
    struct StallingProvider {
        inner: FileProvider,
        stall_on: &'static str,
    }

    impl Provider for StallingProvider {
        fn name(&self) -> &'static str {
            self.inner.name()
        }

        fn read(
            &self,
            id: &ResourceId,
            identifier: Option<&str>,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            self.inner.read(id, identifier)
        }

        fn lookup(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            self.inner.lookup(resource)
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let resource = resource.clone();
            Box::pin(async move {
                let state = self.inner.create(&resource).await?;
                if resource.id.resource_type != self.stall_on {
                    return Ok(state);
                }
                Err(ProviderError::new("Operation timed out")
                    .with_pending_identifier(state.identifier.unwrap_or_default())
                    .for_resource(resource.id))
            })
        }

        fn update(
            &self,
            id: &ResourceId,
            identifier: &str,
            from: &State,
            to: &Resource,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            self.inner.update(id, identifier, from, to)
        }

        fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
            self.inner.delete(id, identifier)
        }
    }

    #[tokio::test]
    async fn timed_out_create_is_picked_up_by_the_next_run() {
        let dir = TempDir::new().unwrap();
        let state_path = dir.path().join(LocalBackend::DEFAULT_STATE_FILE);
        let stalling = Deployer::new(
            Box::new(StallingProvider {
                inner: FileProvider::new(dir.path().join("local")),
                stall_on: "rds_db_instance",
            }),
            Box::new(LocalBackend::with_path(state_path)),
        );
        let topology = Topology::build(&config()).unwrap();

        let mut state = stalling.load_state().await.unwrap();
        let states = stalling
            .current_states(&state, Unit::Network, topology.resources(Unit::Network))
            .await
            .unwrap();
        let plan = Deployer::plan(&topology, Unit::Network, &states);
        let result = stalling
            .apply(&mut state, &topology, Unit::Network, &plan, &states)
            .await
            .unwrap();
        assert!(!result.is_success());

        let recorded = stalling.load_state().await.unwrap();
        let database = recorded
            .resources
            .iter()
            .find(|r| r.resource_type == "rds_db_instance")
            .unwrap();
        assert!(database.identifier.is_some());
        assert!(database.protected);

        // The resumed run adopts the instance instead of creating it again
        let deployer = deployer(&dir);
        let states = deployer
            .current_states(&recorded, Unit::Network, topology.resources(Unit::Network))
            .await
            .unwrap();
        let plan = Deployer::plan(&topology, Unit::Network, &states);
        assert!(!plan.effects().iter().any(|e| matches!(
            e,
            hasura_infra_core::effect::Effect::Create(r) if r.id.resource_type == "rds_db_instance"
        )));
        deploy(&deployer, &topology, &[Unit::Network]).await;
        assert_eq!(deploy(&deployer, &topology, &[Unit::Network]).await, vec![0]);
    }

    #[tokio::test]
    async fn held_lock_is_renewed_during_a_run() {
        let dir = TempDir::new().unwrap();
        let deployer = deployer(&dir).with_lock_renewal(Duration::from_millis(20));
        let lock = deployer.lock("apply").await.unwrap();

        let lock_path = dir.path().join("hasura-infra.state.lock");
        let output = deployer
            .while_locked(&lock, async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                "done"
            })
            .await;
        assert_eq!(output, "done");

        let current: LockInfo =
            serde_json::from_str(&std::fs::read_to_string(&lock_path).unwrap()).unwrap();
        assert_eq!(current.id, lock.id);
        assert!(current.expires > lock.expires);
        deployer.unlock(&lock).await.unwrap();
    }

    #[tokio::test]
    async fn lock_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let deployer = deployer(&dir);
        let lock = deployer.lock("apply").await.unwrap();
        assert!(deployer.lock("destroy").await.is_err());
        deployer.unlock(&lock).await.unwrap();
        assert!(deployer.lock("destroy").await.is_ok());
    }
}
