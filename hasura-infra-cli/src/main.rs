use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;

use hasura_infra_awscc::{AwsccProvider, schemas};
use hasura_infra_core::interpreter::{ApplyResult, EffectOutcome};
use hasura_infra_core::provider::Provider;
use hasura_infra_stacks::topology::validate as validate_topology;
use hasura_infra_stacks::{ConfigBuilder, Topology, TopologyConfig, Unit};
use hasura_infra_state::{BackendConfig, LocalBackend, create_backend};

mod deploy;
mod display;
mod file_provider;

use deploy::{Deployer, first_failure, managed_count};
use display::print_plan;
use file_provider::FileProvider;

#[derive(Parser)]
#[command(name = "hasura-infra")]
#[command(
    about = "Provision a Hasura GraphQL engine and its PostgreSQL foundation",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and validate the declarations without contacting the engine
    Validate {
        #[command(flatten)]
        config: ConfigArgs,

        #[arg(long, value_enum, default_value_t = UnitArg::All)]
        unit: UnitArg,
    },
    /// Show execution plan without applying changes
    Plan {
        #[command(flatten)]
        config: ConfigArgs,

        #[command(flatten)]
        target: TargetArgs,
    },
    /// Apply changes to reach the desired state
    Apply {
        #[command(flatten)]
        config: ConfigArgs,

        #[command(flatten)]
        target: TargetArgs,

        /// Plan and walk the effects without changing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Destroy deployed units, service before network
    Destroy {
        #[command(flatten)]
        config: ConfigArgs,

        #[command(flatten)]
        target: TargetArgs,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Print each unit's declarations and their references
    Graph {
        #[command(flatten)]
        config: ConfigArgs,

        #[arg(long, value_enum, default_value_t = UnitArg::All)]
        unit: UnitArg,
    },
    /// Remove a stale state lock
    ForceUnlock {
        /// Lock ID reported by the failed run
        lock_id: String,

        #[arg(long, default_value = LocalBackend::DEFAULT_STATE_FILE)]
        state: PathBuf,
    },
}

/// Deployment configuration; flags win over environment, environment over context
#[derive(Args)]
struct ConfigArgs {
    /// Target environment (dev or prod)
    #[arg(long, env = "CDK_ENV")]
    environment: Option<String>,

    #[arg(long, env = "PROJECT_ID")]
    project: Option<String>,

    #[arg(long, env = "CDK_DEFAULT_ACCOUNT")]
    account: Option<String>,

    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Secrets Manager ARN of the JWT signing secret
    #[arg(long, env = "JWT_SECRET_ARN")]
    jwt_secret_arn: Option<String>,

    /// Secrets Manager ARN of the Hasura database credentials
    #[arg(long, env = "RDS_FOR_HASURA_SECRET_ARN")]
    db_secret_arn: Option<String>,

    #[arg(long, env = "DOMAIN_NAME")]
    domain_name: Option<String>,

    #[arg(long, env = "SUBDOMAIN_NAME")]
    subdomain_name: Option<String>,

    /// JSON context file with any of the values above
    #[arg(long)]
    context: Option<PathBuf>,
}

#[derive(Args)]
struct TargetArgs {
    #[arg(long, value_enum, default_value_t = UnitArg::All)]
    unit: UnitArg,

    #[arg(long, value_enum, default_value_t = ProviderKind::Awscc)]
    provider: ProviderKind,

    #[arg(long, default_value = LocalBackend::DEFAULT_STATE_FILE)]
    state: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum UnitArg {
    Network,
    Service,
    All,
}

impl UnitArg {
    /// Selected units in deployment order
    fn units(self) -> Vec<Unit> {
        match self {
            UnitArg::Network => vec![Unit::Network],
            UnitArg::Service => vec![Unit::Service],
            UnitArg::All => Unit::all().to_vec(),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderKind {
    /// AWS Cloud Control API
    Awscc,
    /// File-backed simulation next to the state file
    Local,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { config, unit } => run_validate(&config, unit),
        Commands::Plan { config, target } => run_plan(&config, &target).await,
        Commands::Apply {
            config,
            target,
            dry_run,
        } => run_apply(&config, &target, dry_run).await,
        Commands::Destroy {
            config,
            target,
            auto_approve,
        } => run_destroy(&config, &target, auto_approve).await,
        Commands::Graph { config, unit } => run_graph(&config, unit),
        Commands::ForceUnlock { lock_id, state } => run_force_unlock(&lock_id, &state).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn build_config(args: &ConfigArgs) -> Result<TopologyConfig, String> {
    let mut builder = ConfigBuilder::new()
        .environment(args.environment.clone())
        .project(args.project.clone())
        .account(args.account.clone())
        .region(args.region.clone())
        .jwt_secret_arn(args.jwt_secret_arn.clone())
        .db_secret_arn(args.db_secret_arn.clone())
        .domain_name(args.domain_name.clone())
        .subdomain_name(args.subdomain_name.clone());
    if let Some(path) = &args.context {
        builder = builder.context_file(path).map_err(|e| e.to_string())?;
    }
    builder.build().map_err(|e| e.to_string())
}

fn build_topology(args: &ConfigArgs) -> Result<Topology, String> {
    let config = build_config(args)?;
    log::debug!(
        "Building {} topology for project {} in {}",
        config.environment,
        config.project,
        config.region
    );
    Topology::build(&config).map_err(|e| format!("Build error: {}", e))
}

async fn get_provider(kind: ProviderKind, region: &str, state: &Path) -> Box<dyn Provider> {
    match kind {
        ProviderKind::Awscc => Box::new(AwsccProvider::new(region).await),
        ProviderKind::Local => Box::new(FileProvider::new(file_provider::working_dir(state))),
    }
}

async fn get_deployer(topology: &Topology, target: &TargetArgs) -> Result<Deployer, String> {
    let provider = get_provider(target.provider, &topology.config.region, &target.state).await;
    let backend = create_backend(&BackendConfig::local(&target.state))
        .map_err(|e| format!("Failed to open state: {}", e))?;
    Ok(Deployer::new(provider, backend))
}

fn run_validate(args: &ConfigArgs, unit: UnitArg) -> Result<(), String> {
    let topology = build_topology(args)?;

    for unit in unit.units() {
        let resources = topology.resources(unit);
        validate_topology(resources).map_err(|e| e.to_string())?;

        let mut failures = Vec::new();
        for resource in resources {
            if let Err(errors) = schemas::validate(resource) {
                for error in errors {
                    failures.push(format!("{}: {}", resource.id, error));
                }
            }
        }
        if !failures.is_empty() {
            for failure in &failures {
                eprintln!("  {} {}", "✗".red(), failure);
            }
            return Err(format!(
                "{} validation error(s) in unit {}",
                failures.len(),
                unit
            ));
        }

        println!(
            "{} {} ({} resources, stack {})",
            "✓".green(),
            unit.as_str().bold(),
            resources.len(),
            topology.stack_name(unit)
        );
    }

    println!("{}", "Validation passed.".green().bold());
    Ok(())
}

fn run_graph(args: &ConfigArgs, unit: UnitArg) -> Result<(), String> {
    let topology = build_topology(args)?;

    for unit in unit.units() {
        let resolved = match unit {
            Unit::Network => topology.network.graph(),
            Unit::Service => topology.service.graph(),
        };
        println!("{} {}", "Unit:".cyan().bold(), topology.stack_name(unit).bold());
        print!("{}", resolved.graph.display(&resolved.resources));
        println!();
    }
    Ok(())
}

async fn run_plan(args: &ConfigArgs, target: &TargetArgs) -> Result<(), String> {
    let topology = build_topology(args)?;
    let deployer = get_deployer(&topology, target).await?;
    let state = deployer.load_state().await?;

    for unit in target.unit.units() {
        let states = deployer
            .current_states(&state, unit, topology.resources(unit))
            .await?;
        let plan = Deployer::plan(&topology, unit, &states);
        print_plan(unit, &plan);
    }
    Ok(())
}

async fn run_apply(args: &ConfigArgs, target: &TargetArgs, dry_run: bool) -> Result<(), String> {
    let topology = build_topology(args)?;
    let deployer = get_deployer(&topology, target).await?.with_dry_run(dry_run);

    let lock = deployer.lock("apply").await?;
    let result = deployer
        .while_locked(
            &lock,
            apply_units(&deployer, &topology, target.unit.units(), dry_run),
        )
        .await;
    deployer.unlock(&lock).await?;
    result
}

async fn apply_units(
    deployer: &Deployer,
    topology: &Topology,
    units: Vec<Unit>,
    dry_run: bool,
) -> Result<(), String> {
    let mut state = deployer.load_state().await?;

    for unit in units {
        let states = deployer
            .current_states(&state, unit, topology.resources(unit))
            .await?;
        let plan = Deployer::plan(topology, unit, &states);
        print_plan(unit, &plan);

        if plan.is_noop() && !dry_run {
            // Data source lookups still run so their values stay recorded
            let result = deployer
                .apply(&mut state, topology, unit, &plan, &states)
                .await?;
            if let Some(failure) = first_failure(&result) {
                return Err(format!("Unit {} failed: {}", unit, failure));
            }
            continue;
        }

        let heading = if dry_run {
            format!("Walking {} (dry run)...", unit)
        } else {
            format!("Applying {}...", unit)
        };
        println!("{}", heading.cyan().bold());

        let result = deployer
            .apply(&mut state, topology, unit, &plan, &states)
            .await?;
        print_outcomes(&result);

        if let Some(failure) = first_failure(&result) {
            println!(
                "{}",
                format!(
                    "Apply failed. {} succeeded, {} failed.",
                    result.success_count, result.failure_count
                )
                .red()
                .bold()
            );
            return Err(format!("Unit {} failed: {}", unit, failure));
        }

        println!(
            "{}",
            format!(
                "Apply of {} complete! {} changes applied.",
                topology.stack_name(unit),
                plan.mutation_count()
            )
            .green()
            .bold()
        );
        println!();
    }

    if !dry_run {
        println!(
            "{} https://{}",
            "Endpoint:".cyan().bold(),
            topology.config.fqdn()
        );
    }
    Ok(())
}

async fn run_destroy(
    args: &ConfigArgs,
    target: &TargetArgs,
    auto_approve: bool,
) -> Result<(), String> {
    let topology = build_topology(args)?;
    let deployer = get_deployer(&topology, target).await?;

    let units: Vec<Unit> = target.unit.units().into_iter().rev().collect();
    let state = deployer.load_state().await?;
    if !units.contains(&Unit::Service) && managed_count(&state, Unit::Service) > 0 {
        return Err(format!(
            "Unit service still manages {} resource(s); destroy it first",
            managed_count(&state, Unit::Service)
        ));
    }
    if units.iter().all(|&u| managed_count(&state, u) == 0) {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    println!(
        "{}",
        "The following resources will be destroyed:".red().bold()
    );
    println!();
    for &unit in &units {
        let states = deployer
            .current_states(&state, unit, topology.resources(unit))
            .await?;
        print_plan(unit, &Deployer::destroy_plan(&topology, unit, &states));
    }

    if !auto_approve && !confirm()? {
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    let lock = deployer.lock("destroy").await?;
    let result = deployer
        .while_locked(&lock, destroy_units(&deployer, &topology, units))
        .await;
    deployer.unlock(&lock).await?;
    result
}

fn confirm() -> Result<bool, String> {
    println!("{}", "Do you really want to destroy these resources?".yellow());
    println!("  Only 'yes' will be accepted to approve.");
    println!();
    print!("  Enter a value: ");
    io::stdout()
        .flush()
        .map_err(|e| format!("Failed to flush stdout: {}", e))?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .map_err(|e| format!("Failed to read input: {}", e))?;
    println!();
    Ok(input.trim() == "yes")
}

async fn destroy_units(
    deployer: &Deployer,
    topology: &Topology,
    units: Vec<Unit>,
) -> Result<(), String> {
    let mut state = deployer.load_state().await?;

    for unit in units {
        let states = deployer
            .current_states(&state, unit, topology.resources(unit))
            .await?;
        let plan = Deployer::destroy_plan(topology, unit, &states);

        println!("{}", format!("Destroying {}...", unit).red().bold());
        let result = deployer.destroy(&mut state, unit, &plan, &states).await?;
        print_outcomes(&result);

        if let Some(failure) = first_failure(&result) {
            return Err(format!("Destroy of unit {} failed: {}", unit, failure));
        }

        println!(
            "{}",
            format!("Destroy of {} complete!", topology.stack_name(unit))
                .green()
                .bold()
        );
        println!();
    }
    Ok(())
}

fn print_outcomes(result: &ApplyResult) {
    for outcome in &result.outcomes {
        match outcome {
            Ok(EffectOutcome::Read { state }) => {
                println!("  {} Read {}", "✓".green(), state.id);
            }
            Ok(EffectOutcome::Created { state }) => {
                let identifier = state.identifier.as_deref().unwrap_or("-");
                println!("  {} Create {} ({})", "✓".green(), state.id, identifier);
            }
            Ok(EffectOutcome::Updated { state }) => {
                println!("  {} Update {}", "✓".green(), state.id);
            }
            Ok(EffectOutcome::Replaced { state }) => {
                println!("  {} Replace {}", "✓".green(), state.id);
            }
            Ok(EffectOutcome::Deleted { id }) => {
                println!("  {} Delete {}", "✓".green(), id);
            }
            Ok(EffectOutcome::Superseded { id, identifier }) => {
                println!("  {} Delete {} ({}, replaced)", "✓".green(), id, identifier);
            }
            Ok(EffectOutcome::Retained { id }) => {
                println!("  {} Retain {} (left in place)", "✓".blue(), id);
            }
            Ok(EffectOutcome::Skipped { reason }) => {
                println!("  {} skipped: {}", "-".normal(), reason);
            }
            Err(e) => {
                println!("  {} {}", "✗".red(), e);
            }
        }
    }
}

async fn run_force_unlock(lock_id: &str, state: &Path) -> Result<(), String> {
    let backend = create_backend(&BackendConfig::local(state))
        .map_err(|e| format!("Failed to open state: {}", e))?;
    backend
        .force_unlock(lock_id)
        .await
        .map_err(|e| format!("Failed to unlock state: {}", e))?;
    println!("{}", format!("Lock {} removed.", lock_id).green());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn units_run_in_deployment_order() {
        assert_eq!(UnitArg::All.units(), vec![Unit::Network, Unit::Service]);
        assert_eq!(UnitArg::Service.units(), vec![Unit::Service]);
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::try_parse_from([
            "hasura-infra",
            "destroy",
            "--unit",
            "service",
            "--provider",
            "local",
            "--auto-approve",
        ])
        .unwrap();
        let Commands::Destroy {
            target,
            auto_approve,
            ..
        } = cli.command
        else {
            panic!("expected destroy");
        };
        assert!(auto_approve);
        assert!(matches!(target.unit, UnitArg::Service));
        assert!(matches!(target.provider, ProviderKind::Local));
        assert_eq!(target.state, PathBuf::from(LocalBackend::DEFAULT_STATE_FILE));
    }

    #[test]
    fn context_file_fills_unset_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cdk.context.json");
        std::fs::write(
            &path,
            r#"{"context": {
                "JWT_SECRET_ARN": "arn:aws:secretsmanager:us-east-1:123456789012:secret:jwt-AbCdEf",
                "RDS_FOR_HASURA_SECRET_ARN": "arn:aws:secretsmanager:us-east-1:123456789012:secret:db-AbCdEf",
                "DOMAIN_NAME": "example.com",
                "SUBDOMAIN_NAME": "api"
            }}"#,
        )
        .unwrap();

        let args = ConfigArgs {
            environment: Some("prod".to_string()),
            project: None,
            account: None,
            region: None,
            jwt_secret_arn: None,
            db_secret_arn: None,
            domain_name: None,
            subdomain_name: Some("graphql".to_string()),
            context: Some(path),
        };
        let config = build_config(&args).unwrap();
        assert_eq!(config.environment.as_str(), "prod");
        assert_eq!(config.fqdn(), "graphql.example.com");
    }
}
