//! Dataproc reconciler CLI entrypoint.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use dataproc_reconciler::api::DataprocClient;
use dataproc_reconciler::cli::{
    Cli, Commands, LifecycleArgs, OutputFormat, OutputFormatter, ResourceArgs, ResourceSummary, StateCommands,
};
use dataproc_reconciler::config::{
    ClientConfig, ConfigParser, DeclaredResource, ManagedResource, Manifest, canonical_kind, find_manifest_file,
};
use dataproc_reconciler::error::Result;
use dataproc_reconciler::model::{AutoscalingPolicy, Cluster, Identity, Resource, WorkflowTemplate};
use dataproc_reconciler::planner::{LifecycleParam, ResourcePlan};
use dataproc_reconciler::reconciler::{ApplyOptions, ApplySummary, Reconciler};
use dataproc_reconciler::state::{LocalStateStore, ReconcileState, StateStore};

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Runs `$body` with `$r` bound to the typed resource inside a [`ManagedResource`].
macro_rules! with_resource {
    ($managed:expr, $r:ident => $body:expr) => {
        match $managed {
            ManagedResource::AutoscalingPolicy($r) => $body,
            ManagedResource::Cluster($r) => $body,
            ManagedResource::WorkflowTemplate($r) => $body,
        }
    };
}

/// Runs `$body` with `$t` aliased to the resource type named by `$kind`.
macro_rules! with_kind {
    ($kind:expr, $t:ident => $body:expr) => {
        match canonical_kind($kind)? {
            k if k == AutoscalingPolicy::KIND => {
                type $t = AutoscalingPolicy;
                $body
            }
            k if k == Cluster::KIND => {
                type $t = Cluster;
                $body
            }
            _ => {
                type $t = WorkflowTemplate;
                $body
            }
        }
    };
}

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    init_logging(cli.verbose, cli.json_logs);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Validate { file } => cmd_validate(file.as_deref()),
        Commands::Plan {
            file,
            lifecycle,
            refresh,
        } => cmd_plan(config, file.as_deref(), lifecycle, refresh, &formatter).await,
        Commands::Apply {
            file,
            lifecycle,
            yes,
            refresh,
        } => cmd_apply(config, file.as_deref(), lifecycle, yes, refresh, &formatter).await,
        Commands::Get { target } => cmd_get(config, &target, &formatter).await,
        Commands::List {
            kind,
            project,
            location,
        } => cmd_list(config, &kind, &project, &location, &formatter).await,
        Commands::Delete { target, yes } => cmd_delete(config, &target, yes).await,
        Commands::DeleteAll {
            kind,
            project,
            location,
            prefix,
            yes,
        } => cmd_delete_all(config, &kind, &project, &location, &prefix, yes).await,
        Commands::State { command } => cmd_state(config, command, &formatter).await,
    }
}

/// Validate a manifest.
fn cmd_validate(file: Option<&Path>) -> Result<()> {
    let (path, manifest) = load_manifest(file)?;
    info!("Validating manifest: {}", path.display());

    let declared = manifest.resources()?;
    for entry in &declared {
        entry.resource.validate()?;
    }

    eprintln!("Manifest is valid!");
    eprintln!("\nResources ({}):", declared.len());
    for entry in &declared {
        eprintln!("  - {}", entry.resource);
    }
    Ok(())
}

/// Show what apply would change.
async fn cmd_plan(
    config_path: Option<&Path>,
    file: Option<&Path>,
    lifecycle: LifecycleArgs,
    refresh: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (_, manifest) = load_manifest(file)?;
    let declared = ordered(manifest.resources()?);
    let config = load_client_config(config_path)?;
    let store = LocalStateStore::with_state_path(config.state_path());
    let state = if refresh { None } else { store.load().await? };
    let reconciler = create_reconciler(&config).await?;

    let mut plans = Vec::with_capacity(declared.len());
    for entry in &declared {
        let params = merge_lifecycle(&entry.lifecycle, lifecycle);
        let plan = with_resource!(&entry.resource, r => plan_one(&reconciler, r, params, state.as_ref()).await)?;
        plans.push(plan);
    }

    emit(&formatter.format_plans(&plans))
}

/// Converge every resource in a manifest.
async fn cmd_apply(
    config_path: Option<&Path>,
    file: Option<&Path>,
    lifecycle: LifecycleArgs,
    auto_approve: bool,
    refresh: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (_, manifest) = load_manifest(file)?;
    let declared = ordered(manifest.resources()?);
    let config = load_client_config(config_path)?;
    let store = LocalStateStore::with_state_path(config.state_path());
    let mut state = store.load_or_default().await?;
    let reconciler = create_reconciler(&config).await?;

    let hints = if refresh { None } else { Some(&state) };
    let mut plans = Vec::with_capacity(declared.len());
    for entry in &declared {
        let params = merge_lifecycle(&entry.lifecycle, lifecycle);
        let plan = with_resource!(&entry.resource, r => plan_one(&reconciler, r, params, hints).await)?;
        plans.push(plan);
    }

    if plans.iter().all(ResourcePlan::is_empty) {
        eprintln!("No changes to apply.");
        return Ok(());
    }

    eprintln!("{}", OutputFormatter::new(OutputFormat::Text).format_plans(&plans));

    if !auto_approve && !confirm("Do you want to apply this plan? [y/N]: ", "y")? {
        eprintln!("Apply cancelled.");
        return Ok(());
    }

    let mut summaries = Vec::with_capacity(declared.len());
    for entry in &declared {
        let params = merge_lifecycle(&entry.lifecycle, lifecycle);
        let result = with_resource!(&entry.resource, r => {
            apply_one(&reconciler, r, params, refresh, &mut state).await
        });
        match result {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                // Keep what converged before the failure.
                store.save(&state).await?;
                return Err(e);
            }
        }
    }

    store.save(&state).await?;
    emit(&formatter.format_apply(&summaries))
}

/// Show one resource.
async fn cmd_get(config_path: Option<&Path>, target: &ResourceArgs, formatter: &OutputFormatter) -> Result<()> {
    let resource = ManagedResource::reference(&target.kind, &identity_of(target))?;
    let config = load_client_config(config_path)?;
    let reconciler = create_reconciler(&config).await?;

    let value = with_resource!(&resource, r => reconciler.observer().fetch(r).await)?;
    emit(&formatter.format_resource(&value))
}

/// List resources of a kind.
async fn cmd_list(
    config_path: Option<&Path>,
    kind: &str,
    project: &str,
    location: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_client_config(config_path)?;
    let reconciler = create_reconciler(&config).await?;

    let rows: Vec<ResourceSummary> = with_kind!(kind, T => {
        reconciler
            .observer()
            .list_all::<T>(project, location)
            .await?
            .iter()
            .map(ResourceSummary::of)
            .collect()
    });

    emit(&formatter.format_list(canonical_kind(kind)?, &rows))
}

/// Delete one resource.
async fn cmd_delete(config_path: Option<&Path>, target: &ResourceArgs, auto_approve: bool) -> Result<()> {
    let resource = ManagedResource::reference(&target.kind, &identity_of(target))?;

    if !auto_approve {
        eprintln!("{resource} will be deleted.");
        if !confirm("\nThis action is IRREVERSIBLE. Type 'delete' to confirm: ", "delete")? {
            eprintln!("Deletion cancelled.");
            return Ok(());
        }
    }

    let config = load_client_config(config_path)?;
    let reconciler = create_reconciler(&config).await?;
    let deleted = with_resource!(&resource, r => reconciler.delete(r).await)?;

    let store = LocalStateStore::with_state_path(config.state_path());
    if let Some(mut state) = store.load().await? {
        if state.remove(resource.kind(), &resource.identity()) {
            store.save(&state).await?;
        }
    }

    if deleted {
        eprintln!("Deleted {resource}.");
    } else {
        eprintln!("{resource} does not exist.");
    }
    Ok(())
}

/// Delete every resource of a kind whose name starts with a prefix.
async fn cmd_delete_all(
    config_path: Option<&Path>,
    kind: &str,
    project: &str,
    location: &str,
    prefix: &str,
    auto_approve: bool,
) -> Result<()> {
    let kind = canonical_kind(kind)?;

    if !auto_approve {
        eprintln!("Every {kind} in {project}/{location} whose name starts with '{prefix}' will be deleted.");
        if !confirm("\nThis action is IRREVERSIBLE. Type 'delete' to confirm: ", "delete")? {
            eprintln!("Deletion cancelled.");
            return Ok(());
        }
    }

    let config = load_client_config(config_path)?;
    let reconciler = create_reconciler(&config).await?;
    let provisioner = reconciler.provisioner();

    let deleted = with_kind!(kind, T => {
        provisioner
            .delete_all::<T, _>(project, location, |r| r.name().starts_with(prefix))
            .await?
    });

    eprintln!("Deleted {deleted} {kind} resource(s).");
    Ok(())
}

/// State management commands.
async fn cmd_state(config_path: Option<&Path>, command: StateCommands, formatter: &OutputFormatter) -> Result<()> {
    let config = load_client_config(config_path)?;
    let store = LocalStateStore::with_state_path(config.state_path());

    match command {
        StateCommands::Show => {
            if let Some(state) = store.load().await? {
                emit(&formatter.format_state(&state))?;
            } else {
                eprintln!("No state found.");
            }
        }
        StateCommands::Clear { yes } => {
            if !yes && !confirm("Forget all recorded state? [y/N]: ", "y")? {
                eprintln!("Clear cancelled.");
                return Ok(());
            }
            store.delete().await?;
            eprintln!("State cleared ({}).", store.describe());
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

async fn plan_one<R: Resource>(
    reconciler: &Reconciler,
    desired: &R,
    lifecycle: Vec<LifecycleParam>,
    state: Option<&ReconcileState>,
) -> Result<ResourcePlan> {
    let hint = match state {
        Some(state) => state.hint::<R>(&desired.identity())?,
        None => None,
    };
    let options = apply_options(hint, lifecycle);
    reconciler.plan(desired, &options).await
}

async fn apply_one<R: Resource>(
    reconciler: &Reconciler,
    desired: &R,
    lifecycle: Vec<LifecycleParam>,
    refresh: bool,
    state: &mut ReconcileState,
) -> Result<ApplySummary> {
    let hint = if refresh {
        None
    } else {
        state.hint::<R>(&desired.identity())?
    };
    let options = apply_options(hint, lifecycle);
    let outcome = reconciler.apply(desired, &options).await?;
    state.record(&outcome.state)?;
    Ok(ApplySummary::from(&outcome))
}

fn apply_options<R>(hint: Option<R>, lifecycle: Vec<LifecycleParam>) -> ApplyOptions<R> {
    lifecycle
        .into_iter()
        .fold(ApplyOptions::default().with_state_hint(hint), ApplyOptions::with_lifecycle)
}

/// Orders resources so that referenced kinds are applied first.
fn ordered(mut declared: Vec<DeclaredResource>) -> Vec<DeclaredResource> {
    declared.sort_by_key(|entry| match entry.resource {
        ManagedResource::AutoscalingPolicy(_) => 0,
        ManagedResource::Cluster(_) => 1,
        ManagedResource::WorkflowTemplate(_) => 2,
    });
    declared
}

fn merge_lifecycle(declared: &[LifecycleParam], flags: LifecycleArgs) -> Vec<LifecycleParam> {
    let mut params = declared.to_vec();
    for param in flags.params() {
        if !params.contains(&param) {
            params.push(param);
        }
    }
    params
}

fn identity_of(target: &ResourceArgs) -> Identity {
    Identity::new(&target.project, &target.location, &target.name)
}

/// Resolves and loads the manifest, and loads `.env` next to it.
fn load_manifest(file: Option<&Path>) -> Result<(PathBuf, Manifest)> {
    let path = file.map_or_else(|| find_manifest_file("."), |p| Ok(p.to_path_buf()))?;
    debug!("Loading manifest from: {}", path.display());

    let parser = ConfigParser::new().with_base_path(path.parent().unwrap_or_else(|| Path::new(".")));
    parser.load_dotenv()?;
    let manifest = parser.load_manifest(&path)?;
    Ok((path, manifest))
}

fn load_client_config(path: Option<&Path>) -> Result<ClientConfig> {
    ConfigParser::new().load_client_config(path)
}

async fn create_reconciler(config: &ClientConfig) -> Result<Reconciler> {
    let client = DataprocClient::from_config(config).await?;
    Ok(Reconciler::new(client))
}

fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case(expected))
}

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", output.trim_end())?;
    Ok(())
}
