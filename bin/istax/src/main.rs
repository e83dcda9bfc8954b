//! istax is a CLI tool to deploy and wire the iStax contract suite on an EVM chain.

mod cli;
mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use tempdir::TempDir;

use cli::{Cli, Command, DeployArgs, InitArgs, PlanArgs, StatusArgs};
use istax_deploy::{
    ArtifactDir, CHECKPOINT_FILENAME, CONFIG_FILENAME, Checkpoint, CheckpointStore,
    CheckpointSummary, DeploymentConfig, DeploymentPlan,
    DeploymentReport, DryRunChain, Orchestrator, PlaceholderArtifacts, PoolKind,
    REPORT_FILENAME, RpcChainBuilder, plan_table,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match cli.command {
        Command::Init(args) => init(args),
        Command::Plan(args) => plan(args),
        Command::Deploy(args) => deploy(args).await,
        Command::Status(args) => status(args),
    }
}

fn init(args: InitArgs) -> Result<()> {
    let path = if args.path.is_dir() {
        args.path.join(CONFIG_FILENAME)
    } else {
        args.path
    };

    if path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }

    DeploymentConfig::default().save_to_file(&path)
}

fn plan(args: PlanArgs) -> Result<()> {
    let config = settings::load_config(args.config.as_deref())?;
    let plan = DeploymentPlan::from_config(&config)?;

    println!("{}", plan_table(&plan));
    println!(
        "{} steps, {} staking pools, {} insurance pools, plan hash {}",
        plan.steps().len(),
        config.count(PoolKind::Staking),
        config.count(PoolKind::Insurance),
        plan.compute_hash()?
    );

    Ok(())
}

async fn deploy(args: DeployArgs) -> Result<()> {
    let config = settings::load_config(args.config.as_deref())?;
    let plan = DeploymentPlan::from_config(&config)?;

    tracing::info!(
        pools = plan.pools.len(),
        steps = plan.steps().len(),
        dry_run = args.dry_run,
        "Deployment plan ready"
    );

    if args.dry_run {
        // Rehearsals never touch the real state directory.
        let state_dir = TempDir::new("istax-dry-run").context("Failed to create dry-run state directory")?;
        let store = CheckpointStore::open(state_dir.path())?;
        let chain = DryRunChain::new(args.from.unwrap_or(config.beneficiary));

        let report = if args.artifacts.is_dir() {
            let artifacts = ArtifactDir::new(&args.artifacts)?;
            Orchestrator::new(&chain, &artifacts).run(&plan, &store).await?
        } else {
            tracing::warn!(
                artifacts = %args.artifacts.display(),
                "Artifacts directory not found, dry run uses placeholder bytecode"
            );
            Orchestrator::new(&chain, &PlaceholderArtifacts)
                .run(&plan, &store)
                .await?
        };

        println!("{}", report);
        return Ok(());
    }

    let artifacts = ArtifactDir::new(&args.artifacts)?;
    let store = CheckpointStore::open(&args.state_dir)?;
    if args.fresh {
        store.archive()?;
    }

    let mut builder = RpcChainBuilder::new(&args.rpc_url).polling(args.polling());
    if let Some(from) = args.from {
        builder = builder.sender(from);
    }
    if let Some(gas_limit) = args.gas_limit {
        builder = builder.gas_limit(gas_limit);
    }
    let chain = builder.build().await?;

    let report = Orchestrator::new(&chain, &artifacts)
        .run(&plan, &store)
        .await
        .with_context(|| {
            format!(
                "Deployment aborted; rerun the same command to resume from the checkpoint in {}",
                store.dir().display()
            )
        })?;
    println!("{}", report);

    Ok(())
}

fn status(args: StatusArgs) -> Result<()> {
    let checkpoint_path = args.state_dir.join(CHECKPOINT_FILENAME);
    if !checkpoint_path.exists() {
        println!("No deployment recorded in {}", args.state_dir.display());
        return Ok(());
    }

    let checkpoint = Checkpoint::load_from_file(&checkpoint_path)?;
    println!("{}", CheckpointSummary(&checkpoint));

    let report_path = args.state_dir.join(REPORT_FILENAME);
    if checkpoint.is_complete() && report_path.exists() {
        println!();
        println!("{}", DeploymentReport::load_from_file(&report_path)?);
    }

    Ok(())
}
