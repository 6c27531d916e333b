// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod plan;
pub mod scm;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::load_and_validate;
use crate::config::ConfigFile;
use crate::engine::{Capabilities, RuntimeOptions, Scheduler, SchedulerOptions};
use crate::exec::ScriptRunner;
use crate::plan::{format_environment, AssetLocator};
use crate::scm::GitCli;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the git and script capabilities
/// - the scheduler and its management handle
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let options = SchedulerOptions {
        interval: cfg.scheduler.interval,
        initial_delay: cfg.scheduler.initial_delay,
        tolerance: cfg.scheduler.tolerance,
        workers: cfg.scheduler.workers,
        runtime: RuntimeOptions {
            exit_when_idle: args.once,
        },
    };

    let capabilities = Capabilities {
        source_control: Arc::new(GitCli::default()),
        runner: Arc::new(ScriptRunner::default()),
    };

    let locator = AssetLocator::new(cfg.assets_root.clone());
    let (scheduler, handle) = Scheduler::new(options, locator, cfg.plans, capabilities)?;
    let scheduler = tokio::spawn(scheduler.run());

    // Ctrl-C → graceful shutdown.
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received");
            if handle.shutdown().await.is_err() {
                debug!("scheduler already stopped");
            }
        });
    }

    scheduler.await.context("scheduler task panicked")??;
    Ok(())
}

/// Print the validated configuration without touching any repository.
fn print_dry_run(cfg: &ConfigFile) {
    println!("habitat dry-run");
    println!("  scheduler.interval = {:?}", cfg.scheduler.interval);
    println!("  scheduler.initial_delay = {:?}", cfg.scheduler.initial_delay);
    println!("  scheduler.tolerance = {:?}", cfg.scheduler.tolerance);
    println!("  scheduler.workers = {}", cfg.scheduler.workers);
    println!("  assets.root = {}", cfg.assets_root.display());
    println!();

    let locator = AssetLocator::new(cfg.assets_root.clone());
    println!("plans ({}):", cfg.plans.len());
    for plan in &cfg.plans {
        println!("  - {}", plan.name);
        println!("      repository: {}", plan.repository.url);
        println!("      branch: {}", plan.repository.branch);
        println!("      build: {}", plan.build);
        println!("      launch: {}", plan.launch);
        println!(
            "      working copy: {}",
            locator.working_copy(&plan.name).display()
        );
        if !plan.environment.is_empty() {
            println!("      environment:");
            for line in format_environment(&plan.environment).lines() {
                println!("        {line}");
            }
        }
    }

    debug!("dry-run complete (no execution)");
}
