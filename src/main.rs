//! notesctl CLI - deploy a note-sync stack behind a reverse proxy
//!
//! Usage: notesctl <COMMAND>
//!
//! Commands:
//!   apply   Resolve topology, render and apply proxy configuration
//!   detect  Probe topology and proxy hosting without mutating anything

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use notesctl::pipeline::{Orchestrator, PipelineOptions};
use notesctl::runner::HostRunner;
use notesctl::Config;

/// notesctl - deployment topology and reverse-proxy reconciliation
#[derive(Parser, Debug)]
#[command(name = "notesctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Output machine-readable JSON events
    #[arg(long, default_value = "false")]
    json: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve topology, render and apply proxy configuration
    Apply {
        /// Path to the operator config file
        #[arg(short, long, default_value = "notesctl.toml")]
        config: PathBuf,

        /// Directory for persisted deployment state
        #[arg(long, default_value = "/opt/notes")]
        state_dir: PathBuf,

        /// Ignore persisted state and re-resolve from live inventory
        #[arg(long)]
        reset: bool,

        /// Resolve and render, but mutate nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Probe topology and proxy hosting without mutating anything
    Detect {
        /// Path to the operator config file
        #[arg(short, long, default_value = "notesctl.toml")]
        config: PathBuf,

        /// Directory for persisted deployment state
        #[arg(long, default_value = "/opt/notes")]
        state_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            config,
            state_dir,
            reset,
            dry_run,
        } => cmd_apply(&config, state_dir, reset, dry_run, cli.json),
        Commands::Detect { config, state_dir } => cmd_detect(&config, state_dir, cli.json),
    }
}

fn cmd_apply(
    config_path: &PathBuf,
    state_dir: PathBuf,
    reset: bool,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let config = Config::load(config_path)?;
    let runner = HostRunner::new();
    let options = PipelineOptions {
        dry_run,
        reset,
        state_dir,
        host_root: PathBuf::from("/"),
    };

    if !json {
        println!("notesctl apply");
        println!("Domain: {}", config.domain);
        if dry_run {
            println!("Mode: dry run");
        }
        if reset {
            println!("Mode: reset (persisted state ignored)");
        }
    }

    let orchestrator = Orchestrator::new(&runner, &config, options);
    let outcome = match orchestrator.apply() {
        Ok(outcome) => outcome,
        Err(failure) => {
            if json {
                let event = serde_json::json!({
                    "event": "apply",
                    "status": "failed",
                    "stage": failure.stage,
                    "error": failure.source.to_string(),
                });
                println!("{}", serde_json::to_string(&event)?);
            } else {
                eprintln!("✗ stage '{}' failed", failure.stage);
                eprintln!("  {}", failure.source);
            }
            std::process::exit(1);
        }
    };

    if json {
        let event = serde_json::json!({
            "event": "apply",
            "status": if dry_run { "dry-run" } else { "applied" },
            "network": outcome.plan.network.name,
            "network_mode": outcome.plan.network.mode,
            "proxy": outcome.plan.proxy.hosting.label(),
            "config_destination": outcome.plan.proxy.config_destination,
            "rendered_sha256": outcome.plan.rendered_sha256,
            "checked": outcome.connectivity.as_ref().map(|r| r.checked.len()),
            "skipped": outcome.connectivity.as_ref().map(|r| r.skipped.len()),
        });
        println!("{}", serde_json::to_string(&event)?);
    } else {
        println!();
        println!(
            "✓ Network: {} ({:?})",
            outcome.plan.network.name, outcome.plan.network.mode
        );
        if let Some(subnet) = &outcome.plan.network.subnet {
            println!("  Subnet: {}", subnet);
        }
        println!("✓ Proxy: {}", outcome.plan.proxy.hosting.label());
        println!(
            "✓ Config: {}",
            outcome.plan.proxy.config_destination.display()
        );
        if dry_run {
            println!();
            println!("Dry run - nothing was applied. Rendered config:");
            println!();
            println!("{}", outcome.plan.rendered_config);
        } else if let Some(report) = &outcome.connectivity {
            for name in &report.checked {
                println!("✓ Reachable: {}", name);
            }
            for name in &report.skipped {
                println!("⚠ Skipped (not running yet): {}", name);
            }
            println!();
            println!("Deployment applied.");
        }
    }

    Ok(())
}

fn cmd_detect(config_path: &PathBuf, state_dir: PathBuf, json: bool) -> Result<()> {
    let config = Config::load(config_path)?;
    let runner = HostRunner::new();
    let options = PipelineOptions {
        dry_run: true,
        reset: false,
        state_dir,
        host_root: PathBuf::from("/"),
    };

    let orchestrator = Orchestrator::new(&runner, &config, options);
    let detection = match orchestrator.detect() {
        Ok(detection) => detection,
        Err(failure) => {
            if json {
                let event = serde_json::json!({
                    "event": "detect",
                    "status": "failed",
                    "stage": failure.stage,
                    "error": failure.source.to_string(),
                });
                println!("{}", serde_json::to_string(&event)?);
            } else {
                eprintln!("✗ stage '{}' failed", failure.stage);
                eprintln!("  {}", failure.source);
            }
            std::process::exit(1);
        }
    };

    if json {
        let event = serde_json::json!({
            "event": "detect",
            "network": detection.network.name,
            "network_mode": detection.network.mode,
            "external": detection.network.external,
            "subnet_preview": detection.subnet_preview.as_ref().map(|l| &l.subnet),
            "proxy": detection.proxy.hosting.label(),
            "config_destination": detection.proxy.config_destination,
        });
        println!("{}", serde_json::to_string(&event)?);
    } else {
        println!("notesctl detect");
        println!();
        println!(
            "Network: {} ({:?}{})",
            detection.network.name,
            detection.network.mode,
            if detection.network.external {
                ", existing"
            } else {
                ", would be created"
            }
        );
        if let Some(lease) = &detection.subnet_preview {
            println!("Subnet: {} (gateway {})", lease.subnet, lease.gateway);
        }
        println!("Proxy: {}", detection.proxy.hosting.label());
        println!(
            "Config destination: {}",
            detection.proxy.config_destination.display()
        );
    }

    Ok(())
}
