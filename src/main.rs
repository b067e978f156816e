// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Vigil operator CLI - inspect configuration and reason about SLO burn rates.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use vigil::config::{self, LoggingConfig, VigilConfig};
use vigil::slo::{budget_remaining, burn_rate, evaluate_windows, Severity, SloDefinition, SloStatus};
use vigil::telemetry::init_telemetry;

/// Vigil version string.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Vigil - observability and resilience runtime.
#[derive(Parser)]
#[command(name = "vigil")]
#[command(author, version, about = "Observability and resilience runtime", long_about = None)]
struct Cli {
    /// Show debug output
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for printed configuration.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved configuration (defaults, global, then workspace)
    Config {
        /// Workspace directory to resolve from
        #[arg(short, long)]
        dir: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,
    },

    /// Check that the resolved configuration is usable
    Validate {
        /// Workspace directory to resolve from
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Write a default vigil.json into the workspace
    Init {
        /// Workspace directory
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Compute burn rate for a request count and show which windows would fire
    BurnRate {
        /// SLO target, e.g. 0.995
        #[arg(short, long, env = "VIGIL_SLO_TARGET")]
        target: f64,

        /// Total requests observed
        #[arg(long)]
        total: u64,

        /// Failed requests observed
        #[arg(long)]
        errors: u64,

        /// Workspace directory whose configured windows are used
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logging = if cli.debug {
        LoggingConfig::development()
    } else {
        LoggingConfig::default().with_level("warn")
    };
    let _guard = init_telemetry(&logging)?;

    match cli.command {
        Commands::Config { dir, format } => {
            let config = config::load_config(&workspace(dir)?)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
                OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&config)?),
            }
        }
        Commands::Validate { dir } => validate(workspace(dir)?)?,
        Commands::Init { dir, force } => {
            let path = workspace(dir)?.join(config::CONFIG_FILES[0]);
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            config::save_config(&path, &VigilConfig::default())?;
            println!("{} Created {}", "✓".green(), path.display());
        }
        Commands::BurnRate {
            target,
            total,
            errors,
            dir,
        } => {
            let config = config::load_config(&workspace(dir)?)?;
            print_burn_rate(&config, target, total, errors)?;
        }
        Commands::Version => println!("vigil {}", VERSION),
    }
    Ok(())
}

fn workspace(dir: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => Ok(std::env::current_dir()?),
    }
}

fn validate(root: PathBuf) -> anyhow::Result<()> {
    let source = config::find_workspace_config(&root);
    let config = config::load_config(&root)?;
    config.validate()?;

    match source {
        Some(path) => println!("{} {} is valid", "✓".green(), path.display()),
        None => println!("{} No workspace config found; defaults are valid", "✓".green()),
    }
    println!(
        "  {} objective(s), {} burn-rate window(s), sink: {}",
        config.slo.objectives.len(),
        config.slo.windows.len(),
        serde_json::to_value(&config.sink)?["kind"]
    );
    Ok(())
}

fn print_burn_rate(config: &VigilConfig, target: f64, total: u64, errors: u64) -> anyhow::Result<()> {
    if errors > total {
        anyhow::bail!("--errors ({}) cannot exceed --total ({})", errors, total);
    }
    if !(target > 0.0 && target < 1.0) {
        anyhow::bail!("--target must be between 0 and 1 exclusive, got {}", target);
    }
    let definition = SloDefinition::new("cli", target, "30d");

    let error_rate = if total == 0 { 0.0 } else { errors as f64 / total as f64 };
    let rate = burn_rate(error_rate, definition.error_budget());
    let remaining = budget_remaining(rate);
    let status = SloStatus::from_budget_remaining(remaining);

    println!("{}", "Burn rate".bright_blue().bold());
    println!("  error budget:     {:.4}", definition.error_budget());
    println!("  error rate:       {:.4}", error_rate);
    println!("  burn rate:        {:.2}", rate);
    println!("  budget remaining: {:.1}%", remaining);
    let status_text = match status {
        SloStatus::Healthy => status.as_str().green(),
        SloStatus::AtRisk => status.as_str().yellow(),
        SloStatus::Exhausted => status.as_str().red(),
    };
    println!("  status:           {}", status_text);

    println!("\n{}", "Windows".bright_blue().bold());
    let fired = evaluate_windows(rate, &config.slo.windows);
    for window in &config.slo.windows {
        let hit = fired.iter().any(|w| w.label == window.label);
        let marker = if hit { "✗".red() } else { "✓".green() };
        let severity = match window.severity {
            Severity::Critical => window.severity.as_str().red(),
            Severity::Warning => window.severity.as_str().yellow(),
            Severity::Info => window.severity.as_str().cyan(),
        };
        println!(
            "  {} {:>4}  threshold {:>5.1}  {}",
            marker, window.label, window.threshold, severity
        );
    }
    Ok(())
}
