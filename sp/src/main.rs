//! SheetPacer - rate-paced spreadsheet access
//!
//! CLI entry point for running simulated workloads and inspecting config.

use std::fs;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info};

use sheetpacer::cli::{Cli, Command, OutputFormat, get_log_path};
use sheetpacer::config::Config;
use sheetpacer::scheduler::ClassStats;
use sheetpacer::simulate::{self, SimulationReport};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Logging isn't initialized yet, so nothing here can be traced
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if cli.verbose {
        config.scheduler.verbose = true;
    }

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Simulate {
            reads,
            writes,
            distinct_tabs,
            failure_rate,
            latency_ms,
            format,
        } => {
            debug!(?reads, ?writes, ?distinct_tabs, ?failure_rate, ?latency_ms, "main: matched Simulate command");
            let simulation = &mut config.simulation;
            if let Some(reads) = reads {
                simulation.reads = reads;
            }
            if let Some(writes) = writes {
                simulation.writes = writes;
            }
            if let Some(distinct_tabs) = distinct_tabs {
                simulation.distinct_tabs = distinct_tabs;
            }
            if let Some(failure_rate) = failure_rate {
                simulation.failure_rate = failure_rate;
            }
            if let Some(latency_ms) = latency_ms {
                simulation.latency_ms = latency_ms;
            }
            cmd_simulate(&config, format).await
        }
        Command::Config => {
            debug!("main: matched Config command");
            cmd_config(&config)
        }
    }
}

async fn cmd_simulate(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_simulate: called");
    config.validate().context("Invalid configuration")?;

    let report = simulate::run(config.scheduler.clone(), &config.simulation).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    print!("{}", serde_yaml::to_string(config).context("Failed to serialize config")?);
    Ok(())
}

fn outcome(ok: usize, failed: usize) -> String {
    if failed == 0 {
        format!("{} ok", ok).green().to_string()
    } else {
        format!("{} ok, {} failed", ok, failed).yellow().to_string()
    }
}

fn print_class(name: &str, stats: &ClassStats) {
    println!(
        "  {:<6} attempts {:>4}  succeeded {:>4}  retried {:>4}  failed {:>3}  exhausted {:>3}  timed out {:>3}",
        name.bold(),
        stats.attempts,
        stats.succeeded,
        stats.retried,
        stats.failed,
        stats.exhausted,
        stats.timed_out,
    );
    println!(
        "         waited {}ms in total, peak queued cost {}",
        stats.total_wait_ms.to_string().cyan(),
        stats.peak_queued_cost.to_string().cyan(),
    );
}

fn print_report(report: &SimulationReport) {
    println!("{}", "Simulation finished".bold());
    println!("  reads:     {}", outcome(report.reads_ok, report.reads_failed));
    println!("  writes:    {}", outcome(report.writes_ok, report.writes_failed));
    println!("  protected: {} ranges in one batch", report.protected_ranges);
    println!("  remote:    {} calls", report.remote_calls);
    println!("  elapsed:   {}", format!("{}ms", report.elapsed_ms).cyan());
    println!();
    println!("{}", "Scheduler".bold());
    print_class("read", &report.stats.read);
    print_class("write", &report.stats.write);
    println!(
        "  cache  hits {}  misses {}  entries {}",
        report.stats.cache_hits.to_string().green(),
        report.stats.cache_misses.to_string().yellow(),
        report.stats.cached_entries,
    );
}
