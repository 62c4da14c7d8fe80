//! Simulated workload against the in-memory spreadsheet service
//!
//! Issues concurrent tab reads and range writes through `SheetApi`, then
//! flushes one batch of protected ranges, and reports what happened.

use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::scheduler::{Scheduler, SchedulerConfig, SchedulerStats};
use crate::sheets::{AddProtectedRange, MemorySheetClient, SheetApi};

const SHEET_ID: &str = "simulation";
const ROWS_PER_TAB: usize = 20;

/// Workload shape for `sp simulate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Tab reads to issue
    #[serde(default = "default_reads")]
    pub reads: usize,

    /// Range writes to issue
    #[serde(default = "default_writes")]
    pub writes: usize,

    /// Number of tabs the workload is spread over
    #[serde(rename = "distinct-tabs", default = "default_distinct_tabs")]
    pub distinct_tabs: usize,

    /// Probability that a remote call fails transiently
    #[serde(rename = "failure-rate", default = "default_failure_rate")]
    pub failure_rate: f64,

    /// Latency of every remote call in milliseconds
    #[serde(rename = "latency-ms", default = "default_latency_ms")]
    pub latency_ms: u64,
}

fn default_reads() -> usize {
    40
}

fn default_writes() -> usize {
    10
}

fn default_distinct_tabs() -> usize {
    4
}

fn default_failure_rate() -> f64 {
    0.1
}

fn default_latency_ms() -> u64 {
    50
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            reads: default_reads(),
            writes: default_writes(),
            distinct_tabs: default_distinct_tabs(),
            failure_rate: default_failure_rate(),
            latency_ms: default_latency_ms(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.distinct_tabs == 0 {
            return Err(eyre::eyre!("simulation.distinct-tabs must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(eyre::eyre!(
                "simulation.failure-rate must be between 0 and 1, got {}",
                self.failure_rate
            ));
        }
        Ok(())
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

/// Outcome of a simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub reads_ok: usize,
    pub reads_failed: usize,
    pub writes_ok: usize,
    pub writes_failed: usize,
    /// Protected ranges sent in the closing batch
    pub protected_ranges: usize,
    pub elapsed_ms: u64,
    /// Calls that reached the service, failed ones included
    pub remote_calls: usize,
    pub stats: SchedulerStats,
}

fn tab_name(index: usize) -> String {
    format!("Tab{}", index + 1)
}

fn seed_grid(tab: usize) -> Vec<Vec<String>> {
    let header = vec!["id".to_string(), "value".to_string()];
    std::iter::once(header)
        .chain((1..=ROWS_PER_TAB).map(|row| vec![row.to_string(), format!("t{tab}r{row}")]))
        .collect()
}

/// Run the workload and collect a report
pub async fn run(scheduler_config: SchedulerConfig, simulation: &SimulationConfig) -> Result<SimulationReport> {
    debug!(?scheduler_config, ?simulation, "simulate::run: called");
    simulation.validate()?;

    let client = Arc::new(
        MemorySheetClient::new()
            .with_latency(simulation.latency())
            .with_failure_rate(simulation.failure_rate),
    );
    let tab_ids: Vec<i64> = (0..simulation.distinct_tabs)
        .map(|tab| client.add_tab(SHEET_ID, &tab_name(tab), seed_grid(tab)))
        .collect();

    let scheduler = Arc::new(Scheduler::new(scheduler_config));
    let api = SheetApi::new(scheduler, client.clone());
    let started = Instant::now();

    let reads = join_all((0..simulation.reads).map(|i| {
        let api = &api;
        async move {
            let tab = tab_name(i % simulation.distinct_tabs);
            api.tab_data(SHEET_ID, &tab, None, None).await
        }
    }));
    let writes = join_all((0..simulation.writes).map(|i| {
        let api = &api;
        async move {
            let tab = tab_name(i % simulation.distinct_tabs);
            let row = 2 + (i / simulation.distinct_tabs) % ROWS_PER_TAB;
            api.update_range(SHEET_ID, &tab, (row, 2), vec![vec![format!("w{i}")]])
                .await
        }
    }));
    let (reads, writes) = tokio::join!(reads, writes);

    for tab_id in &tab_ids {
        api.add_batch_protected_range(AddProtectedRange {
            sheet_id: SHEET_ID.to_string(),
            tab_id: *tab_id,
            editors: vec!["owner@example.com".to_string()],
            name: Some(format!("header-{tab_id}")),
            start_row: 0,
            start_col: 0,
            end_row: 0,
            end_col: 1,
        });
    }
    let protected_ranges = api.run_batch_protected_range(SHEET_ID).await?;

    let report = SimulationReport {
        reads_ok: reads.iter().filter(|r| r.is_ok()).count(),
        reads_failed: reads.iter().filter(|r| r.is_err()).count(),
        writes_ok: writes.iter().filter(|r| r.is_ok()).count(),
        writes_failed: writes.iter().filter(|r| r.is_err()).count(),
        protected_ranges,
        elapsed_ms: started.elapsed().as_millis() as u64,
        remote_calls: client.total_calls(),
        stats: api.scheduler().stats(),
    };
    info!(
        reads_ok = report.reads_ok,
        writes_ok = report.writes_ok,
        remote_calls = report.remote_calls,
        elapsed_ms = report.elapsed_ms,
        "Simulation finished"
    );
    Ok(report)
}
