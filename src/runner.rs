//! Collect-then-export cycles, once or on an interval.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::collector::{CollectItems, Collector, Scope};
use crate::export::{ExportData, ExportItems, ExportStats, Exporter};

/// Everything one cycle needs besides the collector itself.
#[derive(Debug, Clone)]
pub struct CyclePlan {
    pub scope: Scope,
    pub collect: CollectItems,
    pub export: ExportItems,
}

/// Run one collection cycle and export the resulting snapshot.
///
/// A cycle that yields no rows leaves the previous export in place.
///
/// # Errors
///
/// Returns an error if the category tree cannot be enumerated or the export
/// cannot be written.
pub async fn run_once(
    collector: &Collector,
    exporter: &Exporter,
    plan: &CyclePlan,
) -> Result<ExportStats> {
    let outcome = collector
        .collect(&plan.scope, plan.collect)
        .await
        .context("Collection cycle failed")?;

    let data = ExportData::from_snapshot(&outcome.snapshot, plan.export);
    if data.is_empty() {
        warn!("Nothing collected, skipping export");
        return Ok(ExportStats::default());
    }
    let stats = exporter.export(&data).await.context("Export failed")?;

    info!(
        posts = data.posts.len(),
        edits = data.edits.len(),
        users = data.users.len(),
        rows_failed = stats.rows_failed,
        "Cycle exported"
    );
    Ok(stats)
}

/// Run cycles forever, sleeping `interval` between them.
///
/// The cache persists across cycles, so later cycles only fetch what
/// changed. A failed cycle is logged and retried at the next interval.
pub async fn run_loop(
    collector: Collector,
    exporter: Exporter,
    plan: CyclePlan,
    interval: Duration,
) {
    let mut cycle: u64 = 0;
    loop {
        cycle += 1;
        info!(cycle, "Starting collection cycle");

        if let Err(e) = run_once(&collector, &exporter, &plan).await {
            error!(cycle, "Cycle failed: {e:#}");
        }

        tokio::time::sleep(interval).await;
    }
}
