//! Worker pool that drives every range through fetch and ingest
//!
//! All range identifiers are queued up front; `workers` tasks then drain the
//! queue. A range that fails is logged and counted, and the pool carries on
//! with the rest. [`Pipeline::run`] returns once every worker has exited.

use crate::fetcher::{RangeFetcher, RangeSource};
use crate::ingester::{IngestStats, ResponseIngester};
use crate::range_space::RangeSpace;
use crate::store::Store;
use crate::Error;
use std::io::BufReader;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_util::io::SyncIoBridge;
use tracing::{error, info, warn};

/// Terminal state of one range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    /// Committed
    Ingested(IngestStats),
    /// Fetch retries exhausted; nothing written
    FetchFailed,
    /// Transaction rolled back; nothing written
    IngestFailed,
}

/// Progress callback for pipeline runs
pub trait RangeProgress: Send + Sync + 'static {
    fn on_range_complete(&self, prefix: &str, outcome: &RangeOutcome, current: u32, total: u32);
}

/// Default progress reporter that logs to tracing
pub struct LogProgress;

impl RangeProgress for LogProgress {
    fn on_range_complete(&self, _prefix: &str, _outcome: &RangeOutcome, current: u32, total: u32) {
        if current % 1000 == 0 || current == total {
            info!(
                "Processed {}/{} ranges ({:.1}%)",
                current,
                total,
                (current as f64 / total as f64) * 100.0
            );
        }
    }
}

/// Totals for a pipeline run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub ranges: u32,
    pub ingested: u32,
    pub fetch_failed: u32,
    pub ingest_failed: u32,
    pub hashes_inserted: u64,
    pub lines_skipped: u64,
    /// Prefixes that were abandoned, sorted
    pub failed_prefixes: Vec<String>,
}

impl RunSummary {
    fn record(&mut self, prefix: String, outcome: RangeOutcome) {
        self.ranges += 1;
        match outcome {
            RangeOutcome::Ingested(stats) => {
                self.ingested += 1;
                self.hashes_inserted += stats.inserted as u64;
                self.lines_skipped += stats.skipped as u64;
            }
            RangeOutcome::FetchFailed => {
                self.fetch_failed += 1;
                self.failed_prefixes.push(prefix);
            }
            RangeOutcome::IngestFailed => {
                self.ingest_failed += 1;
                self.failed_prefixes.push(prefix);
            }
        }
    }

    fn merge(&mut self, other: RunSummary) {
        self.ranges += other.ranges;
        self.ingested += other.ingested;
        self.fetch_failed += other.fetch_failed;
        self.ingest_failed += other.ingest_failed;
        self.hashes_inserted += other.hashes_inserted;
        self.lines_skipped += other.lines_skipped;
        self.failed_prefixes.extend(other.failed_prefixes);
    }

    pub fn failed(&self) -> u32 {
        self.fetch_failed + self.ingest_failed
    }
}

/// Fetch-and-ingest worker pool over a shared store
pub struct Pipeline<S> {
    fetcher: Arc<RangeFetcher<S>>,
    ingester: ResponseIngester,
    store: Arc<Store>,
    workers: usize,
}

impl<S: RangeSource> Pipeline<S> {
    pub fn new(
        fetcher: RangeFetcher<S>,
        ingester: ResponseIngester,
        store: Arc<Store>,
        workers: usize,
    ) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            ingester,
            store,
            workers: workers.max(1),
        }
    }

    pub fn fetcher(&self) -> &RangeFetcher<S> {
        &self.fetcher
    }

    /// Process every range in `space`, logging progress
    pub async fn run(&self, space: RangeSpace) -> RunSummary {
        self.run_with_progress(space, Arc::new(LogProgress)).await
    }

    /// Process every range in `space` with custom progress reporting
    pub async fn run_with_progress<P: RangeProgress>(
        &self,
        space: RangeSpace,
        progress: Arc<P>,
    ) -> RunSummary {
        let total = space.len();
        info!(
            "Starting pipeline: {} ranges, {} workers",
            total, self.workers
        );

        // Every identifier is queued before any worker starts
        let (tx, rx) = flume::unbounded();
        for id in space {
            // Unbounded, and `rx` is still held, so this cannot fail
            let _ = tx.send(id);
        }
        drop(tx);

        let completed = Arc::new(AtomicU32::new(0));
        let handles: Vec<_> = (0..self.workers)
            .map(|_| {
                let rx = rx.clone();
                let fetcher = Arc::clone(&self.fetcher);
                let store = Arc::clone(&self.store);
                let ingester = self.ingester;
                let progress = Arc::clone(&progress);
                let completed = Arc::clone(&completed);
                tokio::spawn(async move {
                    let mut summary = RunSummary::default();
                    while let Ok(id) = rx.recv_async().await {
                        let prefix = RangeSpace::prefix(id);
                        let outcome = process_range(&fetcher, ingester, &store, &prefix).await;
                        let current = completed.fetch_add(1, Ordering::SeqCst) + 1;
                        progress.on_range_complete(&prefix, &outcome, current, total);
                        summary.record(prefix, outcome);
                    }
                    summary
                })
            })
            .collect();
        drop(rx);

        let mut summary = RunSummary::default();
        for handle in handles {
            match handle.await {
                Ok(worker_summary) => summary.merge(worker_summary),
                Err(e) => error!("Pipeline worker panicked: {}", e),
            }
        }
        summary.failed_prefixes.sort();

        if summary.failed() > 0 {
            warn!(
                "Pipeline completed with {} failed ranges ({} fetch, {} ingest)",
                summary.failed(),
                summary.fetch_failed,
                summary.ingest_failed
            );
        }
        info!(
            "Pipeline complete: {}/{} ranges committed, {} new hashes, {} lines skipped",
            summary.ingested, total, summary.hashes_inserted, summary.lines_skipped
        );
        summary
    }
}

/// Fetch one range and commit it. Failures are logged here and never escape.
async fn process_range<S: RangeSource>(
    fetcher: &RangeFetcher<S>,
    ingester: ResponseIngester,
    store: &Arc<Store>,
    prefix: &str,
) -> RangeOutcome {
    let body = match fetcher.fetch(prefix).await {
        Ok(body) => body,
        Err(e) => {
            error!("Error processing range {}: {}", prefix, e);
            return RangeOutcome::FetchFailed;
        }
    };

    // The body is still streaming; SyncIoBridge lets the blocking ingest pull it
    let reader = BufReader::new(SyncIoBridge::new(body));
    let store = Arc::clone(store);
    let owned_prefix = prefix.to_string();
    let result = tokio::task::spawn_blocking(move || {
        ingester.ingest(&store, &owned_prefix, reader)
    })
    .await
    .map_err(Error::from)
    .and_then(|r| r);

    match result {
        Ok(stats) => RangeOutcome::Ingested(stats),
        Err(e) => {
            error!("Error ingesting range {}: {}", prefix, e);
            RangeOutcome::IngestFailed
        }
    }
}
