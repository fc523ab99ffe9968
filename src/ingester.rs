//! Parsing a range response and committing it to the store
//!
//! A range is written in one transaction: either every valid row of the
//! response becomes visible at commit, or none of them do.

use crate::config::RetryPolicy;
use crate::store::Store;
use crate::Error;
use std::io::BufRead;
use tracing::{debug, warn};

/// Row counts for one committed range
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    /// Rows that were not already in the store
    pub inserted: usize,
    /// Lines that could not be parsed
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ResponseIngester {
    retry: RetryPolicy,
}

impl ResponseIngester {
    /// `retry` bounds how long a single statement may keep hitting a busy store
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Parse `body` and insert every `prefix + suffix` hash in one transaction.
    ///
    /// Blocking; run it off the async executor.
    pub fn ingest<R: BufRead>(
        &self,
        store: &Store,
        prefix: &str,
        body: R,
    ) -> Result<IngestStats, Error> {
        let conn = store.connection()?;
        let mut batch = self.on_contention(prefix, || conn.begin())?;
        let mut stats = IngestStats::default();

        for line in body.lines() {
            // A read error drops `batch`, which rolls the range back
            let line = line?;
            let Some(suffix) = parse_suffix(&line) else {
                warn!("Skipping invalid line in range {}: {:?}", prefix, line);
                stats.skipped += 1;
                continue;
            };

            let hash = format!("{}{}", prefix, suffix.to_ascii_uppercase());
            if self.on_contention(prefix, || batch.insert(&hash))? {
                stats.inserted += 1;
            }
        }

        self.on_contention(prefix, || batch.commit())?;
        debug!(
            "Committed range {}: {} new, {} skipped",
            prefix, stats.inserted, stats.skipped
        );
        Ok(stats)
    }

    /// Run `op`, retrying while the store reports busy/locked
    fn on_contention<T>(
        &self,
        prefix: &str,
        mut op: impl FnMut() -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut attempt = 1;
        loop {
            match op() {
                Err(e) if e.is_contention() && attempt < self.retry.attempts => {
                    if attempt % 10 == 0 {
                        debug!(
                            "Store busy for range {} ({}/{}): {}",
                            prefix, attempt, self.retry.attempts, e
                        );
                    }
                    attempt += 1;
                    std::thread::sleep(self.retry.delay);
                }
                result => return result,
            }
        }
    }
}

/// Suffix of a `SUFFIX:COUNT` line, or None if the line is malformed
fn parse_suffix(line: &str) -> Option<&str> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let mut fields = line.split(':');
    match (fields.next(), fields.next(), fields.next()) {
        (Some(suffix), Some(_count), None) if !suffix.is_empty() => Some(suffix),
        _ => None,
    }
}
