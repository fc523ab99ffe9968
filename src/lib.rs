//! Pwned Passwords ingestion
//!
//! Walks every 5-character SHA-1 prefix of the HaveIBeenPwned range API and
//! stores each returned hash in a local SQLite table, one transaction per
//! range.
//!
//! # Example
//!
//! ```no_run
//! use pwned_ingest::{
//!     DownloadSize, HttpRangeSource, Pipeline, RangeFetcher, ResponseIngester, RetryPolicy, Store,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pwned_ingest::Error> {
//!     let store = Arc::new(Store::open("./data/passwords.db", Duration::from_secs(5))?);
//!     let fetcher = RangeFetcher::new(
//!         HttpRangeSource::new(pwned_ingest::DEFAULT_API_BASE_URL)?,
//!         RetryPolicy::new(10, Duration::from_millis(500)),
//!     );
//!     let ingester = ResponseIngester::new(RetryPolicy::new(100, Duration::from_millis(100)));
//!
//!     let summary = Pipeline::new(fetcher, ingester, Arc::clone(&store), 3)
//!         .run(DownloadSize::Tiny.range_space())
//!         .await;
//!     println!("{} ranges committed", summary.ingested);
//!
//!     let hash = pwned_ingest::hash_password("password");
//!     println!("leaked: {}", store.contains(&hash)?);
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod fetcher;
mod ingester;
mod pipeline;
mod range_space;
mod store;

pub use config::{Config, RetryPolicy};
pub use error::Error;
pub use fetcher::{HttpRangeSource, RangeBody, RangeFetcher, RangeSource, DEFAULT_API_BASE_URL};
pub use ingester::{IngestStats, ResponseIngester};
pub use pipeline::{LogProgress, Pipeline, RangeOutcome, RangeProgress, RunSummary};
pub use range_space::{DownloadSize, RangeSpace, FULL_RANGE_COUNT, PREFIX_LEN};
pub use store::{Batch, PooledConnection, Store};

/// SHA-1 hash a password and return uppercase hex string
pub fn hash_password(password: &str) -> String {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(password.as_bytes());
    let result = hasher.finalize();
    hex::encode_upper(result)
}

/// Split a SHA-1 hash into prefix (5 chars) and suffix (35 chars)
pub fn split_hash(hash: &str) -> (&str, &str) {
    hash.split_at(PREFIX_LEN)
}
