//! CLI tool to ingest the Pwned Passwords range API into SQLite
//!
//! Usage:
//!   download --config ./configs/leaked-passwords-checker.json
//!   download --size tiny     # 256 ranges (quick test)
//!   download --size sample   # 65,536 ranges (development)
//!   download --size full     # 1,048,576 ranges (production)

use clap::Parser;
use pwned_ingest::{
    Config, Error, HttpRangeSource, Pipeline, RangeFetcher, ResponseIngester, Store,
};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long, default_value = "./configs/leaked-passwords-checker.json")]
    config: PathBuf,

    /// Keyspace to download: tiny, sample or full (overrides the config file)
    #[arg(long)]
    size: Option<String>,

    /// Number of parallel range workers (overrides the config file)
    #[arg(long)]
    workers: Option<usize>,
}

/// Send all tracing output to the log file
fn init_tracing(log_path: &Path) -> Result<(), Error> {
    use tracing_subscriber::{fmt, EnvFilter};

    if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| Error::Config(format!("cannot install logger: {}", e)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(size) = args.size {
        config.size = size;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.validate()?;
    let size = config.download_size()?;

    init_tracing(&config.log_filepath)?;

    // To stdout for immediate feedback; everything else goes to the log file
    println!("Starting downloader...");
    info!(
        "Starting download: {} with {} workers from {}",
        size.description(),
        config.workers,
        config.api_base_url
    );

    let store = Arc::new(Store::open(&config.database_filepath, config.busy_timeout())?);
    let fetcher = RangeFetcher::new(
        HttpRangeSource::new(config.api_base_url.clone())?,
        config.fetch_retry(),
    );
    let ingester = ResponseIngester::new(config.insert_retry());
    let pipeline = Pipeline::new(fetcher, ingester, Arc::clone(&store), config.workers);

    let start = Instant::now();
    let summary = pipeline.run(size.range_space()).await;
    let elapsed = start.elapsed();
    info!("Download and processing complete.");

    println!();
    println!("Download complete!");
    println!("  Ranges: {}/{} committed", summary.ingested, summary.ranges);
    println!("  Failed: {}", summary.failed());
    println!("  New hashes: {}", summary.hashes_inserted);
    println!("  Stored hashes: {}", store.count()?);
    println!("  Time: {:.1}s", elapsed.as_secs_f64());
    println!("  Database: {}", store.path().display());
    if summary.failed() > 0 {
        println!("  See {} for the failed ranges", config.log_filepath.display());
    }

    Ok(())
}
