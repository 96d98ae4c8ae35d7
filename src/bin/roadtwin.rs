//! Feed loop measurements (JSON lines) into the twin.
//!
//! ```text
//! roadtwin --config roadtwin.toml [--input measurements.jsonl]
//! ```
//!
//! Reads stdin when `--input` is absent. Log level via `RUST_LOG`.

use std::path::PathBuf;

use roadtwin::{ContextStore, IngestReport, Measurement, MemoryStore, StoreKind, TwinConfig, TwinSync};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

fn parse_arg(flag: &str) -> Option<String> {
    let mut args = std::env::args();
    while let Some(arg) = args.next() {
        if arg == flag {
            return args.next();
        }
    }
    None
}

fn has_flag(flag: &str) -> bool {
    std::env::args().any(|arg| arg == flag)
}

#[derive(Debug, Default)]
struct Summary {
    created: u64,
    updated: u64,
    skipped: u64,
    malformed: u64,
}

async fn run<S: ContextStore>(config: &TwinConfig, store: S, input: Option<String>) -> anyhow::Result<()> {
    let twin = TwinSync::from_config(config, store).await?;

    let reader: Box<dyn AsyncBufRead + Unpin> = match input {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let mut summary = Summary::default();
    let mut lines = reader.lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let m: Measurement = match serde_json::from_str(line) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "unparseable measurement");
                summary.malformed += 1;
                continue;
            }
        };
        match twin.ingest(&m).await {
            IngestReport::Synced(outcome) if outcome.is_created() => summary.created += 1,
            IngestReport::Synced(_) => summary.updated += 1,
            IngestReport::Skipped { .. } => summary.skipped += 1,
        }
    }
    twin.shutdown().await?;

    let stats = twin.resolver().stats();
    println!(
        "synced: {} ({} created, {} updated), skipped: {}, malformed: {}",
        summary.created + summary.updated,
        summary.created,
        summary.updated,
        summary.skipped,
        summary.malformed
    );
    println!(
        "shadows: {} created, {} cache hits, {} catalog lookups",
        stats.created, stats.cache_hits, stats.catalog_lookups
    );
    for (entity_type, value) in twin.synchronizer().counters().snapshot() {
        println!("counter {entity_type}: {value}");
    }
    Ok(())
}

#[cfg(feature = "http")]
async fn run_http(config: &TwinConfig, input: Option<String>) -> anyhow::Result<()> {
    let store = roadtwin::NgsiLdStore::new(&config.store)?;
    run(config, store, input).await
}

#[cfg(not(feature = "http"))]
async fn run_http(_config: &TwinConfig, _input: Option<String>) -> anyhow::Result<()> {
    anyhow::bail!("store.kind = \"http\" requires building with the `http` feature")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if has_flag("--help") || has_flag("-h") {
        println!("usage: roadtwin --config <FILE> [--input <FILE>]");
        return Ok(());
    }

    let config_path = parse_arg("--config").map(PathBuf::from);
    let input = parse_arg("--input");
    let config = TwinConfig::load(config_path.as_deref())?;
    tracing::info!(store = ?config.store.kind, catalog = %config.catalog_path.display(), "roadtwin starting");

    match config.store.kind {
        StoreKind::Memory => run(&config, MemoryStore::new(), input).await,
        StoreKind::Http => run_http(&config, input).await,
    }
}
