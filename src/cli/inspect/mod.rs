//! Inspect command - lists the records of a snapshot file

use std::path::PathBuf;

use clap::Args;

use crate::config::AppConfig;
use crate::domain::persistence::{PersistedEntry, SnapshotStore};
use crate::infrastructure::persistence::JsonFileSnapshotStore;

/// Arguments for the inspect command
#[derive(Args, Clone)]
pub struct InspectArgs {
    /// Snapshot file to read (defaults to the configured path)
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Show at most this many records
    #[arg(long)]
    pub limit: Option<usize>,

    /// Print the records as JSON
    #[arg(long)]
    pub json: bool,
}

/// Print the records of a snapshot file
pub async fn run(args: InspectArgs) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let path = match args.path {
        Some(path) => path,
        None => AppConfig::load().unwrap_or_default().persistence.snapshot_path,
    };

    let snapshot = JsonFileSnapshotStore::new(&path).load().await?;
    let shown: Vec<&PersistedEntry> = snapshot
        .records
        .iter()
        .take(args.limit.unwrap_or(usize::MAX))
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    println!(
        "{}: {} records, {} unreadable",
        path.display(),
        snapshot.records.len(),
        snapshot.malformed
    );

    for record in shown {
        println!("{}", format_record(record));
    }

    Ok(())
}

fn format_record(record: &PersistedEntry) -> String {
    let tags = if record.tags.is_empty() {
        "-".to_string()
    } else {
        record.tags.join(",")
    };

    format!(
        "{:<8} {} {:<16} {:<20} {}",
        record.priority,
        record.created.format("%Y-%m-%d %H:%M:%S"),
        record.value_type_tag,
        tags,
        record.key
    )
}
