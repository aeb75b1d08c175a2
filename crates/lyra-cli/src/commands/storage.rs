use std::fs;
use std::path::Path;

use lyra_core::{StorageConfig, StorageInfo, StorageMonitor};
use serde::Serialize;

use crate::commands::common::{format_bytes, print_json};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StorageReport {
    #[serde(flatten)]
    pub info: StorageInfo,
    pub recommended_max_cache_bytes: u64,
    /// Answer for `--check`, when given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_allocate: Option<bool>,
}

pub fn storage_report(
    monitor: &StorageMonitor,
    check: Option<u64>,
) -> Result<StorageReport, CliError> {
    let info = monitor.refresh()?;
    Ok(StorageReport {
        info,
        recommended_max_cache_bytes: monitor.recommended_max_cache_bytes(),
        can_allocate: check.map(|size| monitor.can_allocate(size, true)),
    })
}

/// Directory holding the database; a bare file name lives in the working directory
pub fn data_dir_of(db_path: &Path) -> &Path {
    match db_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

pub fn run_storage(
    db_path: &Path,
    config: &StorageConfig,
    check: Option<u64>,
    as_json: bool,
) -> Result<(), CliError> {
    let data_dir = data_dir_of(db_path);
    fs::create_dir_all(data_dir)?;

    let monitor = StorageMonitor::for_path(data_dir, *config);
    let report = storage_report(&monitor, check)?;

    if as_json {
        return print_json(&report);
    }

    let info = report.info;
    println!("Volume of {}", data_dir.display());
    println!(
        "  total {}  available {}  used {}",
        format_bytes(info.total_bytes),
        format_bytes(info.available_bytes),
        format_bytes(info.used_bytes)
    );
    println!("  pressure {}", info.pressure_level);
    println!(
        "  recommended cache {}",
        format_bytes(report.recommended_max_cache_bytes)
    );
    if let (Some(size), Some(fits)) = (check, report.can_allocate) {
        let verdict = if fits { "fits" } else { "does not fit" };
        println!("  {} {verdict}", format_bytes(size));
    }
    Ok(())
}
