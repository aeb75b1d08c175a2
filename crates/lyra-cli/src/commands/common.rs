use std::env;
use std::path::{Path, PathBuf};

use chrono::Utc;
use lyra_core::db::Database;
use lyra_core::models::StatusSummary;
use lyra_core::{
    ContentType, LikedContent, LyraConfig, PassReport, SearchHistoryEntry, Store, SyncConflict,
    SyncedUserSetting, UserSetting, ViewedContent,
};
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub entity_kind: String,
    pub record_key: String,
    pub local_modified_at: i64,
    pub incoming_modified_at: i64,
    pub winner: String,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
    pub strategy: String,
}

#[derive(Debug, Serialize)]
pub struct SettingItem {
    pub key: String,
    pub value: String,
    /// `None` when the key was never set locally
    pub sync_status: Option<String>,
    pub modified_at: Option<i64>,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("LYRA_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lyra")
        .join("lyra.db")
}

pub fn open_store(path: &Path, config: &LyraConfig) -> Result<Store, CliError> {
    Ok(Store::new(Database::open(path)?, config.search_history_limit)?)
}

/// Explicit type, else inferred from the id prefix
pub fn resolve_content_type(explicit: Option<ContentType>, content_id: &str) -> ContentType {
    explicit.unwrap_or_else(|| ContentType::from_id(content_id.trim()))
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn format_like_line(record: &LikedContent) -> String {
    let state = if record.payload.is_liked {
        "liked"
    } else {
        "unliked"
    };
    format!(
        "{} ({})  {state}  [{}]",
        record.payload.content_id, record.payload.content_type, record.sync_status
    )
}

pub fn format_view_lines(entries: &[ViewedContent]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    entries
        .iter()
        .map(|entry| {
            let marker = if entry.synced { "synced" } else { "pending" };
            format!(
                "{:<12}  {:<7}  {:<8}  {marker}",
                entry.content_id,
                entry.content_type,
                format_relative_time(entry.created, now_ms)
            )
        })
        .collect()
}

pub fn format_search_lines(entries: &[SearchHistoryEntry]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    entries
        .iter()
        .map(|entry| {
            format!(
                "{:<8}  {}  -> {} ({})",
                format_relative_time(entry.created, now_ms),
                entry.query,
                entry.content_id,
                entry.content_type
            )
        })
        .collect()
}

pub fn setting_to_item(setting: UserSetting, record: Option<&SyncedUserSetting>) -> SettingItem {
    SettingItem {
        key: setting.key().as_str().to_string(),
        value: setting.value_to_string(),
        sync_status: record.map(|record| record.sync_status.as_str().to_string()),
        modified_at: record.map(|record| record.modified_at),
    }
}

pub fn format_setting_line(item: &SettingItem) -> String {
    let status = item.sync_status.as_deref().unwrap_or("default");
    format!("{:<24}  {:<5}  [{status}]", item.key, item.value)
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        entity_kind: conflict.entity_kind.as_str().to_string(),
        record_key: conflict.record_key.clone(),
        local_modified_at: conflict.local_modified_at,
        incoming_modified_at: conflict.incoming_modified_at,
        winner: conflict.winner.as_str().to_string(),
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_sync_timestamp(conflict.resolved_at),
        strategy: conflict.strategy.clone(),
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<4}  {}={}  local={} incoming={}  winner={}",
                format_sync_timestamp(conflict.resolved_at),
                conflict.strategy,
                conflict.entity_kind,
                conflict.record_key,
                conflict.local_modified_at,
                conflict.incoming_modified_at,
                conflict.winner.as_str()
            )
        })
        .collect()
}

pub fn format_pass_report(report: &PassReport) -> String {
    let mut line = format!(
        "{}: pushed {}, failed {}, conflicts {}, applied {}",
        report.kind, report.pushed, report.failed, report.conflicts, report.applied
    );
    if report.superseded > 0 {
        line.push_str(&format!(", {} changed during sync", report.superseded));
    }
    if report.requeued > 0 {
        line.push_str(&format!(", {} won locally", report.requeued));
    }
    if report.unresolved > 0 {
        line.push_str(&format!(", {} unresolved", report.unresolved));
    }
    if report.pull_failed {
        line.push_str(", pull failed");
    }
    line
}

pub fn format_status_line(kind: &str, summary: &StatusSummary, checkpoint: Option<i64>) -> String {
    let mut line = format!(
        "{kind:<15} synced {:>5}  pending {:>4}  deleting {:>3}  conflict {:>3}  failed {:>3}",
        summary.synced, summary.pending_sync, summary.pending_delete, summary.conflict, summary.failed
    );
    if let Some(checkpoint) = checkpoint {
        line.push_str(&format!("  checkpoint {checkpoint}"));
    }
    line
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}
