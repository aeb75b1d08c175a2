use std::path::{Path, PathBuf};

use clap::Parser;
use lyra_core::db::Database;
use lyra_core::models::ConflictWinner;
use lyra_core::{
    ContentType, EntityKind, LyraConfig, PassReport, SettingKey, Store, SyncConfig, SyncConflict,
    SyncStatus, UserSetting,
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::cli::{parse_content_type, parse_entity_kind, parse_setting_key, Cli, Commands};
use crate::commands::common::{
    format_bytes, format_pass_report, format_relative_time, format_sync_conflict_lines,
    format_sync_timestamp, open_store, resolve_content_type, resolve_db_path,
};
use crate::commands::like::run_like;
use crate::commands::search::{run_search_add, run_search_clear};
use crate::commands::setting::{run_setting_reset, run_setting_set, setting_item};
use crate::commands::status::collect_status;
use crate::commands::storage::data_dir_of;
use crate::commands::sync::{build_synchronizer, run_sync_conflicts};
use crate::error::CliError;

fn memory_store() -> Store {
    Store::new(Database::open_in_memory().unwrap(), 5).unwrap()
}

#[test]
fn explicit_db_path_wins() {
    let path = PathBuf::from("/tmp/custom/lyra.db");
    assert_eq!(resolve_db_path(Some(path.clone())), path);
}

#[test]
fn storage_dir_of_bare_file_name_is_working_dir() {
    assert_eq!(data_dir_of(Path::new("lyra.db")), Path::new("."));
    assert_eq!(data_dir_of(Path::new("/")), Path::new("."));
    assert_eq!(
        data_dir_of(Path::new("/var/lib/lyra/lyra.db")),
        Path::new("/var/lib/lyra")
    );
}

#[test]
fn content_type_falls_back_to_id_prefix() {
    assert_eq!(resolve_content_type(None, "T123"), ContentType::Track);
    assert_eq!(resolve_content_type(None, " A9"), ContentType::Album);
    assert_eq!(
        resolve_content_type(Some(ContentType::Artist), "T123"),
        ContentType::Artist
    );
    assert_eq!(resolve_content_type(None, "x"), ContentType::Unknown);
}

#[test]
fn value_parsers_accept_wire_names() {
    assert_eq!(parse_content_type("Album").unwrap(), ContentType::Album);
    assert!(parse_content_type("podcast").is_err());
    assert_eq!(
        parse_setting_key("enable_direct_downloads").unwrap(),
        SettingKey::DirectDownloadsEnabled
    );
    assert!(parse_setting_key("downloads").is_err());
    assert_eq!(
        parse_entity_kind("viewed_content").unwrap(),
        EntityKind::ViewedContent
    );
}

#[test]
fn cli_parses_nested_commands() {
    let cli = Cli::try_parse_from(["lyra", "-v", "like", "T1", "--type", "track", "--json"]).unwrap();
    assert!(cli.verbose);
    assert!(matches!(
        cli.command,
        Commands::Like {
            content_type: Some(ContentType::Track),
            json: true,
            ..
        }
    ));

    let cli = Cli::try_parse_from(["lyra", "sync", "conflicts", "--limit", "3"]).unwrap();
    assert!(matches!(cli.command, Commands::Sync { command: Some(_), .. }));

    assert!(Cli::try_parse_from(["lyra", "setting", "get", "nope"]).is_err());
}

#[test]
fn like_and_unlike_update_one_row() {
    let store = memory_store();
    run_like(&store, "T1", None, true, false).unwrap();
    run_like(&store, "T1", None, false, true).unwrap();

    let rows = store.liked_content().unwrap();
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].payload.is_liked);
    assert_eq!(rows[0].payload.content_type, ContentType::Track);
    assert_eq!(rows[0].sync_status, SyncStatus::PendingSync);
}

#[test]
fn setting_commands_round_trip() {
    let store = memory_store();
    let key = SettingKey::ExternalSearchEnabled;

    let item = setting_item(&store, key).unwrap();
    assert_eq!(item.value, "false");
    assert_eq!(item.sync_status, None);

    run_setting_set(&store, key, " true ").unwrap();
    let item = setting_item(&store, key).unwrap();
    assert_eq!(item.value, "true");
    assert_eq!(item.sync_status.as_deref(), Some("pending_sync"));

    run_setting_reset(&store, key).unwrap();
    let item = setting_item(&store, key).unwrap();
    assert_eq!(item.value, "false");
    assert_eq!(item.sync_status.as_deref(), Some("pending_delete"));

    assert!(matches!(
        run_setting_set(&store, key, "maybe"),
        Err(CliError::Core(lyra_core::Error::InvalidInput(_)))
    ));
}

#[test]
fn search_commands_respect_limit() {
    let store = memory_store();
    for index in 0..7 {
        run_search_add(&store, &format!("query {index}"), &format!("A{index}"), None).unwrap();
    }
    assert_eq!(store.search_history(100).unwrap().len(), 5);
    assert!(run_search_add(&store, "   ", "A1", None).is_err());

    run_search_clear(&store).unwrap();
    assert!(store.search_history(100).unwrap().is_empty());
}

#[test]
fn status_counts_each_kind() {
    let store = memory_store();
    store.set_liked("T1", ContentType::Track, true).unwrap();
    store.record_view(ContentType::Album, "A1").unwrap();
    store
        .set_setting(UserSetting::DirectDownloadsEnabled(true))
        .unwrap();

    let statuses = collect_status(&store).unwrap();
    assert_eq!(statuses.len(), 3);
    assert!(statuses
        .iter()
        .all(|status| status.summary.pending_sync == 1));
    assert_eq!(statuses[0].checkpoint, Some(0));
    assert_eq!(statuses[2].kind, EntityKind::ViewedContent);
    assert_eq!(statuses[2].checkpoint, None);
}

#[test]
fn open_store_creates_database_file() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("nested").join("lyra.db");
    let store = open_store(&path, &LyraConfig::default()).unwrap();
    store.set_liked("R1", ContentType::Artist, true).unwrap();
    assert!(path.exists());
}

#[test]
fn sync_requires_configured_remote() {
    let result = build_synchronizer(memory_store(), &SyncConfig::default());
    assert!(matches!(result, Err(CliError::SyncNotConfigured)));

    let configured = SyncConfig::new("https://api.example.com/");
    assert!(build_synchronizer(memory_store(), &configured).is_ok());
}

#[test]
fn empty_conflict_log_prints_nothing_to_resolve() {
    let store = memory_store();
    run_sync_conflicts(&store, 10, false).unwrap();
    run_sync_conflicts(&store, 10, true).unwrap();
}

#[test]
fn conflict_lines_name_record_and_winner() {
    let conflict = SyncConflict {
        id: 1,
        entity_kind: EntityKind::LikedContent,
        record_key: "T1".to_string(),
        local_modified_at: 100,
        incoming_modified_at: 150,
        winner: ConflictWinner::Remote,
        resolved_at: 0,
        strategy: "lww".to_string(),
    };
    assert_eq!(
        format_sync_conflict_lines(&[conflict]),
        vec![
            "1970-01-01 00:00:00 UTC  lww   liked_content=T1  local=100 incoming=150  winner=remote"
                .to_string()
        ]
    );
}

#[test]
fn pass_report_line_mentions_problems_only() {
    let mut report = PassReport::new(EntityKind::Settings);
    report.pushed = 2;
    assert_eq!(
        format_pass_report(&report),
        "settings: pushed 2, failed 0, conflicts 0, applied 0"
    );

    report.unresolved = 1;
    report.pull_failed = true;
    assert_eq!(
        format_pass_report(&report),
        "settings: pushed 2, failed 0, conflicts 0, applied 0, 1 unresolved, pull failed"
    );
}

#[test]
fn relative_time_buckets() {
    let now = 10 * 24 * 60 * 60 * 1000;
    assert_eq!(format_relative_time(now - 1_000, now), "just now");
    assert_eq!(format_relative_time(now - 5 * 60_000, now), "5m ago");
    assert_eq!(format_relative_time(now - 3 * 3_600_000, now), "3h ago");
    assert_eq!(format_relative_time(0, now), "1w ago");
    assert_eq!(format_sync_timestamp(i64::MAX), i64::MAX.to_string());
}

#[test]
fn bytes_use_binary_units() {
    assert_eq!(format_bytes(512), "512 B");
    assert_eq!(format_bytes(1536), "1.5 KiB");
    assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.0 GiB");
}
