use std::path::PathBuf;

use clap::Parser;
use lubetrack_core::config::AppConfig;
use lubetrack_core::db::TaskFilter;
use lubetrack_core::models::{NewTask, Quantity, SyncState, TaskStatus, Unit};
use lubetrack_core::sync::{SyncResult, SyncStatus};

use crate::cli::{Cli, Commands, CompletionShell, TaskCommands};
use crate::commands::common::{
    format_relative_time, format_task_lines, format_timestamp, load_config, open_service,
    parse_alert_id, parse_quantity, parse_task_id, resolve_db_path, short_id,
};
use crate::commands::completions::run_completions;
use crate::commands::sync::{format_sync_result, format_sync_status};
use crate::commands::task::location;
use crate::error::CliError;

#[test]
fn parse_quantity_accepts_spacing_and_case() {
    assert_eq!(parse_quantity("100g").unwrap(), Quantity::new(100.0, Unit::G));
    assert_eq!(parse_quantity(" 40 ml ").unwrap(), Quantity::new(40.0, Unit::Ml));
    assert_eq!(parse_quantity("2.5ML").unwrap(), Quantity::new(2.5, Unit::Ml));
}

#[test]
fn parse_quantity_rejects_missing_unit_or_amount() {
    for raw in ["100", "g", "12 oz", "abc ml", ""] {
        assert!(
            matches!(parse_quantity(raw), Err(CliError::InvalidQuantity(_))),
            "{raw:?} should be rejected"
        );
    }
}

#[test]
fn parse_ids_reject_garbage() {
    assert!(matches!(
        parse_task_id("not-a-uuid"),
        Err(CliError::InvalidTaskId(_))
    ));
    assert!(matches!(
        parse_alert_id("42"),
        Err(CliError::InvalidAlertId(_))
    ));

    let id = lubetrack_core::TaskId::new();
    assert_eq!(parse_task_id(&format!(" {id} ")).unwrap(), id);
}

#[test]
fn format_relative_time_buckets() {
    let now = 10 * 24 * 60 * 60 * 1000;
    assert_eq!(format_relative_time(now - 5_000, now), "just now");
    assert_eq!(format_relative_time(now - 5 * 60_000, now), "5m ago");
    assert_eq!(format_relative_time(now - 3 * 60 * 60_000, now), "3h ago");
    assert_eq!(format_relative_time(now - 2 * 24 * 60 * 60_000, now), "2d ago");
    assert_eq!(format_relative_time(now + 60_000, now), "just now");
}

#[test]
fn format_timestamp_is_utc() {
    assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
    assert_eq!(format_timestamp(1_700_000_000_000), "2023-11-14 22:13:20 UTC");
}

#[test]
fn short_id_keeps_uuid_prefix() {
    assert_eq!(
        short_id("01890a5d-ac96-774b-bcce-b302099a8057"),
        "01890a5d-ac96"
    );
    assert_eq!(short_id("abc"), "abc");
}

#[test]
fn location_needs_both_coordinates() {
    assert!(location(Some(1.0), None).is_none());
    assert!(location(None, Some(1.0)).is_none());
    let point = location(Some(-33.4), Some(-70.6)).unwrap();
    assert!((point.latitude + 33.4).abs() < f64::EPSILON);
    assert!((point.longitude + 70.6).abs() < f64::EPSILON);
}

#[test]
fn resolve_db_path_prefers_flag_then_config() {
    let mut config = AppConfig::default();
    config.db_path = Some("/from/config.db".to_string());

    let from_flag = resolve_db_path(Some(PathBuf::from("/from/flag.db")), &config).unwrap();
    assert_eq!(from_flag, PathBuf::from("/from/flag.db"));

    let from_config = resolve_db_path(None, &config).unwrap();
    assert_eq!(from_config, PathBuf::from("/from/config.db"));
}

#[test]
fn load_config_reads_file_and_rejects_bad_values() {
    let dir = tempfile::tempdir().unwrap();

    let missing = load_config(Some(dir.path().join("missing.json"))).unwrap();
    assert_eq!(missing.sync, AppConfig::default().sync);

    let good = dir.path().join("good.json");
    std::fs::write(&good, r#"{"sync": {"max_retries": 7}}"#).unwrap();
    assert_eq!(load_config(Some(good)).unwrap().sync.max_retries, 7);

    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, r#"{"remote": {"push_timeout_secs": 0}}"#).unwrap();
    assert!(matches!(load_config(Some(bad)), Err(CliError::Core(_))));
}

#[test]
fn cli_parses_completion_with_quantity_and_photos() {
    let cli = Cli::try_parse_from([
        "lubetrack",
        "--db-path",
        "/tmp/l.db",
        "task",
        "complete",
        "abc",
        "-q",
        "100g",
        "-u",
        "tech-7",
        "--before",
        "a.png",
        "--latitude",
        "-33.4",
        "--longitude",
        "-70.6",
    ])
    .unwrap();

    assert_eq!(cli.db_path, Some(PathBuf::from("/tmp/l.db")));
    let Commands::Task(TaskCommands::Complete {
        quantity,
        user,
        before,
        after,
        latitude,
        confirm,
        ..
    }) = cli.command
    else {
        panic!("expected task complete");
    };
    assert_eq!(quantity, "100g");
    assert_eq!(user, "tech-7");
    assert_eq!(before, Some(PathBuf::from("a.png")));
    assert_eq!(after, None);
    assert_eq!(latitude, Some(-33.4));
    assert!(!confirm);
}

#[test]
fn cli_requires_both_coordinates() {
    let parsed = Cli::try_parse_from([
        "lubetrack", "task", "schedule", "--work-order", "WO-1", "--point", "P-1", "--latitude",
        "1.0",
    ]);
    assert!(parsed.is_err());
}

#[test]
fn scheduled_tasks_are_listed_from_local_database() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("ledger.db");
    let config_path = dir.path().join("config.json");

    let service = open_service(Some(db_path.clone()), Some(config_path.clone())).unwrap();
    let task = service
        .ledger()
        .schedule_task(
            NewTask::new("WO-1", "P-12").with_expected_quantity(Quantity::new(100.0, Unit::G)),
        )
        .unwrap();
    drop(service);

    let reopened = open_service(Some(db_path), Some(config_path)).unwrap();
    let tasks = reopened
        .ledger()
        .list_tasks(
            TaskFilter {
                status: Some(TaskStatus::Pending),
                sync_state: None,
            },
            10,
        )
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, task.id);
    assert_eq!(tasks[0].sync_state, SyncState::LocalOnly);

    let lines = format_task_lines(&tasks);
    assert!(lines[0].starts_with(&short_id(&task.id.to_string())));
    assert!(lines[0].contains("pending"));
    assert!(lines[0].contains("P-12"));
}

#[test]
fn sync_summaries_are_readable() {
    let result = SyncResult {
        pushed: 2,
        conflicts: 1,
        aborted_offline: true,
        ..SyncResult::default()
    };
    assert_eq!(
        format_sync_result(&result),
        "Pushed 2, conflicts 1, retrying 0, deferred 0, photos uploaded 0 (stopped: offline)"
    );

    let status = SyncStatus {
        is_online: true,
        is_syncing: false,
        last_sync: None,
        pending_count: 3,
    };
    assert_eq!(
        format_sync_status(&status),
        "online, 3 pending, last sync never"
    );
}

#[test]
fn completions_can_be_written_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lubetrack.bash");
    run_completions(CompletionShell::Bash, Some(&path)).unwrap();

    let script = std::fs::read_to_string(path).unwrap();
    assert!(script.contains("lubetrack"));
}
