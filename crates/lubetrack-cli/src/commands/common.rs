use std::env;
use std::path::{Path, PathBuf};

use chrono::Utc;
use lubetrack_core::config::AppConfig;
use lubetrack_core::db::SharedDatabase;
use lubetrack_core::models::{
    AlertId, FraudAlert, PhotoKind, Quantity, SyncQueueEntry, TaskExecution, TaskId, Unit,
};
use lubetrack_core::services::EvidencePhoto;
use lubetrack_core::ExecutionService;

use crate::error::CliError;
use crate::remote::CliRemote;

pub type Service = ExecutionService<CliRemote>;

/// Open the database and wire the core components
pub fn open_service(
    db_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<Service, CliError> {
    let config = load_config(config_path)?;
    open_service_with(db_path, &config)
}

pub fn open_service_with(db_path: Option<PathBuf>, config: &AppConfig) -> Result<Service, CliError> {
    let db_path = resolve_db_path(db_path, config)?;
    tracing::debug!("Opening database at {}", db_path.display());

    let db = SharedDatabase::open(&db_path)?;
    let remote = CliRemote::from_config(&config.remote)?;
    Ok(ExecutionService::open(&db, config, remote)?)
}

pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, CliError> {
    let path = match config_path {
        Some(path) => path,
        None => default_config_path()?,
    };
    Ok(AppConfig::load(&path)?
        .with_env_overrides(|key| env::var(key).ok())
        .validate()?)
}

pub fn default_config_path() -> Result<PathBuf, CliError> {
    dirs::config_dir()
        .map(|dir| dir.join("lubetrack").join("config.json"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI config directory".to_string()))
}

/// `--db-path` wins over the configured path, which wins over the data dir
pub fn resolve_db_path(
    cli_db_path: Option<PathBuf>,
    config: &AppConfig,
) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| config.db_path.as_ref().map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("lubetrack").join("lubetrack.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

pub fn parse_task_id(raw: &str) -> Result<TaskId, CliError> {
    raw.trim()
        .parse()
        .map_err(|_| CliError::InvalidTaskId(raw.to_string()))
}

pub fn parse_alert_id(raw: &str) -> Result<AlertId, CliError> {
    raw.trim()
        .parse()
        .map_err(|_| CliError::InvalidAlertId(raw.to_string()))
}

/// Parse `100g`, `40 ml` or `2.5ML`
pub fn parse_quantity(raw: &str) -> Result<Quantity, CliError> {
    let invalid = || CliError::InvalidQuantity(raw.to_string());
    let trimmed = raw.trim();
    let split = trimmed
        .find(|ch: char| ch.is_ascii_alphabetic())
        .ok_or_else(invalid)?;
    let (amount, unit) = trimmed.split_at(split);

    let amount = amount.trim().parse::<f64>().map_err(|_| invalid())?;
    let unit = unit.parse::<Unit>().map_err(|_| invalid())?;
    Ok(Quantity::new(amount, unit))
}

pub fn read_photo(kind: PhotoKind, path: &Path) -> Result<EvidencePhoto, CliError> {
    Ok(EvidencePhoto::new(kind, std::fs::read(path)?))
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
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

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}

pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn format_task_lines(tasks: &[TaskExecution]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    tasks
        .iter()
        .map(|task| {
            let quantity = task
                .quantity_used
                .map_or_else(|| "-".to_string(), |quantity| quantity.to_string());
            format!(
                "{:<13}  {:<14}  {:<10}  {:<8}  {:<12}  {}",
                short_id(&task.id.to_string()),
                task.status.as_str(),
                task.sync_state.as_str(),
                quantity,
                task.lubrication_point_id,
                format_relative_time(task.updated_at, now_ms)
            )
        })
        .collect()
}

pub fn format_task_details(task: &TaskExecution) -> Vec<String> {
    let mut lines = vec![
        format!("id:          {}", task.id),
        format!("work order:  {}", task.work_order_id),
        format!("point:       {}", task.lubrication_point_id),
        format!("status:      {}", task.status),
        format!("sync state:  {}", task.sync_state),
    ];
    if let Some(expected) = task.expected_quantity {
        lines.push(format!("expected:    {expected}"));
    }
    if let Some(quantity) = task.quantity_used {
        lines.push(format!("applied:     {quantity}"));
    }
    if let (Some(completed_at), Some(executed_by)) = (task.completed_at, &task.executed_by) {
        lines.push(format!(
            "closed:      {} by {executed_by}",
            format_timestamp(completed_at)
        ));
    }
    if let Some(issue) = &task.issue {
        lines.push(format!(
            "issue:       {} ({}) {}",
            issue.issue_type, issue.severity, issue.description
        ));
    }
    if let Some(observations) = &task.observations {
        lines.push(format!("notes:       {observations}"));
    }
    for photo in &task.photo_refs {
        lines.push(format!(
            "photo:       {} {}",
            photo.kind,
            photo
                .hash
                .as_ref()
                .map_or("(unhashed)", |hash| hash.as_str())
        ));
    }
    lines
}

pub fn format_queue_lines(entries: &[SyncQueueEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let mut line = format!(
                "#{:<5} {:<6}  task={}  {:<9}  retries={}  queued {}",
                entry.seq,
                entry.operation.as_str(),
                short_id(&entry.task_id.to_string()),
                entry.state.as_str(),
                entry.retry_count,
                format_timestamp(entry.enqueued_at)
            );
            if let Some(error) = &entry.last_error {
                line.push_str(&format!("  last error: {error}"));
            }
            line
        })
        .collect()
}

pub fn format_alert_lines(alerts: &[FraudAlert]) -> Vec<String> {
    alerts
        .iter()
        .map(|alert| {
            let state = if alert.resolved {
                format!(
                    "resolved by {}",
                    alert.resolved_by.as_deref().unwrap_or("unknown")
                )
            } else {
                "open".to_string()
            };
            format!(
                "{}  {:<6}  {:<17}  user={}  task={}  {}  [{state}]\n    {}",
                format_timestamp(alert.timestamp),
                alert.severity.as_str(),
                alert.alert_type.as_str(),
                alert.user_id,
                short_id(&alert.task_id.to_string()),
                alert.id,
                alert.description
            )
        })
        .collect()
}
