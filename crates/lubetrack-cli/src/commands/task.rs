use std::path::{Path, PathBuf};

use lubetrack_core::db::TaskFilter;
use lubetrack_core::models::{GeoPoint, NewTask, PhotoKind, Severity, TaskExecution};
use lubetrack_core::services::{CompletionRequest, EvidencePhoto, IssueRequest};

use crate::cli::TaskCommands;
use crate::commands::common::{
    format_task_details, format_task_lines, open_service, parse_quantity, parse_task_id,
    read_photo, Service,
};
use crate::error::CliError;

pub fn run_task(
    command: TaskCommands,
    db_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let service = open_service(db_path, config_path)?;
    match command {
        TaskCommands::Schedule {
            work_order,
            point,
            expected,
            latitude,
            longitude,
            json,
        } => {
            let mut new_task = NewTask::new(work_order, point);
            if let Some(expected) = expected {
                new_task = new_task.with_expected_quantity(parse_quantity(&expected)?);
            }
            if let Some(location) = location(latitude, longitude) {
                new_task = new_task.with_location(location);
            }
            let task = service.ledger().schedule_task(new_task)?;
            print_task(&task, json)
        }
        TaskCommands::Complete {
            id,
            quantity,
            user,
            observations,
            before,
            after,
            confirm,
            latitude,
            longitude,
            json,
        } => {
            let request = CompletionRequest {
                task_id: parse_task_id(&id)?,
                user_id: user,
                quantity: parse_quantity(&quantity)?,
                observations,
                photos: collect_photos(&[
                    (PhotoKind::Before, before.as_deref()),
                    (PhotoKind::After, after.as_deref()),
                ])?,
                confirm_deviation: confirm,
                location: location(latitude, longitude),
            };
            let task = service.record_completion(request)?;
            print_task(&task, json)
        }
        TaskCommands::Issue {
            id,
            issue_type,
            severity,
            description,
            user,
            photo,
            json,
        } => {
            let request = IssueRequest {
                task_id: parse_task_id(&id)?,
                user_id: user,
                issue_type,
                severity: Severity::from(severity),
                description,
                photos: collect_photos(&[(PhotoKind::Before, photo.as_deref())])?,
            };
            let task = service.record_issue(request)?;
            print_task(&task, json)
        }
        TaskCommands::Skip { id, reason } => {
            let task = service.skip_task(&parse_task_id(&id)?, reason)?;
            println!("Skipped task {}", task.id);
            Ok(())
        }
        TaskCommands::Amend { id, observations } => {
            let task = service.amend_observations(&parse_task_id(&id)?, observations)?;
            println!("Updated observations of task {} ({})", task.id, task.sync_state);
            Ok(())
        }
        TaskCommands::Show { id, json } => {
            let task = service.ledger().get_task(&parse_task_id(&id)?)?;
            print_task(&task, json)
        }
        TaskCommands::List {
            limit,
            status,
            sync_state,
            json,
        } => run_list(
            &service,
            TaskFilter {
                status: status.map(Into::into),
                sync_state: sync_state.map(Into::into),
            },
            limit,
            json,
        ),
    }
}

fn run_list(
    service: &Service,
    filter: TaskFilter,
    limit: usize,
    as_json: bool,
) -> Result<(), CliError> {
    let tasks = service.ledger().list_tasks(filter, limit)?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
    } else if tasks.is_empty() {
        println!("No tasks found.");
    } else {
        for line in format_task_lines(&tasks) {
            println!("{line}");
        }
    }
    Ok(())
}

fn print_task(task: &TaskExecution, as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(task)?);
    } else {
        for line in format_task_details(task) {
            println!("{line}");
        }
    }
    Ok(())
}

fn collect_photos(
    paths: &[(PhotoKind, Option<&Path>)],
) -> Result<Vec<EvidencePhoto>, CliError> {
    paths
        .iter()
        .filter_map(|(kind, path)| path.map(|path| read_photo(*kind, path)))
        .collect()
}

pub const fn location(latitude: Option<f64>, longitude: Option<f64>) -> Option<GeoPoint> {
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(GeoPoint::new(latitude, longitude)),
        _ => None,
    }
}
