use std::path::PathBuf;

use crate::cli::QueueCommands;
use crate::commands::common::{format_queue_lines, open_service, parse_task_id};
use crate::error::CliError;

pub fn run_queue(
    command: QueueCommands,
    db_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let service = open_service(db_path, config_path)?;
    match command {
        QueueCommands::List { json } => {
            let entries = service.ledger().list_queue()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("Sync queue is empty.");
            } else {
                for line in format_queue_lines(&entries) {
                    println!("{line}");
                }
            }
        }
        QueueCommands::Retry { task_id } => {
            let task_id = parse_task_id(&task_id)?;
            let released = service.ledger().retry_conflicts(&task_id)?;
            if released == 0 {
                println!("No parked entries for task {task_id}");
            } else {
                service.engine().refresh_pending_count()?;
                println!("Released {released} entr{} for task {task_id}", plural_y(released));
            }
        }
    }
    Ok(())
}

const fn plural_y(count: usize) -> &'static str {
    if count == 1 {
        "y"
    } else {
        "ies"
    }
}
