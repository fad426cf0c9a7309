use std::path::PathBuf;

use crate::cli::AlertCommands;
use crate::commands::common::{format_alert_lines, open_service, parse_alert_id};
use crate::error::CliError;

pub fn run_alerts(
    command: AlertCommands,
    db_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let service = open_service(db_path, config_path)?;
    let fraud = service.fraud();
    match command {
        AlertCommands::List { all, json } => {
            let alerts = fraud.list_alerts(all)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&alerts)?);
            } else if alerts.is_empty() {
                println!("No alerts.");
            } else {
                for line in format_alert_lines(&alerts) {
                    println!("{line}");
                }
            }
        }
        AlertCommands::Resolve { id, by } => {
            let alert = fraud.resolve(&parse_alert_id(&id)?, &by)?;
            println!("Resolved alert {} ({})", alert.id, alert.alert_type);
        }
        AlertCommands::Summary { json } => {
            let summary = fraud.summarize()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }
            println!("Alerts:      {} total, {} open", summary.total_alerts, summary.unresolved_alerts);
            println!("Today:       {} evidence captures", summary.today_actions);
            if summary.suspicious_users.is_empty() {
                println!("No users with repeated open alerts.");
            } else {
                println!("Users with repeated open alerts:");
                for user in &summary.suspicious_users {
                    println!("  {:<20} {}", user.user_id, user.alert_count);
                }
            }
        }
    }
    Ok(())
}
