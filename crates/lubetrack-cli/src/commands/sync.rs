use std::path::PathBuf;

use lubetrack_core::sync::{SyncResult, SyncStatus, SyncWorker};

use crate::commands::common::{format_timestamp, load_config, open_service_with};
use crate::error::CliError;

pub async fn run_sync(
    watch: bool,
    recover: bool,
    as_json: bool,
    db_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let service = open_service_with(db_path, &config)?;
    let engine = service.engine();
    if !engine.remote().is_configured() {
        return Err(CliError::SyncNotConfigured);
    }

    if !watch {
        if recover {
            let requeued = engine.recover_in_flight()?;
            if requeued > 0 {
                eprintln!("Returned {requeued} in-flight entries to the queue.");
            }
        }
        if !engine.probe_connectivity().await {
            eprintln!("Remote authority is unreachable; queued work stays local.");
        }
        let result = engine.sync_now().await?;
        if as_json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            println!("{}", format_sync_result(&result));
        }
        return Ok(());
    }

    let subscription = engine.on_sync_status_change(move |status| {
        if as_json {
            if let Ok(line) = serde_json::to_string(status) {
                println!("{line}");
            }
        } else {
            println!("{}", format_sync_status(status));
        }
    });
    let worker = SyncWorker::spawn(engine.clone(), &config.sync);
    println!("Watching sync queue. Press Ctrl-C to stop.");

    let interrupted = tokio::signal::ctrl_c().await;
    worker.shutdown().await;
    subscription.unsubscribe();
    interrupted?;
    Ok(())
}

pub fn format_sync_result(result: &SyncResult) -> String {
    if result.coalesced {
        return "A sync was already running; this request was folded into it.".to_string();
    }
    let mut summary = format!(
        "Pushed {}, conflicts {}, retrying {}, deferred {}, photos uploaded {}",
        result.pushed, result.conflicts, result.transient, result.deferred, result.photos_uploaded
    );
    if result.aborted_offline {
        summary.push_str(" (stopped: offline)");
    }
    summary
}

pub fn format_sync_status(status: &SyncStatus) -> String {
    let connectivity = if status.is_online { "online" } else { "offline" };
    let activity = if status.is_syncing { ", syncing" } else { "" };
    let last_sync = status
        .last_sync
        .map_or_else(|| "never".to_string(), format_timestamp);
    format!(
        "{connectivity}{activity}, {} pending, last sync {last_sync}",
        status.pending_count
    )
}
