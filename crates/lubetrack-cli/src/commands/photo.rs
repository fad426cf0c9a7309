use std::path::{Path, PathBuf};

use crate::commands::common::{format_timestamp, open_service};
use crate::error::CliError;

/// Print the fingerprint of `path` and the earlier submission it matches, if any
pub fn run_photo_check(
    path: &Path,
    db_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let service = open_service(db_path, config_path)?;
    let bytes = std::fs::read(path)?;
    let evidence = service.evidence();
    let hash = evidence.generate_hash(&bytes)?;
    println!("hash: {hash}");

    match evidence.check_duplicate(&hash)? {
        Some(original) => println!(
            "Already submitted as the {} photo of task {} by {} at {}",
            original.kind,
            original.task_id,
            original.user_id,
            format_timestamp(original.timestamp)
        ),
        None => println!("No earlier submission matches this photo."),
    }
    Ok(())
}
