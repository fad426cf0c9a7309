//! Photo evidence registry and duplicate detector.
//!
//! Every accepted photo is fingerprinted and registered system-wide. A
//! fingerprint seen before on another task (or as the other photo type) is
//! evidence reuse. Registration is append-only; the store refuses deletes.

pub(crate) mod hash;

pub use hash::{generate_hash, hamming_distance};

use crate::config::EvidenceConfig;
use crate::db::{SharedDatabase, SqlitePhotoRepository};
use crate::error::{Error, Result};
use crate::models::{PhotoHash, PhotoKind, PhotoRecord, TaskId};
use crate::util::now_ms;

/// Outcome of screening one captured photo
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screening {
    /// Not seen before; register it under this hash
    Fresh(PhotoHash),
    /// Already registered for the same task and photo type
    Resubmitted(PhotoRecord),
    /// Registered earlier for another task or photo type
    Duplicate {
        hash: PhotoHash,
        original: PhotoRecord,
    },
    /// Could not be fingerprinted; let through unregistered
    Unhashed,
}

impl Screening {
    /// Hash to store on the task's photo reference
    pub fn hash(&self) -> Option<&PhotoHash> {
        match self {
            Self::Fresh(hash) | Self::Duplicate { hash, .. } => Some(hash),
            Self::Resubmitted(record) => Some(&record.hash),
            Self::Unhashed => None,
        }
    }
}

/// Registry of every evidence fingerprint the device has accepted
#[derive(Clone)]
pub struct EvidenceRegistry {
    db: SharedDatabase,
    config: EvidenceConfig,
}

impl EvidenceRegistry {
    pub const fn new(db: SharedDatabase, config: EvidenceConfig) -> Self {
        Self { db, config }
    }

    pub fn generate_hash(&self, image_data: &[u8]) -> Result<PhotoHash> {
        generate_hash(image_data, self.config.watermark_band)
    }

    /// Find the registered record matching `hash` across all users, tasks and time.
    ///
    /// With a non-zero Hamming tolerance the closest record within range wins.
    pub fn check_duplicate(&self, hash: &PhotoHash) -> Result<Option<PhotoRecord>> {
        let tolerance = self.config.max_hamming_distance;
        self.db.with(|conn| {
            let photos = SqlitePhotoRepository::new(conn);
            if let Some(record) = photos.find(hash)? {
                return Ok(Some(record));
            }
            if tolerance == 0 {
                return Ok(None);
            }

            let closest = photos
                .all()?
                .into_iter()
                .filter_map(|record| {
                    hamming_distance(hash, &record.hash).map(|distance| (distance, record))
                })
                .filter(|(distance, _)| *distance <= tolerance)
                .min_by_key(|(distance, record)| (*distance, record.timestamp));
            Ok(closest.map(|(_, record)| record))
        })
    }

    /// Fingerprint and look up a photo captured for `task_id`.
    ///
    /// Hashing failures fail open: the photo is allowed and the failure logged.
    pub fn screen(&self, image_data: &[u8], task_id: &TaskId, kind: PhotoKind) -> Result<Screening> {
        let hash = match self.generate_hash(image_data) {
            Ok(hash) => hash,
            Err(Error::HashingFailure(reason)) => {
                tracing::warn!("Allowing unhashed {kind} photo for task {task_id}: {reason}");
                return Ok(Screening::Unhashed);
            }
            Err(error) => return Err(error),
        };

        Ok(match self.check_duplicate(&hash)? {
            None => Screening::Fresh(hash),
            Some(original) if original.task_id == *task_id && original.kind == kind => {
                Screening::Resubmitted(original)
            }
            Some(original) => Screening::Duplicate { hash, original },
        })
    }

    /// Append a record; call only after a `check_duplicate` miss
    pub fn register(&self, record: &PhotoRecord) -> Result<()> {
        self.register_inner(record, None)
    }

    /// Append a record and stage the raw bytes for upload
    pub fn register_with_bytes(&self, record: &PhotoRecord, image_data: &[u8]) -> Result<()> {
        self.register_inner(record, Some(image_data))
    }

    fn register_inner(&self, record: &PhotoRecord, image_data: Option<&[u8]>) -> Result<()> {
        self.db.transaction(|conn| {
            let photos = SqlitePhotoRepository::new(conn);
            if let Some(existing) = photos.find(&record.hash)? {
                if existing.task_id == record.task_id && existing.kind == record.kind {
                    return Ok(());
                }
                return Err(Error::InvalidInput(format!(
                    "photo {} is already registered for task {}",
                    record.hash, existing.task_id
                )));
            }

            photos.insert(record)?;
            if let Some(bytes) = image_data {
                photos.stage_upload(&record.hash, bytes, now_ms())?;
            }
            tracing::debug!(
                "Registered {} photo {} for task {}",
                record.kind,
                record.hash,
                record.task_id
            );
            Ok(())
        })
    }

    /// Raw bytes waiting to be uploaded, if any
    pub fn staged_upload(&self, hash: &PhotoHash) -> Result<Option<Vec<u8>>> {
        self.db
            .with(|conn| SqlitePhotoRepository::new(conn).staged_bytes(hash))
    }

    /// Store the durable URL returned by the remote and release the staged bytes
    pub fn mark_uploaded(&self, hash: &PhotoHash, remote_url: &str) -> Result<()> {
        self.db
            .with(|conn| SqlitePhotoRepository::new(conn).complete_upload(hash, remote_url))
    }

    pub fn get(&self, hash: &PhotoHash) -> Result<Option<PhotoRecord>> {
        self.db
            .with(|conn| SqlitePhotoRepository::new(conn).find(hash))
    }
}
