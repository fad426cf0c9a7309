//! Queue drain: pushes ledger entries to the remote authority.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Notify};

use crate::config::SyncSettings;
use crate::error::{Error, Result};
use crate::evidence::EvidenceRegistry;
use crate::ledger::Ledger;
use crate::models::{SyncQueueEntry, TaskId};
use crate::util::now_ms;

use super::backoff::BackoffPolicy;
use super::remote::{PushOutcome, RemoteAuthority};
use super::status::{Subscription, SyncStatus, SyncStatusHub};

/// Counters for one `sync_now` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    /// Entries acknowledged by the remote
    pub pushed: usize,
    /// Entries parked as conflicts (rejections and exhausted retries)
    pub conflicts: usize,
    /// Entries kept queued after a transient failure
    pub transient: usize,
    /// Entries left for later because of backoff or an earlier entry of the same task
    pub deferred: usize,
    pub photos_uploaded: usize,
    /// Connectivity was lost; in-flight entries went back to the queue
    pub aborted_offline: bool,
    /// Another drain was running; this request was folded into it
    pub coalesced: bool,
}

impl SyncResult {
    fn absorb(&mut self, pass: Self) {
        self.pushed += pass.pushed;
        self.conflicts += pass.conflicts;
        self.transient += pass.transient;
        self.deferred = pass.deferred;
        self.photos_uploaded += pass.photos_uploaded;
        self.aborted_offline |= pass.aborted_offline;
    }
}

struct EngineInner<R> {
    ledger: Ledger,
    evidence: EvidenceRegistry,
    remote: R,
    status: SyncStatusHub,
    backoff: BackoffPolicy,
    max_retries: u32,
    push_timeout: Duration,
    draining: AtomicBool,
    rerun: AtomicBool,
    nudge: Notify,
}

/// Cloneable handle to the synchronization engine
pub struct SyncEngine<R> {
    inner: Arc<EngineInner<R>>,
}

impl<R> Clone for SyncEngine<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Resets the single-flight flag even if the drain future is dropped
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<R: RemoteAuthority> SyncEngine<R> {
    /// Build an engine over `ledger`.
    ///
    /// The engine starts offline until a probe or [`Self::set_online`] says
    /// otherwise. Entries left in flight by a crash stay untouched until the
    /// queue owner calls [`Self::recover_in_flight`].
    pub fn new(
        ledger: Ledger,
        evidence: EvidenceRegistry,
        remote: R,
        settings: &SyncSettings,
        push_timeout: Duration,
    ) -> Result<Self> {
        let status = SyncStatusHub::new(SyncStatus {
            pending_count: ledger.get_pending_count()?,
            ..SyncStatus::default()
        });

        Ok(Self {
            inner: Arc::new(EngineInner {
                ledger,
                evidence,
                remote,
                status,
                backoff: BackoffPolicy::from_settings(settings),
                max_retries: settings.max_retries,
                push_timeout,
                draining: AtomicBool::new(false),
                rerun: AtomicBool::new(false),
                nudge: Notify::new(),
            }),
        })
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.status.current()
    }

    pub fn status_hub(&self) -> &SyncStatusHub {
        &self.inner.status
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.watch()
    }

    pub fn on_sync_status_change(
        &self,
        callback: impl Fn(&SyncStatus) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.status.on_sync_status_change(callback)
    }

    pub fn remote(&self) -> &R {
        &self.inner.remote
    }

    /// Feed the platform's network-change signal
    pub fn set_online(&self, is_online: bool) {
        if self.inner.status.set_online(is_online) {
            tracing::info!(
                "Connectivity changed: {}",
                if is_online { "online" } else { "offline" }
            );
        }
    }

    /// Verify connectivity with a liveness probe and record the result
    pub async fn probe_connectivity(&self) -> bool {
        let online = tokio::time::timeout(self.inner.push_timeout, self.inner.remote.probe())
            .await
            .unwrap_or(false);
        self.set_online(online);
        online
    }

    /// Ask the background worker to drain soon; never blocks
    pub fn request_sync(&self) {
        self.inner.nudge.notify_one();
    }

    pub(crate) async fn sync_requested(&self) {
        self.inner.nudge.notified().await;
    }

    /// Return entries a previous drain left in flight to the queue.
    ///
    /// Only the process that drains the queue may call this; another
    /// process's push would otherwise be sent twice.
    pub fn recover_in_flight(&self) -> Result<usize> {
        let requeued = self.inner.ledger.requeue_in_flight()?;
        self.refresh_pending_count()?;
        Ok(requeued)
    }

    /// Re-read the pending count from the ledger
    pub fn refresh_pending_count(&self) -> Result<usize> {
        let pending = self.inner.ledger.get_pending_count()?;
        self.inner.status.set_pending_count(pending);
        Ok(pending)
    }

    /// Drain the queue once. Single-flight: a call made while a drain is
    /// running returns immediately and triggers one more pass of that drain.
    pub async fn sync_now(&self) -> Result<SyncResult> {
        let inner = &self.inner;
        if !inner.status.current().is_online {
            self.refresh_pending_count()?;
            tracing::debug!("Skipping sync while offline");
            return Ok(SyncResult {
                aborted_offline: true,
                ..SyncResult::default()
            });
        }
        if inner.draining.swap(true, Ordering::AcqRel) {
            inner.rerun.store(true, Ordering::Release);
            return Ok(SyncResult {
                coalesced: true,
                ..SyncResult::default()
            });
        }
        inner.status.update(|status| status.is_syncing = true);

        let mut result = SyncResult::default();
        let outcome = loop {
            let drained = {
                let _guard = DrainGuard(&inner.draining);
                self.drain_while_requested(&mut result).await
            };
            // a request may land after the last pass but before the guard drops
            if drained.is_err() || result.aborted_offline || !self.reclaim_for_rerun() {
                break drained;
            }
        };

        let pending = inner.ledger.get_pending_count();
        inner.status.update(|status| {
            status.is_syncing = false;
            if let Ok(pending) = pending {
                status.pending_count = pending;
            }
            if result.pushed > 0 {
                status.last_sync = Some(now_ms());
            }
        });
        outcome?;

        tracing::info!(
            "Sync finished: {} pushed, {} transient, {} conflicts, {} deferred{}",
            result.pushed,
            result.transient,
            result.conflicts,
            result.deferred,
            if result.aborted_offline {
                " (connectivity lost)"
            } else {
                ""
            }
        );
        Ok(result)
    }

    /// Run passes until no caller asked for another one
    async fn drain_while_requested(&self, result: &mut SyncResult) -> Result<()> {
        let inner = &self.inner;
        loop {
            inner.rerun.store(false, Ordering::Release);
            let pass = self.drain_pass().await?;
            let stop = pass.aborted_offline;
            result.absorb(pass);
            if stop || !inner.rerun.load(Ordering::Acquire) {
                return Ok(());
            }
        }
    }

    /// Take the drain lock again for a request that was folded in after the
    /// last pass. Returns false when nothing is pending or another caller
    /// already holds the lock.
    fn reclaim_for_rerun(&self) -> bool {
        let inner = &self.inner;
        inner.rerun.load(Ordering::Acquire) && !inner.draining.swap(true, Ordering::AcqRel)
    }

    /// Return in-flight entries to the queue after a drain was cancelled
    pub fn abort_drain(&self) -> Result<()> {
        self.inner.ledger.requeue_in_flight()?;
        self.inner
            .status
            .update(|status| status.is_syncing = false);
        self.refresh_pending_count()?;
        Ok(())
    }

    async fn drain_pass(&self) -> Result<SyncResult> {
        let inner = &self.inner;
        let mut result = SyncResult::default();
        let mut blocked: HashSet<TaskId> = HashSet::new();
        let mut status_rx = inner.status.watch();

        for entry in inner.ledger.drainable_entries()? {
            let now = now_ms();
            if blocked.contains(&entry.task_id)
                || entry.next_attempt_at.is_some_and(|at| at > now)
            {
                // FIFO per task: nothing behind a waiting entry may overtake it
                blocked.insert(entry.task_id);
                result.deferred += 1;
                continue;
            }
            if !status_rx.borrow_and_update().is_online {
                result.aborted_offline = true;
                break;
            }

            inner.ledger.mark_in_flight(&entry)?;
            let settled = self
                .settle_entry(&entry, &mut status_rx, &mut result, &mut blocked)
                .await;
            match settled {
                Ok(true) => {}
                Ok(false) => {
                    inner.ledger.release_in_flight(&entry)?;
                    result.aborted_offline = true;
                    break;
                }
                Err(error) => {
                    // the entry must not stay in flight or later entries of
                    // its task would stall behind it
                    if let Err(release_error) = inner.ledger.release_in_flight(&entry) {
                        tracing::error!(
                            "Failed to requeue entry {} after drain error: {release_error}",
                            entry.seq
                        );
                    }
                    return Err(error);
                }
            }
            self.refresh_pending_count()?;
        }

        self.refresh_pending_count()?;
        Ok(result)
    }

    /// Push one in-flight entry and record the remote's answer. Returns
    /// false when connectivity dropped before the remote answered.
    async fn settle_entry(
        &self,
        entry: &SyncQueueEntry,
        status_rx: &mut watch::Receiver<SyncStatus>,
        result: &mut SyncResult,
        blocked: &mut HashSet<TaskId>,
    ) -> Result<bool> {
        let inner = &self.inner;
        let outcome = tokio::select! {
            outcome = self.push_entry(entry, result) => outcome?,
            () = wait_until_offline(status_rx) => return Ok(false),
        };

        match outcome {
            PushOutcome::Ack => {
                let state = inner.ledger.acknowledge(entry, now_ms())?;
                result.pushed += 1;
                tracing::debug!(
                    "Entry {} for task {} acknowledged, task now {state}",
                    entry.seq,
                    entry.task_id
                );
            }
            PushOutcome::Rejected(reason) => {
                let error = Error::RemoteRejection(reason);
                tracing::warn!("Entry {} for task {}: {error}", entry.seq, entry.task_id);
                inner.ledger.mark_conflict(entry, &error.to_string())?;
                blocked.insert(entry.task_id);
                result.conflicts += 1;
            }
            PushOutcome::Transient(reason) => {
                self.handle_transient(entry, &reason, result)?;
                blocked.insert(entry.task_id);
            }
        }
        Ok(true)
    }

    fn handle_transient(
        &self,
        entry: &SyncQueueEntry,
        reason: &str,
        result: &mut SyncResult,
    ) -> Result<()> {
        let inner = &self.inner;
        let error = Error::TransientSyncFailure(reason.to_string());
        let attempts = entry.retry_count.saturating_add(1);
        if attempts > inner.max_retries {
            tracing::warn!(
                "Parking entry {} for task {} after {attempts} failed attempts: {reason}",
                entry.seq,
                entry.task_id
            );
            inner
                .ledger
                .mark_conflict(entry, &format!("retries exhausted: {error}"))?;
            result.conflicts += 1;
            return Ok(());
        }

        let delay = inner.backoff.delay(attempts);
        let next_attempt_at =
            now_ms().saturating_add(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX));
        inner
            .ledger
            .record_transient_failure(entry, &error.to_string(), next_attempt_at)?;
        tracing::warn!(
            "Transient failure for entry {} (attempt {attempts}), retrying in {delay:?}: {reason}",
            entry.seq
        );
        result.transient += 1;
        Ok(())
    }

    /// Upload the entry's staged photos, then push the task delta
    async fn push_entry(
        &self,
        entry: &SyncQueueEntry,
        result: &mut SyncResult,
    ) -> Result<PushOutcome> {
        let inner = &self.inner;
        for hash in entry
            .payload
            .photo_refs
            .iter()
            .filter_map(|photo| photo.hash.as_ref())
        {
            let Some(bytes) = inner.evidence.staged_upload(hash)? else {
                continue;
            };
            let upload = tokio::time::timeout(
                inner.push_timeout,
                inner.remote.upload_photo(hash, &bytes),
            )
            .await;
            match upload {
                Ok(Ok(url)) => {
                    inner.evidence.mark_uploaded(hash, &url)?;
                    result.photos_uploaded += 1;
                }
                Ok(Err(error)) => return Ok(PushOutcome::Transient(error)),
                Err(_) => {
                    return Ok(PushOutcome::Transient(format!(
                        "photo upload timed out after {:?}",
                        inner.push_timeout
                    )))
                }
            }
        }

        let push = inner.remote.push_task(entry.operation, &entry.payload);
        Ok(tokio::time::timeout(inner.push_timeout, push)
            .await
            .unwrap_or_else(|_| {
                PushOutcome::Transient(format!("push timed out after {:?}", inner.push_timeout))
            }))
    }
}

async fn wait_until_offline(status_rx: &mut watch::Receiver<SyncStatus>) {
    loop {
        if !status_rx.borrow_and_update().is_online {
            return;
        }
        if status_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
