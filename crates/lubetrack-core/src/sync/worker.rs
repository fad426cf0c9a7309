//! Background drain loop.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::SyncSettings;

use super::engine::SyncEngine;
use super::remote::RemoteAuthority;

const MIN_PERIOD: Duration = Duration::from_millis(100);

/// Owns the spawned sync loop; stop it with [`SyncWorker::shutdown`]
pub struct SyncWorker {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl SyncWorker {
    /// Start probing connectivity and draining the queue.
    ///
    /// The worker owns the queue: on start it returns entries a previous
    /// process left in flight. A drain starts when connectivity comes back, when the engine is
    /// nudged with `request_sync`, and on every drain tick while online
    /// with pending entries.
    pub fn spawn<R: RemoteAuthority>(engine: SyncEngine<R>, settings: &SyncSettings) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sync_loop(
            engine,
            settings.probe_interval().max(MIN_PERIOD),
            settings.drain_interval().max(MIN_PERIOD),
            cancel.clone(),
        ));
        Self { handle, cancel }
    }

    /// Cancel the loop and wait for it to exit. A drain cut short here
    /// leaves its entries queued.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(error) = self.handle.await {
            tracing::error!("Sync loop failed to join: {error}");
        }
    }
}

async fn sync_loop<R: RemoteAuthority>(
    engine: SyncEngine<R>,
    probe_period: Duration,
    drain_period: Duration,
    cancel: CancellationToken,
) {
    let mut probe = tokio::time::interval(probe_period);
    probe.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut drain = tokio::time::interval(drain_period);
    drain.set_missed_tick_behavior(MissedTickBehavior::Delay);

    if let Err(error) = engine.recover_in_flight() {
        tracing::error!("Failed to requeue entries left in flight: {error}");
    }

    let mut status_rx = engine.watch_status();
    let mut was_online = status_rx.borrow_and_update().is_online;

    loop {
        let should_drain = tokio::select! {
            () = cancel.cancelled() => break,
            _ = probe.tick() => {
                engine.probe_connectivity().await;
                false
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let online = status_rx.borrow_and_update().is_online;
                let reconnected = online && !was_online;
                was_online = online;
                reconnected
            }
            _ = drain.tick() => {
                let status = engine.status();
                status.is_online && status.pending_count > 0
            }
            () = engine.sync_requested() => engine.status().is_online,
        };
        if !should_drain {
            continue;
        }

        tokio::select! {
            () = cancel.cancelled() => {
                if let Err(error) = engine.abort_drain() {
                    tracing::error!("Failed to requeue entries after cancelled drain: {error}");
                }
                break;
            }
            result = engine.sync_now() => {
                if let Err(error) = result {
                    tracing::error!("Sync drain failed: {error}");
                }
            }
        }
    }

    tracing::info!("Sync loop shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::sync::Notify;

    use crate::config::EvidenceConfig;
    use crate::db::SharedDatabase;
    use crate::evidence::EvidenceRegistry;
    use crate::ledger::{CompletionInput, Ledger};
    use crate::models::{
        NewTask, PhotoHash, Quantity, QueueState, SyncOperation, TaskDelta, Unit,
    };
    use crate::quality::QualityGate;
    use crate::sync::remote::PushOutcome;

    /// Acks every push; optionally waits for a release first
    #[derive(Default)]
    struct GatedRemote {
        gate: Option<Arc<Notify>>,
    }

    impl RemoteAuthority for GatedRemote {
        async fn push_task(&self, _operation: SyncOperation, _delta: &TaskDelta) -> PushOutcome {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            PushOutcome::Ack
        }

        async fn upload_photo(
            &self,
            hash: &PhotoHash,
            _bytes: &[u8],
        ) -> std::result::Result<String, String> {
            Ok(format!("https://cdn.test/{hash}"))
        }

        async fn probe(&self) -> bool {
            true
        }
    }

    fn setup(remote: GatedRemote) -> (Ledger, SyncEngine<GatedRemote>) {
        let db = SharedDatabase::open_in_memory().unwrap();
        let ledger = Ledger::new(db.clone(), QualityGate::default());
        let engine = SyncEngine::new(
            ledger.clone(),
            EvidenceRegistry::new(db, EvidenceConfig::default()),
            remote,
            &SyncSettings::default(),
            Duration::from_secs(5),
        )
        .unwrap();
        (ledger, engine)
    }

    fn complete_one(ledger: &Ledger) {
        let task = ledger.schedule_task(NewTask::new("wo-9", "lp-2")).unwrap();
        ledger
            .record_completion(
                &task.id,
                CompletionInput {
                    quantity_used: Quantity::new(40.0, Unit::Ml),
                    observations: None,
                    photo_refs: Vec::new(),
                    executed_by: "tech-4".to_string(),
                    deviation_confirmed: false,
                },
            )
            .unwrap();
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn worker_probes_and_drains_nudged_completions() {
        let (ledger, engine) = setup(GatedRemote::default());
        let worker = SyncWorker::spawn(engine.clone(), &SyncSettings::default());

        wait_for(|| engine.status().is_online).await;
        complete_one(&ledger);
        engine.request_sync();

        wait_for(|| ledger.get_pending_count().unwrap() == 0).await;
        worker.shutdown().await;
    }

    #[tokio::test]
    async fn worker_recovers_and_pushes_entries_left_in_flight() {
        let (ledger, engine) = setup(GatedRemote::default());
        complete_one(&ledger);
        let stranded = ledger.list_queue().unwrap().remove(0);
        ledger.mark_in_flight(&stranded).unwrap();

        let worker = SyncWorker::spawn(engine.clone(), &SyncSettings::default());
        wait_for(|| ledger.get_pending_count().unwrap() == 0).await;
        worker.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_mid_drain_leaves_entry_queued() {
        let gate = Arc::new(Notify::new());
        let (ledger, engine) = setup(GatedRemote {
            gate: Some(Arc::clone(&gate)),
        });
        complete_one(&ledger);
        let worker = SyncWorker::spawn(engine.clone(), &SyncSettings::default());

        wait_for(|| engine.status().is_syncing).await;
        worker.shutdown().await;

        let queue = ledger.list_queue().unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].state, QueueState::Queued);
        assert!(!engine.status().is_syncing);
    }
}
