use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use shared::{
    domain::{ObjectId, TransactionDigest},
    error::SessionError,
    protocol::ObjectData,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    reconciler::{reconcile, FetchSlot, Reconciliation},
    FragmentStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionPhase {
    #[default]
    Idle,
    Validating,
    AwaitingSignature,
    AwaitingSettlement,
    Reconciled,
    /// Ended without a tracked record and without a surfaced error.
    Incomplete,
    Failed,
}

/// Snapshot of the session handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SubmissionState {
    pub object_id: Option<ObjectId>,
    pub phase: SubmissionPhase,
    pub is_submitting: bool,
    pub pending_signature: bool,
    pub last_hash: Option<TransactionDigest>,
    pub error: Option<SessionError>,
}

impl SubmissionState {
    pub fn is_confirmed(&self) -> bool {
        self.last_hash.is_some() && !self.is_submitting && !self.pending_signature
    }
}

#[derive(Debug, Default)]
struct SessionInner {
    object_id: Option<ObjectId>,
    phase: SubmissionPhase,
    is_submitting: bool,
    pending_signature: bool,
    last_hash: Option<TransactionDigest>,
    submission_error: Option<SessionError>,
    fetch: Option<FetchSlot>,
    epoch: u64,
}

impl SessionInner {
    fn snapshot(&self) -> SubmissionState {
        // read errors win over submission errors
        let fetch_error = self
            .fetch
            .as_ref()
            .filter(|slot| Some(&slot.object_id) == self.object_id.as_ref())
            .and_then(|slot| slot.error.clone());
        SubmissionState {
            object_id: self.object_id.clone(),
            phase: self.phase,
            is_submitting: self.is_submitting,
            pending_signature: self.pending_signature,
            last_hash: self.last_hash.clone(),
            error: fetch_error.or_else(|| self.submission_error.clone()),
        }
    }
}

/// Tracked object id plus submission bookkeeping. The id is mirrored into a
/// [`FragmentStore`] so a restarted session re-attaches to the same record.
///
/// Every submission captures the epoch at its start; [`SessionStore::clear`]
/// bumps it, and writes carrying an older epoch are dropped.
///
/// Fragment writes and deletes are serialized through `persist`, so a save
/// still in flight when the session is cleared is deleted afterwards rather
/// than landing after the delete.
pub struct SessionStore {
    fragments: Arc<dyn FragmentStore>,
    inner: Mutex<SessionInner>,
    persist: Mutex<()>,
}

impl SessionStore {
    pub async fn open(fragments: Arc<dyn FragmentStore>) -> Self {
        let object_id = match fragments.load().await {
            Ok(object_id) => object_id,
            Err(err) => {
                warn!("session: failed to load persisted fragment, starting empty: {err:#}");
                None
            }
        };
        if let Some(object_id) = &object_id {
            info!(%object_id, "session: restored tracked object from fragment");
        }
        Self {
            fragments,
            inner: Mutex::new(SessionInner {
                object_id,
                ..SessionInner::default()
            }),
            persist: Mutex::new(()),
        }
    }

    pub async fn snapshot(&self) -> SubmissionState {
        self.inner.lock().await.snapshot()
    }

    pub async fn object_id(&self) -> Option<ObjectId> {
        self.inner.lock().await.object_id.clone()
    }

    pub async fn reconciliation(&self) -> Reconciliation {
        let guard = self.inner.lock().await;
        reconcile(guard.object_id.as_ref(), guard.fetch.as_ref())
    }

    /// Tracks `object_id` and persists it. The in-memory id stays set even if
    /// persisting fails.
    pub async fn set_object_id(&self, object_id: ObjectId) -> Result<()> {
        let _persist = self.persist.lock().await;
        {
            let mut guard = self.inner.lock().await;
            guard.object_id = Some(object_id.clone());
        }
        self.fragments.save(&object_id).await
    }

    /// Resets the tracked id, hash, and errors, and removes the persisted
    /// fragment. Safe to call repeatedly.
    pub async fn clear(&self) -> Result<()> {
        {
            let mut guard = self.inner.lock().await;
            guard.object_id = None;
            guard.last_hash = None;
            guard.submission_error = None;
            guard.fetch = None;
            guard.epoch += 1;
            if !guard.is_submitting {
                guard.phase = SubmissionPhase::Idle;
            }
        }

        // waits for a pending save, then deletes whatever it wrote
        let _persist = self.persist.lock().await;
        if self.inner.lock().await.object_id.is_some() {
            // tracked again after the reset above; that write owns the fragment
            return Ok(());
        }
        self.fragments.clear().await
    }

    pub(crate) async fn begin_submission(&self) -> u64 {
        let mut guard = self.inner.lock().await;
        guard.is_submitting = true;
        guard.pending_signature = false;
        guard.phase = SubmissionPhase::Validating;
        guard.submission_error = None;
        guard.last_hash = None;
        guard.epoch
    }

    pub(crate) async fn enter_phase(&self, epoch: u64, phase: SubmissionPhase) -> bool {
        let mut guard = self.inner.lock().await;
        if guard.epoch != epoch {
            return false;
        }
        guard.phase = phase;
        guard.pending_signature = phase == SubmissionPhase::AwaitingSignature;
        true
    }

    pub(crate) async fn record_digest(&self, epoch: u64, digest: TransactionDigest) -> bool {
        let mut guard = self.inner.lock().await;
        guard.pending_signature = false;
        if guard.epoch != epoch {
            return false;
        }
        guard.last_hash = Some(digest);
        guard.phase = SubmissionPhase::AwaitingSettlement;
        true
    }

    pub(crate) async fn record_failure(&self, epoch: u64, error: SessionError) -> bool {
        let mut guard = self.inner.lock().await;
        guard.pending_signature = false;
        if guard.epoch != epoch {
            return false;
        }
        guard.submission_error = Some(error);
        guard.phase = SubmissionPhase::Failed;
        true
    }

    /// Epoch-checked [`SessionStore::set_object_id`]. `Ok(false)` means the
    /// session was cleared while the submission was in flight.
    pub(crate) async fn track_created_object(
        &self,
        epoch: u64,
        object_id: ObjectId,
    ) -> Result<bool> {
        let _persist = self.persist.lock().await;
        {
            let mut guard = self.inner.lock().await;
            if guard.epoch != epoch {
                return Ok(false);
            }
            guard.object_id = Some(object_id.clone());
        }
        let saved = self.fragments.save(&object_id).await;
        if self.inner.lock().await.epoch != epoch {
            // cleared mid-save; the pending clear removes the fragment
            return Ok(false);
        }
        saved?;
        Ok(true)
    }

    /// Ends the submission started at `epoch`. A submission outlived by a
    /// clear leaves the session idle.
    pub(crate) async fn finish_submission(&self, epoch: u64) {
        let mut guard = self.inner.lock().await;
        guard.is_submitting = false;
        guard.pending_signature = false;
        if guard.epoch != epoch {
            guard.phase = SubmissionPhase::Idle;
        }
    }

    /// Stores a read result unless the tracked id moved on meanwhile. A failed
    /// read keeps the data of the previous read of the same id.
    pub(crate) async fn store_fetch(
        &self,
        object_id: ObjectId,
        result: std::result::Result<Option<ObjectData>, SessionError>,
    ) -> bool {
        let mut guard = self.inner.lock().await;
        if guard.object_id.as_ref() != Some(&object_id) {
            return false;
        }
        let slot = match result {
            Ok(data) => FetchSlot {
                object_id,
                data,
                error: None,
            },
            Err(error) => {
                let previous = guard
                    .fetch
                    .take()
                    .filter(|slot| slot.object_id == object_id)
                    .and_then(|slot| slot.data);
                FetchSlot {
                    object_id,
                    data: previous,
                    error: Some(error),
                }
            }
        };
        guard.fetch = Some(slot);
        true
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
