use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;
use shared::{
    codec::{build_calculation_request, ContractTarget},
    domain::{Address, CalculationInput, CalculationRecord, ObjectId, TransactionDigest},
    error::{ErrorKind, SessionError},
    protocol::{MoveCallRequest, ObjectData, ObjectDataOptions, SettlementEffects},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

pub mod fragment;
pub mod reconciler;
pub mod rpc;
pub mod session;
pub mod signer;

pub use fragment::{MemoryFragmentStore, SqliteFragmentStore, DEFAULT_SESSION_KEY};
pub use reconciler::{reconcile, FetchSlot, ObjectView, Reconciliation};
pub use rpc::{RetryPolicy, RpcError, RpcLedgerClient};
pub use session::{SessionStore, SubmissionPhase, SubmissionState};
pub use signer::{RemoteSigner, SignerError};

/// External wallet: owns the keys and the user's approval.
#[async_trait]
pub trait Signer: Send + Sync {
    fn identity(&self) -> Option<Address>;
    async fn sign_and_execute(&self, request: &MoveCallRequest) -> Result<TransactionDigest>;
}

pub struct MissingSigner;

#[async_trait]
impl Signer for MissingSigner {
    fn identity(&self) -> Option<Address> {
        None
    }

    async fn sign_and_execute(&self, request: &MoveCallRequest) -> Result<TransactionDigest> {
        Err(anyhow!(
            "no signer available for {} on behalf of {}",
            request.target(),
            request.sender
        ))
    }
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn fetch_object(
        &self,
        object_id: &ObjectId,
        options: ObjectDataOptions,
    ) -> Result<Option<ObjectData>>;
    async fn await_settlement(&self, digest: &TransactionDigest) -> Result<SettlementEffects>;
}

/// Single-string persistence for the tracked object id.
#[async_trait]
pub trait FragmentStore: Send + Sync {
    async fn load(&self) -> Result<Option<ObjectId>>;
    async fn save(&self, object_id: &ObjectId) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementAnomaly {
    NoCreatedRecords,
    MissingRecordId,
}

impl std::fmt::Display for SettlementAnomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettlementAnomaly::NoCreatedRecords => f.write_str("settlement created no records"),
            SettlementAnomaly::MissingRecordId => {
                f.write_str("first created record has no object id")
            }
        }
    }
}

/// What to do when a settled transaction yields no usable record id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnomalyPolicy {
    /// Log it and end the submission without an error.
    #[default]
    Absorb,
    /// Store it as a settlement error.
    Surface,
}

impl std::str::FromStr for AnomalyPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "absorb" => Ok(AnomalyPolicy::Absorb),
            "surface" => Ok(AnomalyPolicy::Surface),
            other => Err(anyhow!(
                "unknown anomaly policy '{other}', expected absorb or surface"
            )),
        }
    }
}

/// The contract call creates exactly one record; the first one is ours.
pub fn first_created_record(
    effects: &SettlementEffects,
) -> std::result::Result<ObjectId, SettlementAnomaly> {
    let first = effects
        .created
        .first()
        .ok_or(SettlementAnomaly::NoCreatedRecords)?;
    first
        .object_id
        .clone()
        .ok_or(SettlementAnomaly::MissingRecordId)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Reconciled {
        digest: TransactionDigest,
        object_id: ObjectId,
    },
    Anomaly {
        digest: TransactionDigest,
        anomaly: SettlementAnomaly,
    },
    SettlementUnconfirmed {
        digest: TransactionDigest,
    },
    /// The session was cleared while this submission was in flight.
    Discarded {
        digest: Option<TransactionDigest>,
    },
    Failed {
        error: SessionError,
    },
    Busy,
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    StateChanged(SubmissionState),
    ObjectReconciled(Reconciliation),
}

/// Everything a presentation layer renders.
#[derive(Debug, Clone, Serialize)]
pub struct ContractView {
    pub input: CalculationInput,
    pub record: Option<CalculationRecord>,
    pub object: ObjectView,
    pub object_exists: bool,
    pub has_valid_data: bool,
    pub state: SubmissionState,
    pub is_confirmed: bool,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub target: ContractTarget,
    pub anomaly_policy: AnomalyPolicy,
}

impl ClientOptions {
    pub fn new(target: ContractTarget) -> Self {
        Self {
            target,
            anomaly_policy: AnomalyPolicy::default(),
        }
    }
}

pub struct CalculatorClient {
    options: ClientOptions,
    signer: Arc<dyn Signer>,
    ledger: Arc<dyn LedgerClient>,
    session: SessionStore,
    input: Mutex<CalculationInput>,
    submit_guard: Mutex<()>,
    events: broadcast::Sender<ClientEvent>,
}

impl CalculatorClient {
    pub async fn open(
        options: ClientOptions,
        signer: Arc<dyn Signer>,
        ledger: Arc<dyn LedgerClient>,
        fragments: Arc<dyn FragmentStore>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            options,
            signer,
            ledger,
            session: SessionStore::open(fragments).await,
            input: Mutex::new(CalculationInput::default()),
            submit_guard: Mutex::new(()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub async fn input(&self) -> CalculationInput {
        *self.input.lock().await
    }

    pub async fn set_input(&self, input: CalculationInput) {
        *self.input.lock().await = input;
    }

    pub async fn view(&self) -> ContractView {
        let reconciliation = self.session.reconciliation().await;
        let state = self.session.snapshot().await;
        ContractView {
            input: self.input().await,
            record: reconciliation.decoded,
            object: reconciliation.view,
            object_exists: reconciliation.object_exists,
            has_valid_data: reconciliation.has_valid_data,
            is_confirmed: state.is_confirmed(),
            state,
        }
    }

    pub async fn submit_current(&self) -> SubmissionOutcome {
        let input = self.input().await;
        self.submit(input).await
    }

    /// Runs one submission end to end. Every failure ends up in session state
    /// and in the returned outcome; nothing is propagated as an error.
    pub async fn submit(&self, input: CalculationInput) -> SubmissionOutcome {
        let Ok(_guard) = self.submit_guard.try_lock() else {
            warn!("submit: rejected, another submission is in flight");
            return SubmissionOutcome::Busy;
        };

        let submission_id = Uuid::new_v4();
        let epoch = self.session.begin_submission().await;
        self.publish_state().await;

        let outcome = self.drive_submission(submission_id, epoch, input).await;

        self.session.finish_submission(epoch).await;
        self.publish_state().await;
        info!(%submission_id, ?outcome, "submit: finished");
        outcome
    }

    async fn drive_submission(
        &self,
        submission_id: Uuid,
        epoch: u64,
        input: CalculationInput,
    ) -> SubmissionOutcome {
        let Some(sender) = self.signer.identity() else {
            let error = SessionError::no_identity();
            warn!(%submission_id, "submit: {}", error.message);
            self.session.record_failure(epoch, error.clone()).await;
            return SubmissionOutcome::Failed { error };
        };

        let request = build_calculation_request(&self.options.target, sender, &input);
        info!(
            %submission_id,
            target = %request.target(),
            sender = %request.sender,
            a = %request.arguments[0].value,
            b = %request.arguments[1].value,
            op = %request.arguments[2].value,
            "submit: requesting signature"
        );
        self.session
            .enter_phase(epoch, SubmissionPhase::AwaitingSignature)
            .await;
        self.publish_state().await;

        let digest = match self.signer.sign_and_execute(&request).await {
            Ok(digest) => digest,
            Err(err) => {
                error!(%submission_id, "submit: signer failed: {err:#}");
                let error = SessionError::new(ErrorKind::Signer, err.to_string());
                self.session.record_failure(epoch, error.clone()).await;
                return SubmissionOutcome::Failed { error };
            }
        };

        info!(%submission_id, %digest, "submit: transaction executed, awaiting settlement");
        if !self.session.record_digest(epoch, digest.clone()).await {
            info!(%submission_id, %digest, "submit: session cleared, dropping result");
            return SubmissionOutcome::Discarded {
                digest: Some(digest),
            };
        }
        self.publish_state().await;

        let effects = match self.ledger.await_settlement(&digest).await {
            Ok(effects) => effects,
            Err(err) => {
                error!(%submission_id, %digest, "submit: settlement wait failed: {err:#}");
                self.session
                    .enter_phase(epoch, SubmissionPhase::Incomplete)
                    .await;
                return SubmissionOutcome::SettlementUnconfirmed { digest };
            }
        };
        if let Some(status) = effects.status.as_ref().filter(|status| !status.is_success()) {
            warn!(
                %submission_id,
                %digest,
                status = %status.status,
                reason = status.error.as_deref().unwrap_or_default(),
                "submit: transaction settled unsuccessfully"
            );
        }
        info!(%submission_id, %digest, created = effects.created.len(), "submit: settled");

        let object_id = match first_created_record(&effects) {
            Ok(object_id) => object_id,
            Err(anomaly) => {
                return self
                    .handle_anomaly(submission_id, epoch, digest, anomaly)
                    .await
            }
        };

        match self
            .session
            .track_created_object(epoch, object_id.clone())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                info!(
                    %submission_id,
                    %object_id,
                    "submit: session cleared, dropping created object"
                );
                return SubmissionOutcome::Discarded {
                    digest: Some(digest),
                };
            }
            Err(err) => {
                warn!(
                    %submission_id,
                    %object_id,
                    "submit: failed to persist tracked object: {err:#}"
                );
            }
        }
        info!(%submission_id, %object_id, "submit: tracking created object");

        if !self
            .session
            .enter_phase(epoch, SubmissionPhase::Reconciled)
            .await
        {
            info!(%submission_id, %object_id, "submit: session cleared, skipping refetch");
            return SubmissionOutcome::Discarded {
                digest: Some(digest),
            };
        }
        self.refetch().await;

        SubmissionOutcome::Reconciled { digest, object_id }
    }

    async fn handle_anomaly(
        &self,
        submission_id: Uuid,
        epoch: u64,
        digest: TransactionDigest,
        anomaly: SettlementAnomaly,
    ) -> SubmissionOutcome {
        match self.options.anomaly_policy {
            AnomalyPolicy::Absorb => {
                error!(%submission_id, %digest, "submit: {anomaly}");
                self.session
                    .enter_phase(epoch, SubmissionPhase::Incomplete)
                    .await;
            }
            AnomalyPolicy::Surface => {
                warn!(%submission_id, %digest, "submit: {anomaly}");
                self.session
                    .record_failure(
                        epoch,
                        SessionError::new(ErrorKind::Settlement, anomaly.to_string()),
                    )
                    .await;
            }
        }
        SubmissionOutcome::Anomaly { digest, anomaly }
    }

    /// Reads the tracked object again and reconciles it. Read failures are
    /// kept as a fetch error in session state.
    pub async fn refetch(&self) -> Reconciliation {
        let Some(object_id) = self.session.object_id().await else {
            return self.session.reconciliation().await;
        };

        let result = self
            .ledger
            .fetch_object(&object_id, ObjectDataOptions::content_and_owner())
            .await
            .map_err(|err| {
                warn!(%object_id, "refetch: failed to read object: {err:#}");
                SessionError::new(ErrorKind::Fetch, err.to_string())
            });
        if !self.session.store_fetch(object_id.clone(), result).await {
            info!(%object_id, "refetch: tracked object changed, dropping read");
        }

        let reconciliation = self.session.reconciliation().await;
        let _ = self
            .events
            .send(ClientEvent::ObjectReconciled(reconciliation.clone()));
        self.publish_state().await;
        reconciliation
    }

    /// Attaches the session to an existing record, e.g. one shared by id.
    pub async fn track_object(&self, object_id: ObjectId) -> Reconciliation {
        if let Err(err) = self.session.set_object_id(object_id.clone()).await {
            warn!(%object_id, "track: failed to persist tracked object: {err:#}");
        }
        self.refetch().await
    }

    /// Forgets the tracked record locally. An in-flight submission is not
    /// aborted, but its remaining results are dropped.
    pub async fn clear_session(&self) {
        if let Err(err) = self.session.clear().await {
            warn!("clear: failed to clear persisted fragment: {err:#}");
        }
        self.publish_state().await;
    }

    async fn publish_state(&self) {
        let state = self.session.snapshot().await;
        let _ = self.events.send(ClientEvent::StateChanged(state));
    }
}

#[cfg(test)]
#[path = "tests/gated_fragments.rs"]
mod gated_fragments;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
