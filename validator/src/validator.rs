//! The presentation state machine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rollcall_store::identity::apply_rotation;
use rollcall_store::{IdentityRecord, IdentityStore, RotateOutcome, StoreError};
use rollcall_token::{IssuedToken, Payload, TokenMinter};
use rollcall_types::{IdentityId, Outcome, Timestamp};
use tracing::Instrument;

use crate::event::{EventBus, PresentationEvent};
use crate::metrics::ValidatorMetrics;
use crate::replay_guard::{GuardConfig, GuardDecision, ReplayGuard};
use crate::verdict::{DuplicateReason, Verdict};
use crate::ValidationError;

/// Default replay-guard cooldown.
pub const DEFAULT_COOLDOWN_SECS: u64 = 5;

/// Default bound on a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(2_000);

#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Minimum gap between two reads of the same identity. Zero disables the
    /// replay guard's rejection.
    pub cooldown_secs: u64,
    /// A store call that takes longer fails the attempt as transient.
    pub store_timeout: Duration,
    pub guard: GuardConfig,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            guard: GuardConfig::default(),
        }
    }
}

/// Classifies presentations and rotates tokens on acceptance.
///
/// Shared via `Arc`; any number of `validate` calls may run concurrently.
/// The store's compare-and-rotate guarantees at most one acceptance per
/// issued token no matter how the calls interleave.
pub struct PresentationValidator {
    store: Arc<dyn IdentityStore>,
    minter: TokenMinter,
    guard: ReplayGuard,
    events: EventBus,
    metrics: Arc<ValidatorMetrics>,
    config: ValidatorConfig,
    /// Rotations whose store call timed out; they may have committed anyway.
    pending: Mutex<HashMap<IdentityId, PendingRotation>>,
}

struct PendingRotation {
    presented: Timestamp,
    token: IssuedToken,
    attempted_at: Timestamp,
}

/// What is known about the subject when an attempt finishes, for the event.
struct Subject {
    identity_id: Option<IdentityId>,
    display_name: String,
    group_label: String,
}

impl Subject {
    fn unknown() -> Self {
        Self {
            identity_id: None,
            display_name: String::new(),
            group_label: String::new(),
        }
    }

    fn from_payload(payload: &Payload) -> Self {
        Self {
            identity_id: Some(payload.identity_id.clone()),
            display_name: payload.display_name.clone(),
            group_label: payload.group_label.clone(),
        }
    }

    fn from_record(record: &IdentityRecord) -> Self {
        Self {
            identity_id: Some(record.identity_id.clone()),
            display_name: record.display_name.clone(),
            group_label: record.group_label.clone(),
        }
    }
}

impl PresentationValidator {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        minter: TokenMinter,
        config: ValidatorConfig,
    ) -> Self {
        Self {
            store,
            minter,
            guard: ReplayGuard::new(config.guard),
            events: EventBus::default(),
            metrics: Arc::new(ValidatorMetrics::new()),
            config,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the metrics sink, e.g. to share one registry with the host.
    pub fn with_metrics(mut self, metrics: Arc<ValidatorMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn metrics(&self) -> &Arc<ValidatorMetrics> {
        &self.metrics
    }

    pub fn replay_guard(&self) -> &ReplayGuard {
        &self.guard
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Drop stale replay-guard entries. Returns how many were removed.
    pub fn sweep_replay_guard(&self, now: Timestamp) -> usize {
        let removed = self.guard.sweep(now, self.config.cooldown_secs);
        self.metrics.replay_guard_entries.set(self.guard.len() as i64);

        let horizon = self
            .config
            .cooldown_secs
            .saturating_mul(self.config.guard.sweep_multiplier.max(1));
        self.lock_pending()
            .retain(|_, p| !p.attempted_at.has_expired(horizon, now));
        removed
    }

    /// Classify one decoded payload read at `now`.
    ///
    /// Every terminal classification is `Ok`. `Err` means the attempt was
    /// not classified; on a transient error the caller may resubmit.
    pub async fn validate(&self, raw: &str, now: Timestamp) -> Result<Verdict, ValidationError> {
        let span = tracing::info_span!(
            "presentation",
            identity = tracing::field::Empty,
            outcome = tracing::field::Empty
        );
        let started = Instant::now();
        let result = self.run(raw, now).instrument(span).await;

        self.metrics
            .validation_latency_ms
            .observe(started.elapsed().as_secs_f64() * 1_000.0);
        self.metrics.replay_guard_entries.set(self.guard.len() as i64);
        result
    }

    async fn run(&self, raw: &str, now: Timestamp) -> Result<Verdict, ValidationError> {
        let payload = match Payload::parse(raw) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(error = %e, "malformed payload");
                return Ok(self.finish(Verdict::Malformed(e), Subject::unknown(), now));
            }
        };
        let id = &payload.identity_id;
        tracing::Span::current().record("identity", tracing::field::display(id));

        if let GuardDecision::WithinCooldown { last_seen } =
            self.guard.check_and_mark(id, now, self.config.cooldown_secs)
        {
            tracing::debug!(%last_seen, "read within cooldown");
            let verdict = Verdict::Duplicate {
                identity_id: id.clone(),
                reason: DuplicateReason::Cooldown,
            };
            return Ok(self.finish(verdict, Subject::from_payload(&payload), now));
        }

        match self.classify(&payload, now).await {
            Ok(verdict) => Ok(verdict),
            Err(e) => {
                self.guard.release(id, now);
                if e.is_transient() {
                    tracing::warn!(error = %e, "presentation not classified");
                    self.metrics.record_outcome(Outcome::TransientError);
                    self.emit(
                        Outcome::TransientError,
                        Subject::from_payload(&payload),
                        now,
                        Some(e.to_string()),
                    );
                } else {
                    tracing::error!(error = %e, "presentation failed");
                }
                Err(e)
            }
        }
    }

    /// Steps after the replay guard: lookup, freshness, rotation.
    async fn classify(
        &self,
        payload: &Payload,
        now: Timestamp,
    ) -> Result<Verdict, ValidationError> {
        let id = payload.identity_id.clone();

        let lookup_id = id.clone();
        let record = match self.store_call("get", move |store| store.get(&lookup_id)).await? {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                // Unenrolled ids do not occupy the guard.
                self.guard.release(&id, now);
                let verdict = Verdict::UnknownIdentity(id);
                return Ok(self.finish(verdict, Subject::from_payload(payload), now));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(token) = self.committed_pending(payload, &record) {
            tracing::info!("earlier timed-out rotation had committed");
            self.metrics.rotations.inc();
            let subject = Subject::from_record(&record);
            return Ok(self.finish(Verdict::Accepted { record, token }, subject, now));
        }

        let presented = payload.issued_at;
        let current = record.watermark();
        if presented < current {
            let verdict = Verdict::Stale {
                identity_id: id,
                presented,
                current,
            };
            return Ok(self.finish(verdict, Subject::from_record(&record), now));
        }

        let token = self.minter.mint_after(
            &record.identity_id,
            &record.display_name,
            &record.group_label,
            current.max(presented),
        )?;

        let expected = record.issued_at;
        let new_issued_at = token.issued_at();
        let bytes = token.encoded.as_bytes().to_vec();
        let rotate_id = id.clone();
        let rotated = match self
            .store_call("compare_and_rotate", move |store| {
                store.compare_and_rotate(&rotate_id, expected, &bytes, new_issued_at, Some(now))
            })
            .await
        {
            Ok(rotated) => rotated,
            Err(e) => {
                self.lock_pending().insert(
                    id,
                    PendingRotation {
                        presented,
                        token,
                        attempted_at: now,
                    },
                );
                return Err(e);
            }
        };

        let subject = Subject::from_record(&record);
        let verdict = match rotated {
            Ok(RotateOutcome::Rotated) => {
                self.metrics.rotations.inc();
                let mut record = record;
                apply_rotation(&mut record, token.encoded.as_bytes(), new_issued_at, Some(now));
                Verdict::Accepted { record, token }
            }
            Ok(RotateOutcome::Conflict) => Verdict::Duplicate {
                identity_id: id,
                reason: DuplicateReason::LostRace,
            },
            Err(StoreError::NotFound(_)) => Verdict::UnknownIdentity(id),
            Err(e) => return Err(e.into()),
        };
        Ok(self.finish(verdict, subject, now))
    }

    /// The token of an earlier timed-out rotation for this same frame, if
    /// `record` shows that it committed. The pending entry is consumed either
    /// way, so a commit is reported as accepted at most once.
    fn committed_pending(&self, payload: &Payload, record: &IdentityRecord) -> Option<IssuedToken> {
        let pending = self.lock_pending().remove(&record.identity_id)?;
        let committed = pending.presented == payload.issued_at
            && record.issued_at == Some(pending.token.issued_at())
            && record.current_token.as_deref() == Some(pending.token.encoded.as_bytes());
        committed.then_some(pending.token)
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<IdentityId, PendingRotation>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run a store call off the async runtime, bounded by the store timeout.
    ///
    /// The outer `Err` is a transient failure; the inner result carries the
    /// store's own answer.
    async fn store_call<T, F>(
        &self,
        op: &'static str,
        f: F,
    ) -> Result<Result<T, StoreError>, ValidationError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn IdentityStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || f(store.as_ref()));
        match tokio::time::timeout(self.config.store_timeout, task).await {
            Err(_) => Err(ValidationError::TransientStore(format!(
                "{op} timed out after {}ms",
                self.config.store_timeout.as_millis()
            ))),
            Ok(Err(join)) => Err(ValidationError::TransientStore(format!(
                "{op} task failed: {join}"
            ))),
            Ok(Ok(Err(e))) if e.is_transient() => {
                Err(ValidationError::TransientStore(format!("{op}: {e}")))
            }
            Ok(Ok(result)) => Ok(result),
        }
    }

    fn finish(&self, verdict: Verdict, subject: Subject, now: Timestamp) -> Verdict {
        let outcome = verdict.outcome();
        tracing::Span::current().record("outcome", outcome.as_str());
        match &verdict {
            Verdict::Accepted { token, .. } => {
                tracing::info!(issued_at = %token.issued_at(), "presentation accepted")
            }
            other => tracing::info!(outcome = %other.outcome(), "presentation rejected"),
        }
        self.metrics.record_outcome(outcome);
        self.emit(outcome, subject, now, verdict.detail());
        verdict
    }

    fn emit(&self, outcome: Outcome, subject: Subject, now: Timestamp, detail: Option<String>) {
        self.events.emit(PresentationEvent {
            outcome,
            identity_id: subject.identity_id,
            display_name: subject.display_name,
            group_label: subject.group_label,
            timestamp: now,
            detail,
        });
    }
}
