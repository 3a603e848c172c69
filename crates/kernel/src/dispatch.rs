//! Authorization Dispatcher: binds one confirmed Intent to one execution.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use ghostgate_ledger::{EntryDraft, ExecutionOutcome, ForensicLedger};
use ghostgate_types::{ActionDescriptor, ConfirmationMetrics, IntentId, Suggestion, TokenId};
use parking_lot::Mutex;
use rand::RngCore;
use tracing::{debug, error, info, warn};

use crate::bridge::{BridgeRegistry, ExecutionError, ResultDescriptor};
use crate::clock::{Clock, SystemClock};
use crate::config::DispatchConfig;
use crate::error::DispatchError;

const TOKEN_DOMAIN: &[u8] = b"ghostgate-token-v1:";

/// Proof that an Intent reached CONFIRMED through a full hold cycle.
///
/// Only [`IntentGate::authorize`](crate::gate::IntentGate::authorize) can
/// produce one. Cloning does not grant a second execution: the Dispatcher
/// admits each intent id once, and only within the confirmation lifetime.
#[derive(Clone, Debug)]
pub struct AuthorizedIntent {
    intent_id: IntentId,
    suggestion: Arc<Suggestion>,
    confirmation: ConfirmationMetrics,
    confirmed_at: Instant,
}

impl AuthorizedIntent {
    pub(crate) fn new(
        intent_id: IntentId,
        suggestion: Arc<Suggestion>,
        confirmation: ConfirmationMetrics,
        confirmed_at: Instant,
    ) -> Self {
        Self {
            intent_id,
            suggestion,
            confirmation,
            confirmed_at,
        }
    }

    pub fn intent_id(&self) -> IntentId {
        self.intent_id
    }

    pub fn suggestion(&self) -> &Arc<Suggestion> {
        &self.suggestion
    }

    pub fn confirmation(&self) -> ConfirmationMetrics {
        self.confirmation
    }

    /// Instant the Intent entered CONFIRMED, on the gate's clock.
    pub fn confirmed_at(&self) -> Instant {
        self.confirmed_at
    }
}

/// Token binding a WorkOrder to the Intent that earned it.
///
/// It travels inside the order, so it is spent with the one bridge call the
/// order is good for. Bridges check it with [`WorkOrder::verify_token`].
pub struct AuthorizationToken {
    id: TokenId,
    intent_id: IntentId,
    nonce: [u8; 32],
    held_ms: u64,
    minted_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    binding: blake3::Hash,
}

impl AuthorizationToken {
    fn mint(intent_id: IntentId, held_ms: u64, expires_at: Option<DateTime<Utc>>) -> Self {
        let mut nonce = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self {
            id: TokenId::new(),
            intent_id,
            binding: Self::digest(intent_id, &nonce, held_ms, expires_at),
            nonce,
            held_ms,
            minted_at: Utc::now(),
            expires_at,
        }
    }

    fn digest(
        intent_id: IntentId,
        nonce: &[u8; 32],
        held_ms: u64,
        expires_at: Option<DateTime<Utc>>,
    ) -> blake3::Hash {
        let expiry = expires_at.map_or(i64::MAX, |at| at.timestamp_millis());
        let mut hasher = blake3::Hasher::new();
        hasher.update(TOKEN_DOMAIN);
        hasher.update(intent_id.0.as_bytes());
        hasher.update(nonce);
        hasher.update(&held_ms.to_le_bytes());
        hasher.update(&expiry.to_le_bytes());
        hasher.finalize()
    }

    pub fn id(&self) -> TokenId {
        self.id
    }

    pub fn intent_id(&self) -> IntentId {
        self.intent_id
    }

    pub fn minted_at(&self) -> DateTime<Utc> {
        self.minted_at
    }

    /// End of the confirmation lifetime, if the Dispatcher enforces one.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    pub fn binding_hex(&self) -> String {
        self.binding.to_hex().to_string()
    }

    /// Whether the token was minted for `intent_id` with an unaltered hold
    /// and lifetime.
    pub fn is_bound_to(&self, intent_id: IntentId) -> bool {
        let digest = Self::digest(self.intent_id, &self.nonce, self.held_ms, self.expires_at);
        self.intent_id == intent_id && digest == self.binding
    }
}

impl std::fmt::Debug for AuthorizationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationToken")
            .field("id", &self.id)
            .field("intent_id", &self.intent_id)
            .field("minted_at", &self.minted_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// The payload handed to an execution bridge. Valid for exactly one call:
/// it is moved into the bridge and cannot be cloned.
#[derive(Debug)]
pub struct WorkOrder {
    intent_id: IntentId,
    action: ActionDescriptor,
    token: AuthorizationToken,
}

impl WorkOrder {
    pub fn intent_id(&self) -> IntentId {
        self.intent_id
    }

    pub fn action(&self) -> &ActionDescriptor {
        &self.action
    }

    pub fn token(&self) -> &AuthorizationToken {
        &self.token
    }

    /// Check the token before acting on the order.
    pub fn verify_token(&self) -> Result<(), ExecutionError> {
        self.verify_token_at(Utc::now())
    }

    /// A token is honored only for this order's intent and before its
    /// lifetime ends.
    pub fn verify_token_at(&self, now: DateTime<Utc>) -> Result<(), ExecutionError> {
        let token_id = self.token.id();
        if !self.token.is_bound_to(self.intent_id) {
            return Err(ExecutionError::TokenRejected {
                token_id,
                reason: "binding mismatch",
            });
        }
        if self.token.is_expired(now) {
            return Err(ExecutionError::TokenRejected {
                token_id,
                reason: "confirmation lifetime elapsed",
            });
        }
        Ok(())
    }
}

/// Issued after a successful, ledgered execution. Required to move the
/// Intent from CONFIRMED to EXECUTED.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchReceipt {
    intent_id: IntentId,
    ledger_sequence: u64,
    entry_hash: String,
    result: ResultDescriptor,
}

impl DispatchReceipt {
    pub(crate) fn new(
        intent_id: IntentId,
        ledger_sequence: u64,
        entry_hash: String,
        result: ResultDescriptor,
    ) -> Self {
        Self {
            intent_id,
            ledger_sequence,
            entry_hash,
            result,
        }
    }

    pub fn intent_id(&self) -> IntentId {
        self.intent_id
    }

    pub fn ledger_sequence(&self) -> u64 {
        self.ledger_sequence
    }

    pub fn entry_hash(&self) -> &str {
        &self.entry_hash
    }

    pub fn result(&self) -> &ResultDescriptor {
        &self.result
    }
}

/// Turns confirmed Intents into exactly one bridge call each and records
/// every attempt in the Forensic Ledger.
pub struct Dispatcher {
    ledger: Arc<ForensicLedger>,
    bridges: BridgeRegistry,
    config: DispatchConfig,
    clock: Arc<dyn Clock>,
    claimed: Mutex<HashSet<IntentId>>,
}

impl Dispatcher {
    pub fn new(
        ledger: Arc<ForensicLedger>,
        bridges: BridgeRegistry,
        config: DispatchConfig,
    ) -> Self {
        Self {
            ledger,
            bridges,
            config,
            clock: Arc::new(SystemClock),
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Measure confirmation age on `clock`. It must be the clock the gates
    /// run on.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ledger(&self) -> &Arc<ForensicLedger> {
        &self.ledger
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Whether `intent_id` has already been admitted for dispatch.
    pub fn is_claimed(&self, intent_id: &IntentId) -> bool {
        self.claimed.lock().contains(intent_id)
    }

    /// Execute a confirmed Intent once.
    ///
    /// The intent id is claimed before the bridge is called, so a second
    /// dispatch of the same id, concurrent or later, fails with
    /// [`DispatchError::DuplicateDispatch`] and has no side effect. A hold
    /// below the configured minimum or a confirmation older than its lifetime
    /// is refused before the claim. Every admitted attempt is ledgered,
    /// including failures and a missing bridge.
    pub async fn dispatch(
        &self,
        intent: AuthorizedIntent,
    ) -> Result<DispatchReceipt, DispatchError> {
        let intent_id = intent.intent_id;
        let required = self.config.required_hold();

        if !intent.confirmation.is_sufficient() || !intent.confirmation.satisfies(required) {
            error!(
                intent_id = %intent_id,
                held_ms = intent.confirmation.held_ms,
                required_ms = self.config.required_hold_ms,
                "dispatch refused: hold below minimum"
            );
            return Err(DispatchError::UnauthorizedDispatch {
                intent_id,
                reason: format!(
                    "held {}ms, dispatcher requires {}ms",
                    intent.confirmation.held_ms, self.config.required_hold_ms
                ),
            });
        }

        let expires_at = match self.config.confirmation_ttl() {
            Some(ttl) => {
                let age = self.clock.now().saturating_duration_since(intent.confirmed_at);
                if age >= ttl {
                    error!(
                        intent_id = %intent_id,
                        age_ms = millis(age),
                        ttl_ms = millis(ttl),
                        "dispatch refused: confirmation expired"
                    );
                    return Err(DispatchError::UnauthorizedDispatch {
                        intent_id,
                        reason: format!(
                            "confirmed {}ms ago, lifetime is {}ms",
                            millis(age),
                            millis(ttl)
                        ),
                    });
                }
                chrono::Duration::from_std(ttl - age)
                    .ok()
                    .and_then(|left| Utc::now().checked_add_signed(left))
            }
            None => None,
        };

        let fresh = self.claimed.lock().insert(intent_id);
        if !fresh {
            warn!(intent_id = %intent_id, "duplicate dispatch refused");
            return Err(DispatchError::DuplicateDispatch(intent_id));
        }

        let order = WorkOrder {
            intent_id,
            action: intent.suggestion.action.clone(),
            token: AuthorizationToken::mint(intent_id, intent.confirmation.held_ms, expires_at),
        };

        let result = self.invoke(order).await;

        let outcome = match &result {
            Ok(descriptor) => ExecutionOutcome::success(descriptor.as_str()),
            Err(failure) => ExecutionOutcome::failure(failure.to_string()),
        };
        let suggestion = intent.suggestion;
        let draft = EntryDraft {
            intent_id,
            suggestion_id: suggestion.id,
            action: suggestion.action.clone(),
            evidence: suggestion.evidence.clone(),
            confidence: suggestion.confidence,
            provenance: suggestion.provenance.clone(),
            confirmation: intent.confirmation,
            outcome: outcome.clone(),
        };

        let entry = match self.ledger.append(draft) {
            Ok(entry) => entry,
            Err(source) => {
                error!(
                    intent_id = %intent_id,
                    outcome = outcome.label(),
                    descriptor = outcome.descriptor(),
                    error = %source,
                    "failed to record dispatch attempt"
                );
                return Err(DispatchError::Ledger {
                    intent_id,
                    outcome,
                    source,
                });
            }
        };

        match result {
            Ok(descriptor) => {
                info!(
                    intent_id = %intent_id,
                    ledger_sequence = entry.sequence,
                    "dispatch succeeded"
                );
                Ok(DispatchReceipt::new(
                    intent_id,
                    entry.sequence,
                    entry.entry_hash,
                    descriptor,
                ))
            }
            Err(failure) => {
                warn!(
                    intent_id = %intent_id,
                    ledger_sequence = entry.sequence,
                    error = %failure,
                    "execution failed"
                );
                Err(DispatchError::ExecutionFailed {
                    failure: failure.to_string(),
                    ledger_sequence: entry.sequence,
                    entry_hash: entry.entry_hash,
                    suggestion,
                })
            }
        }
    }

    async fn invoke(&self, order: WorkOrder) -> Result<ResultDescriptor, ExecutionError> {
        let kind = order.action().kind.clone();
        let Some(bridge) = self.bridges.get(&kind) else {
            return Err(ExecutionError::NoBridge(kind));
        };

        debug!(
            intent_id = %order.intent_id(),
            token_id = %order.token().id(),
            bridge = bridge.name(),
            action = %kind,
            "invoking execution bridge"
        );

        match self.config.bridge_timeout() {
            Some(limit) => match tokio::time::timeout(limit, bridge.execute(order)).await {
                Ok(result) => result,
                Err(_) => Err(ExecutionError::Timeout(millis(limit))),
            },
            None => bridge.execute(order).await,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("bridges", &self.bridges)
            .field("config", &self.config)
            .field("claimed", &self.claimed.lock().len())
            .finish()
    }
}
