//! Typestate Intent.
//!
//! Each lifecycle state is a distinct type, and only the legal edges exist as
//! methods:
//!
//! ```text
//! Generated --reveal--> Visible --arm--> Armed --confirm--> Confirmed --execute--> EXECUTED
//!                          ^               |
//!                          +----release----+
//!
//! any live state --expire--> EXPIRED
//! ```
//!
//! Shortcuts such as generated-to-confirmed or armed-to-executed have no
//! method, so they cannot be written:
//!
//! ```compile_fail
//! use std::sync::Arc;
//! use std::time::Instant;
//! use ghostgate_kernel::intent::Intent;
//! use ghostgate_types::{ActionDescriptor, Evidence, Suggestion};
//!
//! let suggestion = Suggestion::builder("track-1", ActionDescriptor::new("mute"))
//!     .evidence(Evidence::new("rms", 0.0, 0.0, "silence"))
//!     .build()
//!     .unwrap();
//! let generated = Intent::new(Arc::new(suggestion), Instant::now());
//! let _ = generated.confirm(Instant::now(), std::time::Duration::ZERO);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use ghostgate_types::{ConfirmationMetrics, ContextId, IntentId, Suggestion, SuggestionId};
use serde::{Deserialize, Serialize};

use crate::dispatch::DispatchReceipt;

/// Runtime view of an Intent's lifecycle position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentState {
    Generated,
    Visible,
    Armed,
    Confirmed,
    Executed,
    Expired,
}

impl IntentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IntentState::Executed | IntentState::Expired)
    }
}

impl std::fmt::Display for IntentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IntentState::Generated => "GENERATED",
            IntentState::Visible => "VISIBLE",
            IntentState::Armed => "ARMED",
            IntentState::Confirmed => "CONFIRMED",
            IntentState::Executed => "EXECUTED",
            IntentState::Expired => "EXPIRED",
        };
        f.write_str(name)
    }
}

/// Why an Intent was expired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryReason {
    /// The gate's context moved away from the one the Intent was bound to.
    ContextMismatch,
    /// The gate was torn down.
    Shutdown,
    /// Replaced by a fresh Intent for the same Suggestion.
    Superseded,
}

impl std::fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpiryReason::ContextMismatch => f.write_str("context mismatch"),
            ExpiryReason::Shutdown => f.write_str("shutdown"),
            ExpiryReason::Superseded => f.write_str("superseded"),
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Marker for an Intent lifecycle stage. Sealed: no stages exist outside
/// this module.
pub trait Stage: sealed::Sealed {
    const STATE: IntentState;
}

/// Stages from which an Intent can still expire.
pub trait Live: Stage {}

#[derive(Debug)]
pub struct Generated;

#[derive(Debug)]
pub struct Visible;

#[derive(Debug)]
pub struct Armed {
    since: Instant,
}

#[derive(Debug)]
pub struct Confirmed {
    metrics: ConfirmationMetrics,
}

impl sealed::Sealed for Generated {}
impl sealed::Sealed for Visible {}
impl sealed::Sealed for Armed {}
impl sealed::Sealed for Confirmed {}

impl Stage for Generated {
    const STATE: IntentState = IntentState::Generated;
}
impl Stage for Visible {
    const STATE: IntentState = IntentState::Visible;
}
impl Stage for Armed {
    const STATE: IntentState = IntentState::Armed;
}
impl Stage for Confirmed {
    const STATE: IntentState = IntentState::Confirmed;
}

impl Live for Generated {}
impl Live for Visible {}
impl Live for Armed {}
impl Live for Confirmed {}

/// One Suggestion moving through the confirmation lifecycle.
#[derive(Debug)]
pub struct Intent<S: Stage> {
    id: IntentId,
    suggestion: Arc<Suggestion>,
    binding: ContextId,
    entered_at: Instant,
    stage: S,
}

impl<S: Stage> Intent<S> {
    pub fn id(&self) -> IntentId {
        self.id
    }

    pub fn suggestion(&self) -> &Arc<Suggestion> {
        &self.suggestion
    }

    /// Context captured when the Intent was generated.
    pub fn binding(&self) -> &ContextId {
        &self.binding
    }

    /// Instant the current state was entered.
    pub fn entered_at(&self) -> Instant {
        self.entered_at
    }

    pub fn state(&self) -> IntentState {
        S::STATE
    }

    fn advance<T: Stage>(self, stage: T, now: Instant) -> Intent<T> {
        Intent {
            id: self.id,
            suggestion: self.suggestion,
            binding: self.binding,
            entered_at: now,
            stage,
        }
    }
}

impl<S: Live> Intent<S> {
    /// Terminal: an expired Intent can never be confirmed or executed.
    pub fn expire(self, reason: ExpiryReason) -> TerminalIntent {
        TerminalIntent {
            id: self.id,
            suggestion_id: self.suggestion.id,
            termination: Termination::Expired(reason),
        }
    }
}

impl Intent<Generated> {
    /// Wrap a Suggestion, binding it to the Suggestion's own context.
    pub fn new(suggestion: Arc<Suggestion>, now: Instant) -> Self {
        Self {
            id: IntentId::new(),
            binding: suggestion.context.clone(),
            suggestion,
            entered_at: now,
            stage: Generated,
        }
    }

    pub fn reveal(self, now: Instant) -> Intent<Visible> {
        self.advance(Visible, now)
    }
}

impl Intent<Visible> {
    /// The user began holding the confirmation input. Starts the hold timer.
    pub fn arm(self, now: Instant) -> Intent<Armed> {
        self.advance(Armed { since: now }, now)
    }
}

impl Intent<Armed> {
    /// Continuous hold so far.
    pub fn held(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stage.since)
    }

    /// Hold released before a confirm action. Returns the hold achieved.
    pub fn release(self, now: Instant) -> (Intent<Visible>, Duration) {
        let held = self.held(now);
        (self.advance(Visible, now), held)
    }

    /// Honor a confirm action if the hold has reached `min_hold`.
    ///
    /// On a premature confirm the Intent is handed back unchanged, still
    /// armed and still timing.
    pub fn confirm(self, now: Instant, min_hold: Duration) -> Result<Intent<Confirmed>, Self> {
        let held = self.held(now);
        if held < min_hold {
            return Err(self);
        }
        let metrics = ConfirmationMetrics::new(held, min_hold);
        Ok(self.advance(Confirmed { metrics }, now))
    }
}

impl Intent<Confirmed> {
    pub fn metrics(&self) -> ConfirmationMetrics {
        self.stage.metrics
    }

    /// Complete the lifecycle with the Dispatcher's receipt for this Intent.
    ///
    /// A receipt issued for another Intent is refused and the Intent is
    /// handed back unchanged.
    pub fn execute(self, receipt: &DispatchReceipt) -> Result<TerminalIntent, Self> {
        if receipt.intent_id() != self.id {
            return Err(self);
        }
        Ok(TerminalIntent {
            id: self.id,
            suggestion_id: self.suggestion.id,
            termination: Termination::Executed {
                ledger_sequence: receipt.ledger_sequence(),
            },
        })
    }
}

/// How an Intent ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Executed { ledger_sequence: u64 },
    Expired(ExpiryReason),
}

/// What remains of an Intent after it terminates: its id and how it ended.
/// The Suggestion itself is dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalIntent {
    pub id: IntentId,
    pub suggestion_id: SuggestionId,
    pub termination: Termination,
}

impl TerminalIntent {
    pub fn state(&self) -> IntentState {
        match self.termination {
            Termination::Executed { .. } => IntentState::Executed,
            Termination::Expired(_) => IntentState::Expired,
        }
    }

    pub fn expiry_reason(&self) -> Option<ExpiryReason> {
        match self.termination {
            Termination::Expired(reason) => Some(reason),
            Termination::Executed { .. } => None,
        }
    }
}
