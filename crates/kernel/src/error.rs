use std::sync::Arc;
use std::time::Duration;

use ghostgate_ledger::{ExecutionOutcome, LedgerError};
use ghostgate_types::{ContextId, IntentId, Suggestion};
use thiserror::Error;

use crate::gate::GateEvent;
use crate::intent::IntentState;

/// Rejections from the Intent Gate. None of these touch the ledger, and the
/// Intent's state is unchanged unless stated otherwise.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GateError {
    #[error("invalid transition for {intent_id}: {event} in state {from}")]
    InvalidTransition {
        intent_id: IntentId,
        from: IntentState,
        event: GateEvent,
    },

    /// Confirm arrived before the minimum hold. The Intent stays armed.
    #[error("hold incomplete: held {held:?} of required {required:?}")]
    HoldIncomplete { held: Duration, required: Duration },

    /// The binding context no longer matches. The Intent has been expired.
    #[error("context mismatch for {intent_id}: bound to {bound}, gate is on {current}")]
    ContextMismatch {
        intent_id: IntentId,
        bound: ContextId,
        current: ContextId,
    },

    #[error("receipt for {receipt} presented to {intent_id}")]
    ReceiptMismatch {
        intent_id: IntentId,
        receipt: IntentId,
    },

    #[error("unknown intent: {0}")]
    UnknownIntent(IntentId),

    #[error("gate has been shut down")]
    ShutDown,
}

/// Errors from the Authorization Dispatcher.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Integration error: the intent did not come through a full
    /// confirmation. No side effect was performed.
    #[error("unauthorized dispatch of {intent_id}: {reason}")]
    UnauthorizedDispatch { intent_id: IntentId, reason: String },

    /// The intent id was already claimed. No bridge call, no ledger entry.
    #[error("duplicate dispatch of {0}")]
    DuplicateDispatch(IntentId),

    /// The bridge reported failure. The attempt is recorded at
    /// `ledger_sequence`; a retry needs a fresh Intent for `suggestion`.
    #[error("execution failed (ledger #{ledger_sequence}): {failure}")]
    ExecutionFailed {
        failure: String,
        ledger_sequence: u64,
        entry_hash: String,
        suggestion: Arc<Suggestion>,
    },

    /// The bridge was called but the attempt could not be sealed. The
    /// intent stays claimed; `outcome` is the only record of what happened.
    #[error(
        "attempt for {intent_id} ended in {} but was not recorded: {source}",
        .outcome.label()
    )]
    Ledger {
        intent_id: IntentId,
        outcome: ExecutionOutcome,
        source: LedgerError,
    },
}

/// Errors surfaced by the Orchestrator, which drives both halves.
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("gate error: {0}")]
    Gate(#[from] GateError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}
