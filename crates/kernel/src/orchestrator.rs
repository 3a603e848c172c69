use std::sync::Arc;

use ghostgate_types::IntentId;
use parking_lot::Mutex;
use tracing::{error, warn};

use crate::board::GateBoard;
use crate::dispatch::{AuthorizedIntent, DispatchReceipt, Dispatcher};
use crate::error::{DispatchError, GateError, KernelError};
use crate::gate::{GateSignal, IntentGate};

/// Wires confirmed gates to the Dispatcher and applies receipts back.
///
/// For hosts that keep several gates busy at once, the three phases are
/// also exposed separately: [`authorize`](Self::authorize) borrows the gate
/// briefly, the dispatch future owns nothing of it, and
/// [`complete`](Self::complete) re-borrows it to apply the receipt.
#[derive(Clone, Debug)]
pub struct Orchestrator {
    dispatcher: Arc<Dispatcher>,
}

impl Orchestrator {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Dispatch the gate's confirmed Intent and move it to EXECUTED.
    pub async fn execute(&self, gate: &mut IntentGate) -> Result<DispatchReceipt, KernelError> {
        let authorized = self.authorize(gate)?;
        let receipt = self.dispatcher.dispatch(authorized).await?;
        self.complete(gate, &receipt);
        Ok(receipt)
    }

    /// [`execute`](Self::execute) for a gate held by a shared board.
    ///
    /// The board is locked only to authorize and to apply the receipt. While
    /// the bridge runs, other gates on it keep ticking and taking input.
    pub async fn execute_on(
        &self,
        board: &Mutex<GateBoard>,
        intent_id: &IntentId,
    ) -> Result<DispatchReceipt, KernelError> {
        let authorized = {
            let board = board.lock();
            let gate = board
                .gate(intent_id)
                .ok_or(GateError::UnknownIntent(*intent_id))?;
            self.authorize(gate)?
        };

        let receipt = self.dispatcher.dispatch(authorized).await?;

        match board.lock().gate_mut(intent_id) {
            Some(gate) => {
                self.complete(gate, &receipt);
            }
            None => warn!(
                intent_id = %intent_id,
                ledger_sequence = receipt.ledger_sequence(),
                "gate left the board while its action ran"
            ),
        }
        Ok(receipt)
    }

    pub fn authorize(&self, gate: &IntentGate) -> Result<AuthorizedIntent, DispatchError> {
        gate.authorize().ok_or_else(|| {
            error!(
                intent_id = %gate.id(),
                state = %gate.state(),
                "dispatch requested for unconfirmed intent"
            );
            DispatchError::UnauthorizedDispatch {
                intent_id: gate.id(),
                reason: format!("intent is {}, not CONFIRMED", gate.state()),
            }
        })
    }

    /// Apply a receipt to its gate.
    ///
    /// The action has already run and been ledgered, so a gate that can no
    /// longer accept the receipt (it expired while the bridge was busy) is
    /// logged rather than treated as a dispatch failure.
    pub fn complete(&self, gate: &mut IntentGate, receipt: &DispatchReceipt) -> Option<GateSignal> {
        match gate.mark_executed(receipt) {
            Ok(signal) => Some(signal),
            Err(err) => {
                warn!(
                    intent_id = %gate.id(),
                    ledger_sequence = receipt.ledger_sequence(),
                    error = %err,
                    "executed action could not be applied to its gate"
                );
                None
            }
        }
    }
}
