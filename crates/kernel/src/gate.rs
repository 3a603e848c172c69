use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ghostgate_types::{ConfirmationMetrics, ContextId, IntentId, Suggestion};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::GateConfig;
use crate::dispatch::{AuthorizedIntent, DispatchReceipt};
use crate::error::GateError;
use crate::filter::{MinConfidence, VisibilityFilter};
use crate::intent::{
    Armed, Confirmed, ExpiryReason, Generated, Intent, IntentState, TerminalIntent, Visible,
};

/// Host events routed to a gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateEvent {
    /// User began holding the confirmation input.
    Press,
    /// User let go of the confirmation input.
    Release,
    /// Discrete confirming action while holding.
    Confirm,
    /// Dispatch receipt presented.
    Execute,
    /// Replace the Intent with a fresh one for the same Suggestion.
    Retry,
}

impl std::fmt::Display for GateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GateEvent::Press => "press",
            GateEvent::Release => "release",
            GateEvent::Confirm => "confirm",
            GateEvent::Execute => "execute",
            GateEvent::Retry => "retry",
        };
        f.write_str(name)
    }
}

/// Informational outcome of a gate event or tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateSignal {
    Revealed,
    Armed,
    /// Hold sampled on tick, still below the minimum.
    HoldProgress { held: Duration, required: Duration },
    /// Hold reached the minimum. Reported once per arming.
    HoldSatisfied { held: Duration },
    /// Released before the minimum: the "changed my mind" path.
    HoldTooShort { held: Duration, required: Duration },
    /// Released after the minimum without confirming.
    Released { held: Duration },
    Confirmed(ConfirmationMetrics),
    Executed { ledger_sequence: u64 },
    Expired(ExpiryReason),
}

/// Why a journaled transition happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum TransitionCause {
    Revealed,
    Pressed,
    Released { held_ms: u64 },
    Confirmed { held_ms: u64 },
    Executed { ledger_sequence: u64 },
    Expired { reason: ExpiryReason },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionRecord {
    pub from: IntentState,
    pub to: IntentState,
    pub at: Instant,
    pub cause: TransitionCause,
}

enum IntentSlot {
    Generated(Intent<Generated>),
    Visible(Intent<Visible>),
    Armed(Intent<Armed>),
    Confirmed(Intent<Confirmed>),
    Terminal(TerminalIntent),
    /// Only observable between `take()` and the write-back.
    Vacant,
}

impl IntentSlot {
    fn state(&self) -> IntentState {
        match self {
            IntentSlot::Generated(i) => i.state(),
            IntentSlot::Visible(i) => i.state(),
            IntentSlot::Armed(i) => i.state(),
            IntentSlot::Confirmed(i) => i.state(),
            IntentSlot::Terminal(t) => t.state(),
            IntentSlot::Vacant => IntentState::Expired,
        }
    }

    fn suggestion(&self) -> Option<&Arc<Suggestion>> {
        match self {
            IntentSlot::Generated(i) => Some(i.suggestion()),
            IntentSlot::Visible(i) => Some(i.suggestion()),
            IntentSlot::Armed(i) => Some(i.suggestion()),
            IntentSlot::Confirmed(i) => Some(i.suggestion()),
            IntentSlot::Terminal(_) | IntentSlot::Vacant => None,
        }
    }

    fn binding(&self) -> Option<&ContextId> {
        match self {
            IntentSlot::Generated(i) => Some(i.binding()),
            IntentSlot::Visible(i) => Some(i.binding()),
            IntentSlot::Armed(i) => Some(i.binding()),
            IntentSlot::Confirmed(i) => Some(i.binding()),
            IntentSlot::Terminal(_) | IntentSlot::Vacant => None,
        }
    }
}

/// Runtime driver for one Intent.
///
/// Maps host events onto the typestate [`Intent`] methods. Events that do
/// not apply to the current state are rejected with
/// [`GateError::InvalidTransition`] and leave the state as it was. Every
/// applied transition is journaled and traced.
pub struct IntentGate {
    id: IntentId,
    slot: IntentSlot,
    current_context: ContextId,
    config: GateConfig,
    clock: Arc<dyn Clock>,
    filter: Arc<dyn VisibilityFilter>,
    journal: VecDeque<TransitionRecord>,
    hold_reported: bool,
    shut_down: bool,
}

impl IntentGate {
    /// Gate for `suggestion` with a [`MinConfidence`] filter taken from
    /// `config.min_confidence_to_show`.
    pub fn new(
        suggestion: Arc<Suggestion>,
        current_context: ContextId,
        config: GateConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let filter = Arc::new(MinConfidence::new(config.min_confidence_to_show));
        Self::with_filter(suggestion, current_context, config, clock, filter)
    }

    pub fn with_filter(
        suggestion: Arc<Suggestion>,
        current_context: ContextId,
        config: GateConfig,
        clock: Arc<dyn Clock>,
        filter: Arc<dyn VisibilityFilter>,
    ) -> Self {
        let intent = Intent::new(suggestion, clock.now());
        let id = intent.id();
        debug!(
            intent_id = %id,
            suggestion_id = %intent.suggestion().id,
            binding = %intent.binding(),
            "intent generated"
        );

        let mut gate = Self {
            id,
            slot: IntentSlot::Generated(intent),
            current_context,
            journal: VecDeque::with_capacity(config.journal_capacity.min(64)),
            config,
            clock,
            filter,
            hold_reported: false,
            shut_down: false,
        };

        if gate.slot.binding() != Some(&gate.current_context) {
            gate.expire(ExpiryReason::ContextMismatch);
        } else {
            gate.tick();
        }
        gate
    }

    pub fn id(&self) -> IntentId {
        self.id
    }

    pub fn state(&self) -> IntentState {
        self.slot.state()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// The Suggestion, while the Intent is live.
    pub fn suggestion(&self) -> Option<&Arc<Suggestion>> {
        self.slot.suggestion()
    }

    pub fn binding(&self) -> Option<&ContextId> {
        self.slot.binding()
    }

    pub fn current_context(&self) -> &ContextId {
        &self.current_context
    }

    pub fn terminal(&self) -> Option<&TerminalIntent> {
        match &self.slot {
            IntentSlot::Terminal(t) => Some(t),
            _ => None,
        }
    }

    /// Current hold, when armed.
    pub fn held(&self) -> Option<Duration> {
        match &self.slot {
            IntentSlot::Armed(intent) => Some(intent.held(self.clock.now())),
            _ => None,
        }
    }

    pub fn journal(&self) -> impl Iterator<Item = &TransitionRecord> {
        self.journal.iter()
    }

    /// Swap the visibility filter. Takes effect on the next tick.
    pub fn set_filter(&mut self, filter: Arc<dyn VisibilityFilter>) {
        self.filter = filter;
    }

    /// Poll time-dependent conditions.
    ///
    /// Reveals a generated Intent once it passes the visibility filter and
    /// samples the hold of an armed one.
    pub fn tick(&mut self) -> Option<GateSignal> {
        if self.shut_down {
            return None;
        }
        let now = self.clock.now();

        match self.take() {
            IntentSlot::Generated(intent) if self.filter.is_visible(intent.suggestion()) => {
                self.slot = IntentSlot::Visible(intent.reveal(now));
                self.record(
                    IntentState::Generated,
                    IntentState::Visible,
                    now,
                    TransitionCause::Revealed,
                );
                Some(GateSignal::Revealed)
            }
            IntentSlot::Armed(intent) => {
                let held = intent.held(now);
                self.slot = IntentSlot::Armed(intent);
                let required = self.config.min_hold();
                if held < required {
                    Some(GateSignal::HoldProgress { held, required })
                } else if !self.hold_reported {
                    self.hold_reported = true;
                    debug!(intent_id = %self.id, held_ms = millis(held), "hold satisfied");
                    Some(GateSignal::HoldSatisfied { held })
                } else {
                    None
                }
            }
            other => {
                self.slot = other;
                None
            }
        }
    }

    /// VISIBLE -> ARMED. Starts the hold timer from zero.
    pub fn press(&mut self) -> Result<GateSignal, GateError> {
        self.ensure_open()?;
        let now = self.clock.now();

        match self.take() {
            IntentSlot::Visible(intent) => {
                self.slot = IntentSlot::Armed(intent.arm(now));
                self.hold_reported = false;
                self.record(
                    IntentState::Visible,
                    IntentState::Armed,
                    now,
                    TransitionCause::Pressed,
                );
                Ok(GateSignal::Armed)
            }
            other => Err(self.reject(other, GateEvent::Press)),
        }
    }

    /// ARMED -> VISIBLE. An early release is reported as
    /// [`GateSignal::HoldTooShort`], not as an error.
    pub fn release(&mut self) -> Result<GateSignal, GateError> {
        self.ensure_open()?;
        let now = self.clock.now();

        match self.take() {
            IntentSlot::Armed(intent) => {
                let (visible, held) = intent.release(now);
                self.slot = IntentSlot::Visible(visible);
                self.record(
                    IntentState::Armed,
                    IntentState::Visible,
                    now,
                    TransitionCause::Released {
                        held_ms: millis(held),
                    },
                );

                let required = self.config.min_hold();
                if held < required {
                    debug!(intent_id = %self.id, held_ms = millis(held), "hold too short");
                    Ok(GateSignal::HoldTooShort { held, required })
                } else {
                    Ok(GateSignal::Released { held })
                }
            }
            other => Err(self.reject(other, GateEvent::Release)),
        }
    }

    /// ARMED -> CONFIRMED, if the hold has reached the minimum.
    ///
    /// The binding context is re-validated first; a mismatch expires the
    /// Intent. A confirm before the minimum is refused with
    /// [`GateError::HoldIncomplete`] and the Intent stays armed.
    pub fn confirm(&mut self) -> Result<GateSignal, GateError> {
        self.ensure_open()?;
        let now = self.clock.now();

        match self.take() {
            IntentSlot::Armed(intent) => {
                if intent.binding() != &self.current_context {
                    let bound = intent.binding().clone();
                    self.slot = IntentSlot::Terminal(intent.expire(ExpiryReason::ContextMismatch));
                    self.record(
                        IntentState::Armed,
                        IntentState::Expired,
                        now,
                        TransitionCause::Expired {
                            reason: ExpiryReason::ContextMismatch,
                        },
                    );
                    warn!(
                        intent_id = %self.id,
                        bound = %bound,
                        current = %self.current_context,
                        "confirm refused: context changed"
                    );
                    return Err(GateError::ContextMismatch {
                        intent_id: self.id,
                        bound,
                        current: self.current_context.clone(),
                    });
                }

                let required = self.config.min_hold();
                match intent.confirm(now, required) {
                    Ok(confirmed) => {
                        let metrics = confirmed.metrics();
                        self.slot = IntentSlot::Confirmed(confirmed);
                        self.record(
                            IntentState::Armed,
                            IntentState::Confirmed,
                            now,
                            TransitionCause::Confirmed {
                                held_ms: metrics.held_ms,
                            },
                        );
                        info!(intent_id = %self.id, held_ms = metrics.held_ms, "intent confirmed");
                        Ok(GateSignal::Confirmed(metrics))
                    }
                    Err(armed) => {
                        let held = armed.held(now);
                        self.slot = IntentSlot::Armed(armed);
                        debug!(
                            intent_id = %self.id,
                            held_ms = millis(held),
                            "confirm before minimum hold"
                        );
                        Err(GateError::HoldIncomplete { held, required })
                    }
                }
            }
            other => Err(self.reject(other, GateEvent::Confirm)),
        }
    }

    /// Proof that this gate's Intent is CONFIRMED, for the Dispatcher.
    pub fn authorize(&self) -> Option<AuthorizedIntent> {
        match &self.slot {
            IntentSlot::Confirmed(intent) => Some(AuthorizedIntent::new(
                intent.id(),
                Arc::clone(intent.suggestion()),
                intent.metrics(),
                intent.entered_at(),
            )),
            _ => None,
        }
    }

    /// CONFIRMED -> EXECUTED on presentation of this Intent's receipt.
    pub fn mark_executed(&mut self, receipt: &DispatchReceipt) -> Result<GateSignal, GateError> {
        self.ensure_open()?;
        let now = self.clock.now();

        match self.take() {
            IntentSlot::Confirmed(intent) => match intent.execute(receipt) {
                Ok(terminal) => {
                    self.slot = IntentSlot::Terminal(terminal);
                    let ledger_sequence = receipt.ledger_sequence();
                    self.record(
                        IntentState::Confirmed,
                        IntentState::Executed,
                        now,
                        TransitionCause::Executed { ledger_sequence },
                    );
                    info!(intent_id = %self.id, ledger_sequence, "intent executed");
                    Ok(GateSignal::Executed { ledger_sequence })
                }
                Err(intent) => {
                    self.slot = IntentSlot::Confirmed(intent);
                    warn!(
                        intent_id = %self.id,
                        receipt = %receipt.intent_id(),
                        "foreign receipt refused"
                    );
                    Err(GateError::ReceiptMismatch {
                        intent_id: self.id,
                        receipt: receipt.intent_id(),
                    })
                }
            },
            other => Err(self.reject(other, GateEvent::Execute)),
        }
    }

    /// Record a new current context. A live Intent bound elsewhere expires.
    pub fn context_changed(&mut self, context: ContextId) -> Option<GateSignal> {
        self.current_context = context;
        let mismatched = self
            .slot
            .binding()
            .is_some_and(|binding| binding != &self.current_context);
        if mismatched {
            self.expire(ExpiryReason::ContextMismatch)
        } else {
            None
        }
    }

    /// Expire the Intent and refuse every later event.
    pub fn shutdown(&mut self) -> Option<GateSignal> {
        let signal = self.expire(ExpiryReason::Shutdown);
        self.shut_down = true;
        signal
    }

    /// Retire a CONFIRMED Intent whose dispatch failed, handing back its
    /// Suggestion so a fresh Intent can be built from it.
    pub fn supersede(&mut self) -> Result<Arc<Suggestion>, GateError> {
        self.ensure_open()?;
        match &self.slot {
            IntentSlot::Confirmed(intent) => {
                let suggestion = Arc::clone(intent.suggestion());
                self.expire(ExpiryReason::Superseded);
                Ok(suggestion)
            }
            _ => Err(GateError::InvalidTransition {
                intent_id: self.id,
                from: self.state(),
                event: GateEvent::Retry,
            }),
        }
    }

    /// Expire from any live state. No-op once terminal.
    pub fn expire(&mut self, reason: ExpiryReason) -> Option<GateSignal> {
        let now = self.clock.now();
        let (from, terminal) = match self.take() {
            IntentSlot::Generated(i) => (IntentState::Generated, i.expire(reason)),
            IntentSlot::Visible(i) => (IntentState::Visible, i.expire(reason)),
            IntentSlot::Armed(i) => (IntentState::Armed, i.expire(reason)),
            IntentSlot::Confirmed(i) => (IntentState::Confirmed, i.expire(reason)),
            other => {
                self.slot = other;
                return None;
            }
        };

        self.slot = IntentSlot::Terminal(terminal);
        self.record(
            from,
            IntentState::Expired,
            now,
            TransitionCause::Expired { reason },
        );
        info!(intent_id = %self.id, %from, %reason, "intent expired");
        Some(GateSignal::Expired(reason))
    }

    fn ensure_open(&self) -> Result<(), GateError> {
        if self.shut_down {
            return Err(GateError::ShutDown);
        }
        Ok(())
    }

    fn take(&mut self) -> IntentSlot {
        std::mem::replace(&mut self.slot, IntentSlot::Vacant)
    }

    fn reject(&mut self, slot: IntentSlot, event: GateEvent) -> GateError {
        let from = slot.state();
        self.slot = slot;
        debug!(intent_id = %self.id, %from, %event, "event rejected");
        GateError::InvalidTransition {
            intent_id: self.id,
            from,
            event,
        }
    }

    fn record(&mut self, from: IntentState, to: IntentState, at: Instant, cause: TransitionCause) {
        if self.journal.len() >= self.config.journal_capacity.max(1) {
            self.journal.pop_front();
        }
        self.journal.push_back(TransitionRecord {
            from,
            to,
            at,
            cause,
        });
        debug!(intent_id = %self.id, %from, %to, ?cause, "intent transition");
    }
}

impl std::fmt::Debug for IntentGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentGate")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("current_context", &self.current_context)
            .field("shut_down", &self.shut_down)
            .finish()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
