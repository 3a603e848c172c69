//! One gate per visible suggestion, grouped for a session.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use ghostgate_types::{ContextId, IntentId, Suggestion};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::GateConfig;
use crate::error::GateError;
use crate::filter::{MinConfidence, VisibilityFilter};
use crate::gate::{GateSignal, IntentGate};
use crate::intent::{IntentState, TerminalIntent};

/// The set of independently timed gates in a session.
///
/// Session-wide signals (context change, tick, shutdown) fan out to every
/// gate; user events are routed by intent id.
pub struct GateBoard {
    gates: Vec<IntentGate>,
    current_context: ContextId,
    config: GateConfig,
    clock: Arc<dyn Clock>,
    filter: Arc<dyn VisibilityFilter>,
    shut_down: bool,
}

impl GateBoard {
    pub fn new(context: impl Into<ContextId>, config: GateConfig, clock: Arc<dyn Clock>) -> Self {
        let filter = Arc::new(MinConfidence::new(config.min_confidence_to_show));
        Self {
            gates: Vec::new(),
            current_context: context.into(),
            config,
            clock,
            filter,
            shut_down: false,
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn VisibilityFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Replace the visibility filter on the board and every gate.
    /// Pending suggestions that now pass are revealed on the next tick.
    pub fn set_filter(&mut self, filter: Arc<dyn VisibilityFilter>) {
        for gate in &mut self.gates {
            gate.set_filter(Arc::clone(&filter));
        }
        self.filter = filter;
    }

    pub fn current_context(&self) -> &ContextId {
        &self.current_context
    }

    /// Open a gate for a newly produced Suggestion.
    pub fn ingest(&mut self, suggestion: Suggestion) -> Result<IntentId, GateError> {
        self.open_gate(Arc::new(suggestion))
    }

    pub fn ingest_all<I>(&mut self, suggestions: I) -> Result<Vec<IntentId>, GateError>
    where
        I: IntoIterator<Item = Suggestion>,
    {
        suggestions.into_iter().map(|s| self.ingest(s)).collect()
    }

    /// Drain a producer stream into the board.
    pub async fn ingest_stream<S>(&mut self, suggestions: S) -> Result<Vec<IntentId>, GateError>
    where
        S: Stream<Item = Suggestion>,
    {
        futures::pin_mut!(suggestions);
        let mut ids = Vec::new();
        while let Some(suggestion) = suggestions.next().await {
            ids.push(self.ingest(suggestion)?);
        }
        Ok(ids)
    }

    fn open_gate(&mut self, suggestion: Arc<Suggestion>) -> Result<IntentId, GateError> {
        if self.shut_down {
            return Err(GateError::ShutDown);
        }
        let gate = IntentGate::with_filter(
            suggestion,
            self.current_context.clone(),
            self.config.clone(),
            Arc::clone(&self.clock),
            Arc::clone(&self.filter),
        );
        let id = gate.id();
        debug!(intent_id = %id, state = %gate.state(), "gate opened");
        self.gates.push(gate);
        Ok(id)
    }

    pub fn gate(&self, intent_id: &IntentId) -> Option<&IntentGate> {
        self.gates.iter().find(|g| &g.id() == intent_id)
    }

    pub fn gate_mut(&mut self, intent_id: &IntentId) -> Option<&mut IntentGate> {
        self.gates.iter_mut().find(|g| &g.id() == intent_id)
    }

    fn routed(&mut self, intent_id: &IntentId) -> Result<&mut IntentGate, GateError> {
        self.gate_mut(intent_id).ok_or(GateError::UnknownIntent(*intent_id))
    }

    pub fn press(&mut self, intent_id: &IntentId) -> Result<GateSignal, GateError> {
        self.routed(intent_id)?.press()
    }

    pub fn release(&mut self, intent_id: &IntentId) -> Result<GateSignal, GateError> {
        self.routed(intent_id)?.release()
    }

    pub fn confirm(&mut self, intent_id: &IntentId) -> Result<GateSignal, GateError> {
        self.routed(intent_id)?.confirm()
    }

    pub fn state(&self, intent_id: &IntentId) -> Option<IntentState> {
        self.gate(intent_id).map(IntentGate::state)
    }

    pub fn context_changed(
        &mut self,
        context: impl Into<ContextId>,
    ) -> Vec<(IntentId, GateSignal)> {
        self.current_context = context.into();
        info!(context = %self.current_context, "context changed");
        let context = self.current_context.clone();
        self.fan_out(|gate| gate.context_changed(context.clone()))
    }

    pub fn tick(&mut self) -> Vec<(IntentId, GateSignal)> {
        self.fan_out(IntentGate::tick)
    }

    /// Expire every live Intent and refuse further ingest.
    pub fn shutdown(&mut self) -> Vec<(IntentId, GateSignal)> {
        self.shut_down = true;
        let expired = self.fan_out(IntentGate::shutdown);
        info!(expired = expired.len(), "gate board shut down");
        expired
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Replace a CONFIRMED Intent whose dispatch failed with a fresh one
    /// for the same Suggestion. The new Intent needs a full hold cycle.
    pub fn retry(&mut self, intent_id: &IntentId) -> Result<IntentId, GateError> {
        if self.shut_down {
            return Err(GateError::ShutDown);
        }
        let suggestion = self.routed(intent_id)?.supersede()?;
        let fresh = self.open_gate(suggestion)?;
        info!(previous = %intent_id, intent_id = %fresh, "intent retried");
        Ok(fresh)
    }

    /// Drop terminal gates, returning what is left of them.
    pub fn sweep(&mut self) -> Vec<TerminalIntent> {
        let mut swept = Vec::new();
        self.gates.retain(|gate| match gate.terminal() {
            Some(terminal) => {
                swept.push(*terminal);
                false
            }
            None => true,
        });
        swept
    }

    pub fn iter(&self) -> impl Iterator<Item = &IntentGate> {
        self.gates.iter()
    }

    /// Ids of gates currently in `state`.
    pub fn in_state(&self, state: IntentState) -> Vec<IntentId> {
        self.gates
            .iter()
            .filter(|g| g.state() == state)
            .map(IntentGate::id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    fn fan_out<F>(&mut self, mut f: F) -> Vec<(IntentId, GateSignal)>
    where
        F: FnMut(&mut IntentGate) -> Option<GateSignal>,
    {
        self.gates
            .iter_mut()
            .filter_map(|gate| f(gate).map(|signal| (gate.id(), signal)))
            .collect()
    }
}

impl std::fmt::Debug for GateBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateBoard")
            .field("gates", &self.gates)
            .field("current_context", &self.current_context)
            .field("shut_down", &self.shut_down)
            .finish()
    }
}
