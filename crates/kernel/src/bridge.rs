//! Execution bridges: the capability that actually performs an action.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ghostgate_types::{ActionKind, TokenId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dispatch::WorkOrder;

/// Opaque result returned by a bridge on success.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultDescriptor(pub String);

impl ResultDescriptor {
    pub fn new(result: impl Into<String>) -> Self {
        Self(result.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResultDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("bridge rejected the action: {0}")]
    Rejected(String),

    #[error("bridge unavailable: {0}")]
    Unavailable(String),

    #[error("no bridge registered for action type '{0}'")]
    NoBridge(ActionKind),

    #[error("bridge call timed out after {0}ms")]
    Timeout(u64),

    /// The order's authorization token failed the bridge-side check.
    #[error("authorization token {token_id} rejected: {reason}")]
    TokenRejected {
        token_id: TokenId,
        reason: &'static str,
    },
}

/// Performs the action described by a [`WorkOrder`].
///
/// The order is consumed: it is good for exactly one call. Calls may take
/// arbitrarily long; the Dispatcher holds no lock while one is in flight.
#[async_trait]
pub trait ExecutionBridge: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn execute(&self, order: WorkOrder) -> Result<ResultDescriptor, ExecutionError>;
}

/// Bridges keyed by the action type they handle.
#[derive(Clone, Default)]
pub struct BridgeRegistry {
    bridges: HashMap<ActionKind, Arc<dyn ExecutionBridge>>,
    fallback: Option<Arc<dyn ExecutionBridge>>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, bridge: Arc<dyn ExecutionBridge>) {
        self.bridges.insert(ActionKind::new(kind), bridge);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, kind: impl Into<String>, bridge: Arc<dyn ExecutionBridge>) -> Self {
        self.register(kind, bridge);
        self
    }

    /// Bridge used for action types with no specific registration.
    pub fn with_fallback(mut self, bridge: Arc<dyn ExecutionBridge>) -> Self {
        self.fallback = Some(bridge);
        self
    }

    pub fn get(&self, kind: &ActionKind) -> Option<Arc<dyn ExecutionBridge>> {
        self.bridges
            .get(kind)
            .or(self.fallback.as_ref())
            .map(Arc::clone)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &ActionKind> {
        self.bridges.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty() && self.fallback.is_none()
    }
}

impl std::fmt::Debug for BridgeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.bridges.keys().map(ActionKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("BridgeRegistry")
            .field("kinds", &kinds)
            .field("fallback", &self.fallback.as_ref().map(|b| b.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::RecordingBridge;

    #[test]
    fn lookup_by_kind_then_fallback() {
        let gain: Arc<dyn ExecutionBridge> = Arc::new(RecordingBridge::succeeding("gain"));
        let other: Arc<dyn ExecutionBridge> = Arc::new(RecordingBridge::succeeding("other"));

        let registry = BridgeRegistry::new().with("apply_gain", gain);
        assert_eq!(
            registry.get(&ActionKind::new("apply_gain")).unwrap().name(),
            "recording"
        );
        assert!(registry.get(&ActionKind::new("mute")).is_none());

        let registry = registry.with_fallback(other);
        assert!(registry.get(&ActionKind::new("mute")).is_some());
        assert!(!registry.is_empty());
    }
}
