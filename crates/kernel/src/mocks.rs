use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ghostgate_types::{ActionDescriptor, IntentId, TokenId};
use parking_lot::Mutex;

use crate::bridge::{ExecutionBridge, ExecutionError, ResultDescriptor};
use crate::dispatch::WorkOrder;

/// A work order as seen by [`RecordingBridge`].
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub intent_id: IntentId,
    pub token_id: TokenId,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub action: ActionDescriptor,
}

/// Mock execution bridge for testing.
///
/// Records every order whose token checks out and answers with a fixed
/// result. An optional delay simulates a slow external application.
pub struct RecordingBridge {
    response: Result<ResultDescriptor, ExecutionError>,
    delay: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingBridge {
    pub fn succeeding(result: impl Into<String>) -> Self {
        Self {
            response: Ok(ResultDescriptor::new(result)),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: ExecutionError) -> Self {
        Self {
            response: Err(error),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ExecutionBridge for RecordingBridge {
    fn name(&self) -> &str {
        "recording"
    }

    async fn execute(&self, order: WorkOrder) -> Result<ResultDescriptor, ExecutionError> {
        order.verify_token()?;
        self.calls.lock().push(RecordedCall {
            intent_id: order.intent_id(),
            token_id: order.token().id(),
            token_expires_at: order.token().expires_at(),
            action: order.action().clone(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.clone()
    }
}

/// Bridge that "applies" any action by describing it back.
///
/// Results read `ok:<n>:<kind>(<params>)` where `n` counts calls from 1.
#[derive(Debug, Default)]
pub struct EchoBridge {
    calls: AtomicU64,
}

impl EchoBridge {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionBridge for EchoBridge {
    fn name(&self) -> &str {
        "echo"
    }

    async fn execute(&self, order: WorkOrder) -> Result<ResultDescriptor, ExecutionError> {
        order.verify_token()?;
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let action = order.action();
        Ok(ResultDescriptor::new(format!(
            "ok:{n}:{}({})",
            action.kind,
            action.render_parameters()
        )))
    }
}
