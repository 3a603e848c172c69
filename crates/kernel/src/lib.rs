//! Ghostgate kernel: the Intent Gate, the Authorization Dispatcher, and the
//! Orchestrator that joins them.
//!
//! ## Invariants
//!
//! - **No shortcuts**: an Intent reaches CONFIRMED only through
//!   VISIBLE -> ARMED with a continuous hold of at least the configured
//!   minimum, followed by a distinct confirm action. The typestate
//!   [`Intent`] makes every other edge unwritable.
//! - **Confidence is advisory**: it may delay visibility, never authority.
//! - **Context before confirm**: a confirm is honored only if the Intent's
//!   binding context still matches the gate's current context.
//! - **At most once**: the Dispatcher claims an intent id before calling the
//!   bridge; a second dispatch is refused without side effects.
//! - **Everything admitted is recorded**: every dispatch attempt, success or
//!   failure, is sealed into the Forensic Ledger before it is reported.
//! - **Receipt-gated completion**: CONFIRMED -> EXECUTED needs the
//!   Dispatcher's receipt for that same Intent.

pub mod board;
pub mod bridge;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod gate;
pub mod intent;
pub mod mocks;
pub mod orchestrator;

pub use board::GateBoard;
pub use bridge::{BridgeRegistry, ExecutionBridge, ExecutionError, ResultDescriptor};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, DispatchConfig, GateConfig, KernelConfig};
pub use dispatch::{AuthorizationToken, AuthorizedIntent, DispatchReceipt, Dispatcher, WorkOrder};
pub use error::{DispatchError, GateError, KernelError};
pub use filter::{MinConfidence, VisibilityFilter};
pub use gate::{GateEvent, GateSignal, IntentGate, TransitionCause, TransitionRecord};
pub use intent::{ExpiryReason, Intent, IntentState, TerminalIntent, Termination};
pub use mocks::{EchoBridge, RecordedCall, RecordingBridge};
pub use orchestrator::Orchestrator;
