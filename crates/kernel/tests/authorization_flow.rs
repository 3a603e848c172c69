use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ghostgate_kernel::{
    BridgeRegistry, DispatchConfig, DispatchError, Dispatcher, ExecutionBridge, ExecutionError,
    ExpiryReason, GateBoard, GateConfig, GateError, GateSignal, IntentGate, IntentState,
    KernelError, ManualClock, Orchestrator, RecordingBridge, ResultDescriptor, WorkOrder,
};
use ghostgate_ledger::{ExecutionOutcome, ForensicLedger, JsonlStore};
use ghostgate_types::{ActionDescriptor, ContextId, Evidence, Suggestion};
use parking_lot::Mutex;

fn suggestion(context: &str, confidence: f64) -> Suggestion {
    Suggestion::builder(
        context,
        ActionDescriptor::new("apply_gain").with_param("db", -3.5),
    )
    .evidence(Evidence::new(
        "integrated_loudness",
        -9.1,
        -14.0,
        "master bus exceeds streaming target",
    ))
    .confidence(confidence)
    .provenance("loudness-v2")
    .build()
    .unwrap()
}

struct Session {
    clock: ManualClock,
    ledger: Arc<ForensicLedger>,
    orchestrator: Orchestrator,
}

fn session_with(bridge: Arc<dyn ExecutionBridge>, dispatch: DispatchConfig) -> Session {
    let clock = ManualClock::new();
    let ledger = Arc::new(ForensicLedger::new());
    let dispatcher = Dispatcher::new(
        Arc::clone(&ledger),
        BridgeRegistry::new().with("apply_gain", bridge),
        dispatch,
    )
    .with_clock(Arc::new(clock.clone()));
    Session {
        clock,
        ledger,
        orchestrator: Orchestrator::new(Arc::new(dispatcher)),
    }
}

fn session(bridge: Arc<dyn ExecutionBridge>) -> Session {
    session_with(bridge, DispatchConfig::default())
}

impl Session {
    fn gate(&self, suggestion: Suggestion) -> IntentGate {
        IntentGate::new(
            Arc::new(suggestion),
            ContextId::new("track-1"),
            GateConfig::default(),
            Arc::new(self.clock.clone()),
        )
    }

    fn confirmed_gate(&self, held_ms: u64) -> IntentGate {
        let mut gate = self.gate(suggestion("track-1", 0.8));
        gate.press().unwrap();
        self.clock.advance_ms(held_ms);
        gate.confirm().unwrap();
        gate
    }
}

#[tokio::test]
async fn full_confidence_without_hold_stays_visible() {
    let bridge = Arc::new(RecordingBridge::succeeding("ok:1"));
    let s = session(bridge.clone());
    let mut gate = s.gate(suggestion("track-1", 1.0));

    s.clock.advance_ms(10_000);
    gate.tick();
    assert_eq!(gate.state(), IntentState::Visible);

    let err = s.orchestrator.execute(&mut gate).await.unwrap_err();
    assert!(matches!(
        err,
        KernelError::Dispatch(DispatchError::UnauthorizedDispatch { .. })
    ));
    assert!(s.ledger.is_empty());
    assert_eq!(bridge.call_count(), 0);
}

#[tokio::test]
async fn early_release_returns_to_visible_with_no_entry() {
    let s = session(Arc::new(RecordingBridge::succeeding("ok:1")));
    let mut gate = s.gate(suggestion("track-1", 0.8));

    gate.press().unwrap();
    s.clock.advance_ms(200);
    assert!(matches!(
        gate.release(),
        Ok(GateSignal::HoldTooShort { .. })
    ));

    assert_eq!(gate.state(), IntentState::Visible);
    assert_eq!(s.ledger.len(), 0);
}

#[tokio::test]
async fn held_and_confirmed_intent_executes_once() {
    let bridge = Arc::new(RecordingBridge::succeeding("ok:1"));
    let s = session(bridge.clone());
    let mut gate = s.confirmed_gate(450);

    let receipt = s.orchestrator.execute(&mut gate).await.unwrap();
    assert_eq!(gate.state(), IntentState::Executed);
    assert_eq!(receipt.ledger_sequence(), 1);

    assert_eq!(s.ledger.len(), 1);
    let entry = s.ledger.entry(1).unwrap();
    assert_eq!(entry.sequence, 1);
    assert_eq!(entry.outcome, ExecutionOutcome::success("ok:1"));
    assert_eq!(entry.confirmation.held_ms, 450);
    assert_eq!(entry.confirmation.required_ms, 400);
    assert_eq!(entry.evidence.metric, "integrated_loudness");
    assert_eq!(entry.provenance.to_string(), "loudness-v2");
    assert!(s.ledger.verify_chain());

    let again = s.orchestrator.execute(&mut gate).await.unwrap_err();
    assert!(matches!(
        again,
        KernelError::Dispatch(DispatchError::UnauthorizedDispatch { .. })
    ));
    assert_eq!(bridge.call_count(), 1);
}

#[tokio::test]
async fn context_switch_before_confirm_expires() {
    let s = session(Arc::new(RecordingBridge::succeeding("ok:1")));
    let mut board = GateBoard::new(
        "track-A",
        GateConfig::default(),
        Arc::new(s.clock.clone()),
    );
    let id = board.ingest(suggestion("track-A", 0.9)).unwrap();

    board.press(&id).unwrap();
    s.clock.advance_ms(500);
    let signals = board.context_changed("track-B");
    assert_eq!(
        signals,
        vec![(id, GateSignal::Expired(ExpiryReason::ContextMismatch))]
    );

    assert!(matches!(
        board.confirm(&id),
        Err(GateError::InvalidTransition { .. })
    ));
    assert_eq!(board.state(&id), Some(IntentState::Expired));

    let board = Mutex::new(board);
    let err = s.orchestrator.execute_on(&board, &id).await.unwrap_err();
    assert!(matches!(
        err,
        KernelError::Dispatch(DispatchError::UnauthorizedDispatch { .. })
    ));
    assert!(s.ledger.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dispatch_of_one_intent_runs_once() {
    let bridge = Arc::new(
        RecordingBridge::succeeding("ok:1").with_delay(Duration::from_millis(100)),
    );
    let s = session(bridge.clone());
    let mut gate = s.confirmed_gate(450);

    let authorized = s.orchestrator.authorize(&gate).unwrap();
    let first = {
        let dispatcher = Arc::clone(s.orchestrator.dispatcher());
        let intent = authorized.clone();
        tokio::spawn(async move { dispatcher.dispatch(intent).await })
    };
    let second = {
        let dispatcher = Arc::clone(s.orchestrator.dispatcher());
        let intent = authorized;
        tokio::spawn(async move { dispatcher.dispatch(intent).await })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let receipts: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(DispatchError::DuplicateDispatch(_))))
        .count();

    assert_eq!(receipts.len(), 1);
    assert_eq!(duplicates, 1);
    assert_eq!(bridge.call_count(), 1);
    assert_eq!(s.ledger.len(), 1);
    assert!(s.ledger.entry(1).unwrap().outcome.is_success());

    let receipt = receipts[0].clone();
    assert_eq!(
        s.orchestrator.complete(&mut gate, &receipt),
        Some(GateSignal::Executed { ledger_sequence: 1 })
    );
}

/// Fails its first call, succeeds afterwards.
#[derive(Default)]
struct FlakyBridge {
    tripped: AtomicBool,
}

#[async_trait]
impl ExecutionBridge for FlakyBridge {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn execute(&self, order: WorkOrder) -> Result<ResultDescriptor, ExecutionError> {
        order.verify_token()?;
        if !self.tripped.swap(true, Ordering::SeqCst) {
            return Err(ExecutionError::Unavailable("host not responding".into()));
        }
        Ok(ResultDescriptor::new(format!("ok:{}", order.action().kind)))
    }
}

#[tokio::test]
async fn failed_execution_is_ledgered_and_retry_needs_a_fresh_hold() {
    let s = session(Arc::new(FlakyBridge::default()));
    let board = Mutex::new(GateBoard::new(
        "track-1",
        GateConfig::default(),
        Arc::new(s.clock.clone()),
    ));
    let first = board.lock().ingest(suggestion("track-1", 0.6)).unwrap();
    board.lock().press(&first).unwrap();
    s.clock.advance_ms(420);
    board.lock().confirm(&first).unwrap();

    let err = s.orchestrator.execute_on(&board, &first).await.unwrap_err();
    let suggestion_id = match err {
        KernelError::Dispatch(DispatchError::ExecutionFailed {
            failure,
            ledger_sequence,
            entry_hash,
            suggestion,
        }) => {
            assert!(failure.contains("host not responding"));
            assert_eq!(ledger_sequence, 1);
            assert_eq!(entry_hash, s.ledger.head_hash());
            suggestion.id
        }
        other => panic!("expected execution failure, got {other:?}"),
    };
    assert_eq!(board.lock().state(&first), Some(IntentState::Confirmed));

    let second = {
        let mut board = board.lock();
        let second = board.retry(&first).unwrap();
        assert_eq!(board.state(&first), Some(IntentState::Expired));
        assert_eq!(board.state(&second), Some(IntentState::Visible));
        assert_eq!(
            board.gate(&second).unwrap().suggestion().unwrap().id,
            suggestion_id
        );

        board.press(&second).unwrap();
        s.clock.advance_ms(100);
        assert!(matches!(
            board.confirm(&second),
            Err(GateError::HoldIncomplete { .. })
        ));
        s.clock.advance_ms(350);
        board.confirm(&second).unwrap();
        second
    };

    let receipt = s.orchestrator.execute_on(&board, &second).await.unwrap();
    assert_eq!(receipt.ledger_sequence(), 2);
    assert_eq!(board.lock().state(&second), Some(IntentState::Executed));

    let entries: Vec<_> = s.ledger.export(..).into_iter().collect();
    assert_eq!(entries.len(), 2);
    assert!(!entries[0].outcome.is_success());
    assert!(entries[1].outcome.is_success());
    assert_ne!(entries[0].intent_id, entries[1].intent_id);
    assert_eq!(entries[0].suggestion_id, entries[1].suggestion_id);
    assert!(s.ledger.verify_chain());
}

#[tokio::test]
async fn context_change_during_dispatch_leaves_gate_expired_but_ledgered() {
    let s = session(Arc::new(RecordingBridge::succeeding("ok:1")));
    let mut gate = s.confirmed_gate(500);

    let authorized = s.orchestrator.authorize(&gate).unwrap();
    let in_flight = s.orchestrator.dispatcher().dispatch(authorized);
    gate.context_changed(ContextId::new("track-2"));
    let receipt = in_flight.await.unwrap();

    assert_eq!(s.orchestrator.complete(&mut gate, &receipt), None);
    assert_eq!(gate.state(), IntentState::Expired);
    assert_eq!(s.ledger.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn other_gates_on_the_board_run_while_a_dispatch_is_in_flight() {
    let bridge = Arc::new(
        RecordingBridge::succeeding("ok:1").with_delay(Duration::from_millis(500)),
    );
    let s = session(bridge.clone());
    let board = Mutex::new(GateBoard::new(
        "track-1",
        GateConfig::default(),
        Arc::new(s.clock.clone()),
    ));
    let (first, second) = {
        let mut board = board.lock();
        let ids = board
            .ingest_all(vec![suggestion("track-1", 0.8), suggestion("track-1", 0.6)])
            .unwrap();
        board.press(&ids[0]).unwrap();
        s.clock.advance_ms(450);
        board.confirm(&ids[0]).unwrap();
        (ids[0], ids[1])
    };

    let dispatch = s.orchestrator.execute_on(&board, &first);
    let meanwhile = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut board = board.lock();
        assert_eq!(bridge.call_count(), 1);
        board.press(&second).unwrap();
        s.clock.advance_ms(200);
        let progress = board.tick();
        let states = (board.state(&first), board.state(&second));
        (progress, states, s.ledger.len())
    };
    let (receipt, (progress, states, recorded)) = tokio::join!(dispatch, meanwhile);

    assert_eq!(
        states,
        (Some(IntentState::Confirmed), Some(IntentState::Armed))
    );
    assert_eq!(recorded, 0);
    assert!(progress
        .iter()
        .any(|(id, signal)| *id == second && matches!(signal, GateSignal::HoldProgress { .. })));

    assert_eq!(receipt.unwrap().ledger_sequence(), 1);
    let board = board.lock();
    assert_eq!(board.state(&first), Some(IntentState::Executed));
    assert_eq!(board.state(&second), Some(IntentState::Armed));
}

#[tokio::test]
async fn stale_confirmation_is_refused_without_side_effects() {
    let config = DispatchConfig {
        confirmation_ttl_ms: Some(5_000),
        ..DispatchConfig::default()
    };
    let bridge = Arc::new(RecordingBridge::succeeding("ok:1"));
    let s = session_with(bridge.clone(), config);
    let mut gate = s.confirmed_gate(450);

    s.clock.advance_ms(5_000);
    let err = s.orchestrator.execute(&mut gate).await.unwrap_err();
    assert!(matches!(
        err,
        KernelError::Dispatch(DispatchError::UnauthorizedDispatch { .. })
    ));
    assert_eq!(gate.state(), IntentState::Confirmed);
    assert!(!s.orchestrator.dispatcher().is_claimed(&gate.id()));
    assert!(s.ledger.is_empty());
    assert_eq!(bridge.call_count(), 0);
}

#[tokio::test]
async fn shutdown_mid_hold_confirms_nothing() {
    let s = session(Arc::new(RecordingBridge::succeeding("ok:1")));
    let mut board = GateBoard::new(
        "track-1",
        GateConfig::default(),
        Arc::new(s.clock.clone()),
    );
    let ids = board
        .ingest_all(vec![suggestion("track-1", 0.3), suggestion("track-1", 0.7)])
        .unwrap();
    board.press(&ids[0]).unwrap();
    s.clock.advance_ms(600);

    assert_eq!(board.shutdown().len(), 2);
    assert_eq!(board.confirm(&ids[0]), Err(GateError::ShutDown));
    assert_eq!(board.in_state(IntentState::Expired).len(), 2);
    assert!(s.ledger.is_empty());
}

#[tokio::test]
async fn dispatcher_minimum_above_gate_minimum_is_unauthorized() {
    let config = DispatchConfig {
        required_hold_ms: 1_000,
        ..DispatchConfig::default()
    };
    let s = session_with(Arc::new(RecordingBridge::succeeding("ok")), config);
    let mut gate = s.confirmed_gate(450);

    let err = s.orchestrator.execute(&mut gate).await.unwrap_err();
    assert!(matches!(
        err,
        KernelError::Dispatch(DispatchError::UnauthorizedDispatch { .. })
    ));
    assert_eq!(gate.state(), IntentState::Confirmed);
    assert!(s.ledger.is_empty());
}

#[tokio::test]
async fn ledger_file_survives_reopen_and_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("forensic.jsonl");

    let head = {
        let ledger = Arc::new(ForensicLedger::open(JsonlStore::new(&path)).unwrap());
        let dispatcher = Dispatcher::new(
            Arc::clone(&ledger),
            BridgeRegistry::new().with("apply_gain", Arc::new(RecordingBridge::succeeding("ok:1"))),
            DispatchConfig::default(),
        );
        let orchestrator = Orchestrator::new(Arc::new(dispatcher));
        let clock = ManualClock::new();
        let mut gate = IntentGate::new(
            Arc::new(suggestion("track-1", 0.8)),
            ContextId::new("track-1"),
            GateConfig::default(),
            Arc::new(clock.clone()),
        );
        gate.press().unwrap();
        clock.advance_ms(450);
        gate.confirm().unwrap();
        orchestrator.execute(&mut gate).await.unwrap();
        ledger.head_hash()
    };

    let reopened = ForensicLedger::open(JsonlStore::new(&path)).unwrap();
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened.head_hash(), head);
    assert!(reopened.verify_chain());
}
