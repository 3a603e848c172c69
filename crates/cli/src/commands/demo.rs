//! `ghostgate demo`: a scripted session on a manual clock.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use ghostgate_kernel::{
    BridgeRegistry, Dispatcher, EchoBridge, GateBoard, GateError, GateSignal, KernelError,
    ManualClock, Orchestrator,
};
use ghostgate_ledger::{ComplianceReport, ForensicLedger, JsonlStore};
use ghostgate_types::{ActionDescriptor, Evidence, IntentId, Suggestion};
use tracing::info;

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::{print_info, print_records, print_success, print_warning, OutputFormat};

const SESSION_CONTEXT: &str = "session-1";

#[derive(Debug, Args)]
pub struct DemoArgs {
    /// Append to this JSONL ledger instead of an in-memory one
    #[arg(long)]
    pub ledger: Option<PathBuf>,

    /// How long the first suggestion is held, in milliseconds
    #[arg(long, default_value_t = 450)]
    pub hold_ms: u64,

    /// Confirm at the end of the hold instead of releasing
    #[arg(long)]
    pub confirm: bool,
}

/// Narration goes to stdout in table mode only, so JSON output stays parseable.
struct Narrator {
    format: OutputFormat,
}

impl Narrator {
    fn info(&self, message: String) {
        if self.format == OutputFormat::Table {
            print_info(&message);
        }
    }

    fn warn(&self, message: String) {
        if self.format == OutputFormat::Table {
            print_warning(&message);
        }
    }

    fn signal(&self, intent_id: &IntentId, signal: &GateSignal) {
        self.info(format!("{}: {}", short_id(intent_id), describe(signal)));
    }
}

pub async fn execute(args: DemoArgs, config: &CliConfig, format: OutputFormat) -> CliResult<()> {
    let kernel = config.kernel();
    let say = Narrator { format };

    let ledger = match args.ledger.as_ref().or(config.ledger_path.as_ref()) {
        Some(path) => {
            say.info(format!("ledger: {}", path.display()));
            ForensicLedger::open(JsonlStore::new(path))?
        }
        None => ForensicLedger::new(),
    };
    let ledger = Arc::new(ledger);
    let first_new = ledger.len() as u64 + 1;

    let bridges = BridgeRegistry::new().with_fallback(Arc::new(EchoBridge::new()));
    let clock = ManualClock::new();
    let dispatcher = Dispatcher::new(Arc::clone(&ledger), bridges, kernel.dispatch.clone())
        .with_clock(Arc::new(clock.clone()));
    let orchestrator = Orchestrator::new(Arc::new(dispatcher));

    let mut board = GateBoard::new(SESSION_CONTEXT, kernel.gate.clone(), Arc::new(clock.clone()));

    let ids = board.ingest_all(scripted_suggestions()?)?;
    for gate in board.iter() {
        say.info(format!(
            "{}: {} is {}",
            short_id(&gate.id()),
            gate.suggestion().map(|s| s.action.kind.to_string()).unwrap_or_default(),
            gate.state()
        ));
    }

    let target = ids[0];
    let signal = board.press(&target)?;
    say.signal(&target, &signal);

    clock.advance_ms(args.hold_ms);
    for (id, signal) in board.tick() {
        say.signal(&id, &signal);
    }

    if args.confirm {
        match board.confirm(&target) {
            Ok(signal) => {
                say.signal(&target, &signal);

                let gate = board.gate(&target).ok_or(GateError::UnknownIntent(target))?;
                let authorized = orchestrator.authorize(gate).map_err(KernelError::from)?;
                // The board is not borrowed while the bridge runs.
                let receipt = orchestrator
                    .dispatcher()
                    .dispatch(authorized)
                    .await
                    .map_err(KernelError::from)?;
                if let Some(signal) = board
                    .gate_mut(&target)
                    .and_then(|gate| orchestrator.complete(gate, &receipt))
                {
                    say.signal(&target, &signal);
                }
                info!(
                    intent_id = %target,
                    ledger_sequence = receipt.ledger_sequence(),
                    "demo dispatch complete"
                );
                if format == OutputFormat::Table {
                    print_success(&format!(
                        "{}: executed as ledger entry #{} ({})",
                        short_id(&target),
                        receipt.ledger_sequence(),
                        receipt.result().as_str()
                    ));
                }
            }
            Err(GateError::HoldIncomplete { held, required }) => {
                say.warn(format!(
                    "{}: hold incomplete ({}ms of {}ms), confirm ignored",
                    short_id(&target),
                    held.as_millis(),
                    required.as_millis()
                ));
                let signal = board.release(&target)?;
                say.signal(&target, &signal);
            }
            Err(err) => return Err(err.into()),
        }
    } else {
        let signal = board.release(&target)?;
        say.signal(&target, &signal);
    }

    for (id, signal) in board.shutdown() {
        say.signal(&id, &signal);
    }

    let report = ComplianceReport::from_ledger(&ledger, first_new..);
    print_records(&report, &report.records, format)
}

fn scripted_suggestions() -> CliResult<Vec<Suggestion>> {
    let loudness = Suggestion::builder(
        SESSION_CONTEXT,
        ActionDescriptor::new("apply_gain").with_param("db", -3.5),
    )
    .evidence(Evidence::new("lufs", -9.1, -14.0, "master bus is too hot"))
    .confidence(0.83)
    .provenance("loudness-v2")
    .build();

    let silence = Suggestion::builder(
        SESSION_CONTEXT,
        ActionDescriptor::new("trim_silence")
            .with_param("start_ms", 0)
            .with_param("end_ms", 840),
    )
    .evidence(Evidence::new("leading_silence_ms", 840.0, 0.0, "dead air before downbeat"))
    .confidence(0.64)
    .provenance("silence-detector")
    .build();

    [loudness, silence]
        .into_iter()
        .map(|s| s.map_err(|e| CliError::InvalidInput(e.to_string())))
        .collect()
}

fn short_id(id: &IntentId) -> String {
    id.to_string().chars().take(8).collect()
}

fn describe(signal: &GateSignal) -> String {
    match signal {
        GateSignal::Revealed => "revealed".to_string(),
        GateSignal::Armed => "armed".to_string(),
        GateSignal::HoldProgress { held, required } => {
            format!("holding {}ms of {}ms", held.as_millis(), required.as_millis())
        }
        GateSignal::HoldSatisfied { held } => {
            format!("hold satisfied after {}ms, confirm now", held.as_millis())
        }
        GateSignal::HoldTooShort { held, required } => format!(
            "released after {}ms of {}ms, back to visible",
            held.as_millis(),
            required.as_millis()
        ),
        GateSignal::Released { held } => format!("released after {}ms", held.as_millis()),
        GateSignal::Confirmed(metrics) => {
            format!("confirmed after {}ms", metrics.held_ms)
        }
        GateSignal::Executed { ledger_sequence } => format!("executed (#{ledger_sequence})"),
        GateSignal::Expired(reason) => format!("expired ({reason})"),
    }
}
