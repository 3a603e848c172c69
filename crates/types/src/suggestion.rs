use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SuggestionError;
use crate::ids::{ContextId, SuggestionId};

/// Why a suggestion was made: the measured metric and where it should go.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Metric being acted on (e.g. "integrated_loudness").
    pub metric: String,
    /// Currently measured value.
    pub current_value: f64,
    /// Value the action aims for.
    pub target_value: f64,
    /// Human-readable rationale shown next to the ghost preview.
    pub rationale: String,
}

impl Evidence {
    pub fn new(
        metric: impl Into<String>,
        current_value: f64,
        target_value: f64,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            metric: metric.into(),
            current_value,
            target_value,
            rationale: rationale.into(),
        }
    }

    /// Signed distance from the current value to the target.
    pub fn delta(&self) -> f64 {
        self.target_value - self.current_value
    }
}

impl std::fmt::Display for Evidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {:.2} -> {:.2} ({})",
            self.metric, self.current_value, self.target_value, self.rationale
        )
    }
}

/// Which engine produced a suggestion. Advisory only.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance(pub String);

impl Provenance {
    pub fn new(engine: impl Into<String>) -> Self {
        Self(engine.into())
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Action type used to select an execution bridge.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionKind(pub String);

impl ActionKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What would be executed: an action type plus its parameters.
///
/// Parameters are kept in a `BTreeMap` so their serialized form is stable,
/// which keeps ledger hashes reproducible.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub kind: ActionKind,
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl ActionDescriptor {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::new(kind),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Render parameters as `key=value` pairs for flat reports.
    pub fn render_parameters(&self) -> String {
        self.parameters
            .iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => format!("{k}={s}"),
                other => format!("{k}={other}"),
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// A candidate action proposed by an external producer.
///
/// Immutable after creation. `confidence` and `provenance` are carried into
/// the forensic record but never consulted by the gate's transitions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: SuggestionId,
    /// What this suggestion applies to.
    pub context: ContextId,
    pub evidence: Evidence,
    /// Producer confidence in [0.0, 1.0].
    pub confidence: f64,
    pub provenance: Provenance,
    pub action: ActionDescriptor,
}

impl Suggestion {
    /// Create a builder for ergonomic construction.
    pub fn builder(context: impl Into<ContextId>, action: ActionDescriptor) -> SuggestionBuilder {
        SuggestionBuilder {
            context: context.into(),
            action,
            evidence: Evidence::new("unspecified", 0.0, 0.0, ""),
            confidence: 0.0,
            provenance: Provenance::new("unknown"),
        }
    }
}

/// Builder for Suggestion.
pub struct SuggestionBuilder {
    context: ContextId,
    action: ActionDescriptor,
    evidence: Evidence,
    confidence: f64,
    provenance: Provenance,
}

impl SuggestionBuilder {
    pub fn evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn provenance(mut self, engine: impl Into<String>) -> Self {
        self.provenance = Provenance::new(engine);
        self
    }

    pub fn build(self) -> Result<Suggestion, SuggestionError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(SuggestionError::ConfidenceOutOfRange(self.confidence));
        }
        if self.action.kind.0.trim().is_empty() {
            return Err(SuggestionError::EmptyActionKind);
        }
        if self.evidence.metric.trim().is_empty() {
            return Err(SuggestionError::EmptyMetric);
        }
        for (field, value) in [
            ("current_value", self.evidence.current_value),
            ("target_value", self.evidence.target_value),
        ] {
            if !value.is_finite() {
                return Err(SuggestionError::NonFiniteEvidence { field, value });
            }
        }

        Ok(Suggestion {
            id: SuggestionId::new(),
            context: self.context,
            evidence: self.evidence,
            confidence: self.confidence,
            provenance: self.provenance,
            action: self.action,
        })
    }
}
