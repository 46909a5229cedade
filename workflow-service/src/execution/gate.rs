// Secret Gate
// Decides whether a credential-gated stage may run in this environment

use serde::{Deserialize, Serialize};

use std::collections::HashMap;

/// Read-only lookup of named credentials in the execution environment.
///
/// The gate never mutates the environment; implementations exist for the
/// real process environment and for tests.
pub trait SecretProbe {
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Probe backed by the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvProbe;

impl SecretProbe for EnvProbe {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl SecretProbe for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// The gate's verdict for one stage, computed once at stage entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    /// Stage this decision gates
    pub stage: String,

    /// True iff every required credential is present and non-empty
    pub available: bool,

    /// Names that were missing or empty (empty when available)
    pub missing: Vec<String>,
}

impl GateDecision {
    /// Human-readable skip reason for an unavailable gate.
    pub fn reason(&self) -> String {
        format!("missing credentials: {}", self.missing.join(", "))
    }
}

/// Secret gate evaluation.
///
/// Absent credentials are a normal, expected outcome (a fork without
/// access to secrets), never an error. The decision is made once per run
/// at stage entry and holds for the stage's lifetime.
pub struct SecretGate;

impl SecretGate {
    /// Evaluate whether all required credentials are available.
    pub fn evaluate(
        stage: impl Into<String>,
        required: &[String],
        probe: &dyn SecretProbe,
    ) -> GateDecision {
        let missing: Vec<String> = required
            .iter()
            .filter(|name| {
                probe
                    .lookup(name)
                    .map(|value| value.is_empty())
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        GateDecision {
            stage: stage.into(),
            available: missing.is_empty(),
            missing,
        }
    }

    /// Collect the required credential values for handing to the job
    /// runner. Only meaningful once `evaluate` returned available.
    pub fn collect(required: &[String], probe: &dyn SecretProbe) -> HashMap<String, String> {
        required
            .iter()
            .filter_map(|name| probe.lookup(name).map(|value| (name.clone(), value)))
            .collect()
    }
}
