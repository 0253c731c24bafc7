use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable reason attached to every guardrail rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailCode {
    ActiveExperimentExists,
    UntestedBacklogExists,
    PendingBundleConflict,
    InvalidStateTransition,
}

impl std::fmt::Display for GuardrailCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardrailCode::ActiveExperimentExists => write!(f, "active_experiment_exists"),
            GuardrailCode::UntestedBacklogExists => write!(f, "untested_backlog_exists"),
            GuardrailCode::PendingBundleConflict => write!(f, "pending_bundle_conflict"),
            GuardrailCode::InvalidStateTransition => write!(f, "invalid_state_transition"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ShopLabError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Guardrail violation [{code}]: {message}")]
    Guardrail { code: GuardrailCode, message: String },

    #[error("Invalid change payload: {0}")]
    InvalidChange(String),

    #[error("Experiment has no baseline: {0}")]
    MissingBaseline(String),

    #[error("Evaluation data missing: {0}")]
    EvaluationDataMissing(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Collaborator failure: {0}")]
    Collaborator(anyhow::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl ShopLabError {
    pub fn guardrail(code: GuardrailCode, message: impl Into<String>) -> Self {
        ShopLabError::Guardrail { code, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ShopLabError::NotFound(message.into())
    }
}
