use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Worker '{worker_id}' unavailable: {reason}")]
    WorkerUnavailable { worker_id: String, reason: String },

    #[error("Insufficient data for {assessment}: {reason}")]
    InsufficientData { assessment: String, reason: String },

    #[error("Unsupported assessment type: {0}")]
    UnsupportedAssessmentType(String),

    #[error("Unsupported assessment method: {0}")]
    UnsupportedMethod(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Data source error for '{reference}': {reason}")]
    DataSource { reference: String, reason: String },

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Risk '{0}' not found")]
    RiskNotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type RiskResult<T> = Result<T, RiskError>;
