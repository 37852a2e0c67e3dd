//! Error types for the lead funnel.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Funnel controller errors. These are session-local and never leave the
/// process as anything but an HTTP status + generic message.
#[derive(Debug, thiserror::Error)]
pub enum FunnelError {
    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Option {option:?} is not offered at step {step}")]
    UnknownOption { step: String, option: String },

    #[error("Phone number does not match the 11-digit mobile format")]
    InvalidPhone,

    #[error("Wizard answers are incomplete")]
    IncompleteAnswers,

    #[error("A submission is already in flight")]
    SubmissionInFlight,

    #[error("Cannot reset while a submission is in flight")]
    ResetWhileSubmitting,

    #[error("Lead store rejected the submission: {0}")]
    Store(#[from] StoreError),
}

/// Datastore (lead persistence) errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Lead store is not configured")]
    NotConfigured,

    #[error("Insert request failed: {0}")]
    Request(String),

    #[error("Insert rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Push relay errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Push token is not configured")]
    TokenMissing,

    #[error("Push request failed: {0}")]
    Request(String),

    #[error("Push service returned status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Push response was not valid JSON: {0}")]
    InvalidResponse(String),
}
