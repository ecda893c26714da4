use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::{Endorsement, Policy};
use crate::form::RequiredField;

/// Reasons a form cannot be submitted. Both are resolved locally, before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("please fill out all required fields: {}", field_list(.fields))]
    MissingRequiredField { fields: Vec<RequiredField> },

    #[error("no endorsement has both an audit resolution and an AI agreement answer")]
    NoCompleteResponses,
}

impl ValidationError {
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::MissingRequiredField { .. } => "missing_required_field",
            ValidationError::NoCompleteResponses => "no_complete_responses",
        }
    }
}

fn field_list(fields: &[RequiredField]) -> String {
    fields
        .iter()
        .map(|f| f.label())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rejected edits to the form's selection state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("policy {0} is not selected")]
    PolicyNotSelected(Policy),

    #[error("endorsement {endorsement} is not offered for {policy}")]
    UnknownEndorsement {
        policy: Policy,
        endorsement: Endorsement,
    },

    #[error("only one endorsement may be selected for {policy} ({selected} given)")]
    TooManyEndorsements { policy: Policy, selected: usize },

    #[error("endorsement {endorsement} is not selected for {policy}")]
    EndorsementNotSelected {
        policy: Policy,
        endorsement: Endorsement,
    },

    #[error("explanation {0:?} is not one of the configured options")]
    UnknownExplanation(String),
}

impl FormError {
    pub fn kind(&self) -> &'static str {
        match self {
            FormError::PolicyNotSelected(_) => "policy_not_selected",
            FormError::UnknownEndorsement { .. } => "unknown_endorsement",
            FormError::TooManyEndorsements { .. } => "too_many_endorsements",
            FormError::EndorsementNotSelected { .. } => "endorsement_not_selected",
            FormError::UnknownExplanation(_) => "unknown_explanation",
        }
    }
}

/// Failures of an append-only record sink.
///
/// A failed multi-record append does not say which records, if any, were
/// written before the failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),
}

impl SinkError {
    pub fn kind(&self) -> &'static str {
        match self {
            SinkError::AuthenticationFailed(_) => "authentication_failed",
            SinkError::ConnectionFailed(_) => "connection_failed",
            SinkError::WriteFailed(_) => "write_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("session storage error: {0}")]
pub struct StorageError(pub String);

/// Everything that can stop a submission or a session edit, from session
/// lookup to the sink write.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Edit(#[from] FormError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session {0} has already been submitted")]
    AlreadySubmitted(String),

    #[error("session {0} is being submitted")]
    InProgress(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SubmitError {
    pub fn kind(&self) -> &'static str {
        match self {
            SubmitError::Validation(e) => e.kind(),
            SubmitError::Edit(e) => e.kind(),
            SubmitError::Sink(e) => e.kind(),
            SubmitError::SessionNotFound(_) => "session_not_found",
            SubmitError::AlreadySubmitted(_) => "already_submitted",
            SubmitError::InProgress(_) => "submission_in_progress",
            SubmitError::Storage(_) => "storage",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T, E = SubmitError> = std::result::Result<T, E>;
