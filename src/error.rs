//! Pipeline error taxonomy and the policy applied to each kind.
//!
//! Every fallible pipeline operation returns a [`PipelineError`]. What the
//! run does with it is decided in exactly one place, [`PipelineError::policy`],
//! and applied through [`recover`].

use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Network, auth or decoding failure talking to the forum API.
    #[error("upstream request failed ({context}): {source:#}")]
    Upstream {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    /// The persisted id set exists but could not be read or parsed.
    #[error("failed to read post id ledger: {source:#}")]
    LedgerRead {
        #[source]
        source: anyhow::Error,
    },

    /// The merged id set could not be written back.
    #[error("failed to persist post id ledger: {source:#}")]
    LedgerWrite {
        #[source]
        source: anyhow::Error,
    },

    /// Records could not be encoded into the requested archive format.
    #[error("failed to encode {format} archive: {source:#}")]
    Encode {
        format: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// An archive blob could not be uploaded.
    #[error("failed to upload archive {key}: {source:#}")]
    Archive {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// The downstream job could not be signalled.
    #[error("failed to trigger downstream job {successor}: {source:#}")]
    Trigger {
        successor: String,
        #[source]
        source: anyhow::Error,
    },
}

/// What a run does when an operation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop the run and surface the error to the scheduler.
    Propagate,
    /// Log, keep whatever partial result exists, move on.
    LogAndContinue,
    /// Log and substitute the permissive default (e.g. an empty id set).
    FailOpen,
}

impl PipelineError {
    /// The policy table.
    #[must_use]
    pub fn policy(&self) -> ErrorPolicy {
        match self {
            Self::Upstream { .. } => ErrorPolicy::LogAndContinue,
            Self::LedgerRead { .. } | Self::LedgerWrite { .. } => ErrorPolicy::FailOpen,
            Self::Encode { .. } | Self::Archive { .. } | Self::Trigger { .. } => {
                ErrorPolicy::Propagate
            }
        }
    }

    /// Short machine-friendly name of the error kind, used as a log field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Upstream { .. } => "upstream",
            Self::LedgerRead { .. } => "ledger_read",
            Self::LedgerWrite { .. } => "ledger_write",
            Self::Encode { .. } => "encode",
            Self::Archive { .. } => "archive",
            Self::Trigger { .. } => "trigger",
        }
    }
}

/// Apply the policy table to a failed operation.
///
/// Returns the error back when it must propagate; otherwise logs it with the
/// given context and returns `fallback()`.
///
/// # Errors
///
/// Returns the original error when its policy is [`ErrorPolicy::Propagate`].
pub fn recover<T>(
    result: Result<T, PipelineError>,
    context: &str,
    fallback: impl FnOnce() -> T,
) -> Result<T, PipelineError> {
    match result {
        Ok(value) => Ok(value),
        Err(e) => match e.policy() {
            ErrorPolicy::Propagate => Err(e),
            ErrorPolicy::LogAndContinue => {
                error!(kind = e.kind(), context, "{e}");
                Ok(fallback())
            }
            ErrorPolicy::FailOpen => {
                warn!(kind = e.kind(), context, "{e}; continuing with default");
                Ok(fallback())
            }
        },
    }
}
