//! Error types for contract checks and old-value scope handling.
//!
//! [`ContractFailure`] is the designed-for outcome of a false check.
//! [`ScopeError`] is programmer misuse of the old-value machinery and is
//! kept separate so callers can tell a broken contract from a broken call.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scope::{Frame, WrapperKind};
use crate::value::Value;

/// Which check produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    Requires,
    RequiresValue,
    Ensures,
    EnsuresValue,
    Asserts,
    AssertsValue,
    Unreachable,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Requires => "Requires",
            FailureKind::RequiresValue => "RequiresValue",
            FailureKind::Ensures => "Ensures",
            FailureKind::EnsuresValue => "EnsuresValue",
            FailureKind::Asserts => "Asserts",
            FailureKind::AssertsValue => "AssertsValue",
            FailureKind::Unreachable => "Unreachable",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed contract check.
///
/// Carries the check kind, the offending value for the `*Value` checks, and
/// the caller's reason verbatim. Match on [`kind`](Self::kind); the message
/// is for humans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractFailure {
    pub kind: FailureKind,
    pub value: Option<Value>,
    pub reason: Option<String>,
}

impl ContractFailure {
    pub fn new(kind: FailureKind) -> Self {
        ContractFailure {
            kind,
            value: None,
            reason: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Builds the failure message.
    ///
    /// `"<Kind> failed"`, then `"; value tested was '<value>'"` when a value
    /// is present, then `"; reason for failure was: <reason>"` when a reason
    /// is present.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ContractFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed", self.kind)?;
        if let Some(value) = &self.value {
            write!(f, "; value tested was '{}'", value)?;
        }
        if let Some(reason) = &self.reason {
            write!(f, "; reason for failure was: {}", reason)?;
        }
        Ok(())
    }
}

impl std::error::Error for ContractFailure {}

/// Misuse of the old-value machinery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// A value was remembered outside a precondition block.
    #[error("old values can only be remembered inside Preconditions (called from {caller})")]
    Discipline { caller: WrapperKind },

    /// An old-value operation ran outside every contract wrapper.
    #[error("old values can only be used inside Preconditions, Postconditions or Conditionals")]
    Resolution,

    /// Entering another frame would exceed the configured call depth.
    #[error("scope depth limit ({limit}) exceeded entering {frame}")]
    DepthExceeded { limit: usize, frame: Frame },
}

/// A value could not be snapshotted or restored.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("cannot capture value: {0}")]
    Capture(#[source] serde_json::Error),

    #[error("cannot restore value as {target}: {source}")]
    Restore {
        target: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Any error raised from inside a contract wrapper block.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error(transparent)]
    Failed(#[from] ContractFailure),

    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl ContractError {
    /// The contract failure, if this error is one.
    pub fn as_failure(&self) -> Option<&ContractFailure> {
        match self {
            ContractError::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.as_failure().map(|failure| failure.kind)
    }
}
