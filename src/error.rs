//! Unified error model for the routine-call subsystem.
//! A single enum covers the three failure classes the subsystem distinguishes:
//! caller mistakes (bad indexes, unregistered outputs), non-retryable
//! environment/programming defects (unparseable DDL, premature output reads),
//! and transport failures propagated unmodified from the connection layer.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallError {
    IllegalArgument { code: String, message: String },
    General { code: String, message: String },
    Connection { code: String, message: String },
}

impl CallError {
    pub fn code_str(&self) -> &str {
        match self {
            CallError::IllegalArgument { code, .. }
            | CallError::General { code, .. }
            | CallError::Connection { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CallError::IllegalArgument { message, .. }
            | CallError::General { message, .. }
            | CallError::Connection { message, .. } => message.as_str(),
        }
    }

    pub fn illegal<S: Into<String>>(code: S, msg: S) -> Self { CallError::IllegalArgument { code: code.into(), message: msg.into() } }
    pub fn general<S: Into<String>>(code: S, msg: S) -> Self { CallError::General { code: code.into(), message: msg.into() } }
    pub fn connection<S: Into<String>>(code: S, msg: S) -> Self { CallError::Connection { code: code.into(), message: msg.into() } }

    /// SQLSTATE mapping for frontends that surface this error on the wire.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            CallError::IllegalArgument { .. } => "S1009", // invalid argument value
            CallError::General { .. } => "S1000",         // general error
            CallError::Connection { .. } => "08S01",      // communications link failure
        }
    }

    /// Transport errors belong to the connection layer's retry policy; nothing
    /// in this subsystem is retried internally.
    pub fn is_transport(&self) -> bool {
        matches!(self, CallError::Connection { .. })
    }
}

impl Display for CallError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for CallError {}

pub type CallResult<T> = Result<T, CallError>;

impl From<anyhow::Error> for CallError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: treat as General unless downcasted elsewhere
        CallError::General { code: "general_error".into(), message: err.to_string() }
    }
}
