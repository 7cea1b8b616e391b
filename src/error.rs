//! Error types
//!
//! A zero-denominator ratio is not an error: the engine reports it as `None`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalcError {
    /// Terminal unreachable, login rejected, or logged into the wrong account
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    #[error("Quote unavailable for {symbol}: {reason}")]
    QuoteUnavailable { symbol: String, reason: String },

    #[error("Malformed {kind} record (ticket {}): {reason}", display_ticket(.ticket))]
    MalformedRecord {
        kind: &'static str,
        ticket: Option<u64>,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Terminal error: {0}")]
    Terminal(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CalcError {
    pub fn malformed(kind: &'static str, ticket: Option<u64>, reason: impl Into<String>) -> Self {
        CalcError::MalformedRecord {
            kind,
            ticket,
            reason: reason.into(),
        }
    }

    /// Per-item errors are skipped; everything else fails the account
    pub fn is_item_level(&self) -> bool {
        matches!(
            self,
            CalcError::QuoteUnavailable { .. } | CalcError::MalformedRecord { .. }
        )
    }
}

impl From<::config::ConfigError> for CalcError {
    fn from(e: ::config::ConfigError) -> Self {
        CalcError::Config(e.to_string())
    }
}

fn display_ticket(ticket: &Option<u64>) -> String {
    ticket.map(|t| t.to_string()).unwrap_or_else(|| "?".into())
}

pub type Result<T> = std::result::Result<T, CalcError>;
