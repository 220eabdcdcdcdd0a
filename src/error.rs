use thiserror::Error;

/// Failures a single card, chart or forecast panel can run into.
///
/// These never abort a whole render pass: each view turns its own error into
/// a notice and carries on with the next ticker or feature.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DashError {
    /// The data source answered, but with no usable series for the symbol.
    #[error("invalid ticker {symbol}: {reason}")]
    InvalidTicker { symbol: String, reason: String },

    /// The data source could not be reached or the transfer failed.
    #[error("network failure for {symbol}: {reason}")]
    NetworkFailure { symbol: String, reason: String },

    /// Fewer records than the operation needs.
    #[error("insufficient history: need at least {needed} records, got {got}")]
    InsufficientHistory { needed: usize, got: usize },

    /// Model fitting or prediction failed.
    #[error("model error: {0}")]
    Model(String),
}

impl DashError {
    pub fn invalid_ticker(symbol: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTicker {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }

    pub fn network(symbol: &str, reason: impl std::fmt::Display) -> Self {
        Self::NetworkFailure {
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Short machine-readable tag used by the web page to style notices.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTicker { .. } => "invalid_ticker",
            Self::NetworkFailure { .. } => "network_failure",
            Self::InsufficientHistory { .. } => "insufficient_history",
            Self::Model(_) => "model",
        }
    }
}

pub type Result<T> = std::result::Result<T, DashError>;
