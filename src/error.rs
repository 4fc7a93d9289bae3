use miette::Diagnostic;
use std::fmt;
use thiserror::Error;

use crate::domain::payment::TransactionId;

/// Classification of a failed call across the network boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The request was rejected (4xx, or a `success: false` body).
    Client { status: u16 },
    /// The server failed to handle the request (5xx).
    Server { status: u16 },
    /// No response was received at all.
    Unreachable,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::Client { status } => write!(f, "client error {status}"),
            FaultKind::Server { status } => write!(f, "server error {status}"),
            FaultKind::Unreachable => f.write_str("unreachable"),
        }
    }
}

/// A failed call to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct RemoteFault {
    pub kind: FaultKind,
    pub message: String,
}

impl RemoteFault {
    pub fn client(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Client { status },
            message: message.into(),
        }
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Server { status },
            message: message.into(),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Unreachable,
            message: message.into(),
        }
    }

    /// Whether repeating the same request may succeed.
    ///
    /// Only server errors and unreachable backends qualify; a rejected
    /// request will be rejected again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind, FaultKind::Client { .. })
    }
}

/// The durable storage medium failed (disk full, corruption, ...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("storage fault: {message}")]
pub struct StorageFault {
    pub message: String,
}

impl StorageFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum WalletError {
    #[error("invalid amount: {0}")]
    #[diagnostic(
        code(wallet::invalid_amount),
        help("enter a positive amount that does not exceed the allowed limit")
    )]
    InvalidAmount(String),

    #[error("remote ledger call failed: {0}")]
    #[diagnostic(
        code(wallet::remote),
        help("check your connection and try again; payments are never resubmitted automatically")
    )]
    Remote(#[from] RemoteFault),

    #[error("no installed application can handle payment {transaction_id}")]
    #[diagnostic(
        code(wallet::no_handler),
        help("the transaction is still open on the server; check its status in the transaction history later")
    )]
    NoHandlerAvailable { transaction_id: TransactionId },

    #[error(transparent)]
    #[diagnostic(code(wallet::storage))]
    Storage(#[from] StorageFault),

    #[error("operation not allowed: {0}")]
    #[diagnostic(code(wallet::invalid_state))]
    InvalidState(String),

    #[error("wallet engine is no longer running")]
    #[diagnostic(code(wallet::stopped))]
    EngineStopped,

    #[error("invalid configuration: {0}")]
    #[diagnostic(code(wallet::config))]
    Config(String),

    #[error("output error: {0}")]
    #[diagnostic(code(wallet::output))]
    Output(String),
}

impl From<csv::Error> for WalletError {
    fn from(e: csv::Error) -> Self {
        WalletError::Output(e.to_string())
    }
}

impl From<std::io::Error> for WalletError {
    fn from(e: std::io::Error) -> Self {
        WalletError::Output(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WalletError>;
