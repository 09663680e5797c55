use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::domain::entities::order::OrderSide;
use crate::domain::value_objects::Settlement;

/// Errors produced while reconciling a fill against an account.
///
/// Every variant is returned to the caller; the writer never sees a bundle
/// unless reconciliation succeeded as a whole.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconcileError {
    #[error("Account not found: {account_id}")]
    AccountNotFound { account_id: String },

    #[error("No open {side} position for {symbol} on account {account_id}")]
    NoOffsettingPosition {
        account_id: String,
        symbol: String,
        side: OrderSide,
    },

    #[error("Close quantity {requested} exceeds open quantity {open} for {symbol}")]
    OverClose {
        symbol: String,
        requested: Decimal,
        open: Decimal,
    },

    #[error("Insufficient {settlement} funds: resulting balance would be {resulting}")]
    InsufficientFunds {
        settlement: Settlement,
        resulting: Decimal,
    },

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Partial write for transaction {transaction_id} after {completed:?}: {reason}")]
    PartialWriteFailure {
        transaction_id: String,
        completed: Vec<WriteStep>,
        reason: String,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ReconcileError {
    /// Get the severity level of this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ReconcileError::InvalidOrder(_) => ErrorSeverity::Minor,
            ReconcileError::AccountNotFound { .. } => ErrorSeverity::Moderate,
            ReconcileError::NoOffsettingPosition { .. } => ErrorSeverity::Moderate,
            ReconcileError::InsufficientFunds { .. } => ErrorSeverity::Moderate,
            ReconcileError::OverClose { .. } => ErrorSeverity::Critical,
            ReconcileError::PartialWriteFailure { .. } => ErrorSeverity::Critical,
            ReconcileError::Store(_) => ErrorSeverity::Critical,
        }
    }

    /// Check if this error is recoverable (retrying might help)
    pub fn is_recoverable(&self) -> bool {
        match self {
            ReconcileError::Store(_) => true,
            ReconcileError::PartialWriteFailure { .. } => true,

            ReconcileError::AccountNotFound { .. } => false,
            ReconcileError::NoOffsettingPosition { .. } => false,
            ReconcileError::OverClose { .. } => false,
            ReconcileError::InsufficientFunds { .. } => false,
            ReconcileError::InvalidOrder(_) => false,
        }
    }

    /// Get a short error code for logging/monitoring
    pub fn error_code(&self) -> &'static str {
        match self {
            ReconcileError::AccountNotFound { .. } => "ERR_ACCOUNT_NOT_FOUND",
            ReconcileError::NoOffsettingPosition { .. } => "ERR_NO_OFFSETTING_POSITION",
            ReconcileError::OverClose { .. } => "ERR_OVER_CLOSE",
            ReconcileError::InsufficientFunds { .. } => "ERR_INSUFFICIENT_FUNDS",
            ReconcileError::InvalidOrder(_) => "ERR_INVALID_ORDER",
            ReconcileError::PartialWriteFailure { .. } => "ERR_PARTIAL_WRITE",
            ReconcileError::Store(_) => "ERR_STORE",
        }
    }
}

/// One persistence call of the bundle writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WriteStep {
    Transaction,
    Position,
    Earning,
    Account,
    MarkApplied,
}

/// Severity levels for ledger errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Expected to occur occasionally (bad input)
    Minor,
    /// Rejected business operation
    Moderate,
    /// Data-integrity problem that needs an operator
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Minor => write!(f, "Minor"),
            ErrorSeverity::Moderate => write!(f, "Moderate"),
            ErrorSeverity::Critical => write!(f, "Critical"),
        }
    }
}

/// Errors raised by a ledger store implementation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Unknown order side: {0}")]
    UnknownSide(String),

    #[error("Unknown order status: {0}")]
    UnknownStatus(String),
}

impl From<ValidationError> for ReconcileError {
    fn from(error: ValidationError) -> Self {
        ReconcileError::InvalidOrder(error.to_string())
    }
}
