//! Unified error type for the ledger.
//!
//! Every variant maps onto one [`ErrorKind`] so callers can decide between
//! reporting, retrying, or giving up without matching on individual variants.

use thiserror::Error;

/// Coarse classification of failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before reaching the writer (malformed amount, bad input).
    Validation,
    /// Unknown account, invoice, withdrawal or promo code.
    NotFound,
    /// A state transition or uniqueness rule was violated.
    Conflict,
    /// Storage I/O, lost writer, or a read that timed out.
    Persistence,
    /// A collaborator outside the ledger failed (chat framework, provider).
    External,
}

/// All errors produced by the ledger.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying storage failure.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Configuration could not be read or parsed.
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// A monetary amount was not finite, not positive, or out of range.
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: f64,
    },

    /// Any other malformed input.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// What was wrong with the input
        message: String,
    },

    /// No account exists for the identifier.
    #[error("Account {account_id} not found")]
    AccountNotFound {
        /// The missing account
        account_id: i64,
    },

    /// No payment exists for the invoice.
    #[error("Payment for invoice '{invoice_id}' not found")]
    PaymentNotFound {
        /// The missing invoice
        invoice_id: String,
    },

    /// No withdrawal exists for the id.
    #[error("Withdrawal {withdrawal_id} not found")]
    WithdrawalNotFound {
        /// The missing withdrawal
        withdrawal_id: i64,
    },

    /// No promo code exists with that name (admin paths only; activation
    /// reports this as a rejection).
    #[error("Promo code '{code}' not found")]
    PromoNotFound {
        /// The normalized code
        code: String,
    },

    /// A debit would take a balance below zero.
    #[error("Insufficient funds: balance {current:.2}, required {required:.2}")]
    InsufficientFunds {
        /// Balance at the time of the attempt
        current: f64,
        /// Amount the operation needed
        required: f64,
    },

    /// A one-shot status transition was attempted from a terminal state.
    #[error("{entity} '{key}' cannot move from {from} to {to}")]
    InvalidTransition {
        /// Which record kind ("payment", "withdrawal")
        entity: &'static str,
        /// Record key
        key: String,
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// An invoice id was registered twice.
    #[error("Invoice '{invoice_id}' already exists")]
    DuplicateInvoice {
        /// The duplicated invoice
        invoice_id: String,
    },

    /// A promo code was created twice.
    #[error("Promo code '{code}' already exists")]
    DuplicatePromo {
        /// The duplicated code
        code: String,
    },

    /// The writer task is gone or dropped the reply.
    #[error("Ledger writer unavailable: {message}")]
    WriterUnavailable {
        /// Which channel failed
        message: String,
    },

    /// A read did not finish within the configured timeout.
    #[error("Read timed out after {millis}ms")]
    ReadTimeout {
        /// Timeout that elapsed
        millis: u64,
    },

    /// File system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Required environment variable missing or not unicode.
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// Numeric conversion overflow (e.g. chat user ids).
    #[error("Integer conversion error: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),

    /// Building a chat reply failed.
    #[error("Formatting error: {0}")]
    Fmt(#[from] std::fmt::Error),

    /// Serenity/Poise framework failure.
    #[error("Serenity/Poise framework error: {0}")]
    Framework(Box<poise::serenity_prelude::Error>),
}

impl From<poise::serenity_prelude::Error> for Error {
    fn from(value: poise::serenity_prelude::Error) -> Self {
        Self::Framework(Box::new(value))
    }
}

impl Error {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount { .. } | Self::InvalidInput { .. } | Self::Config { .. } => {
                ErrorKind::Validation
            }
            Self::AccountNotFound { .. }
            | Self::PaymentNotFound { .. }
            | Self::WithdrawalNotFound { .. }
            | Self::PromoNotFound { .. } => ErrorKind::NotFound,
            Self::InsufficientFunds { .. }
            | Self::InvalidTransition { .. }
            | Self::DuplicateInvoice { .. }
            | Self::DuplicatePromo { .. } => ErrorKind::Conflict,
            Self::Database(_)
            | Self::WriterUnavailable { .. }
            | Self::ReadTimeout { .. }
            | Self::Io(_) => ErrorKind::Persistence,
            Self::EnvVar(_) | Self::IntConversion(_) | Self::Fmt(_) | Self::Framework(_) => {
                ErrorKind::External
            }
        }
    }

    /// Whether the caller may retry the same request unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Persistence)
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicts_are_not_retryable() {
        let err = Error::InsufficientFunds {
            current: 1.0,
            required: 2.0,
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_persistence_errors_are_retryable() {
        let err = Error::ReadTimeout { millis: 250 };
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(err.is_retryable());

        let err = Error::Database(sea_orm::DbErr::Custom("disk I/O error".to_string()));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_validation_kind() {
        let err = Error::InvalidAmount { amount: f64::NAN };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().starts_with("Invalid amount"));
    }
}
