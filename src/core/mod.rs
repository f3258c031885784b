//! Core ledger logic - framework-agnostic operations on the store.
//!
//! Top-level functions take a `&DatabaseConnection` and run their own
//! transaction; helpers that must compose inside another unit of work are
//! generic over `ConnectionTrait`. Nothing here is concurrency-safe on its
//! own: callers go through the writer, which runs one operation at a time.

/// Account registration and balance mutation
pub mod account;
/// Append-only audit trail
pub mod audit;
/// Invoice lifecycle
pub mod payment;
/// Promo code administration and activation
pub mod promo;
/// Referral bonus latch and share codes
pub mod referral;
/// Game and text settings
pub mod settings;
/// Read-only aggregations
pub mod views;
/// Payout requests
pub mod withdrawal;

/// Result of a one-shot status transition (payment or withdrawal).
#[derive(Debug, Clone, PartialEq)]
pub enum StatusChange {
    /// This call performed the transition.
    Applied {
        /// Account the record belongs to
        account_id: i64,
        /// Amount carried by the record
        amount: f64,
        /// Referral bonus paid as part of the transition, if any
        referral: Option<referral::ReferralCredit>,
    },
    /// The record was already in the requested state; nothing changed.
    NoOp {
        /// Account the record belongs to
        account_id: i64,
    },
}

impl StatusChange {
    /// Account the record belongs to, whichever way the call went.
    #[must_use]
    pub const fn account_id(&self) -> i64 {
        match self {
            Self::Applied { account_id, .. } | Self::NoOp { account_id } => *account_id,
        }
    }

    /// Whether this call performed the transition
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}
