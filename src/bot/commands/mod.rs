//! Discord command implementations organized by category.

#![allow(clippy::too_long_first_doc_paragraph)]

/// Balance, referral and leaderboard commands
pub mod account;

/// General utility commands
pub mod general;

/// Promo redemption and administration
pub mod promo;

// Export commands
pub use account::*;
pub use general::*;
pub use promo::*;
