//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod account;
pub mod audit_log;
pub mod game_setting;
pub mod payment;
pub mod promo_activation;
pub mod promo_code;
pub mod referral_code;
pub mod schema_migration;
pub mod text_setting;
pub mod withdrawal;

// Re-export specific types to avoid conflicts
pub use account::{Column as AccountColumn, Entity as Account, Model as AccountModel};
pub use audit_log::{Column as AuditLogColumn, Entity as AuditLog, Model as AuditLogModel};
pub use game_setting::{
    Column as GameSettingColumn, Entity as GameSetting, Model as GameSettingModel,
};
pub use payment::{
    Column as PaymentColumn, Entity as Payment, Model as PaymentModel, PaymentStatus,
};
pub use promo_activation::{
    Column as PromoActivationColumn, Entity as PromoActivation, Model as PromoActivationModel,
};
pub use promo_code::{Column as PromoCodeColumn, Entity as PromoCode, Model as PromoCodeModel};
pub use referral_code::{
    Column as ReferralCodeColumn, Entity as ReferralCode, Model as ReferralCodeModel,
};
pub use schema_migration::{Entity as SchemaMigration, Model as SchemaMigrationModel};
pub use text_setting::{
    Column as TextSettingColumn, Entity as TextSetting, Model as TextSettingModel,
};
pub use withdrawal::{
    Column as WithdrawalColumn, Entity as Withdrawal, Model as WithdrawalModel, WithdrawalStatus,
};
