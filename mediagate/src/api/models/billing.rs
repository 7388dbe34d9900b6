use crate::{
    db::models::credits::LedgerOutcome,
    types::{TransactionId, UserId},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Request models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreditCreate {
    /// User to credit
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    /// Amount of credits to add, strictly positive
    #[schema(value_type = String, example = "10.00")]
    pub amount: Decimal,
    /// Provider-side unique id for this payment; retries must reuse it
    pub idempotency_key: String,
    /// Free-form origin tag recorded on the ledger entry
    pub source: Option<String>,
}

// Response models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreditResponse {
    #[schema(value_type = String, format = "uuid")]
    pub transaction_id: TransactionId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    /// Balance right after this credit was applied
    #[schema(value_type = String)]
    pub balance: Decimal,
    /// True when this key had been applied before and nothing changed
    pub already_applied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    #[schema(value_type = String)]
    pub balance: Decimal,
}

impl From<LedgerOutcome> for CreditResponse {
    fn from(outcome: LedgerOutcome) -> Self {
        let already_applied = outcome.already_applied();
        let tx = outcome.transaction();
        Self {
            transaction_id: tx.id,
            user_id: tx.user_id,
            balance: tx.new_amount,
            already_applied,
        }
    }
}
