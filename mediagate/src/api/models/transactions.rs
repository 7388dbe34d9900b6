use crate::{db::models::credits::CreditTransactionDBResponse, types::TransactionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

// Response models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    /// Transaction ID
    #[schema(value_type = String, format = "uuid")]
    pub id: TransactionId,
    /// Signed amount: positive for credits, negative for job debits
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// Origin of the entry, `job-debit` for job admissions
    pub source: String,
    pub idempotency_key: String,
    /// Balance before this transaction
    #[schema(value_type = String)]
    pub previous_amount: Decimal,
    /// Balance after this transaction
    #[schema(value_type = String)]
    pub new_amount: Decimal,
    /// When the transaction was created
    pub created_at: DateTime<Utc>,
}

/// Query parameters for listing transactions
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListTransactionsQuery {
    /// Number of items to skip
    pub skip: Option<i64>,

    /// Maximum number of items to return
    pub limit: Option<i64>,
}

// Conversions
impl From<CreditTransactionDBResponse> for TransactionResponse {
    fn from(db: CreditTransactionDBResponse) -> Self {
        Self {
            id: db.id,
            amount: db.amount,
            source: db.source,
            idempotency_key: db.idempotency_key,
            previous_amount: db.previous_amount,
            new_amount: db.new_amount,
            created_at: db.created_at,
        }
    }
}
