use crate::types::{TransactionId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Source tag recorded on ledger entries created by job admission
pub const JOB_DEBIT_SOURCE: &str = "job-debit";

/// Decimal places kept by the NUMERIC(20,6) money columns
pub const MONEY_SCALE: u32 = 6;

/// Exclusive upper bound for amounts and balances in a NUMERIC(20,6) column (10^14)
pub const MAX_MONEY: Decimal = Decimal::from_parts(0x107A_4000, 0x5AF3, 0, false, 0);

/// Whether `amount` is positive and can be stored without rounding or overflow
pub fn is_storable_amount(amount: Decimal) -> bool {
    amount > Decimal::ZERO && amount.normalize().scale() <= MONEY_SCALE && amount < MAX_MONEY
}

/// Database request for moving funds in or out of a user's balance.
/// `amount` is always positive; the direction is given by the operation called.
#[derive(Debug, Clone)]
pub struct LedgerMutationDBRequest {
    pub user_id: UserId,
    pub amount: Decimal,
    pub idempotency_key: String,
    pub source: String,
}

/// Database response for a ledger transaction
#[derive(Debug, Clone, PartialEq)]
pub struct CreditTransactionDBResponse {
    pub id: TransactionId,
    pub user_id: UserId,
    /// Signed: positive for credits, negative for debits
    pub amount: Decimal,
    pub idempotency_key: String,
    pub source: String,
    pub previous_amount: Decimal,
    pub new_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Result of a debit or credit. Replays of a known idempotency key report the
/// originally recorded transaction and leave the balance untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerOutcome {
    Applied(CreditTransactionDBResponse),
    AlreadyApplied(CreditTransactionDBResponse),
}

impl LedgerOutcome {
    pub fn transaction(&self) -> &CreditTransactionDBResponse {
        match self {
            LedgerOutcome::Applied(tx) | LedgerOutcome::AlreadyApplied(tx) => tx,
        }
    }

    pub fn new_balance(&self) -> Decimal {
        self.transaction().new_amount
    }

    pub fn already_applied(&self) -> bool {
        matches!(self, LedgerOutcome::AlreadyApplied(_))
    }
}
