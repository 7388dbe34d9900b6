use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

/// Storage-level errors. Constraint violations are classified so callers can tell a
/// business rule from an outage.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: Decimal, required: Decimal },

    #[error("amount must be greater than zero, got {amount}")]
    InvalidAmount { amount: Decimal },

    #[error("idempotency key {key} already belongs to another user")]
    IdempotencyConflict { key: String },

    #[error("unique constraint violated: {constraint:?}")]
    UniqueViolation { constraint: Option<String>, message: String },

    #[error("check constraint violated: {constraint:?}")]
    CheckViolation { constraint: Option<String>, message: String },

    #[error("foreign key constraint violated: {constraint:?}")]
    ForeignKeyViolation { constraint: Option<String>, message: String },

    #[error(transparent)]
    Other(sqlx::Error),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().map(str::to_string);
            let message = db_err.message().to_string();
            // SQLSTATE class 23: integrity constraint violation
            match db_err.code().as_deref() {
                Some("23505") => return DbError::UniqueViolation { constraint, message },
                Some("23514") => return DbError::CheckViolation { constraint, message },
                Some("23503") => return DbError::ForeignKeyViolation { constraint, message },
                _ => {}
            }
        }
        DbError::Other(err)
    }
}

impl DbError {
    pub fn is_unique_violation_on(&self, name: &str) -> bool {
        matches!(self, DbError::UniqueViolation { constraint: Some(c), .. } if c == name)
    }
}
