use crate::{
    db::{
        errors::{DbError, Result},
        models::credits::{is_storable_amount, CreditTransactionDBResponse, LedgerMutationDBRequest, LedgerOutcome, MAX_MONEY},
    },
    types::{TransactionId, UserId},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Connection, FromRow, PgConnection};
use tracing::{debug, trace};
use uuid::Uuid;

const IDEMPOTENCY_KEY_CONSTRAINT: &str = "transactions_idempotency_key_key";

const TRANSACTION_COLUMNS: &str = "id, user_id, amount, idempotency_key, source, previous_amount, new_amount, created_at";

// Database entity model for a ledger transaction
#[derive(Debug, Clone, FromRow)]
struct CreditTransaction {
    id: TransactionId,
    user_id: UserId,
    amount: Decimal,
    idempotency_key: String,
    source: String,
    previous_amount: Decimal,
    new_amount: Decimal,
    created_at: DateTime<Utc>,
}

impl From<CreditTransaction> for CreditTransactionDBResponse {
    fn from(tx: CreditTransaction) -> Self {
        Self {
            id: tx.id,
            user_id: tx.user_id,
            amount: tx.amount,
            idempotency_key: tx.idempotency_key,
            source: tx.source,
            previous_amount: tx.previous_amount,
            new_amount: tx.new_amount,
            created_at: tx.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Debit,
    Credit,
}

/// The credit reservation engine. Every balance mutation goes through [`Credits::debit`] or
/// [`Credits::credit`]; both are idempotent on the caller's key.
pub struct Credits<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Credits<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Reserve `amount` from the user's balance.
    ///
    /// Fails with [`DbError::InsufficientFunds`] without writing anything when the balance is too
    /// low. A key that was already applied returns [`LedgerOutcome::AlreadyApplied`] carrying the
    /// balance recorded at the time.
    pub async fn debit(&mut self, request: &LedgerMutationDBRequest) -> Result<LedgerOutcome> {
        self.apply(request, Direction::Debit).await
    }

    /// Add `amount` to the user's balance. Same idempotency rules as [`Credits::debit`].
    pub async fn credit(&mut self, request: &LedgerMutationDBRequest) -> Result<LedgerOutcome> {
        self.apply(request, Direction::Credit).await
    }

    async fn apply(&mut self, request: &LedgerMutationDBRequest, direction: Direction) -> Result<LedgerOutcome> {
        if !is_storable_amount(request.amount) {
            return Err(DbError::InvalidAmount { amount: request.amount });
        }

        // Nested inside the caller's transaction this becomes a savepoint, so job admission can
        // commit the debit and the job row together.
        let mut tx = self.db.begin().await?;

        // Exclusive row lock for the whole read-modify-write. Only this user is serialised;
        // mutations for other users proceed in parallel.
        let current_balance = sqlx::query_scalar::<_, Decimal>("SELECT credits FROM users WHERE id = $1 FOR UPDATE")
            .bind(request.user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DbError::NotFound { entity: "User" })?;

        trace!("Acquired row lock for user_id {}", request.user_id);

        // Looked up under the lock: a concurrent replay for the same user waits for the first
        // attempt to commit and then finds its row here.
        if let Some(existing) = find_by_key(&mut tx, &request.idempotency_key).await? {
            if existing.user_id != request.user_id {
                return Err(DbError::IdempotencyConflict {
                    key: request.idempotency_key.clone(),
                });
            }
            tx.commit().await?;
            debug!(
                user_id = %request.user_id,
                idempotency_key = %request.idempotency_key,
                "Ledger mutation already applied, returning recorded balance"
            );
            return Ok(LedgerOutcome::AlreadyApplied(existing.into()));
        }

        let (signed_amount, new_balance) = match direction {
            Direction::Credit => {
                let new_balance = current_balance + request.amount;
                if new_balance >= MAX_MONEY {
                    return Err(DbError::InvalidAmount { amount: request.amount });
                }
                (request.amount, new_balance)
            }
            Direction::Debit => {
                if current_balance < request.amount {
                    return Err(DbError::InsufficientFunds {
                        balance: current_balance,
                        required: request.amount,
                    });
                }
                (-request.amount, current_balance - request.amount)
            }
        };

        sqlx::query("UPDATE users SET credits = $2, updated_at = NOW() WHERE id = $1")
            .bind(request.user_id)
            .bind(new_balance)
            .execute(&mut *tx)
            .await?;

        let transaction = sqlx::query_as::<_, CreditTransaction>(&format!(
            r#"
            INSERT INTO transactions (id, user_id, amount, idempotency_key, source, previous_amount, new_amount)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(signed_amount)
        .bind(&request.idempotency_key)
        .bind(&request.source)
        .bind(current_balance)
        .bind(new_balance)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            // Only reachable when another user's mutation claimed the key concurrently
            let err = DbError::from(e);
            if err.is_unique_violation_on(IDEMPOTENCY_KEY_CONSTRAINT) {
                DbError::IdempotencyConflict {
                    key: request.idempotency_key.clone(),
                }
            } else {
                err
            }
        })?;

        tx.commit().await?;

        Ok(LedgerOutcome::Applied(transaction.into()))
    }

    /// Current balance for a user, read without locking
    pub async fn get_user_balance(&mut self, user_id: UserId) -> Result<Decimal> {
        sqlx::query_scalar::<_, Decimal>("SELECT credits FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&mut *self.db)
            .await?
            .ok_or(DbError::NotFound { entity: "User" })
    }

    /// Sum of every committed transaction amount for a user. Always equal to the balance.
    #[cfg(test)]
    pub async fn sum_user_transactions(&mut self, user_id: UserId) -> Result<Decimal> {
        let sum = sqlx::query_scalar::<_, Decimal>("SELECT COALESCE(SUM(amount), 0) FROM transactions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(sum)
    }

    /// List transactions for a specific user with pagination, most recent first
    pub async fn list_user_transactions(&mut self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<CreditTransactionDBResponse>> {
        let transactions = sqlx::query_as::<_, CreditTransaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            OFFSET $2
            LIMIT $3
            "#
        ))
        .bind(user_id)
        .bind(skip)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(transactions.into_iter().map(CreditTransactionDBResponse::from).collect())
    }

    #[cfg(test)]
    pub async fn get_transaction_by_key(&mut self, idempotency_key: &str) -> Result<Option<CreditTransactionDBResponse>> {
        Ok(find_by_key(self.db, idempotency_key).await?.map(CreditTransactionDBResponse::from))
    }
}

async fn find_by_key(conn: &mut PgConnection, idempotency_key: &str) -> Result<Option<CreditTransaction>> {
    let transaction = sqlx::query_as::<_, CreditTransaction>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE idempotency_key = $1"
    ))
    .bind(idempotency_key)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(transaction)
}
