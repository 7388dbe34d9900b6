use crate::{
    db::{
        errors::Result,
        models::users::{UserCreateDBRequest, UserDBResponse},
    },
    types::UserId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

// Database entity model for a user row
#[derive(Debug, Clone, FromRow)]
struct User {
    id: UserId,
    email: String,
    credits: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<User> for UserDBResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            credits: user.credits,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Identity rows for the ledger. Balances are never written here: only
/// [`crate::db::handlers::Credits`] mutates `credits`.
pub struct Users<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Create a user with a zero balance
    pub async fn create(&mut self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email)
            VALUES ($1, $2)
            RETURNING id, email, credits, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.email)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user.into())
    }

    pub async fn get_by_id(&mut self, id: UserId) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, User>("SELECT id, email, credits, created_at, updated_at FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user.map(UserDBResponse::from))
    }

    pub async fn get_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, User>("SELECT id, email, credits, created_at, updated_at FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user.map(UserDBResponse::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::errors::DbError;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_user_starts_with_zero_balance(pool: PgPool) {
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut users = Users::new(&mut conn);

        let user = users
            .create(&UserCreateDBRequest {
                email: "alice@example.com".to_string(),
            })
            .await
            .expect("Failed to create user");

        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.credits, Decimal::ZERO);

        let fetched = users.get_by_id(user.id).await.expect("Failed to get user").expect("User should exist");
        assert_eq!(fetched, user);

        let by_email = users
            .get_by_email("alice@example.com")
            .await
            .expect("Failed to get user")
            .expect("User should exist");
        assert_eq!(by_email.id, user.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_email_is_rejected(pool: PgPool) {
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut users = Users::new(&mut conn);
        let request = UserCreateDBRequest {
            email: "dup@example.com".to_string(),
        };

        users.create(&request).await.expect("First create should succeed");
        match users.create(&request).await {
            Err(DbError::UniqueViolation { .. }) => {}
            other => panic!("Expected UniqueViolation, got {other:?}"),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unknown_user_is_none(pool: PgPool) {
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut users = Users::new(&mut conn);

        assert!(users.get_by_id(Uuid::new_v4()).await.expect("Query failed").is_none());
    }
}
