use crate::{
    auth::{
        current_principal::{INTERNAL_API_KEY_HEADER, SERVICE_API_KEY_HEADER},
        session::InMemorySessionStore,
    },
    config::{AuthConfig, Config, DatabaseConfig, ReconciliationConfig},
    db::{
        handlers::{Credits, Users},
        models::{credits::LedgerMutationDBRequest, users::UserCreateDBRequest},
    },
    queue::InMemoryQueue,
    types::UserId,
    AppState,
};

use axum_test::TestServer;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::{str::FromStr, sync::Arc, time::Duration};
use uuid::Uuid;

/// A router over the real handlers with in-memory queue and sessions
pub struct TestApp {
    pub server: TestServer,
    pub queue: Arc<InMemoryQueue>,
    pub sessions: Arc<InMemorySessionStore>,
    pub config: Config,
}

pub async fn create_test_app(pool: PgPool) -> TestApp {
    let config = create_test_config();
    let queue = Arc::new(InMemoryQueue::new());
    let sessions = Arc::new(InMemorySessionStore::new());

    let state = AppState::builder()
        .db(pool)
        .config(config.clone())
        .queue(queue.clone())
        .sessions(sessions.clone())
        .build();
    let router = crate::build_router(state);
    let server = TestServer::new(router).expect("Failed to create test server");

    TestApp {
        server,
        queue,
        sessions,
        config,
    }
}

pub fn create_test_config() -> Config {
    let database_url = std::env::var("TEST_DATABASE_URL").unwrap_or_else(|_| "postgres://postgres@localhost/test".to_string());

    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database: DatabaseConfig {
            url: database_url,
            ..Default::default()
        },
        auth: AuthConfig {
            service_api_key: "test-service-key".to_string(),
            internal_api_key: "test-internal-key".to_string(),
        },
        reconciliation: ReconciliationConfig {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub async fn create_test_user(pool: &PgPool) -> UserId {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let mut users_repo = Users::new(&mut conn);
    let email = format!("testuser_{}@example.com", Uuid::new_v4().simple());

    users_repo
        .create(&UserCreateDBRequest { email })
        .await
        .expect("Failed to create test user")
        .id
}

/// Create a user and credit them `amount` through the ledger
pub async fn create_funded_user(pool: &PgPool, amount: &str) -> UserId {
    let user_id = create_test_user(pool).await;
    let amount = Decimal::from_str(amount).expect("Invalid decimal amount");
    if amount > Decimal::ZERO {
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        Credits::new(&mut conn)
            .credit(&LedgerMutationDBRequest {
                user_id,
                amount,
                idempotency_key: format!("test-funding-{user_id}"),
                source: "test".to_string(),
            })
            .await
            .expect("Failed to fund test user");
    }
    user_id
}

/// Log `user_id` in and return the cookie header carrying the session
pub fn session_cookie(app: &TestApp, user_id: UserId) -> (String, String) {
    let token = Uuid::new_v4().simple().to_string();
    app.sessions.insert(token.clone(), user_id, Duration::from_secs(3600));
    ("cookie".to_string(), format!("{}={token}", app.config.sessions.cookie_name))
}

pub fn provider_headers(app: &TestApp) -> (String, String) {
    (SERVICE_API_KEY_HEADER.to_string(), app.config.auth.service_api_key.clone())
}

pub fn worker_headers(app: &TestApp) -> (String, String) {
    (INTERNAL_API_KEY_HEADER.to_string(), app.config.auth.internal_api_key.clone())
}
