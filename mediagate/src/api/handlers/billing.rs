use crate::{
    api::models::billing::{BalanceResponse, CreditCreate, CreditResponse},
    auth::permissions::{acting_user, operation, resource, RequiresPermission},
    db::{
        handlers::Credits,
        models::credits::{LedgerMutationDBRequest, MAX_MONEY, MONEY_SCALE},
    },
    errors::{Error, Result},
    services::{admission::JOB_DEBIT_KEY_PREFIX, with_timeout},
    types::{Operation, Resource},
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Json,
};
use rust_decimal::Decimal;
use tracing::{info, warn};

const DEFAULT_CREDIT_SOURCE: &str = "payment-provider";
const MAX_KEY_LENGTH: usize = 255;

/// Credit a user's balance
#[utoipa::path(
    post,
    path = "/api/v1/billing/credit",
    tag = "billing",
    summary = "Credit a balance",
    description = "Add purchased credits to a user's balance. Called by the payment provider. \
                   Deliveries are deduplicated on idempotency_key: a retried payment is acknowledged without crediting twice.",
    request_body = CreditCreate,
    responses(
        (status = 201, description = "Credit applied", body = CreditResponse),
        (status = 200, description = "Credit was already applied earlier", body = CreditResponse),
        (status = 400, description = "Invalid amount or key", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Idempotency key belongs to another user", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(
        ("service_api_key" = [])
    )
)]
pub async fn create_credit(
    State(state): State<AppState>,
    _perm: RequiresPermission<resource::Credits, operation::CreateAll>,
    body: std::result::Result<Json<CreditCreate>, JsonRejection>,
) -> Result<(StatusCode, Json<CreditResponse>)> {
    let Json(data) = body?;

    if data.amount <= Decimal::ZERO {
        return Err(Error::BadRequest {
            message: "Amount must be greater than zero".to_string(),
        });
    }
    if data.amount.normalize().scale() > MONEY_SCALE {
        return Err(Error::BadRequest {
            message: format!("Amount must have at most {MONEY_SCALE} decimal places"),
        });
    }
    if data.amount >= MAX_MONEY {
        return Err(Error::BadRequest {
            message: format!("Amount must be less than {MAX_MONEY}"),
        });
    }
    let key = data.idempotency_key.trim();
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        return Err(Error::BadRequest {
            message: format!("idempotency_key must be 1-{MAX_KEY_LENGTH} characters"),
        });
    }
    // Admission debits own this namespace
    if key.starts_with(JOB_DEBIT_KEY_PREFIX) {
        return Err(Error::BadRequest {
            message: format!("idempotency_key must not start with '{JOB_DEBIT_KEY_PREFIX}'"),
        });
    }

    let request = LedgerMutationDBRequest {
        user_id: data.user_id,
        amount: data.amount,
        idempotency_key: key.to_string(),
        source: data
            .source
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CREDIT_SOURCE.to_string()),
    };

    let outcome = with_timeout(state.config.database.operation_timeout, "credit balance", async {
        let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        Ok(Credits::new(&mut pool_conn).credit(&request).await?)
    })
    .await?;

    let status = if outcome.already_applied() {
        warn!(user_id = %request.user_id, idempotency_key = %request.idempotency_key, "Duplicate credit delivery acknowledged");
        StatusCode::OK
    } else {
        info!(user_id = %request.user_id, amount = %request.amount, new_balance = %outcome.new_balance(), "Credits added");
        StatusCode::CREATED
    };

    Ok((status, Json(CreditResponse::from(outcome))))
}

/// Get the caller's balance
#[utoipa::path(
    get,
    path = "/api/v1/billing/balance",
    tag = "billing",
    summary = "Get own balance",
    responses(
        (status = 200, description = "Current balance", body = BalanceResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(
        ("session" = [])
    )
)]
pub async fn get_balance(
    State(state): State<AppState>,
    current: RequiresPermission<resource::Credits, operation::ReadOwn>,
) -> Result<Json<BalanceResponse>> {
    let user_id = acting_user(&current, Resource::Credits, Operation::ReadOwn)?;

    let balance = with_timeout(state.config.database.operation_timeout, "read balance", async {
        let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        Ok(Credits::new(&mut pool_conn).get_user_balance(user_id).await?)
    })
    .await?;

    Ok(Json(BalanceResponse { user_id, balance }))
}
