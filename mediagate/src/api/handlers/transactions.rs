use crate::{
    api::models::transactions::{ListTransactionsQuery, TransactionResponse},
    auth::permissions::{acting_user, operation, resource, RequiresPermission},
    db::handlers::Credits,
    errors::{Error, Result},
    services::with_timeout,
    types::{Operation, Resource},
    AppState,
};
use axum::{
    extract::{Query, State},
    response::Json,
};

/// List the caller's ledger entries
#[utoipa::path(
    get,
    path = "/api/v1/transactions",
    tag = "transactions",
    summary = "List own transactions",
    description = "Ledger entries for the caller, newest first. Credits are positive, job debits negative.",
    params(
        ListTransactionsQuery
    ),
    responses(
        (status = 200, description = "List of transactions", body = [TransactionResponse]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(
        ("session" = [])
    )
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<ListTransactionsQuery>,
    current: RequiresPermission<resource::Credits, operation::ReadOwn>,
) -> Result<Json<Vec<TransactionResponse>>> {
    let user_id = acting_user(&current, Resource::Credits, Operation::ReadOwn)?;
    let skip = query.skip.unwrap_or(0).max(0);
    let limit = query.limit.unwrap_or(100).clamp(0, 1000);

    let transactions = with_timeout(state.config.database.operation_timeout, "list transactions", async {
        let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        Ok(Credits::new(&mut pool_conn).list_user_transactions(user_id, skip, limit).await?)
    })
    .await?;

    Ok(Json(transactions.into_iter().map(TransactionResponse::from).collect()))
}
