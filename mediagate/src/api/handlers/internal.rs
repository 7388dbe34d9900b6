//! Endpoints reserved for the worker fleet, mounted outside the public API prefix.

use crate::{
    api::models::jobs::{JobResponse, JobUpdate},
    auth::permissions::{operation, resource, RequiresPermission},
    errors::Result,
    services::jobs,
    AppState,
};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    response::Json,
};
use tracing::{debug, info};
use uuid::Uuid;

/// Report job progress
#[utoipa::path(
    patch,
    path = "/internal/jobs/{job_id}",
    tag = "internal",
    summary = "Update job status",
    description = "Merge a worker's status report into the job. Fields that are absent or empty keep their stored value. \
                   Status transitions are not validated and credits are never refunded here.",
    params(
        ("job_id" = String, Path, format = "uuid", description = "Job ID"),
    ),
    request_body = JobUpdate,
    responses(
        (status = 200, description = "Updated job", body = JobResponse),
        (status = 400, description = "Malformed body or job ID", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Job not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(
        ("internal_api_key" = [])
    )
)]
pub async fn update_job(
    State(state): State<AppState>,
    _perm: RequiresPermission<resource::Jobs, operation::UpdateAll>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
    body: std::result::Result<Json<JobUpdate>, JsonRejection>,
) -> Result<Json<JobResponse>> {
    let Path(job_id) = path?;
    let Json(update) = body?;

    let job = jobs::update_job(&state.db, state.config.database.operation_timeout, job_id, update.into()).await?;
    if job.status.is_terminal() {
        info!(job_id = %job.id, status = %job.status, error = ?job.error, "Job finished");
    } else {
        debug!(job_id = %job.id, status = %job.status, "Worker updated job");
    }

    Ok(Json(JobResponse::from(job)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::models::jobs::JobCreatedResponse, db::models::jobs::JobStatus, test_utils::*};
    use axum::http::StatusCode;
    use serde_json::{json, Value};
    use sqlx::PgPool;

    async fn submit_job(app: &TestApp, pool: &PgPool) -> (JobCreatedResponse, (String, String)) {
        let user_id = create_funded_user(pool, "5.00").await;
        let cookie = session_cookie(app, user_id);
        let response = app
            .server
            .post("/api/v1/jobs")
            .add_header(cookie.0.clone(), cookie.1.clone())
            .json(&json!({
                "upload_id": "upl_91",
                "source_lang": "en",
                "target_lang": "es",
                "duration": 90
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        (response.json(), cookie)
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_worker_updates_merge(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let (created, cookie) = submit_job(&app, &pool).await;
        let worker = worker_headers(&app);
        let path = format!("/internal/jobs/{}", created.id);

        let failed = app
            .server
            .patch(&path)
            .add_header(worker.0.clone(), worker.1.clone())
            .json(&json!({"status": "failed", "error": "unsupported codec"}))
            .await;
        failed.assert_status_ok();
        let failed: JobResponse = failed.json();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("unsupported codec"));

        // A later report without an error keeps the stored one
        let retried = app
            .server
            .patch(&path)
            .add_header(worker.0, worker.1)
            .json(&json!({"status": "completed", "result_url": "s3://out/job.srt", "error": ""}))
            .await;
        retried.assert_status_ok();
        let retried: JobResponse = retried.json();
        assert_eq!(retried.status, JobStatus::Completed);
        assert_eq!(retried.result_ref.as_deref(), Some("s3://out/job.srt"));
        assert_eq!(retried.error.as_deref(), Some("unsupported codec"));
        assert_eq!(retried.cost, created.cost);

        // The owner sees the worker's view
        let seen: JobResponse = app
            .server
            .get(&format!("/api/v1/jobs/{}", created.id))
            .add_header(cookie.0, cookie.1)
            .await
            .json();
        assert_eq!(seen.status, JobStatus::Completed);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_unknown_job_is_not_found(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let worker = worker_headers(&app);

        let response = app
            .server
            .patch(&format!("/internal/jobs/{}", Uuid::new_v4()))
            .add_header(worker.0.clone(), worker.1.clone())
            .json(&json!({"status": "processing"}))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["error"], "not_found");

        app.server
            .patch("/internal/jobs/not-a-uuid")
            .add_header(worker.0, worker.1)
            .json(&json!({"status": "processing"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_rejects_unknown_status(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let (created, _) = submit_job(&app, &pool).await;
        let worker = worker_headers(&app);

        let response = app
            .server
            .patch(&format!("/internal/jobs/{}", created.id))
            .add_header(worker.0, worker.1)
            .json(&json!({"status": "exploded"}))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "validation_error");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_only_workers_may_update(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let (created, cookie) = submit_job(&app, &pool).await;
        let path = format!("/internal/jobs/{}", created.id);
        let body = json!({"status": "completed"});

        // Even the owner cannot report progress
        app.server
            .patch(&path)
            .add_header(cookie.0, cookie.1)
            .json(&body)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let provider = provider_headers(&app);
        app.server
            .patch(&path)
            .add_header(provider.0, provider.1)
            .json(&body)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        app.server
            .patch(&path)
            .add_header("x-internal-api-key", "guess")
            .json(&body)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        app.server.patch(&path).json(&body).await.assert_status(StatusCode::UNAUTHORIZED);
    }
}
