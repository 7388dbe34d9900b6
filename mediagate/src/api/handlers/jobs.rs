use crate::{
    api::models::jobs::{JobCreate, JobCreatedResponse, JobResponse, ListJobsQuery},
    auth::permissions::{acting_user, operation, resource, RequiresPermission},
    errors::{Error, Result},
    services::{admission, jobs},
    types::{Operation, Resource},
    AppState,
};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::Json,
};
use uuid::Uuid;

/// Client-chosen key that makes job creation safe to retry
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
const MAX_IDEMPOTENCY_KEY_LENGTH: usize = 255;

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .map_err(|_| Error::BadRequest {
            message: "Idempotency-Key must be visible ASCII".to_string(),
        })?
        .trim();
    if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LENGTH {
        return Err(Error::BadRequest {
            message: format!("Idempotency-Key must be 1-{MAX_IDEMPOTENCY_KEY_LENGTH} characters"),
        });
    }
    Ok(Some(key.to_string()))
}

/// Submit a media conversion job
#[utoipa::path(
    post,
    path = "/api/v1/jobs",
    tag = "jobs",
    summary = "Submit a job",
    description = "Validate the request, reserve its cost from the caller's credit balance and queue the job. \
                   Send an Idempotency-Key header to make retries safe: a retry returns the original job without charging again.",
    request_body = JobCreate,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Client-chosen key identifying this submission"),
    ),
    responses(
        (status = 201, description = "Job admitted", body = JobCreatedResponse),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 402, description = "Insufficient credits", body = crate::errors::ErrorResponse),
        (status = 503, description = "Timed out, safe to retry", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(
        ("session" = [])
    )
)]
pub async fn create_job(
    State(state): State<AppState>,
    current: RequiresPermission<resource::Jobs, operation::CreateOwn>,
    headers: HeaderMap,
    body: std::result::Result<Json<JobCreate>, JsonRejection>,
) -> Result<(StatusCode, Json<JobCreatedResponse>)> {
    let user_id = acting_user(&current, Resource::Jobs, Operation::CreateOwn)?;
    let Json(data) = body?;

    let key = idempotency_key(&headers)?;
    let validated = admission::validate(&data)?;
    let job_id = admission::job_id_for(user_id, key.as_deref());

    let admitted = admission::create_job(
        state.db.clone(),
        state.queue.clone(),
        state.config.clone(),
        user_id,
        job_id,
        validated,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(JobCreatedResponse {
            id: admitted.job.id,
            status: admitted.job.status,
            cost: admitted.job.cost,
            enqueued: admitted.enqueued,
        }),
    ))
}

/// List the caller's jobs
#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    tag = "jobs",
    summary = "List own jobs",
    description = "List the caller's jobs, most recent first.",
    params(
        ListJobsQuery
    ),
    responses(
        (status = 200, description = "List of jobs", body = [JobResponse]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(
        ("session" = [])
    )
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
    current: RequiresPermission<resource::Jobs, operation::ReadOwn>,
) -> Result<Json<Vec<JobResponse>>> {
    let user_id = acting_user(&current, Resource::Jobs, Operation::ReadOwn)?;
    let skip = query.skip.unwrap_or(0).max(0);
    let limit = query.limit.unwrap_or(100).clamp(0, 1000);

    let jobs = jobs::list_jobs(&state.db, state.config.database.operation_timeout, user_id, skip, limit).await?;

    Ok(Json(jobs.into_iter().map(JobResponse::from).collect()))
}

/// Get a job by ID
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{job_id}",
    tag = "jobs",
    summary = "Get a job",
    description = "Get one of the caller's jobs. Jobs owned by other users are reported as not found.",
    params(
        ("job_id" = String, Path, format = "uuid", description = "Job ID"),
    ),
    responses(
        (status = 200, description = "Job details", body = JobResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Job not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(
        ("session" = [])
    )
)]
pub async fn get_job(
    State(state): State<AppState>,
    current: RequiresPermission<resource::Jobs, operation::ReadOwn>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<Json<JobResponse>> {
    let Path(job_id) = path?;

    let job = jobs::get_job(&state.db, state.config.database.operation_timeout, &current, job_id).await?;

    Ok(Json(JobResponse::from(job)))
}
