use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

use crate::{
    api,
    auth::current_principal::{INTERNAL_API_KEY_HEADER, SERVICE_API_KEY_HEADER},
};

/// Registers the three ways a caller can authenticate. The session cookie name is
/// configurable; the default is documented.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "session".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "octavia_session",
                    "Browser session established by the web application",
                ))),
            );
            components.security_schemes.insert(
                "service_api_key".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    SERVICE_API_KEY_HEADER,
                    "Shared key held by the payment provider",
                ))),
            );
            components.security_schemes.insert(
                "internal_api_key".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    INTERNAL_API_KEY_HEADER,
                    "Shared key held by conversion workers",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    paths(
        api::handlers::jobs::create_job,
        api::handlers::jobs::list_jobs,
        api::handlers::jobs::get_job,
        api::handlers::billing::create_credit,
        api::handlers::billing::get_balance,
        api::handlers::transactions::list_transactions,
        api::handlers::internal::update_job,
    ),
    components(
        schemas(
            api::models::jobs::JobCreate,
            api::models::jobs::JobUpdate,
            api::models::jobs::JobCreatedResponse,
            api::models::jobs::JobResponse,
            api::models::billing::CreditCreate,
            api::models::billing::CreditResponse,
            api::models::billing::BalanceResponse,
            api::models::transactions::TransactionResponse,
            crate::db::models::jobs::JobStatus,
            crate::errors::ErrorResponse,
        )
    ),
    tags(
        (name = "jobs", description = "Submit conversion jobs and follow their progress"),
        (name = "billing", description = "Pre-paid credit balance"),
        (name = "transactions", description = "Credit ledger history"),
        (name = "internal", description = "Worker status reporting"),
    ),
    info(
        title = "mediagate API",
        version = "0.1.0",
        description = "Job admission gateway for media conversion with a pre-paid credit ledger",
    ),
)]
pub struct ApiDoc;
