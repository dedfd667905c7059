//! Gateway HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, puts tenant admission in front of every
//! tenant-scoped route, and defines the shared application state.
//!
//! # Notes
//! Route composition lives here to keep `main` small and testable.
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::auth::verifier::TokenVerifier;
use crate::context::{ContextBuilder, PipelineTimeouts, require_tenant_context};
use crate::gate::PlanGate;
use crate::observability;
use crate::store::{GatewayStore, UsageStore};
use crate::tenancy::TenantResolver;
use crate::usage::UsageRecorder;
use axum::Router;
use axum::routing::{get, patch, post};
use std::sync::Arc;
use tenantgate_authz::AccessPolicy;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use utoipa::OpenApi;

pub const SERVICE_NAME: &str = "tenantgate";

#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub api_version: String,
    pub store: Arc<dyn GatewayStore>,
    pub pipeline: Arc<ContextBuilder>,
    pub usage: UsageRecorder,
}

/// Pipeline knobs that are not part of the verifier or the policy.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub timeouts: PipelineTimeouts,
    pub usage_queue_capacity: usize,
    pub usage_retention: chrono::Duration,
}

/// Assemble the state over one store.
///
/// Usage metrics go to `usage_store`, which is normally the same store.
/// Spawns the usage worker, so this must run inside a Tokio runtime.
pub fn assemble_state<S>(
    store: Arc<S>,
    usage_store: Arc<dyn UsageStore>,
    verifier: TokenVerifier,
    policy: Arc<AccessPolicy>,
    settings: PipelineSettings,
) -> (AppState, JoinHandle<()>)
where
    S: GatewayStore + 'static,
{
    let (usage, usage_worker) = UsageRecorder::spawn(
        usage_store,
        settings.usage_queue_capacity,
        settings.usage_retention,
    );
    let pipeline = ContextBuilder::new(
        verifier,
        TenantResolver::new(store.clone()),
        PlanGate::new(store.clone()),
        policy,
        usage.clone(),
        settings.timeouts,
    );
    let state = AppState {
        service_name: SERVICE_NAME.to_string(),
        api_version: "v1".to_string(),
        store,
        pipeline: Arc::new(pipeline),
        usage,
    };
    (state, usage_worker)
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
                tenant_id = tracing::field::Empty
            );
            span.set_parent(parent);
            span
        });

    let tenant_routes = Router::new()
        .route("/v1/context", get(api::context::current_context))
        .route("/v1/organization", get(api::organization::get_organization))
        .route(
            "/v1/members",
            get(api::members::list_members).post(api::members::add_member),
        )
        .route("/v1/members/:user_id", patch(api::members::update_member))
        .route(
            "/v1/tenants/:tenant_id/members",
            get(api::members::list_tenant_members),
        )
        .route("/v1/files", post(api::files::upload_file))
        .route("/v1/usage", get(api::usage::get_usage))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_tenant_context,
        ));

    Router::new()
        .route("/v1/system/info", get(api::system::system_info))
        .route("/v1/system/health", get(api::system::system_health))
        .merge(tenant_routes)
        .merge(
            utoipa_swagger_ui::SwaggerUi::new("/docs").url("/v1/openapi.json", ApiDoc::openapi()),
        )
        .layer(trace_layer)
        .with_state(state)
}
