use crate::app::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Axum middleware guarding every tenant-scoped route.
///
/// Admitted requests continue with a [`super::TenantContext`] in their
/// extensions. Rejected requests never reach the handler.
pub async fn require_tenant_context(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let outcome = state
        .pipeline
        .build(
            request.method().as_str(),
            request.uri().path(),
            request.headers(),
        )
        .await;
    match outcome {
        Ok(context) => {
            tracing::Span::current().record("tenant_id", context.tenant_id.as_str());
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(rejection) => {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            rejection.into_api_error(request_id).into_response()
        }
    }
}
