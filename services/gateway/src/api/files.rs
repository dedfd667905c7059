//! File upload accounting.
//!
//! Only the byte count matters here. Admission checks the storage quota
//! against `Content-Length`; the received body is checked again before the
//! tenant's storage counter moves, so an upload without a declared length
//! cannot slip past the limit.
use crate::api::error::{ApiError, api_internal, api_quota_exceeded, api_tenant_error};
use crate::api::types::FileUploadResponse;
use crate::app::AppState;
use crate::context::TenantContext;
use crate::gate::GateDenial;
use crate::usage::UsageEvent;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use tenantgate_authz::QuotaKind;

#[utoipa::path(
    post,
    path = "/v1/files",
    tag = "files",
    security(("bearer" = [])),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Upload accepted", body = FileUploadResponse),
        (status = 403, description = "Forbidden or storage quota exceeded", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn upload_file(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    body: Bytes,
) -> Result<(StatusCode, Json<FileUploadResponse>), ApiError> {
    let bytes = body.len() as u64;
    state
        .pipeline
        .gate()
        .check_tenant_quota(
            &context.tenant_id,
            &context.organization_settings,
            QuotaKind::StorageBytes,
            bytes,
        )
        .await
        .map_err(|denial| match denial {
            GateDenial::QuotaExceeded(denied) => api_quota_exceeded(&denied.to_string()),
            GateDenial::Store(err) => api_internal("failed to read storage usage", &err),
            GateDenial::PaymentRequired(_) => api_tenant_error("unexpected plan denial"),
        })?;
    let storage_used = state
        .store
        .add_storage_used(&context.tenant_id, bytes)
        .await
        .map_err(|err| api_internal("failed to record upload", &err))?;
    state
        .usage
        .record(&context.tenant_id, &context.user_id, UsageEvent::Upload { bytes });
    Ok((
        StatusCode::CREATED,
        Json(FileUploadResponse {
            tenant_id: context.tenant_id,
            bytes,
            storage_used,
        }),
    ))
}
