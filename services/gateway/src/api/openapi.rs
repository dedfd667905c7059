//! OpenAPI schema aggregation for the gateway API.
use crate::api::{
    context, files, members, organization, system,
    types::{
        ErrorResponse, FileUploadResponse, HealthStatus, MemberCreateRequest, MemberListResponse,
        MemberPatchRequest, SystemInfo, UpgradeHint, UsageResponse,
    },
    usage,
};
use crate::context::{TenantContext, TokenMeta};
use crate::model::{
    MembershipStatus, MetricType, Organization, OrganizationSettings, OrganizationStatus,
    TenantMembership, UsageTotal,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "tenantgate",
        version = "v1",
        description = "Multi-tenant authentication and authorization gateway"
    ),
    modifiers(&BearerAuth),
    paths(
        system::system_info,
        system::system_health,
        context::current_context,
        organization::get_organization,
        members::list_members,
        members::list_tenant_members,
        members::add_member,
        members::update_member,
        files::upload_file,
        usage::get_usage
    ),
    components(schemas(
        SystemInfo,
        HealthStatus,
        ErrorResponse,
        UpgradeHint,
        TenantContext,
        TokenMeta,
        Organization,
        OrganizationSettings,
        OrganizationStatus,
        TenantMembership,
        MembershipStatus,
        MemberListResponse,
        MemberCreateRequest,
        MemberPatchRequest,
        FileUploadResponse,
        UsageResponse,
        UsageTotal,
        MetricType
    )),
    tags(
        (name = "system", description = "Health and discovery endpoints"),
        (name = "context", description = "Resolved caller context"),
        (name = "organization", description = "Acting tenant's organization"),
        (name = "members", description = "Membership management"),
        (name = "files", description = "Storage accounting"),
        (name = "usage", description = "Usage analytics")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_protected_routes_and_bearer_scheme() {
        let doc = serde_json::to_value(ApiDoc::openapi()).expect("openapi json");
        for path in [
            "/v1/context",
            "/v1/members",
            "/v1/members/{user_id}",
            "/v1/tenants/{tenant_id}/members",
            "/v1/usage",
        ] {
            assert!(doc["paths"].get(path).is_some(), "missing {path}");
        }
        assert_eq!(doc["components"]["securitySchemes"]["bearer"]["scheme"], "bearer");
    }
}
