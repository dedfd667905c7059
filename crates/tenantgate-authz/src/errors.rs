use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthzError {
    #[error("invalid permission: {0}")]
    InvalidPermission(String),
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("unknown plan: {0}")]
    UnknownPlan(String),
    #[error("invalid route {route}: {reason}")]
    InvalidRoute { route: String, reason: String },
    #[error("duplicate route: {0}")]
    DuplicateRoute(String),
    #[error("invalid feature {feature}: {reason}")]
    InvalidFeature { feature: String, reason: String },
    #[error("role table is not monotone: {senior} lacks {permission} held by {junior}")]
    NonMonotoneRoles {
        senior: String,
        junior: String,
        permission: String,
    },
}

pub type AuthzResult<T> = Result<T, AuthzError>;
