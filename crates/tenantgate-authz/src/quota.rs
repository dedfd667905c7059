use serde::{Deserialize, Serialize};
use std::fmt;

/// Tenant resource with a numeric ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaKind {
    Users,
    StorageBytes,
}

impl QuotaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QuotaKind::Users => "users",
            QuotaKind::StorageBytes => "storage_bytes",
        }
    }
}

impl fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaDenied {
    pub kind: QuotaKind,
    pub current: u64,
    pub delta: u64,
    pub limit: u64,
}

impl fmt::Display for QuotaDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} quota exceeded (limit {})", self.kind, self.limit)
    }
}

/// Admit iff `current + delta <= limit`. Overflow is a denial.
pub fn check_quota_limit(
    kind: QuotaKind,
    current: u64,
    delta: u64,
    limit: u64,
) -> Result<(), QuotaDenied> {
    match current.checked_add(delta) {
        Some(projected) if projected <= limit => Ok(()),
        _ => Err(QuotaDenied {
            kind,
            current,
            delta,
            limit,
        }),
    }
}
