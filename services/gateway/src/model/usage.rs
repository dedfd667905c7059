//! Usage metric records.
//!
//! Metrics are append-only and expire passively: each row carries its own
//! `expires_at`, and readers ignore rows past it.
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    ApiRequests,
    StorageUsage,
}

impl MetricType {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricType::ApiRequests => "api_requests",
            MetricType::StorageUsage => "storage_usage",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "api_requests" => Ok(MetricType::ApiRequests),
            "storage_usage" => Ok(MetricType::StorageUsage),
            other => Err(format!("unknown metric type {other}")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct UsageMetric {
    pub tenant_id: String,
    /// `"{metric_type}#{YYYY-MM-DD}"`, scoped to the UTC day of `timestamp`.
    pub metric_key: String,
    pub metric_type: MetricType,
    pub value: u64,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UsageMetric {
    pub fn new(
        tenant_id: &str,
        user_id: &str,
        metric_type: MetricType,
        value: u64,
        timestamp: DateTime<Utc>,
        retention: Duration,
    ) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            metric_key: format!("{}#{}", metric_type, timestamp.format("%Y-%m-%d")),
            metric_type,
            value,
            user_id: user_id.to_string(),
            timestamp,
            expires_at: timestamp + retention,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Aggregated unexpired usage for one metric type.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct UsageTotal {
    pub metric_type: MetricType,
    pub total: u64,
}
