use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

// Gateway configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    // Public API listener.
    pub bind_addr: SocketAddr,
    // Prometheus scrape listener.
    pub metrics_bind: SocketAddr,
    // Identity provider key set document.
    pub jwks_url: String,
    // Exact issuer string expected in tokens.
    pub issuer: String,
    // Client identifier that must appear in `aud`.
    pub audience: String,
    // Claim carrying an optional tenant hint.
    pub tenant_claim: String,
    pub clock_skew_secs: u64,
    pub jwks_cache_ttl_secs: u64,
    pub jwks_cache_capacity: u64,
    pub jwks_fetch_timeout_ms: u64,
    // Minimum spacing between key set fetches for unknown key ids.
    pub jwks_refresh_cooldown_ms: u64,
    // Deadline for the whole admission pipeline.
    pub pipeline_timeout_ms: u64,
    // Deadline for tenant resolution, including provisioning.
    pub tenant_lookup_timeout_ms: u64,
    pub usage_queue_capacity: usize,
    pub usage_retention_days: i64,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    // Role table, route registry and feature table; built-in when unset.
    pub access_policy_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            other => anyhow::bail!("unknown storage backend {other}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

const DEFAULT_BIND: &str = "0.0.0.0:8443";
const DEFAULT_METRICS_BIND: &str = "0.0.0.0:8080";
const DEFAULT_TENANT_CLAIM: &str = "tenant_id";
const DEFAULT_CLOCK_SKEW_SECS: u64 = 60;
const DEFAULT_JWKS_CACHE_TTL_SECS: u64 = 600;
const DEFAULT_JWKS_CACHE_CAPACITY: u64 = 64;
const DEFAULT_JWKS_FETCH_TIMEOUT_MS: u64 = 3000;
const DEFAULT_JWKS_REFRESH_COOLDOWN_MS: u64 = 5000;
const DEFAULT_PIPELINE_TIMEOUT_MS: u64 = 5000;
const DEFAULT_TENANT_LOOKUP_TIMEOUT_MS: u64 = 2000;
const DEFAULT_USAGE_QUEUE_CAPACITY: usize = 4096;
const DEFAULT_USAGE_RETENTION_DAYS: i64 = 395;
const DEFAULT_PG_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_PG_CONNECT_TIMEOUT_MS: u64 = 5000;
const DEFAULT_PG_ACQUIRE_TIMEOUT_MS: u64 = 5000;

fn default_max_connections() -> u32 {
    DEFAULT_PG_MAX_CONNECTIONS
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_PG_CONNECT_TIMEOUT_MS
}

fn default_acquire_timeout_ms() -> u64 {
    DEFAULT_PG_ACQUIRE_TIMEOUT_MS
}

#[derive(Debug, Deserialize)]
struct GatewayConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    jwks_url: Option<String>,
    issuer: Option<String>,
    audience: Option<String>,
    tenant_claim: Option<String>,
    clock_skew_secs: Option<u64>,
    jwks_cache_ttl_secs: Option<u64>,
    jwks_cache_capacity: Option<u64>,
    jwks_fetch_timeout_ms: Option<u64>,
    jwks_refresh_cooldown_ms: Option<u64>,
    pipeline_timeout_ms: Option<u64>,
    tenant_lookup_timeout_ms: Option<u64>,
    usage_queue_capacity: Option<usize>,
    usage_retention_days: Option<i64>,
    storage: Option<String>,
    postgres: Option<PostgresConfig>,
    access_policy_path: Option<PathBuf>,
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value.parse().with_context(|| format!("parse {name}")),
        Err(_) => Ok(default),
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self::read_env()?;
        config.require_identity()?;
        Ok(config)
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::read_env()?;
        if let Ok(path) = std::env::var("TENANTGATE_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read TENANTGATE_CONFIG: {path}"))?;
            let override_cfg: GatewayConfigOverride =
                serde_yaml::from_str(&contents).with_context(|| "parse gateway config yaml")?;
            config.apply_override(override_cfg)?;
        }
        config.require_identity()?;
        Ok(config)
    }

    // The identity provider settings have no safe default.
    fn require_identity(&self) -> Result<()> {
        for (name, value) in [
            ("TENANTGATE_JWKS_URL", &self.jwks_url),
            ("TENANTGATE_ISSUER", &self.issuer),
            ("TENANTGATE_AUDIENCE", &self.audience),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("missing {name}");
            }
        }
        Ok(())
    }

    fn read_env() -> Result<Self> {
        let bind_addr = std::env::var("TENANTGATE_BIND")
            .unwrap_or_else(|_| DEFAULT_BIND.to_string())
            .parse()
            .with_context(|| "parse TENANTGATE_BIND")?;
        let metrics_bind = std::env::var("TENANTGATE_METRICS_BIND")
            .unwrap_or_else(|_| DEFAULT_METRICS_BIND.to_string())
            .parse()
            .with_context(|| "parse TENANTGATE_METRICS_BIND")?;
        let storage = std::env::var("TENANTGATE_STORAGE")
            .unwrap_or_else(|_| "memory".to_string())
            .parse()
            .with_context(|| "parse TENANTGATE_STORAGE")?;
        let postgres = match std::env::var("TENANTGATE_DATABASE_URL") {
            Ok(url) => Some(PostgresConfig {
                url,
                max_connections: env_or(
                    "TENANTGATE_PG_MAX_CONNECTIONS",
                    DEFAULT_PG_MAX_CONNECTIONS,
                )?,
                connect_timeout_ms: env_or(
                    "TENANTGATE_PG_CONNECT_TIMEOUT_MS",
                    DEFAULT_PG_CONNECT_TIMEOUT_MS,
                )?,
                acquire_timeout_ms: env_or(
                    "TENANTGATE_PG_ACQUIRE_TIMEOUT_MS",
                    DEFAULT_PG_ACQUIRE_TIMEOUT_MS,
                )?,
            }),
            Err(_) => None,
        };

        Ok(Self {
            bind_addr,
            metrics_bind,
            jwks_url: std::env::var("TENANTGATE_JWKS_URL").unwrap_or_default(),
            issuer: std::env::var("TENANTGATE_ISSUER").unwrap_or_default(),
            audience: std::env::var("TENANTGATE_AUDIENCE").unwrap_or_default(),
            tenant_claim: std::env::var("TENANTGATE_TENANT_CLAIM")
                .unwrap_or_else(|_| DEFAULT_TENANT_CLAIM.to_string()),
            clock_skew_secs: env_or("TENANTGATE_CLOCK_SKEW_SECS", DEFAULT_CLOCK_SKEW_SECS)?,
            jwks_cache_ttl_secs: env_or(
                "TENANTGATE_JWKS_CACHE_TTL_SECS",
                DEFAULT_JWKS_CACHE_TTL_SECS,
            )?,
            jwks_cache_capacity: env_or(
                "TENANTGATE_JWKS_CACHE_CAPACITY",
                DEFAULT_JWKS_CACHE_CAPACITY,
            )?,
            jwks_fetch_timeout_ms: env_or(
                "TENANTGATE_JWKS_FETCH_TIMEOUT_MS",
                DEFAULT_JWKS_FETCH_TIMEOUT_MS,
            )?,
            jwks_refresh_cooldown_ms: env_or(
                "TENANTGATE_JWKS_REFRESH_COOLDOWN_MS",
                DEFAULT_JWKS_REFRESH_COOLDOWN_MS,
            )?,
            pipeline_timeout_ms: env_or(
                "TENANTGATE_PIPELINE_TIMEOUT_MS",
                DEFAULT_PIPELINE_TIMEOUT_MS,
            )?,
            tenant_lookup_timeout_ms: env_or(
                "TENANTGATE_TENANT_LOOKUP_TIMEOUT_MS",
                DEFAULT_TENANT_LOOKUP_TIMEOUT_MS,
            )?,
            usage_queue_capacity: env_or(
                "TENANTGATE_USAGE_QUEUE_CAPACITY",
                DEFAULT_USAGE_QUEUE_CAPACITY,
            )?,
            usage_retention_days: env_or(
                "TENANTGATE_USAGE_RETENTION_DAYS",
                DEFAULT_USAGE_RETENTION_DAYS,
            )?,
            storage,
            postgres,
            access_policy_path: std::env::var("TENANTGATE_ACCESS_POLICY")
                .ok()
                .map(PathBuf::from),
        })
    }

    fn apply_override(&mut self, override_cfg: GatewayConfigOverride) -> Result<()> {
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.jwks_url {
            self.jwks_url = value;
        }
        if let Some(value) = override_cfg.issuer {
            self.issuer = value;
        }
        if let Some(value) = override_cfg.audience {
            self.audience = value;
        }
        if let Some(value) = override_cfg.tenant_claim {
            self.tenant_claim = value;
        }
        if let Some(value) = override_cfg.clock_skew_secs {
            self.clock_skew_secs = value;
        }
        if let Some(value) = override_cfg.jwks_cache_ttl_secs {
            self.jwks_cache_ttl_secs = value;
        }
        if let Some(value) = override_cfg.jwks_cache_capacity {
            self.jwks_cache_capacity = value;
        }
        if let Some(value) = override_cfg.jwks_fetch_timeout_ms {
            self.jwks_fetch_timeout_ms = value;
        }
        if let Some(value) = override_cfg.jwks_refresh_cooldown_ms {
            self.jwks_refresh_cooldown_ms = value;
        }
        if let Some(value) = override_cfg.pipeline_timeout_ms {
            self.pipeline_timeout_ms = value;
        }
        if let Some(value) = override_cfg.tenant_lookup_timeout_ms {
            self.tenant_lookup_timeout_ms = value;
        }
        if let Some(value) = override_cfg.usage_queue_capacity {
            self.usage_queue_capacity = value;
        }
        if let Some(value) = override_cfg.usage_retention_days {
            self.usage_retention_days = value;
        }
        if let Some(value) = override_cfg.storage {
            self.storage = value.parse().with_context(|| "parse storage")?;
        }
        if let Some(value) = override_cfg.postgres {
            self.postgres = Some(value);
        }
        if let Some(value) = override_cfg.access_policy_path {
            self.access_policy_path = Some(value);
        }
        Ok(())
    }
}
