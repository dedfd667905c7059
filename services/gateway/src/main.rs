//! Tenant gateway HTTP service entry point.
//!
//! # Purpose
//! Wires configuration, the access policy, the key resolver, storage and the
//! HTTP router, then serves the API and the metrics endpoint.
//!
//! Shutdown order: stop accepting requests, stop the metrics listener, then
//! give the usage queue a short window to drain.
use anyhow::Context;
use gateway::app::{AppState, PipelineSettings, SERVICE_NAME, assemble_state, build_router};
use gateway::auth::jwks::{JwksKeyResolver, JwksSettings};
use gateway::auth::verifier::{TokenVerifier, VerifierSettings};
use gateway::config::{GatewayConfig, StorageBackend};
use gateway::context::PipelineTimeouts;
use gateway::observability;
use gateway::policy::load_access_policy;
use gateway::store::memory::InMemoryStore;
use gateway::store::postgres::PostgresStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const USAGE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env_or_yaml().context("gateway config")?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: GatewayConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability(SERVICE_NAME)?;
    let (state, usage_worker) = build_state(config.clone()).await?;
    tracing::info!(
        backend = state.store.backend_name(),
        durable = state.store.is_durable(),
        "tenant store ready"
    );
    let metrics_task = tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let app = build_router(state);
    let addr = config.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "gateway listening");
    tokio::pin!(shutdown);
    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result?;
        }
        _ = &mut shutdown => {}
    }

    metrics_task.abort();
    let _ = metrics_task.await;
    // The worker exits once the router and its recorder clones are gone.
    if tokio::time::timeout(USAGE_DRAIN_TIMEOUT, usage_worker)
        .await
        .is_err()
    {
        tracing::warn!("usage queue not drained before shutdown");
    }
    Ok(())
}

async fn build_state(config: GatewayConfig) -> anyhow::Result<(AppState, JoinHandle<()>)> {
    let policy = load_access_policy(config.access_policy_path.as_deref())?;
    let keys = JwksKeyResolver::new(JwksSettings {
        jwks_url: config.jwks_url.clone(),
        cache_ttl: Duration::from_secs(config.jwks_cache_ttl_secs),
        cache_capacity: config.jwks_cache_capacity,
        fetch_timeout: Duration::from_millis(config.jwks_fetch_timeout_ms),
        refresh_cooldown: Duration::from_millis(config.jwks_refresh_cooldown_ms),
    })
    .context("build jwks key resolver")?;
    let verifier = TokenVerifier::new(
        Arc::new(keys),
        VerifierSettings {
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            clock_skew_secs: config.clock_skew_secs,
            tenant_claim: config.tenant_claim.clone(),
        },
    );
    let settings = PipelineSettings {
        timeouts: PipelineTimeouts {
            pipeline: Duration::from_millis(config.pipeline_timeout_ms),
            tenant_lookup: Duration::from_millis(config.tenant_lookup_timeout_ms),
        },
        usage_queue_capacity: config.usage_queue_capacity,
        usage_retention: chrono::Duration::try_days(config.usage_retention_days)
            .context("usage retention out of range")?,
    };

    match config.storage {
        StorageBackend::Memory => {
            let store = Arc::new(InMemoryStore::new());
            Ok(assemble_state(store.clone(), store, verifier, policy, settings))
        }
        StorageBackend::Postgres => {
            let pg = config
                .postgres
                .as_ref()
                .context("postgres configuration missing")?;
            let store = Arc::new(PostgresStore::connect(pg).await?);
            Ok(assemble_state(store.clone(), store, verifier, policy, settings))
        }
    }
}
