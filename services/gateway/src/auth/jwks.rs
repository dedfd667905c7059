//! JWKS-backed key resolver with a bounded, single-flight cache.
//!
//! # Purpose
//! Resolve identity provider signing keys by `kid`, fetching the provider's
//! JWK set over HTTPS on a cache miss.
//!
//! # Concurrency model
//! - Keys live in a `moka` cache bounded by TTL and entry count (TinyLFU with
//!   LRU eviction).
//! - Misses go through `try_get_with`, so concurrent callers asking for the
//!   same missing `kid` share one upstream fetch.
//! - Fetched documents are also held for a short refresh cooldown, so a burst
//!   of tokens carrying unknown key ids cannot hammer the provider. A zero
//!   cooldown disables this.
//! - Failed fetches are never cached; the next lookup tries again.
//!
//! # Failure modes
//! - Provider unreachable, non-2xx, or timed out: `KeyError::FetchFailed`.
//! - Document without usable keys: `KeyError::InvalidKeySet`.
//! - Key id absent from a fresh document: `KeyError::NotFound`.
//!
//! Callers retry; this module never loops internally.
use crate::auth::keys::{KeyError, KeyResolver, SigningKey, parse_jwks};
use async_trait::async_trait;
use moka::future::Cache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

type KeySet = Arc<HashMap<String, Arc<SigningKey>>>;

#[derive(Debug, Clone)]
pub struct JwksSettings {
    pub jwks_url: String,
    pub cache_ttl: Duration,
    pub cache_capacity: u64,
    pub fetch_timeout: Duration,
    pub refresh_cooldown: Duration,
}

#[derive(Clone)]
pub struct JwksKeyResolver {
    client: reqwest::Client,
    jwks_url: String,
    keys: Cache<String, Arc<SigningKey>>,
    documents: Option<Cache<String, KeySet>>,
}

impl JwksKeyResolver {
    pub fn new(settings: JwksSettings) -> Result<Self, KeyError> {
        let client = reqwest::Client::builder()
            .timeout(settings.fetch_timeout)
            .build()
            .map_err(|err| KeyError::FetchFailed(format!("build http client: {err}")))?;
        let keys = Cache::builder()
            .max_capacity(settings.cache_capacity)
            .time_to_live(settings.cache_ttl)
            .build();
        let documents = (!settings.refresh_cooldown.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(1)
                .time_to_live(settings.refresh_cooldown)
                .build()
        });
        Ok(Self {
            client,
            jwks_url: settings.jwks_url,
            keys,
            documents,
        })
    }

    async fn load_key(&self, key_id: &str) -> Result<Arc<SigningKey>, KeyError> {
        let key_set = match &self.documents {
            Some(documents) => documents
                .try_get_with(self.jwks_url.clone(), self.fetch_key_set())
                .await
                .map_err(|err| (*err).clone())?,
            None => self.fetch_key_set().await?,
        };
        // One fetch warms every key in the document.
        for (kid, key) in key_set.iter() {
            if kid != key_id {
                self.keys.insert(kid.clone(), key.clone()).await;
            }
        }
        key_set
            .get(key_id)
            .cloned()
            .ok_or_else(|| KeyError::NotFound(key_id.to_string()))
    }

    async fn fetch_key_set(&self) -> Result<KeySet, KeyError> {
        let result = self.fetch_document().await.and_then(|document| {
            let keys = parse_jwks(&document)?;
            Ok(Arc::new(
                keys.into_iter()
                    .map(|key| (key.key_id.clone(), Arc::new(key)))
                    .collect::<HashMap<_, _>>(),
            ))
        });
        let label = match &result {
            Ok(_) => "ok",
            Err(KeyError::InvalidKeySet(_)) => "invalid",
            Err(_) => "error",
        };
        metrics::counter!("tenantgate_jwks_fetches_total", "result" => label).increment(1);
        match &result {
            Ok(keys) => tracing::debug!(url = %self.jwks_url, keys = keys.len(), "jwks fetched"),
            Err(err) => tracing::warn!(url = %self.jwks_url, error = %err, "jwks fetch failed"),
        }
        result
    }

    async fn fetch_document(&self) -> Result<serde_json::Value, KeyError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| KeyError::FetchFailed(err.to_string()))?;
        response
            .json()
            .await
            .map_err(|err| KeyError::InvalidKeySet(format!("decode jwks: {err}")))
    }
}

#[async_trait]
impl KeyResolver for JwksKeyResolver {
    async fn signing_key(&self, key_id: &str) -> Result<Arc<SigningKey>, KeyError> {
        if let Some(key) = self.keys.get(key_id).await {
            return Ok(key);
        }
        self.keys
            .try_get_with_by_ref(key_id, self.load_key(key_id))
            .await
            .map_err(|err| (*err).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::get};
    use serde_json::{Value, json};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock;

    const N: &str = "vBgbgFjJbmgknYAOntrqxKi3fROFZN2sTWF5vWEVFi29fFY10_0PigkCIWlhwLBG0PmCNtHo1IXNA5LI2HMyyBIj_weGYTkmKzNYVYiGjEvRyn-N82F_YGvV8zNKeSmbSkmiNZMZ2Miw3zbsd6vzmGGeWlmHi-wS9JO2UEI907fiXYpr_sSFFet9RJoaLbbvsA6_Nm6U0xl6b4Fl3zjHaC1EYqENCK66QbBfRIJaqTCiDyqENiueWdlsGsrC7dxp8mjCLE7cz5_HGg2QcyxkesRbLGaPY8DLwS3WjEb8LfpsmxnNjpBzEmZZwF-tBM3p5R2SW9DiBUlYfbI57_q_bQ";

    fn jwks(kids: &[&str]) -> Value {
        let keys: Vec<Value> = kids
            .iter()
            .map(|kid| json!({ "kty": "RSA", "kid": kid, "alg": "RS256", "n": N, "e": "AQAB" }))
            .collect();
        json!({ "keys": keys })
    }

    struct JwksServer {
        addr: SocketAddr,
        hits: Arc<AtomicUsize>,
        document: Arc<RwLock<Value>>,
    }

    async fn spawn_jwks_server(document: Value, delay: Duration) -> JwksServer {
        let hits = Arc::new(AtomicUsize::new(0));
        let document = Arc::new(RwLock::new(document));
        let app = Router::new().route(
            "/jwks",
            get({
                let hits = hits.clone();
                let document = document.clone();
                move || {
                    let hits = hits.clone();
                    let document = document.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(delay).await;
                        Json(document.read().await.clone())
                    }
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app.into_make_service()).await;
        });
        JwksServer {
            addr,
            hits,
            document,
        }
    }

    fn resolver(url: String, cooldown: Duration) -> JwksKeyResolver {
        JwksKeyResolver::new(JwksSettings {
            jwks_url: url,
            cache_ttl: Duration::from_secs(600),
            cache_capacity: 16,
            fetch_timeout: Duration::from_secs(2),
            refresh_cooldown: cooldown,
        })
        .expect("resolver")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_share_one_fetch() {
        let server = spawn_jwks_server(jwks(&["kid-1"]), Duration::from_millis(100)).await;
        let resolver = resolver(format!("http://{}/jwks", server.addr), Duration::ZERO);

        let lookups = (0..16).map(|_| {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.signing_key("kid-1").await })
        });
        for lookup in lookups {
            lookup.await.expect("join").expect("key");
        }
        assert_eq!(server.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn one_fetch_warms_every_key() {
        let server = spawn_jwks_server(jwks(&["kid-1", "kid-2"]), Duration::ZERO).await;
        let resolver = resolver(format!("http://{}/jwks", server.addr), Duration::ZERO);
        resolver.signing_key("kid-1").await.expect("kid-1");
        resolver.signing_key("kid-2").await.expect("kid-2");
        assert_eq!(server.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rotated_keys_are_fetched_on_miss() {
        let server = spawn_jwks_server(jwks(&["kid-1"]), Duration::ZERO).await;
        let resolver = resolver(format!("http://{}/jwks", server.addr), Duration::ZERO);
        resolver.signing_key("kid-1").await.expect("kid-1");
        let err = resolver.signing_key("kid-2").await.unwrap_err();
        assert!(matches!(err, KeyError::NotFound(_)));

        *server.document.write().await = jwks(&["kid-1", "kid-2"]);
        resolver.signing_key("kid-2").await.expect("rotated key");
        assert_eq!(server.hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn refresh_cooldown_limits_unknown_kid_fetches() {
        let server = spawn_jwks_server(jwks(&["kid-1"]), Duration::ZERO).await;
        let resolver = resolver(format!("http://{}/jwks", server.addr), Duration::from_secs(60));
        for attempt in 0..5 {
            let err = resolver.signing_key(&format!("bogus-{attempt}")).await.unwrap_err();
            assert!(matches!(err, KeyError::NotFound(_)));
        }
        assert_eq!(server.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_provider_is_retryable() {
        let resolver = resolver("http://127.0.0.1:1/jwks".to_string(), Duration::ZERO);
        let err = resolver.signing_key("kid-1").await.unwrap_err();
        assert!(matches!(err, KeyError::FetchFailed(_)));
        assert!(err.is_retryable());
    }
}
