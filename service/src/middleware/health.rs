//! Transport health gate.
//!
//! Probes `GET {endpoint}/health`, caches the verdict per endpoint for a
//! bounded time-to-live, and exposes both a probe that never fails and a
//! guard that raises [`RouteError::TransportUnavailable`].
//!
//! The cache is an explicitly constructed [`HealthCache`] owned by the gate,
//! never a process global. Concurrent misses for the same endpoint may both
//! probe; the later write wins.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::RouteError;

/// How long a verdict stays valid.
pub const DEFAULT_HEALTH_TTL: Duration = Duration::from_secs(30);
/// Upper bound on a single probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Sub-path probed on the transport endpoint.
pub const HEALTH_PATH: &str = "/health";
/// Longest a verdict is ever kept, whatever TTL is requested.
pub const MAX_HEALTH_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Outcome of probing the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthVerdict {
    pub ok: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// Unix time (ms) at which the probe completed.
    pub checked_at_ms: u64,
}

impl HealthVerdict {
    fn healthy(latency_ms: u64, status_code: u16) -> Self {
        Self {
            ok: true,
            latency_ms,
            status_code: Some(status_code),
            error_detail: None,
            checked_at_ms: unix_millis(),
        }
    }

    fn unhealthy(latency_ms: u64, status_code: Option<u16>, detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            latency_ms,
            status_code,
            error_detail: Some(detail.into()),
            checked_at_ms: unix_millis(),
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Cache keys ignore a trailing slash so `http://h:1` and `http://h:1/` share
/// one verdict.
fn normalize(endpoint: &str) -> &str {
    endpoint.trim_end_matches('/')
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CachedVerdict {
    verdict: HealthVerdict,
    expires_at: Instant,
}

/// Per-endpoint verdict cache holding at most one live verdict per endpoint.
#[derive(Debug, Default)]
pub struct HealthCache {
    entries: RwLock<HashMap<String, CachedVerdict>>,
}

impl HealthCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live verdict for `endpoint`, if one has not expired.
    pub fn get(&self, endpoint: &str) -> Option<HealthVerdict> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(normalize(endpoint))
            .filter(|cached| Instant::now() < cached.expires_at)
            .map(|cached| cached.verdict.clone())
    }

    /// Replace the verdict for `endpoint`. `ttl` is capped at
    /// [`MAX_HEALTH_TTL`].
    pub fn put(&self, endpoint: &str, verdict: HealthVerdict, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl.min(MAX_HEALTH_TTL))
            .unwrap_or(now);
        let cached = CachedVerdict {
            verdict,
            expires_at,
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize(endpoint).to_string(), cached);
    }

    /// Drop the verdict for one endpoint.
    pub fn invalidate(&self, endpoint: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(normalize(endpoint));
    }

    /// Drop every verdict, forcing fresh probes.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Probes the transport and caches the verdict.
pub struct HealthGate {
    client: reqwest::Client,
    cache: Arc<HealthCache>,
    ttl: Duration,
    probe_timeout: Duration,
}

impl Default for HealthGate {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthGate {
    /// Gate with a fresh cache, 30 s TTL and 5 s probe timeout.
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_HEALTH_TTL, DEFAULT_PROBE_TIMEOUT)
    }

    pub fn with_settings(ttl: Duration, probe_timeout: Duration) -> Self {
        Self::with_cache(Arc::new(HealthCache::new()), ttl, probe_timeout)
    }

    /// Gate backed by an existing cache, shared with other gates.
    pub fn with_cache(cache: Arc<HealthCache>, ttl: Duration, probe_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder().build().unwrap_or_default(),
            cache,
            ttl,
            probe_timeout,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    pub fn cache(&self) -> &Arc<HealthCache> {
        &self.cache
    }

    /// The cached verdict for `endpoint`, without probing.
    pub fn cached(&self, endpoint: &str) -> Option<HealthVerdict> {
        self.cache.get(endpoint)
    }

    /// Probe with the gate's default timeout. Never fails.
    pub async fn probe_health(&self, endpoint: &str) -> HealthVerdict {
        self.probe_health_with_timeout(endpoint, self.probe_timeout)
            .await
    }

    /// Probe `endpoint`, reusing a live cached verdict when present.
    ///
    /// Every failure (timeout, refused connection, DNS, malformed URL,
    /// non-2xx status) is folded into an `ok = false` verdict.
    pub async fn probe_health_with_timeout(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> HealthVerdict {
        if let Some(verdict) = self.cache.get(endpoint) {
            tracing::debug!(endpoint = %endpoint, ok = verdict.ok, "Health verdict served from cache");
            return verdict;
        }

        let verdict = self.fetch(endpoint, timeout).await;
        self.record(endpoint, &verdict);
        verdict
    }

    /// Like [`Self::probe_health`], but aborts when `cancel` fires.
    ///
    /// A cancelled probe returns an `ok = false` verdict and leaves the cache
    /// as it was.
    pub async fn probe_health_cancellable(
        &self,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> HealthVerdict {
        if let Some(verdict) = self.cache.get(endpoint) {
            return verdict;
        }

        let started = Instant::now();
        tokio::select! {
            verdict = self.fetch(endpoint, self.probe_timeout) => {
                self.record(endpoint, &verdict);
                verdict
            }
            () = cancel.cancelled() => {
                tracing::debug!(endpoint = %endpoint, "Health probe cancelled");
                HealthVerdict::unhealthy(
                    started.elapsed().as_millis() as u64,
                    None,
                    "probe cancelled",
                )
            }
        }
    }

    /// Probe and raise [`RouteError::TransportUnavailable`] when unhealthy.
    pub async fn ensure_healthy(&self, endpoint: &str) -> Result<HealthVerdict, RouteError> {
        let verdict = self.probe_health(endpoint).await;
        if verdict.ok {
            Ok(verdict)
        } else {
            let detail = verdict
                .error_detail
                .clone()
                .unwrap_or_else(|| "health check failed".to_string());
            Err(RouteError::transport_unavailable(endpoint, detail))
        }
    }

    /// Forget the verdict for one endpoint.
    pub fn invalidate(&self, endpoint: &str) {
        self.cache.invalidate(endpoint);
    }

    /// Forget every verdict.
    pub fn clear(&self) {
        self.cache.clear();
    }

    fn record(&self, endpoint: &str, verdict: &HealthVerdict) {
        self.cache.put(endpoint, verdict.clone(), self.ttl);
    }

    async fn fetch(&self, endpoint: &str, timeout: Duration) -> HealthVerdict {
        let base = normalize(endpoint);
        if let Err(e) = url::Url::parse(base) {
            tracing::warn!(endpoint = %endpoint, error = %e, "Invalid transport endpoint");
            return HealthVerdict::unhealthy(0, None, format!("invalid endpoint URL: {e}"));
        }

        let url = format!("{base}{HEALTH_PATH}");
        let started = Instant::now();
        let result = self.client.get(&url).timeout(timeout).send().await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let verdict = match result {
            Ok(resp) if resp.status().is_success() => {
                HealthVerdict::healthy(latency_ms, resp.status().as_u16())
            }
            Ok(resp) => {
                let status = resp.status();
                HealthVerdict::unhealthy(
                    latency_ms,
                    Some(status.as_u16()),
                    format!("health endpoint returned HTTP {status}"),
                )
            }
            Err(e) if e.is_timeout() => HealthVerdict::unhealthy(
                latency_ms,
                None,
                format!("timed out after {} ms", timeout.as_millis()),
            ),
            Err(e) if e.is_connect() => {
                HealthVerdict::unhealthy(latency_ms, None, format!("connection failed: {e}"))
            }
            Err(e) => HealthVerdict::unhealthy(latency_ms, None, e.to_string()),
        };

        if verdict.ok {
            tracing::debug!(endpoint = %endpoint, latency_ms, "Transport healthy");
        } else {
            tracing::warn!(
                endpoint = %endpoint,
                latency_ms,
                status = ?verdict.status_code,
                error = verdict.error_detail.as_deref().unwrap_or(""),
                "Transport unhealthy"
            );
        }
        verdict
    }
}
