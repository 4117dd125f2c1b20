//! Routing controller.
//!
//! Binds a resolved preset to the transport and dispatches requests by tier:
//!
//! 1. Gate on transport health. An unhealthy transport aborts the whole
//!    request: no model is tried and no chain is consulted.
//! 2. Dispatch with the tier's model, then walk that model's fallback chain
//!    at the same tier.
//! 3. On exhaustion raise [`RouteError::ModelUnavailable`] so an outer tier
//!    policy ([`Router::dispatch_with_tier_fallback`]) can try a lower tier.
//!
//! Model fallback and tier fallback never interact: the chain walk knows
//! nothing about tiers and the tier loop only sees `ModelUnavailable`.

use std::iter;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::catalog::{FallbackTable, ModelCatalog, ModelId, Preset, PresetTable, Tier};
use crate::config::RouterConfig;
use crate::error::RouteError;
use crate::middleware::decision::RoutingDecision;
use crate::middleware::health::HealthGate;
use crate::middleware::metrics::DispatchMetrics;
use crate::providers::{CompletionRequest, CompletionResponse, Provider};

/// States of a single dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    HealthChecking,
    HealthFailed,
    HealthOk,
    Dispatching,
    Success,
    ChainExhausted,
}

impl DispatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::HealthFailed | Self::Success | Self::ChainExhausted)
    }
}

/// One try against one concrete model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub model: ModelId,
    /// `None` when the attempt succeeded.
    pub error: Option<String>,
}

/// Result of a successful dispatch.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// Tier that served the request.
    pub tier: Tier,
    /// Model bound to `tier` by the preset.
    pub requested_model: ModelId,
    /// Model that actually answered.
    pub served_by: ModelId,
    pub attempts: Vec<Attempt>,
    /// How many tiers were skipped before `tier` served the request.
    pub tier_fallbacks: usize,
    pub response: CompletionResponse,
}

impl DispatchOutcome {
    /// Whether a chain substitute answered instead of the tier's model.
    pub fn substituted(&self) -> bool {
        self.served_by != self.requested_model
    }
}

// ---------------------------------------------------------------------------
// Tier fallback policy
// ---------------------------------------------------------------------------

/// Ordered tiers tried when a tier's chain is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierFallback {
    order: Vec<Tier>,
}

impl Default for TierFallback {
    fn default() -> Self {
        Self {
            order: Tier::ALL.to_vec(),
        }
    }
}

impl TierFallback {
    /// `order` must be non-empty and must not repeat a tier.
    pub fn new(order: Vec<Tier>) -> Result<Self, RouteError> {
        if order.is_empty() {
            return Err(RouteError::Config("tier order must not be empty".to_string()));
        }
        for (idx, tier) in order.iter().enumerate() {
            if order[..idx].contains(tier) {
                return Err(RouteError::Config(format!("tier order repeats '{tier}'")));
            }
        }
        Ok(Self { order })
    }

    pub fn order(&self) -> &[Tier] {
        &self.order
    }

    pub fn primary(&self) -> Tier {
        self.order[0]
    }

    /// `start` followed by the tiers after it in the order. A tier missing
    /// from the order is tried alone.
    pub fn tiers_from(&self, start: Tier) -> Vec<Tier> {
        match self.order.iter().position(|t| *t == start) {
            Some(idx) => self.order[idx..].to_vec(),
            None => vec![start],
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Dispatches requests for one session's preset through one transport.
pub struct Router<P> {
    endpoint: String,
    preset: Preset,
    fallbacks: Arc<FallbackTable>,
    gate: Arc<HealthGate>,
    provider: P,
    tier_fallback: TierFallback,
    metrics: Arc<DispatchMetrics>,
}

impl<P: Provider> Router<P> {
    pub fn new(
        endpoint: impl Into<String>,
        preset: Preset,
        fallbacks: Arc<FallbackTable>,
        gate: Arc<HealthGate>,
        provider: P,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            preset,
            fallbacks,
            gate,
            provider,
            tier_fallback: TierFallback::default(),
            metrics: Arc::new(DispatchMetrics::new()),
        }
    }

    /// Build from configuration with the built-in catalog, presets and
    /// fallback chains. Table validation errors surface here, at startup.
    pub fn from_config(config: &RouterConfig, provider: P) -> Result<Self, RouteError> {
        config.validate()?;
        let catalog = ModelCatalog::builtin();
        let presets = PresetTable::builtin(&catalog)?;
        let fallbacks = FallbackTable::builtin(&catalog)?;
        let preset = config.resolve_preset(&presets)?;
        let gate = HealthGate::with_settings(config.health_ttl(), config.probe_timeout());

        tracing::info!(
            endpoint = %config.endpoint,
            preset = %preset.id,
            big = %preset.big,
            middle = %preset.middle,
            small = %preset.small,
            "Routing preset resolved"
        );

        Ok(Self::new(
            config.endpoint.clone(),
            preset,
            Arc::new(fallbacks),
            Arc::new(gate),
            provider,
        )
        .with_tier_fallback(TierFallback::new(config.tier_order.clone())?))
    }

    pub fn with_tier_fallback(mut self, tier_fallback: TierFallback) -> Self {
        self.tier_fallback = tier_fallback;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn preset(&self) -> &Preset {
        &self.preset
    }

    pub fn gate(&self) -> &Arc<HealthGate> {
        &self.gate
    }

    pub fn fallbacks(&self) -> &FallbackTable {
        &self.fallbacks
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    pub fn tier_fallback(&self) -> &TierFallback {
        &self.tier_fallback
    }

    /// The decision to persist for this session.
    pub fn routing_decision(&self) -> RoutingDecision {
        RoutingDecision::new(&self.endpoint, &self.preset, self.tier_fallback.order())
    }

    /// Dispatch at `tier`, walking the model's fallback chain on model-level
    /// failures. Never changes tier.
    pub async fn dispatch(
        &self,
        tier: Tier,
        request: &CompletionRequest,
    ) -> Result<DispatchOutcome, RouteError> {
        self.metrics.record_dispatch();
        self.dispatch_tier(tier, request).await
    }

    async fn dispatch_tier(
        &self,
        tier: Tier,
        request: &CompletionRequest,
    ) -> Result<DispatchOutcome, RouteError> {
        let started = Instant::now();
        let mut state = DispatchState::Idle;

        advance(&mut state, DispatchState::HealthChecking, tier);
        if let Err(err) = self.gate.ensure_healthy(&self.endpoint).await {
            advance(&mut state, DispatchState::HealthFailed, tier);
            self.metrics.record_transport_abort();
            tracing::warn!(tier = %tier, endpoint = %self.endpoint, "Transport unavailable, aborting dispatch");
            return Err(err);
        }
        advance(&mut state, DispatchState::HealthOk, tier);

        let requested = self.preset.model_for(tier).clone();
        let chain = self.fallbacks.chain_for(&requested);
        let mut attempts: Vec<Attempt> = Vec::with_capacity(1 + chain.len());
        let mut last_error = None;

        advance(&mut state, DispatchState::Dispatching, tier);
        for model in iter::once(&requested).chain(chain) {
            match self.provider.complete(model, request).await {
                Ok(response) => {
                    self.metrics.record_attempt(model, false);
                    attempts.push(Attempt {
                        model: model.clone(),
                        error: None,
                    });
                    advance(&mut state, DispatchState::Success, tier);

                    let outcome = DispatchOutcome {
                        tier,
                        requested_model: requested.clone(),
                        served_by: model.clone(),
                        attempts,
                        tier_fallbacks: 0,
                        response,
                    };
                    if outcome.substituted() {
                        tracing::info!(
                            tier = %tier,
                            requested = %requested,
                            served_by = %model,
                            "Request served by fallback model"
                        );
                    }
                    self.metrics
                        .record_success(outcome.substituted(), started.elapsed());
                    return Ok(outcome);
                }
                Err(e) if e.is_transport() => {
                    // The transport died after the health check passed; the
                    // cached verdict is stale.
                    self.metrics.record_attempt(model, true);
                    self.metrics.record_transport_abort();
                    self.gate.invalidate(&self.endpoint);
                    tracing::warn!(
                        tier = %tier,
                        model = %model,
                        error = %e,
                        "Transport failed mid-dispatch, aborting"
                    );
                    return Err(RouteError::transport_unavailable(
                        &self.endpoint,
                        e.to_string(),
                    ));
                }
                Err(e) => {
                    self.metrics.record_attempt(model, true);
                    tracing::warn!(
                        tier = %tier,
                        model = %model,
                        error = %e,
                        "Model failed, trying next in chain"
                    );
                    attempts.push(Attempt {
                        model: model.clone(),
                        error: Some(e.to_string()),
                    });
                    last_error = Some(e.to_string());
                }
            }
        }

        advance(&mut state, DispatchState::ChainExhausted, tier);
        self.metrics.record_exhausted(started.elapsed());
        Err(RouteError::ModelUnavailable {
            tier,
            exhausted: attempts.into_iter().map(|a| a.model).collect(),
            last_error,
        })
    }

    /// Dispatch starting at `tier`, moving down the tier order when a tier's
    /// chain is exhausted. A transport failure stops immediately.
    ///
    /// Counts as one dispatch in the metrics however many tiers are tried.
    /// A tier bound to a model already exhausted by an earlier tier is
    /// skipped: its chain would fail the same way.
    pub async fn dispatch_with_tier_fallback(
        &self,
        tier: Tier,
        request: &CompletionRequest,
    ) -> Result<DispatchOutcome, RouteError> {
        self.metrics.record_dispatch();
        let mut last_err = None;
        let mut failed_tier = tier;
        let mut exhausted: Vec<&ModelId> = Vec::new();

        for (idx, current) in self.tier_fallback.tiers_from(tier).into_iter().enumerate() {
            let model = self.preset.model_for(current);
            if exhausted.contains(&model) {
                tracing::debug!(tier = %current, model = %model, "Skipping tier, model already exhausted");
                continue;
            }
            if idx > 0 {
                self.metrics.record_tier_fallback();
                tracing::info!(from = %failed_tier, to = %current, "Falling back to lower tier");
            }
            match self.dispatch_tier(current, request).await {
                Ok(mut outcome) => {
                    outcome.tier_fallbacks = idx;
                    return Ok(outcome);
                }
                Err(err) if err.is_retryable_at_lower_tier() => {
                    exhausted.push(model);
                    failed_tier = current;
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err
            .unwrap_or_else(|| RouteError::Config(format!("no tiers to dispatch from '{tier}'"))))
    }
}

fn advance(state: &mut DispatchState, next: DispatchState, tier: Tier) {
    tracing::debug!(tier = %tier, from = ?state, to = ?next, "Dispatch state");
    *state = next;
}
