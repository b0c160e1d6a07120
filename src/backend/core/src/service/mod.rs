//! Console services, one per rule kind.
//!
//! `RuleService` is the capability contract shared by the unguarded engine and
//! the [`PermissionGate`] wrapping it, so callers never know which they hold.

pub mod engine;
pub mod filter;
pub mod gate;
pub mod response;
pub mod transfer;

pub use engine::RuleEngine;
pub use filter::QueryFilter;
pub use gate::PermissionGate;
pub use response::{BatchQueryResponse, BatchWriteResponse, ExportResponse, ItemResponse, Rejection};
pub use transfer::{ArchiveSource, ArchiveTransfer};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::{checker_from_config, AuthChecker, OwnershipRelaxation};
use crate::config::{Config, LimitsConfig};
use crate::context::RequestContext;
use crate::history::{ChannelHistoryRecorder, HistoryRecorder};
use crate::model::{
    CircuitBreakerPolicy, GovernanceRule, RateLimitPolicy, RoutingPolicy, RulePolicy,
};
use crate::store::{InMemoryRuleStore, RuleStore};

#[async_trait]
pub trait RuleService<P: RulePolicy>: Send + Sync {
    async fn create_rules(
        &self,
        ctx: &RequestContext,
        rules: Vec<GovernanceRule<P>>,
    ) -> BatchWriteResponse<P>;

    async fn update_rules(
        &self,
        ctx: &RequestContext,
        rules: Vec<GovernanceRule<P>>,
    ) -> BatchWriteResponse<P>;

    async fn delete_rules(
        &self,
        ctx: &RequestContext,
        rules: Vec<GovernanceRule<P>>,
    ) -> BatchWriteResponse<P>;

    async fn enable_rules(
        &self,
        ctx: &RequestContext,
        rules: Vec<GovernanceRule<P>>,
    ) -> BatchWriteResponse<P>;

    async fn query_rules(
        &self,
        ctx: &RequestContext,
        params: &HashMap<String, String>,
    ) -> BatchQueryResponse<P>;

    async fn export_rules(
        &self,
        ctx: &RequestContext,
        params: &HashMap<String, String>,
    ) -> ExportResponse;

    async fn import_rules(
        &self,
        ctx: &RequestContext,
        sources: Vec<ArchiveSource>,
    ) -> BatchWriteResponse<P>;
}

#[async_trait]
impl<P: RulePolicy> RuleService<P> for RuleEngine<P> {
    async fn create_rules(
        &self,
        ctx: &RequestContext,
        rules: Vec<GovernanceRule<P>>,
    ) -> BatchWriteResponse<P> {
        self.create_batch(ctx, rules).await
    }

    async fn update_rules(
        &self,
        ctx: &RequestContext,
        rules: Vec<GovernanceRule<P>>,
    ) -> BatchWriteResponse<P> {
        self.update_batch(ctx, rules).await
    }

    async fn delete_rules(
        &self,
        ctx: &RequestContext,
        rules: Vec<GovernanceRule<P>>,
    ) -> BatchWriteResponse<P> {
        self.delete_batch(ctx, rules).await
    }

    async fn enable_rules(
        &self,
        ctx: &RequestContext,
        rules: Vec<GovernanceRule<P>>,
    ) -> BatchWriteResponse<P> {
        self.enable_batch(ctx, rules).await
    }

    async fn query_rules(
        &self,
        ctx: &RequestContext,
        params: &HashMap<String, String>,
    ) -> BatchQueryResponse<P> {
        self.query(ctx, params).await
    }

    async fn export_rules(
        &self,
        ctx: &RequestContext,
        params: &HashMap<String, String>,
    ) -> ExportResponse {
        ArchiveTransfer::new(self).export(ctx, params).await
    }

    async fn import_rules(
        &self,
        ctx: &RequestContext,
        sources: Vec<ArchiveSource>,
    ) -> BatchWriteResponse<P> {
        ArchiveTransfer::new(self).import(ctx, &sources).await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Wiring
// ═══════════════════════════════════════════════════════════════════════════════

/// The three gated services sharing one store, history sink and checker.
#[derive(Clone)]
pub struct GovernanceServices {
    pub circuit_breakers: Arc<dyn RuleService<CircuitBreakerPolicy>>,
    pub rate_limits: Arc<dyn RuleService<RateLimitPolicy>>,
    pub routings: Arc<dyn RuleService<RoutingPolicy>>,
}

impl GovernanceServices {
    pub fn new(
        store: Arc<dyn RuleStore>,
        history: Arc<dyn HistoryRecorder>,
        checker: Arc<dyn AuthChecker>,
        relaxation: OwnershipRelaxation,
        limits: LimitsConfig,
    ) -> Self {
        let limits = Arc::new(limits);
        let relaxation = Arc::new(relaxation);
        Self {
            circuit_breakers: gated::<CircuitBreakerPolicy>(
                &store, &history, &checker, &relaxation, &limits,
            ),
            rate_limits: gated::<RateLimitPolicy>(&store, &history, &checker, &relaxation, &limits),
            routings: gated::<RoutingPolicy>(&store, &history, &checker, &relaxation, &limits),
        }
    }

    /// Reference wiring: in-memory store, channel history sink and the checker
    /// selected by the `auth` section. Must be called inside a tokio runtime.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(InMemoryRuleStore::new()),
            Arc::new(ChannelHistoryRecorder::new(config.history.channel_buffer_size)),
            checker_from_config(&config.auth),
            OwnershipRelaxation::from_kinds(config.auth.relaxed_kinds.iter().copied()),
            config.limits.clone(),
        )
    }
}

fn gated<P: RulePolicy>(
    store: &Arc<dyn RuleStore>,
    history: &Arc<dyn HistoryRecorder>,
    checker: &Arc<dyn AuthChecker>,
    relaxation: &Arc<OwnershipRelaxation>,
    limits: &Arc<LimitsConfig>,
) -> Arc<dyn RuleService<P>> {
    let engine: Arc<dyn RuleService<P>> = Arc::new(RuleEngine::<P>::new(
        store.clone(),
        history.clone(),
        limits.clone(),
    ));
    Arc::new(PermissionGate::new(engine, checker.clone(), relaxation.clone()))
}
