//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use meshgov_core::config::LimitsConfig;
use meshgov_core::context::RequestContext;
use meshgov_core::history::{HistoryRecorder, OperationType, RecordEntry};
use meshgov_core::model::{
    CircuitBreakerPolicy, GovernanceRule, RateLimitPolicy, RoutingPolicy, RuleKind, RuleMeta,
    RulePolicy, RuleRecord, SourceMatch, SubRule,
};
use meshgov_core::service::RuleEngine;
use meshgov_core::store::{
    EnableToggle, InMemoryRuleStore, ListRequest, RulePage, RuleStore, StoreError, StoreResult,
};

// ============================================================================
// History
// ============================================================================

/// History sink keeping every entry in memory.
#[derive(Default)]
pub struct RecordingHistory {
    entries: Mutex<Vec<RecordEntry>>,
}

impl RecordingHistory {
    pub fn entries(&self) -> Vec<RecordEntry> {
        self.entries.lock().clone()
    }

    pub fn operations(&self) -> Vec<OperationType> {
        self.entries.lock().iter().map(|e| e.operation).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl HistoryRecorder for RecordingHistory {
    fn record(&self, entry: RecordEntry) {
        self.entries.lock().push(entry);
    }
}

// ============================================================================
// Stores
// ============================================================================

/// Store whose every call fails as if the backend were down.
pub struct UnavailableStore;

fn down<T>() -> StoreResult<T> {
    Err(StoreError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl RuleStore for UnavailableStore {
    async fn has_rule(&self, _: RuleKind, _: &str) -> StoreResult<bool> {
        down()
    }

    async fn get_rule(&self, _: RuleKind, _: &str) -> StoreResult<Option<RuleRecord>> {
        down()
    }

    async fn has_rule_by_name(&self, _: RuleKind, _: &str, _: &str) -> StoreResult<bool> {
        down()
    }

    async fn has_rule_by_name_exclude_id(
        &self,
        _: RuleKind,
        _: &str,
        _: &str,
        _: &str,
    ) -> StoreResult<bool> {
        down()
    }

    async fn create_rule(&self, _: RuleRecord) -> StoreResult<()> {
        down()
    }

    async fn update_rule(&self, _: RuleRecord) -> StoreResult<()> {
        down()
    }

    async fn delete_rule(&self, _: RuleKind, _: &str) -> StoreResult<()> {
        down()
    }

    async fn enable_rule(&self, _: RuleKind, _: EnableToggle) -> StoreResult<()> {
        down()
    }

    async fn list_rules(&self, _: RuleKind, _: &ListRequest) -> StoreResult<RulePage> {
        down()
    }
}

// ============================================================================
// Engines
// ============================================================================

pub struct Fixture<P: RulePolicy> {
    pub engine: RuleEngine<P>,
    pub store: Arc<InMemoryRuleStore>,
    pub history: Arc<RecordingHistory>,
}

pub fn fixture<P: RulePolicy>() -> Fixture<P> {
    fixture_with_limits(LimitsConfig::default())
}

pub fn fixture_with_limits<P: RulePolicy>(limits: LimitsConfig) -> Fixture<P> {
    let store = Arc::new(InMemoryRuleStore::new());
    let history = Arc::new(RecordingHistory::default());
    let engine = RuleEngine::new(store.clone(), history.clone(), Arc::new(limits));
    Fixture {
        engine,
        store,
        history,
    }
}

pub fn ctx() -> RequestContext {
    RequestContext::new("test-request").with_operator("tester")
}

pub fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ============================================================================
// Rules
// ============================================================================

pub fn circuit_breaker(name: &str, namespace: &str) -> GovernanceRule<CircuitBreakerPolicy> {
    let mut policy = CircuitBreakerPolicy::default();
    policy.rule_matcher.destination.service = "orders".to_string();
    policy.rule_matcher.destination.namespace = namespace.to_string();
    policy.max_ejection_percent = 50;
    GovernanceRule::new(RuleMeta::new(name, namespace), policy)
}

pub fn rate_limit(name: &str, service: &str) -> GovernanceRule<RateLimitPolicy> {
    let policy = RateLimitPolicy {
        service: service.to_string(),
        service_namespace: "default".to_string(),
        priority: 1,
        ..Default::default()
    };
    GovernanceRule::new(RuleMeta::new(name, "default"), policy)
}

pub fn routing(name: &str) -> GovernanceRule<RoutingPolicy> {
    let policy = RoutingPolicy {
        priority: 2,
        rules: vec![SubRule {
            sources: vec![SourceMatch {
                service: "gateway".to_string(),
                namespace: "default".to_string(),
                arguments: Vec::new(),
            }],
            ..Default::default()
        }],
        ..Default::default()
    };
    GovernanceRule::new(RuleMeta::new(name, "default"), policy)
}

/// Id-only item, as sent to delete and enable.
pub fn by_id<P: RulePolicy>(id: &str) -> GovernanceRule<P> {
    GovernanceRule::with_id(id)
}
