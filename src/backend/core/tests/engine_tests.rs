//! Batch rule engine integration tests.
//!
//! Covers:
//! - Create, update, delete and enable across the three rule kinds
//! - Partial failure aggregation and item ordering
//! - Batch-level rejection with zero side effects
//! - Query filters, pagination and brief listings
//! - Storage failures surfacing as store-layer codes
//! - Cancellation and concurrent writers of the same rule

mod common;

use std::sync::Arc;

use common::{by_id, circuit_breaker, ctx, fixture, params, rate_limit, routing, UnavailableStore};
use meshgov_core::config::LimitsConfig;
use meshgov_core::history::OperationType;
use meshgov_core::model::{
    CircuitBreakerPolicy, GovernanceRule, RateLimitPolicy, RoutingPolicy, RuleKind,
};
use meshgov_core::service::RuleEngine;
use meshgov_core::ApiCode;

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_assigns_fresh_ids_across_batches() {
    let fx = fixture::<RateLimitPolicy>();
    let first = fx
        .engine
        .create_batch(&ctx(), vec![rate_limit("a", "login"), rate_limit("b", "login")])
        .await;
    let second = fx
        .engine
        .create_batch(&ctx(), vec![rate_limit("c", "login")])
        .await;

    assert!(first.is_success());
    assert!(second.is_success());

    let mut ids: Vec<String> = first
        .responses
        .iter()
        .chain(second.responses.iter())
        .map(|r| r.id.clone())
        .collect();
    assert!(ids.iter().all(|id| !id.is_empty()));
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert_eq!(fx.store.count(RuleKind::RateLimit), 3);
}

#[tokio::test]
async fn test_create_echoes_rule_with_defaults_applied() {
    let fx = fixture::<CircuitBreakerPolicy>();
    let response = fx
        .engine
        .create_batch(&ctx(), vec![circuit_breaker("cb-orders", "")])
        .await;

    assert_eq!(response.code, ApiCode::ExecuteSuccess);
    let echo = response.responses[0].rule.as_ref().unwrap();
    assert_eq!(echo.meta.namespace, "default");
    assert!(!echo.meta.revision.is_empty());
    assert_eq!(echo.meta.id, response.responses[0].id);
    assert_eq!(echo.policy.max_ejection_percent, 50);
}

#[tokio::test]
async fn test_partial_failure_keeps_order_and_siblings() {
    let fx = fixture::<RoutingPolicy>();
    let response = fx
        .engine
        .create_batch(
            &ctx(),
            vec![routing("r1"), routing(""), routing("r3"), routing("r1")],
        )
        .await;

    assert_eq!(response.size, 4);
    assert_eq!(response.code, ApiCode::InvalidRuleName);
    let codes: Vec<ApiCode> = response.responses.iter().map(|r| r.code).collect();
    assert_eq!(
        codes,
        [
            ApiCode::ExecuteSuccess,
            ApiCode::InvalidRuleName,
            ApiCode::ExecuteSuccess,
            ApiCode::ExistedResource,
        ]
    );
    assert_eq!(fx.store.count(RuleKind::Routing), 2);
    assert_eq!(
        fx.history.operations(),
        [OperationType::Create, OperationType::Create]
    );
}

#[tokio::test]
async fn test_same_name_in_other_namespace_is_allowed() {
    let fx = fixture::<CircuitBreakerPolicy>();
    let response = fx
        .engine
        .create_batch(
            &ctx(),
            vec![circuit_breaker("cb", "default"), circuit_breaker("cb", "prod")],
        )
        .await;
    assert!(response.is_success());
}

#[tokio::test]
async fn test_field_limits_map_to_codes() {
    let fx = fixture::<RateLimitPolicy>();
    let mut long_ns = rate_limit("ok", "login");
    long_ns.meta.namespace = "n".repeat(65);
    let mut long_desc = rate_limit("ok2", "login");
    long_desc.meta.description = "d".repeat(1025);

    let response = fx
        .engine
        .create_batch(
            &ctx(),
            vec![long_ns, long_desc, rate_limit("no-service", "")],
        )
        .await;

    let codes: Vec<ApiCode> = response.responses.iter().map(|r| r.code).collect();
    assert_eq!(
        codes,
        [
            ApiCode::InvalidNamespaceName,
            ApiCode::InvalidComment,
            ApiCode::InvalidServiceName,
        ]
    );
    assert!(fx.history.is_empty());
}

// ============================================================================
// Batch Rejection
// ============================================================================

#[tokio::test]
async fn test_empty_batch_rejected() {
    let fx = fixture::<RateLimitPolicy>();
    let response = fx.engine.create_batch(&ctx(), Vec::new()).await;
    assert_eq!(response.code, ApiCode::EmptyRequest);
    assert_eq!(response.size, 0);
}

#[tokio::test]
async fn test_oversized_batch_has_no_side_effects() {
    let fx = common::fixture_with_limits::<RateLimitPolicy>(LimitsConfig {
        max_batch_size: 2,
        ..Default::default()
    });
    let rules = (0..3)
        .map(|i| rate_limit(&format!("r{}", i), "login"))
        .collect();

    let response = fx.engine.create_batch(&ctx(), rules).await;

    assert_eq!(response.code, ApiCode::BatchSizeOverLimit);
    assert!(response.responses.is_empty());
    assert_eq!(fx.store.count(RuleKind::RateLimit), 0);
    assert!(fx.history.is_empty());
}

// ============================================================================
// Update / Enable / Delete
// ============================================================================

#[tokio::test]
async fn test_conflict_then_update_lifecycle() {
    let fx = fixture::<CircuitBreakerPolicy>();
    let created = fx
        .engine
        .create_batch(&ctx(), vec![circuit_breaker("r1", "default")])
        .await;
    let id = created.responses[0].id.clone();
    let first_revision = fx.store.get(RuleKind::CircuitBreaker, &id).unwrap().revision;

    // Same name again
    let dup = fx
        .engine
        .create_batch(&ctx(), vec![circuit_breaker("r1", "default")])
        .await;
    assert_eq!(dup.code, ApiCode::ExistedResource);

    // Rename and enable
    let mut renamed = circuit_breaker("r2", "default");
    renamed.meta.id = id.clone();
    renamed.meta.enable = true;
    let updated = fx.engine.update_batch(&ctx(), vec![renamed]).await;
    assert!(updated.is_success());
    assert_eq!(updated.responses[0].id, id);

    let stored = fx.store.get(RuleKind::CircuitBreaker, &id).unwrap();
    assert_eq!(stored.name, "r2");
    assert_ne!(stored.revision, first_revision);
    assert!(stored.etime.is_some());

    // Disable through the toggle
    let mut toggle = by_id::<CircuitBreakerPolicy>(&id);
    toggle.meta.enable = false;
    let disabled = fx.engine.enable_batch(&ctx(), vec![toggle]).await;
    assert!(disabled.is_success());

    let page = fx.engine.query(&ctx(), &params(&[("id", id.as_str())])).await;
    assert_eq!(page.amount, 1);
    assert!(!page.data[0].meta.enable);
    assert!(page.data[0].meta.etime.is_empty());

    assert_eq!(
        fx.history.operations(),
        [
            OperationType::Create,
            OperationType::Update,
            OperationType::UpdateEnable,
        ]
    );
}

#[tokio::test]
async fn test_update_keeps_creation_time() {
    let fx = fixture::<RateLimitPolicy>();
    let created = fx
        .engine
        .create_batch(&ctx(), vec![rate_limit("r1", "login")])
        .await;
    let id = created.responses[0].id.clone();
    let ctime = fx.store.get(RuleKind::RateLimit, &id).unwrap().ctime;

    let mut changed = rate_limit("r1", "checkout");
    changed.meta.id = id.clone();
    assert!(fx.engine.update_batch(&ctx(), vec![changed]).await.is_success());

    let stored = fx.store.get(RuleKind::RateLimit, &id).unwrap();
    assert_eq!(stored.ctime, ctime);
    assert_eq!(stored.dst_service, "checkout");
}

#[tokio::test]
async fn test_update_unknown_and_colliding() {
    let fx = fixture::<RateLimitPolicy>();
    let created = fx
        .engine
        .create_batch(&ctx(), vec![rate_limit("a", "login"), rate_limit("b", "login")])
        .await;
    let b_id = created.responses[1].id.clone();

    let mut unknown = rate_limit("z", "login");
    unknown.meta.id = "missing".to_string();
    let mut collide = rate_limit("a", "login");
    collide.meta.id = b_id;
    let no_id = rate_limit("c", "login");

    let response = fx
        .engine
        .update_batch(&ctx(), vec![unknown, collide, no_id])
        .await;
    let codes: Vec<ApiCode> = response.responses.iter().map(|r| r.code).collect();
    assert_eq!(
        codes,
        [
            ApiCode::NotFoundResource,
            ApiCode::ExistedResource,
            ApiCode::InvalidRuleId,
        ]
    );
    assert_eq!(response.code, ApiCode::NotFoundResource);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let fx = fixture::<RoutingPolicy>();
    let created = fx.engine.create_batch(&ctx(), vec![routing("r1")]).await;
    let id = created.responses[0].id.clone();

    let first = fx
        .engine
        .delete_batch(&ctx(), vec![by_id::<RoutingPolicy>(&id)])
        .await;
    let second = fx
        .engine
        .delete_batch(&ctx(), vec![by_id::<RoutingPolicy>(&id)])
        .await;

    assert!(first.is_success());
    assert!(second.is_success());
    assert_eq!(fx.store.count(RuleKind::Routing), 0);
    // Only the delete that removed something is recorded
    assert_eq!(
        fx.history.operations(),
        [OperationType::Create, OperationType::Delete]
    );
}

#[tokio::test]
async fn test_delete_requires_id() {
    let fx = fixture::<RoutingPolicy>();
    let response = fx
        .engine
        .delete_batch(&ctx(), vec![by_id::<RoutingPolicy>("")])
        .await;
    assert_eq!(response.code, ApiCode::InvalidRuleId);
}

#[tokio::test]
async fn test_history_carries_operator() {
    let fx = fixture::<RoutingPolicy>();
    fx.engine.create_batch(&ctx(), vec![routing("r1")]).await;
    let entries = fx.history.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].operator, "tester");
    assert_eq!(entries[0].request_id, "test-request");
    assert_eq!(entries[0].kind, RuleKind::Routing);
    assert_eq!(entries[0].rule_name, "r1");
}

#[tokio::test]
async fn test_id_only_writes_record_stored_name() {
    let fx = fixture::<CircuitBreakerPolicy>();
    let created = fx
        .engine
        .create_batch(&ctx(), vec![circuit_breaker("cb-orders", "prod")])
        .await;
    let id = created.responses[0].id.clone();

    let mut toggle = by_id::<CircuitBreakerPolicy>(&id);
    toggle.meta.enable = true;
    assert!(fx.engine.enable_batch(&ctx(), vec![toggle]).await.is_success());
    assert!(fx
        .engine
        .delete_batch(&ctx(), vec![by_id::<CircuitBreakerPolicy>(&id)])
        .await
        .is_success());

    let entries = fx.history.entries();
    assert_eq!(entries.len(), 3);
    for entry in &entries[1..] {
        assert_eq!(entry.rule_id, id);
        assert_eq!(entry.rule_name, "cb-orders");
        assert_eq!(entry.namespace, "prod");
    }
    assert_eq!(entries[1].operation, OperationType::UpdateEnable);
    assert_eq!(entries[2].operation, OperationType::Delete);
}

// ============================================================================
// Query
// ============================================================================

#[tokio::test]
async fn test_query_rejects_unknown_filter() {
    let fx = fixture::<RateLimitPolicy>();
    let response = fx
        .engine
        .query(&ctx(), &params(&[("level", "SERVICE")]))
        .await;
    assert_eq!(response.code, ApiCode::InvalidParameter);
    assert!(response.data.is_empty());
}

#[tokio::test]
async fn test_query_pagination_reports_total() {
    let fx = fixture::<RateLimitPolicy>();
    let rules = (0..5)
        .map(|i| rate_limit(&format!("r{}", i), "login"))
        .collect();
    fx.engine.create_batch(&ctx(), rules).await;

    let page = fx
        .engine
        .query(&ctx(), &params(&[("offset", "3"), ("limit", "10")]))
        .await;
    assert!(page.is_success());
    assert_eq!(page.amount, 5);
    assert_eq!(page.size, 2);

    let capped = fx
        .engine
        .query(&ctx(), &params(&[("limit", "1000")]))
        .await;
    assert_eq!(capped.size, 5);
}

#[tokio::test]
async fn test_query_filters_by_name_prefix_and_service() {
    let fx = fixture::<RateLimitPolicy>();
    fx.engine
        .create_batch(
            &ctx(),
            vec![
                rate_limit("login-burst", "login"),
                rate_limit("login-steady", "login"),
                rate_limit("pay-burst", "payment"),
            ],
        )
        .await;

    let by_prefix = fx.engine.query(&ctx(), &params(&[("name", "login*")])).await;
    assert_eq!(by_prefix.amount, 2);

    let by_service = fx
        .engine
        .query(&ctx(), &params(&[("service", "payment")]))
        .await;
    assert_eq!(by_service.amount, 1);
    assert_eq!(by_service.data[0].meta.name, "pay-burst");
}

#[tokio::test]
async fn test_brief_query_rebuilds_policy_from_columns() {
    let fx = fixture::<CircuitBreakerPolicy>();
    let mut rule = circuit_breaker("cb", "default");
    rule.policy.max_ejection_percent = 80;
    fx.engine.create_batch(&ctx(), vec![rule]).await;

    let brief = fx.engine.query(&ctx(), &params(&[("brief", "true")])).await;
    assert_eq!(brief.amount, 1);
    let policy = &brief.data[0].policy;
    assert_eq!(policy.rule_matcher.destination.service, "orders");
    // Not a column, so absent from the brief form
    assert_eq!(policy.max_ejection_percent, 0);
}

// ============================================================================
// Storage Failures
// ============================================================================

#[tokio::test]
async fn test_store_failure_maps_to_store_layer_code() {
    let engine = RuleEngine::<RateLimitPolicy>::new(
        Arc::new(UnavailableStore),
        Arc::new(common::RecordingHistory::default()),
        Arc::new(LimitsConfig::default()),
    );

    let created = engine
        .create_batch(&ctx(), vec![rate_limit("r1", "login")])
        .await;
    assert_eq!(created.code, ApiCode::StoreLayerException);

    let deleted = engine
        .delete_batch(&ctx(), vec![by_id::<RateLimitPolicy>("x")])
        .await;
    assert_eq!(deleted.code, ApiCode::StoreLayerException);

    let page = engine.query(&ctx(), &params(&[])).await;
    assert_eq!(page.code, ApiCode::StoreLayerException);
}

#[tokio::test]
async fn test_rule_json_round_trips_through_engine() {
    let fx = fixture::<RateLimitPolicy>();
    let rule: GovernanceRule<RateLimitPolicy> = serde_json::from_value(serde_json::json!({
        "name": "from-json",
        "namespace": "prod",
        "service": "login",
        "serviceNamespace": "prod",
        "amounts": [{"maxAmount": 20, "validDuration": "1s"}]
    }))
    .unwrap();

    let created = fx.engine.create_batch(&ctx(), vec![rule]).await;
    assert!(created.is_success());

    let page = fx
        .engine
        .query(&ctx(), &params(&[("namespace", "prod")]))
        .await;
    assert_eq!(page.amount, 1);
    assert_eq!(page.data[0].policy.amounts[0].max_amount, 20);
    assert_eq!(page.data[0].meta.namespace, "prod");
}

// ============================================================================
// Cancellation and Concurrency
// ============================================================================

#[tokio::test]
async fn test_started_batch_ignores_cancellation() {
    let fx = fixture::<RateLimitPolicy>();
    let cancelled = ctx();
    cancelled.cancellation().cancel();
    assert!(cancelled.is_cancelled());

    let response = fx
        .engine
        .create_batch(&cancelled, vec![rate_limit("a", "login"), rate_limit("b", "login")])
        .await;

    assert!(response.is_success());
    assert_eq!(response.size, 2);
    assert_eq!(fx.store.count(RuleKind::RateLimit), 2);
    assert_eq!(
        fx.history.operations(),
        [OperationType::Create, OperationType::Create]
    );
}

#[tokio::test]
async fn test_concurrent_same_name_creates_admit_one() {
    let fx = fixture::<RateLimitPolicy>();
    let (ctx_a, ctx_b) = (ctx(), ctx());
    let (a, b) = tokio::join!(
        fx.engine.create_batch(&ctx_a, vec![rate_limit("dup", "login")]),
        fx.engine.create_batch(&ctx_b, vec![rate_limit("dup", "login")]),
    );

    let codes = [a.code, b.code];
    assert_eq!(codes.iter().filter(|c| **c == ApiCode::ExecuteSuccess).count(), 1);
    assert_eq!(codes.iter().filter(|c| **c == ApiCode::ExistedResource).count(), 1);
    assert_eq!(fx.store.count(RuleKind::RateLimit), 1);
    assert_eq!(fx.history.operations(), [OperationType::Create]);
}
