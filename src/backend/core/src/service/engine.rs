//! Batch rule engine.
//!
//! One engine per rule kind. Items of a batch are processed strictly in input
//! order and independently: a failing item becomes that item's response and
//! never aborts its siblings. Once a batch starts, every item runs to
//! completion regardless of caller-side cancellation.

use chrono::Utc;
use metrics::counter;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::filter::QueryFilter;
use super::response::{BatchQueryResponse, BatchWriteResponse, ItemResponse, Rejection};
use crate::auth::OperationVerb;
use crate::config::LimitsConfig;
use crate::context::RequestContext;
use crate::error::{ApiCode, GovernanceError, Result};
use crate::history::{HistoryRecorder, OperationType, RecordEntry};
use crate::model::{new_id, new_revision, GovernanceRule, RulePolicy};
use crate::store::{EnableToggle, RuleStore, StoreError};
use crate::validation::{check_rule_meta, MetaRequirements};

pub struct RuleEngine<P: RulePolicy> {
    store: Arc<dyn RuleStore>,
    history: Arc<dyn HistoryRecorder>,
    limits: Arc<LimitsConfig>,
    _policy: PhantomData<fn() -> P>,
}

impl<P: RulePolicy> RuleEngine<P> {
    pub fn new(
        store: Arc<dyn RuleStore>,
        history: Arc<dyn HistoryRecorder>,
        limits: Arc<LimitsConfig>,
    ) -> Self {
        Self {
            store,
            history,
            limits,
            _policy: PhantomData,
        }
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Batch operations
    // ─────────────────────────────────────────────────────────────────────────

    #[instrument(skip(self, ctx, rules), fields(kind = %P::KIND, request_id = %ctx.request_id(), size = rules.len()))]
    pub async fn create_batch(
        &self,
        ctx: &RequestContext,
        rules: Vec<GovernanceRule<P>>,
    ) -> BatchWriteResponse<P> {
        if let Err(err) = self.check_batch(&rules) {
            err.log(ctx.request_id());
            return BatchWriteResponse::rejected(err);
        }

        let mut responses = Vec::with_capacity(rules.len());
        for rule in &rules {
            let response = match self.try_create(ctx, rule).await {
                Ok(created) => ItemResponse::created(created),
                Err(err) => {
                    err.log(ctx.request_id());
                    let mut failed = ItemResponse::failed(&err, "");
                    failed.rule = Some(rule.clone());
                    failed
                }
            };
            responses.push(response);
        }
        self.finish(OperationVerb::Create, responses)
    }

    #[instrument(skip(self, ctx, rules), fields(kind = %P::KIND, request_id = %ctx.request_id(), size = rules.len()))]
    pub async fn update_batch(
        &self,
        ctx: &RequestContext,
        rules: Vec<GovernanceRule<P>>,
    ) -> BatchWriteResponse<P> {
        if let Err(err) = self.check_batch(&rules) {
            err.log(ctx.request_id());
            return BatchWriteResponse::rejected(err);
        }

        let mut responses = Vec::with_capacity(rules.len());
        for rule in &rules {
            responses.push(self.item_outcome(ctx, rule, self.try_update(ctx, rule).await));
        }
        self.finish(OperationVerb::Update, responses)
    }

    #[instrument(skip(self, ctx, rules), fields(kind = %P::KIND, request_id = %ctx.request_id(), size = rules.len()))]
    pub async fn delete_batch(
        &self,
        ctx: &RequestContext,
        rules: Vec<GovernanceRule<P>>,
    ) -> BatchWriteResponse<P> {
        if let Err(err) = self.check_batch(&rules) {
            err.log(ctx.request_id());
            return BatchWriteResponse::rejected(err);
        }

        let mut responses = Vec::with_capacity(rules.len());
        for rule in &rules {
            responses.push(self.item_outcome(ctx, rule, self.try_delete(ctx, rule).await));
        }
        self.finish(OperationVerb::Delete, responses)
    }

    #[instrument(skip(self, ctx, rules), fields(kind = %P::KIND, request_id = %ctx.request_id(), size = rules.len()))]
    pub async fn enable_batch(
        &self,
        ctx: &RequestContext,
        rules: Vec<GovernanceRule<P>>,
    ) -> BatchWriteResponse<P> {
        if let Err(err) = self.check_batch(&rules) {
            err.log(ctx.request_id());
            return BatchWriteResponse::rejected(err);
        }

        let mut responses = Vec::with_capacity(rules.len());
        for rule in &rules {
            responses.push(self.item_outcome(ctx, rule, self.try_enable(ctx, rule).await));
        }
        self.finish(OperationVerb::Enable, responses)
    }

    /// Filtered, paginated listing.
    #[instrument(skip(self, ctx, params), fields(kind = %P::KIND, request_id = %ctx.request_id()))]
    pub async fn query(
        &self,
        ctx: &RequestContext,
        params: &HashMap<String, String>,
    ) -> BatchQueryResponse<P> {
        let filter = match QueryFilter::parse::<P>(params, &self.limits) {
            Ok(filter) => filter,
            Err(err) => {
                err.log(ctx.request_id());
                return BatchQueryResponse::rejected(err);
            }
        };

        let page = match self.store.list_rules(P::KIND, &filter.to_list_request()).await {
            Ok(page) => page,
            Err(err) => {
                let err = GovernanceError::from(err);
                err.log(ctx.request_id());
                return BatchQueryResponse::rejected(err);
            }
        };

        let data = page
            .records
            .iter()
            .filter_map(|record| match GovernanceRule::<P>::from_record(record) {
                Ok(rule) => Some(rule),
                Err(err) => {
                    warn!(
                        request_id = %ctx.request_id(),
                        rule_id = %record.id,
                        error = %err,
                        "Skipping unconvertible rule record"
                    );
                    None
                }
            })
            .collect();

        BatchQueryResponse::success(page.total, data)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Single items
    // ─────────────────────────────────────────────────────────────────────────

    async fn try_create(
        &self,
        ctx: &RequestContext,
        rule: &GovernanceRule<P>,
    ) -> Result<GovernanceRule<P>> {
        check_rule_meta(&rule.meta, &self.limits, MetaRequirements::CREATE)?;
        rule.policy.validate(&self.limits)?;

        let mut record = rule.to_record()?;
        if self
            .store
            .has_rule_by_name(P::KIND, &record.name, &record.namespace)
            .await?
        {
            return Err(GovernanceError::conflict(P::KIND, &record.name, &record.namespace));
        }

        record.id = new_id();
        record.revision = new_revision();
        self.store.create_rule(record.clone()).await?;
        self.record_history(ctx, OperationType::Create, &record.id, &record.name, &record.namespace);

        info!(
            request_id = %ctx.request_id(),
            rule_id = %record.id,
            name = %record.name,
            namespace = %record.namespace,
            "Created {} rule", P::KIND
        );

        let mut created = rule.clone();
        created.meta.id = record.id;
        created.meta.namespace = record.namespace;
        created.meta.revision = record.revision;
        created.meta.ctime.clear();
        created.meta.mtime.clear();
        created.meta.etime.clear();
        Ok(created)
    }

    async fn try_update(&self, ctx: &RequestContext, rule: &GovernanceRule<P>) -> Result<()> {
        check_rule_meta(&rule.meta, &self.limits, MetaRequirements::UPDATE)?;
        rule.policy.validate(&self.limits)?;

        if !self.store.has_rule(P::KIND, &rule.meta.id).await? {
            return Err(GovernanceError::not_found(P::KIND, &rule.meta.id));
        }

        let mut record = rule.to_record()?;
        if self
            .store
            .has_rule_by_name_exclude_id(P::KIND, &record.name, &record.namespace, &record.id)
            .await?
        {
            return Err(GovernanceError::conflict(P::KIND, &record.name, &record.namespace));
        }

        record.revision = new_revision();
        self.store.update_rule(record.clone()).await?;
        self.record_history(ctx, OperationType::Update, &record.id, &record.name, &record.namespace);

        info!(
            request_id = %ctx.request_id(),
            rule_id = %record.id,
            revision = %record.revision,
            "Updated {} rule", P::KIND
        );
        Ok(())
    }

    async fn try_delete(&self, ctx: &RequestContext, rule: &GovernanceRule<P>) -> Result<()> {
        check_rule_meta(&rule.meta, &self.limits, MetaRequirements::ID_ONLY)?;

        // History names the stored rule; id-only requests carry no name.
        let Some(stored) = self.store.get_rule(P::KIND, &rule.meta.id).await? else {
            self.skip_unknown_delete(ctx, &rule.meta.id);
            return Ok(());
        };

        match self.store.delete_rule(P::KIND, &stored.id).await {
            Ok(()) => {}
            // Deleting an unknown id succeeds so deletes are safe to retry.
            Err(StoreError::NotFound(_)) => {
                self.skip_unknown_delete(ctx, &stored.id);
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }

        self.record_history(ctx, OperationType::Delete, &stored.id, &stored.name, &stored.namespace);
        info!(request_id = %ctx.request_id(), rule_id = %stored.id, "Deleted {} rule", P::KIND);
        Ok(())
    }

    async fn try_enable(&self, ctx: &RequestContext, rule: &GovernanceRule<P>) -> Result<()> {
        check_rule_meta(&rule.meta, &self.limits, MetaRequirements::ID_ONLY)?;

        let stored = self
            .store
            .get_rule(P::KIND, &rule.meta.id)
            .await?
            .ok_or_else(|| GovernanceError::not_found(P::KIND, &rule.meta.id))?;

        let toggle = EnableToggle {
            id: rule.meta.id.clone(),
            enable: rule.meta.enable,
            revision: new_revision(),
        };
        self.store.enable_rule(P::KIND, toggle).await?;
        self.record_history(
            ctx,
            OperationType::UpdateEnable,
            &stored.id,
            &stored.name,
            &stored.namespace,
        );

        info!(
            request_id = %ctx.request_id(),
            rule_id = %rule.meta.id,
            enable = rule.meta.enable,
            "Toggled {} rule", P::KIND
        );
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn skip_unknown_delete(&self, ctx: &RequestContext, id: &str) {
        debug!(
            request_id = %ctx.request_id(),
            rule_id = %id,
            "Delete of unknown {} rule treated as success", P::KIND
        );
    }

    fn check_batch(&self, rules: &[GovernanceRule<P>]) -> Result<()> {
        if rules.is_empty() {
            return Err(GovernanceError::from_code(ApiCode::EmptyRequest));
        }
        if rules.len() > self.limits.max_batch_size {
            return Err(GovernanceError::new(
                ApiCode::BatchSizeOverLimit,
                format!(
                    "batch of {} items exceeds the limit of {}",
                    rules.len(),
                    self.limits.max_batch_size
                ),
            ));
        }
        Ok(())
    }

    fn item_outcome(
        &self,
        ctx: &RequestContext,
        rule: &GovernanceRule<P>,
        outcome: Result<()>,
    ) -> ItemResponse<P> {
        match outcome {
            Ok(()) => ItemResponse::success(rule.meta.id.clone()),
            Err(err) => {
                err.log(ctx.request_id());
                ItemResponse::failed(&err, rule.meta.id.clone())
            }
        }
    }

    fn record_history(
        &self,
        ctx: &RequestContext,
        operation: OperationType,
        id: &str,
        name: &str,
        namespace: &str,
    ) {
        self.history.record(RecordEntry {
            timestamp: Utc::now(),
            request_id: ctx.request_id().to_string(),
            kind: P::KIND,
            operation,
            rule_id: id.to_string(),
            rule_name: name.to_string(),
            namespace: namespace.to_string(),
            operator: ctx.actor(),
        });
    }

    fn finish(&self, verb: OperationVerb, responses: Vec<ItemResponse<P>>) -> BatchWriteResponse<P> {
        let response = BatchWriteResponse::collect(responses);
        let failed = response.failed_count() as u64;
        let succeeded = response.size as u64 - failed;
        counter!(
            "governance_batch_items_total",
            "kind" => P::KIND.as_str(),
            "operation" => verb.as_str(),
            "outcome" => "success"
        )
        .increment(succeeded);
        counter!(
            "governance_batch_items_total",
            "kind" => P::KIND.as_str(),
            "operation" => verb.as_str(),
            "outcome" => "failure"
        )
        .increment(failed);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CircuitBreakerPolicy, RuleMeta};
    use crate::store::InMemoryRuleStore;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<RecordEntry>>);

    impl HistoryRecorder for Recording {
        fn record(&self, entry: RecordEntry) {
            self.0.lock().push(entry);
        }
    }

    fn engine() -> (RuleEngine<CircuitBreakerPolicy>, Arc<Recording>) {
        let history = Arc::new(Recording::default());
        let engine = RuleEngine::new(
            Arc::new(InMemoryRuleStore::new()),
            history.clone(),
            Arc::new(LimitsConfig::default()),
        );
        (engine, history)
    }

    fn rule(name: &str) -> GovernanceRule<CircuitBreakerPolicy> {
        GovernanceRule::new(RuleMeta::new(name, "default"), CircuitBreakerPolicy::default())
    }

    #[tokio::test]
    async fn test_create_ignores_supplied_id() {
        let (engine, history) = engine();
        let mut item = rule("r1");
        item.meta.id = "caller-id".to_string();
        let response = engine.create_batch(&RequestContext::new("t"), vec![item]).await;
        assert!(response.is_success());
        assert_ne!(response.responses[0].id, "caller-id");
        assert_eq!(history.0.lock()[0].operation, OperationType::Create);
    }

    #[tokio::test]
    async fn test_failed_create_echoes_input() {
        let (engine, _) = engine();
        let response = engine
            .create_batch(&RequestContext::new("t"), vec![rule("")])
            .await;
        assert_eq!(response.code, ApiCode::InvalidRuleName);
        assert!(response.responses[0].rule.is_some());
    }

    #[tokio::test]
    async fn test_enable_unknown_is_not_found() {
        let (engine, history) = engine();
        let response = engine
            .enable_batch(&RequestContext::new("t"), vec![GovernanceRule::with_id("nope")])
            .await;
        assert_eq!(response.code, ApiCode::NotFoundResource);
        assert!(history.0.lock().is_empty());
    }
}
