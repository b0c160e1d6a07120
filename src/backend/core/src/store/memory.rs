//! In-memory rule store, used by the server binary and tests.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use super::{EnableToggle, ListRequest, RulePage, RuleStore, StoreError, StoreResult};
use crate::model::{RuleKind, RuleRecord};

type KindTable = BTreeMap<String, RuleRecord>;

/// Per-kind maps keyed by rule id.
///
/// Writes stamp the timestamps and enforce (name, namespace) uniqueness, so
/// two racing creates for the same identity cannot both persist.
#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<HashMap<RuleKind, KindTable>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rules of `kind`.
    pub fn count(&self, kind: RuleKind) -> usize {
        self.rules.read().get(&kind).map_or(0, BTreeMap::len)
    }

    /// Snapshot of one record.
    pub fn get(&self, kind: RuleKind, id: &str) -> Option<RuleRecord> {
        self.rules.read().get(&kind).and_then(|t| t.get(id)).cloned()
    }

    fn name_taken(table: &KindTable, name: &str, namespace: &str, exclude_id: Option<&str>) -> bool {
        table.values().any(|r| {
            r.name == name && r.namespace == namespace && Some(r.id.as_str()) != exclude_id
        })
    }
}

fn matches_filter(record: &RuleRecord, key: &str, value: &str) -> bool {
    match key {
        "id" => record.id == value,
        "name" => match value.strip_suffix('*') {
            Some(prefix) => record.name.starts_with(prefix),
            None => record.name == value,
        },
        "namespace" => record.namespace == value,
        "enable" => record.enable.to_string() == value.to_ascii_lowercase(),
        "description" => record.description.contains(value),
        "level" => record.level.eq_ignore_ascii_case(value),
        "service" => record.src_service == value || record.dst_service == value,
        "serviceNamespace" => record.src_namespace == value || record.dst_namespace == value,
        "srcService" => record.src_service == value,
        "srcNamespace" => record.src_namespace == value,
        "dstService" => record.dst_service == value,
        "dstNamespace" => record.dst_namespace == value,
        "dstMethod" | "method" => record.dst_method == value,
        _ => true,
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn has_rule(&self, kind: RuleKind, id: &str) -> StoreResult<bool> {
        Ok(self.get(kind, id).is_some())
    }

    async fn get_rule(&self, kind: RuleKind, id: &str) -> StoreResult<Option<RuleRecord>> {
        Ok(self.get(kind, id))
    }

    async fn has_rule_by_name(
        &self,
        kind: RuleKind,
        name: &str,
        namespace: &str,
    ) -> StoreResult<bool> {
        let rules = self.rules.read();
        Ok(rules
            .get(&kind)
            .is_some_and(|t| Self::name_taken(t, name, namespace, None)))
    }

    async fn has_rule_by_name_exclude_id(
        &self,
        kind: RuleKind,
        name: &str,
        namespace: &str,
        id: &str,
    ) -> StoreResult<bool> {
        let rules = self.rules.read();
        Ok(rules
            .get(&kind)
            .is_some_and(|t| Self::name_taken(t, name, namespace, Some(id))))
    }

    async fn create_rule(&self, mut record: RuleRecord) -> StoreResult<()> {
        let mut rules = self.rules.write();
        let table = rules.entry(record.kind).or_default();
        if table.contains_key(&record.id) {
            return Err(StoreError::DuplicateKey(format!("id={}", record.id)));
        }
        if Self::name_taken(table, &record.name, &record.namespace, None) {
            return Err(StoreError::DuplicateKey(format!(
                "name={}, namespace={}",
                record.name, record.namespace
            )));
        }

        let now = Utc::now();
        record.ctime = Some(now);
        record.mtime = Some(now);
        record.etime = record.enable.then_some(now);
        table.insert(record.id.clone(), record);
        Ok(())
    }

    async fn update_rule(&self, mut record: RuleRecord) -> StoreResult<()> {
        let mut rules = self.rules.write();
        let table = rules.entry(record.kind).or_default();
        if Self::name_taken(table, &record.name, &record.namespace, Some(&record.id)) {
            return Err(StoreError::DuplicateKey(format!(
                "name={}, namespace={}",
                record.name, record.namespace
            )));
        }
        let existing = table
            .get(&record.id)
            .ok_or_else(|| StoreError::NotFound(format!("id={}", record.id)))?;

        let now = Utc::now();
        record.ctime = existing.ctime;
        record.mtime = Some(now);
        record.etime = match (existing.enable, record.enable) {
            (_, false) => None,
            (false, true) => Some(now),
            (true, true) => existing.etime,
        };
        table.insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete_rule(&self, kind: RuleKind, id: &str) -> StoreResult<()> {
        let mut rules = self.rules.write();
        rules
            .get_mut(&kind)
            .and_then(|t| t.remove(id))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("id={}", id)))
    }

    async fn enable_rule(&self, kind: RuleKind, toggle: EnableToggle) -> StoreResult<()> {
        let mut rules = self.rules.write();
        let record = rules
            .get_mut(&kind)
            .and_then(|t| t.get_mut(&toggle.id))
            .ok_or_else(|| StoreError::NotFound(format!("id={}", toggle.id)))?;

        let now = Utc::now();
        record.etime = match (record.enable, toggle.enable) {
            (_, false) => None,
            (false, true) => Some(now),
            (true, true) => record.etime,
        };
        record.enable = toggle.enable;
        record.revision = toggle.revision;
        record.mtime = Some(now);
        Ok(())
    }

    async fn list_rules(&self, kind: RuleKind, request: &ListRequest) -> StoreResult<RulePage> {
        let rules = self.rules.read();
        let mut matched: Vec<&RuleRecord> = rules
            .get(&kind)
            .map(|t| {
                t.values()
                    .filter(|r| {
                        request
                            .filters
                            .iter()
                            .all(|(key, value)| matches_filter(r, key, value))
                    })
                    .collect()
            })
            .unwrap_or_default();

        // Newest first; id breaks ties so paging is stable.
        matched.sort_by(|a, b| b.mtime.cmp(&a.mtime).then_with(|| a.id.cmp(&b.id)));

        let total = matched.len();
        let records = matched
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .map(|r| {
                let mut record = r.clone();
                if request.brief {
                    record.payload.clear();
                }
                record
            })
            .collect();

        Ok(RulePage { total, records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, name: &str, namespace: &str) -> RuleRecord {
        let mut record = RuleRecord::new(RuleKind::CircuitBreaker);
        record.id = id.to_string();
        record.name = name.to_string();
        record.namespace = namespace.to_string();
        record.payload = "{}".to_string();
        record
    }

    fn list(filters: &[(&str, &str)], brief: bool) -> ListRequest {
        ListRequest {
            filters: filters
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            brief,
            offset: 0,
            limit: 100,
        }
    }

    #[test]
    fn test_create_enforces_uniqueness() {
        let store = InMemoryRuleStore::new();
        tokio_test::block_on(store.create_rule(record("a", "r1", "default"))).unwrap();

        let dup_name = tokio_test::block_on(store.create_rule(record("b", "r1", "default")));
        assert!(matches!(dup_name, Err(StoreError::DuplicateKey(_))));
        let dup_id = tokio_test::block_on(store.create_rule(record("a", "r2", "default")));
        assert!(matches!(dup_id, Err(StoreError::DuplicateKey(_))));

        tokio_test::block_on(store.create_rule(record("c", "r1", "other"))).unwrap();
        assert_eq!(store.count(RuleKind::CircuitBreaker), 2);
    }

    #[tokio::test]
    async fn test_get_rule_is_scoped_by_kind() {
        let store = InMemoryRuleStore::new();
        store.create_rule(record("a", "r1", "prod")).await.unwrap();

        let found = store.get_rule(RuleKind::CircuitBreaker, "a").await.unwrap();
        assert_eq!(found.map(|r| (r.name, r.namespace)), Some(("r1".into(), "prod".into())));
        assert!(store.get_rule(RuleKind::Routing, "a").await.unwrap().is_none());
        assert!(store.get_rule(RuleKind::CircuitBreaker, "b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_keeps_ctime_and_tracks_etime() {
        let store = InMemoryRuleStore::new();
        store.create_rule(record("a", "r1", "default")).await.unwrap();
        let created = store.get(RuleKind::CircuitBreaker, "a").unwrap();
        assert!(created.etime.is_none());

        let mut enabled = record("a", "r1-renamed", "default");
        enabled.enable = true;
        store.update_rule(enabled).await.unwrap();
        let updated = store.get(RuleKind::CircuitBreaker, "a").unwrap();
        assert_eq!(updated.ctime, created.ctime);
        assert_eq!(updated.name, "r1-renamed");
        assert!(updated.etime.is_some());

        let missing = store.update_rule(record("zz", "x", "default")).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_enable_toggle() {
        let store = InMemoryRuleStore::new();
        store.create_rule(record("a", "r1", "default")).await.unwrap();
        let toggle = |enable| EnableToggle {
            id: "a".to_string(),
            enable,
            revision: format!("rev-{}", enable),
        };

        store.enable_rule(RuleKind::CircuitBreaker, toggle(true)).await.unwrap();
        let on = store.get(RuleKind::CircuitBreaker, "a").unwrap();
        assert!(on.enable && on.etime.is_some());
        assert_eq!(on.revision, "rev-true");

        store.enable_rule(RuleKind::CircuitBreaker, toggle(false)).await.unwrap();
        let off = store.get(RuleKind::CircuitBreaker, "a").unwrap();
        assert!(!off.enable && off.etime.is_none());
        assert_eq!(off.payload, "{}");
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let store = InMemoryRuleStore::new();
        let result = store.delete_rule(RuleKind::Routing, "nope").await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_filters_and_brief() {
        let store = InMemoryRuleStore::new();
        let mut a = record("a", "orders-cb", "default");
        a.dst_service = "orders".to_string();
        let mut b = record("b", "orders-cb-2", "default");
        b.src_service = "orders".to_string();
        let c = record("c", "payments-cb", "default");
        for r in [a, b, c] {
            store.create_rule(r).await.unwrap();
        }

        let page = store
            .list_rules(RuleKind::CircuitBreaker, &list(&[("name", "orders*")], false))
            .await
            .unwrap();
        assert_eq!(page.total, 2);

        let page = store
            .list_rules(RuleKind::CircuitBreaker, &list(&[("service", "orders")], true))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert!(page.records.iter().all(RuleRecord::is_brief));

        let page = store
            .list_rules(RuleKind::CircuitBreaker, &list(&[("name", "orders")], false))
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_list_pagination_reports_total() {
        let store = InMemoryRuleStore::new();
        for i in 0..5 {
            store
                .create_rule(record(&format!("id{}", i), &format!("r{}", i), "default"))
                .await
                .unwrap();
        }
        let mut request = list(&[], false);
        request.offset = 3;
        request.limit = 10;
        let page = store.list_rules(RuleKind::CircuitBreaker, &request).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.records.len(), 2);
    }
}
