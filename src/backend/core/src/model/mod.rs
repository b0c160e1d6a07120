//! Governance rule model.
//!
//! A rule is the common [`RuleMeta`] block plus a kind-specific policy. The
//! policy type doubles as the per-kind descriptor: it names its kind, its query
//! allow-list, its own field checks and how it maps onto the storage columns.
//! The engine, the archive transfer and the permission gate are generic over it.

pub mod circuit_breaker;
pub mod meta;
pub mod rate_limit;
pub mod routing;

pub use circuit_breaker::{
    CircuitBreakerLevel, CircuitBreakerPolicy, DestinationService, ErrorCondition,
    ErrorInputType, RecoverCondition, RuleMatcher, SourceService, TriggerCondition, TriggerType,
};
pub use meta::{
    format_time, new_id, new_revision, ArgumentType, MatchArgument, MatchString, MatchType,
    RuleKind, RuleMeta, RuleRecord, DEFAULT_NAMESPACE,
};
pub use rate_limit::{
    Amount, FailoverType, RateLimitAction, RateLimitPolicy, RateLimitResource, RateLimitType,
};
pub use routing::{DestinationGroup, RoutingPolicy, RoutingPolicyType, SourceMatch, SubRule};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::config::LimitsConfig;
use crate::error::Result;

/// Filter keys every kind accepts.
pub const COMMON_QUERY_FILTERS: &[&str] = &[
    "brief",
    "offset",
    "limit",
    "id",
    "name",
    "namespace",
    "enable",
    "description",
];

/// Kind-specific part of a governance rule.
pub trait RulePolicy:
    Debug + Clone + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: RuleKind;

    /// Kind-specific filter keys, on top of [`COMMON_QUERY_FILTERS`].
    const QUERY_FILTERS: &'static [&'static str];

    /// Length checks on the service references this policy carries.
    fn validate(&self, limits: &LimitsConfig) -> Result<()>;

    /// Fill the denormalized columns used for filtering and brief listings.
    fn write_columns(&self, record: &mut RuleRecord);

    /// Rebuild a partial policy from the columns of a brief record.
    fn from_columns(record: &RuleRecord) -> Self;

    fn allows_filter(key: &str) -> bool {
        COMMON_QUERY_FILTERS.contains(&key) || Self::QUERY_FILTERS.contains(&key)
    }
}

/// A rule as exchanged with console clients and written to archives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(bound = "P: RulePolicy")]
pub struct GovernanceRule<P: RulePolicy> {
    #[serde(flatten)]
    pub meta: RuleMeta,
    #[serde(flatten)]
    pub policy: P,
}

pub type CircuitBreakerRule = GovernanceRule<CircuitBreakerPolicy>;
pub type RateLimitRule = GovernanceRule<RateLimitPolicy>;
pub type RoutingRule = GovernanceRule<RoutingPolicy>;

impl<P: RulePolicy> GovernanceRule<P> {
    pub fn new(meta: RuleMeta, policy: P) -> Self {
        Self { meta, policy }
    }

    /// Item carrying only an id, as used by delete and enable requests.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            meta: RuleMeta {
                id: id.into(),
                ..Default::default()
            },
            policy: P::default(),
        }
    }

    pub fn kind(&self) -> RuleKind {
        P::KIND
    }

    /// Translate to the storage form. Timestamps and revision are left for
    /// the store to assign.
    pub fn to_record(&self) -> Result<RuleRecord> {
        let mut record = RuleRecord::new(P::KIND);
        record.id = self.meta.id.clone();
        record.name = self.meta.name.clone();
        record.namespace = self.meta.effective_namespace().to_string();
        record.description = self.meta.description.clone();
        record.enable = self.meta.enable;
        record.revision = self.meta.revision.clone();
        record.payload = serde_json::to_string(&self.policy)?;
        self.policy.write_columns(&mut record);
        Ok(record)
    }

    /// Translate from the storage form.
    pub fn from_record(record: &RuleRecord) -> Result<Self> {
        let policy = if record.is_brief() {
            P::from_columns(record)
        } else {
            serde_json::from_str(&record.payload)?
        };
        let meta = RuleMeta {
            id: record.id.clone(),
            name: record.name.clone(),
            namespace: record.namespace.clone(),
            description: record.description.clone(),
            enable: record.enable,
            revision: record.revision.clone(),
            ctime: format_time(record.ctime),
            mtime: format_time(record.mtime),
            etime: if record.enable {
                format_time(record.etime)
            } else {
                String::new()
            },
        };
        Ok(Self { meta, policy })
    }
}
