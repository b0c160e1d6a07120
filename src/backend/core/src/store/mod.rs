//! Rule storage contract.
//!
//! The engine only needs existence probes, single-record writes and a
//! filtered, paginated listing. Consistency and persistence are the store's
//! business; in particular (name, namespace) uniqueness must be enforced by
//! the store itself, since the engine's check-then-write is not atomic.

pub mod memory;

pub use memory::InMemoryRuleStore;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::error::{ApiCode, GovernanceError};
use crate::model::{RuleKind, RuleRecord};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store failure: {0}")]
    Internal(String),
}

impl StoreError {
    pub const fn api_code(&self) -> ApiCode {
        match self {
            Self::DuplicateKey(_) => ApiCode::ExistedResource,
            Self::NotFound(_) => ApiCode::NotFoundResource,
            Self::Unavailable(_) | Self::Internal(_) => ApiCode::StoreLayerException,
        }
    }
}

impl From<StoreError> for GovernanceError {
    fn from(error: StoreError) -> Self {
        GovernanceError::new(error.api_code(), error.to_string()).with_source(error)
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Enable-flag change for one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnableToggle {
    pub id: String,
    pub enable: bool,
    pub revision: String,
}

/// One page of a filtered listing plus the total match count.
#[derive(Debug, Clone, Default)]
pub struct RulePage {
    pub total: usize,
    pub records: Vec<RuleRecord>,
}

/// Listing request. `filters` holds only non-pagination keys with non-empty
/// values; `brief` asks for payload-less records.
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    pub filters: HashMap<String, String>,
    pub brief: bool,
    pub offset: usize,
    pub limit: usize,
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn has_rule(&self, kind: RuleKind, id: &str) -> StoreResult<bool>;

    /// Full record by id, `None` when unknown.
    async fn get_rule(&self, kind: RuleKind, id: &str) -> StoreResult<Option<RuleRecord>>;

    async fn has_rule_by_name(
        &self,
        kind: RuleKind,
        name: &str,
        namespace: &str,
    ) -> StoreResult<bool>;

    async fn has_rule_by_name_exclude_id(
        &self,
        kind: RuleKind,
        name: &str,
        namespace: &str,
        id: &str,
    ) -> StoreResult<bool>;

    async fn create_rule(&self, record: RuleRecord) -> StoreResult<()>;

    async fn update_rule(&self, record: RuleRecord) -> StoreResult<()>;

    async fn delete_rule(&self, kind: RuleKind, id: &str) -> StoreResult<()>;

    async fn enable_rule(&self, kind: RuleKind, toggle: EnableToggle) -> StoreResult<()>;

    async fn list_rules(&self, kind: RuleKind, request: &ListRequest) -> StoreResult<RulePage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let err: GovernanceError = StoreError::DuplicateKey("r1".into()).into();
        assert_eq!(err.code(), ApiCode::ExistedResource);
        let err: GovernanceError = StoreError::Unavailable("down".into()).into();
        assert_eq!(err.code(), ApiCode::StoreLayerException);
        assert_eq!(err.message(), "store unavailable: down");
    }
}
