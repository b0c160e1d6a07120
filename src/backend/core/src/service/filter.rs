//! Query parameter validation and pagination.

use std::collections::HashMap;

use crate::config::LimitsConfig;
use crate::error::{GovernanceError, Result};
use crate::model::RulePolicy;
use crate::store::ListRequest;

const OFFSET: &str = "offset";
const LIMIT: &str = "limit";
const BRIEF: &str = "brief";

/// A validated query: storage filters plus pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFilter {
    pub filters: HashMap<String, String>,
    pub brief: bool,
    pub offset: usize,
    pub limit: usize,
}

impl QueryFilter {
    /// Validate `params` against the allow-list of `P`.
    ///
    /// Any key outside the allow-list rejects the whole query, even when the
    /// other keys are valid. Empty values are dropped.
    pub fn parse<P: RulePolicy>(
        params: &HashMap<String, String>,
        limits: &LimitsConfig,
    ) -> Result<Self> {
        let mut keys: Vec<&String> = params.keys().collect();
        keys.sort();
        if let Some(key) = keys.into_iter().find(|key| !P::allows_filter(key)) {
            return Err(GovernanceError::invalid_parameter(format!(
                "query parameter {} is not allowed for {} rules",
                key,
                P::KIND
            )));
        }

        let value_of = |key: &str| params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let offset = match value_of(OFFSET) {
            Some(raw) => parse_number(OFFSET, raw)?,
            None => 0,
        };
        let limit = match value_of(LIMIT) {
            Some(raw) => parse_number(LIMIT, raw)?,
            None => limits.query_default_limit,
        }
        .min(limits.query_max_limit);
        let brief = match value_of(BRIEF) {
            Some(raw) => raw.parse::<bool>().map_err(|_| {
                GovernanceError::invalid_parameter(format!("brief must be true or false, got {}", raw))
            })?,
            None => false,
        };

        let filters = params
            .iter()
            .filter(|(key, value)| {
                !matches!(key.as_str(), OFFSET | LIMIT | BRIEF) && !value.trim().is_empty()
            })
            .map(|(key, value)| (key.clone(), value.trim().to_string()))
            .collect();

        Ok(Self {
            filters,
            brief,
            offset,
            limit,
        })
    }

    pub fn to_list_request(&self) -> ListRequest {
        ListRequest {
            filters: self.filters.clone(),
            brief: self.brief,
            offset: self.offset,
            limit: self.limit,
        }
    }
}

fn parse_number(key: &str, raw: &str) -> Result<usize> {
    raw.parse::<usize>().map_err(|_| {
        GovernanceError::invalid_parameter(format!(
            "{} must be a non-negative integer, got {}",
            key, raw
        ))
    })
}
