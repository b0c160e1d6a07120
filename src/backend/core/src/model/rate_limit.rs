//! Rate-limit rules.

use serde::{Deserialize, Serialize};

use super::meta::{MatchArgument, MatchString, RuleKind, RuleRecord};
use super::RulePolicy;
use crate::config::LimitsConfig;
use crate::error::{ApiCode, Result};
use crate::validation::{check_service_ref, validate_field};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateLimitResource {
    #[default]
    Qps,
    Concurrency,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateLimitType {
    #[default]
    Global,
    Local,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateLimitAction {
    #[default]
    Reject,
    Unirate,
}

/// Behaviour when the global quota server is unreachable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailoverType {
    #[default]
    FailoverLocal,
    FailoverPass,
}

/// Quota: at most `max_amount` requests per `valid_duration` (e.g. `1s`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Amount {
    pub max_amount: u32,
    pub valid_duration: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitPolicy {
    pub service: String,
    pub service_namespace: String,
    pub method: MatchString,
    pub arguments: Vec<MatchArgument>,
    pub resource: RateLimitResource,
    #[serde(rename = "type")]
    pub limit_type: RateLimitType,
    pub amounts: Vec<Amount>,
    pub action: RateLimitAction,
    pub priority: u32,
    pub failover: FailoverType,
}

impl RulePolicy for RateLimitPolicy {
    const KIND: RuleKind = RuleKind::RateLimit;

    const QUERY_FILTERS: &'static [&'static str] = &["service", "serviceNamespace", "method"];

    fn validate(&self, limits: &LimitsConfig) -> Result<()> {
        validate_field("service", &self.service, ApiCode::InvalidServiceName)
            .required()
            .result()?;
        check_service_ref("service", &self.service, &self.service_namespace, limits)
    }

    fn write_columns(&self, record: &mut RuleRecord) {
        record.priority = self.priority;
        record.dst_service = self.service.clone();
        record.dst_namespace = self.service_namespace.clone();
        record.dst_method = self.method.value.clone();
    }

    fn from_columns(record: &RuleRecord) -> Self {
        Self {
            service: record.dst_service.clone(),
            service_namespace: record.dst_namespace.clone(),
            method: MatchString::exact(record.dst_method.clone()),
            priority: record.priority,
            ..Default::default()
        }
    }
}
