//! Circuit-breaker rules.

use serde::{Deserialize, Serialize};

use super::meta::{MatchString, RuleKind, RuleRecord};
use super::RulePolicy;
use crate::config::LimitsConfig;
use crate::error::Result;
use crate::validation::check_service_ref;

/// Granularity at which the breaker trips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitBreakerLevel {
    #[default]
    Service,
    Method,
    Group,
    Instance,
}

impl CircuitBreakerLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "SERVICE",
            Self::Method => "METHOD",
            Self::Group => "GROUP",
            Self::Instance => "INSTANCE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "SERVICE" => Some(Self::Service),
            "METHOD" => Some(Self::Method),
            "GROUP" => Some(Self::Group),
            "INSTANCE" => Some(Self::Instance),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceService {
    pub service: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationService {
    pub service: String,
    pub namespace: String,
    pub method: MatchString,
}

/// Which calls the rule applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleMatcher {
    pub source: SourceService,
    pub destination: DestinationService,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorInputType {
    #[default]
    RetCode,
    Delay,
}

/// What counts as a failed call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorCondition {
    pub input_type: ErrorInputType,
    pub condition: MatchString,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    #[default]
    ErrorRate,
    ConsecutiveError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerCondition {
    pub trigger_type: TriggerType,
    pub error_count: u32,
    pub error_percent: u32,
    /// Statistic window, seconds
    pub interval: u32,
    pub minimum_request: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecoverCondition {
    /// Seconds spent open before probing
    pub sleep_window: u32,
    pub consecutive_success: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CircuitBreakerPolicy {
    pub level: CircuitBreakerLevel,
    pub rule_matcher: RuleMatcher,
    pub error_conditions: Vec<ErrorCondition>,
    pub trigger_condition: Vec<TriggerCondition>,
    pub max_ejection_percent: u32,
    pub recover_condition: RecoverCondition,
}

impl RulePolicy for CircuitBreakerPolicy {
    const KIND: RuleKind = RuleKind::CircuitBreaker;

    const QUERY_FILTERS: &'static [&'static str] = &[
        "level",
        "service",
        "serviceNamespace",
        "srcService",
        "srcNamespace",
        "dstService",
        "dstNamespace",
        "dstMethod",
    ];

    fn validate(&self, limits: &LimitsConfig) -> Result<()> {
        let matcher = &self.rule_matcher;
        check_service_ref(
            "ruleMatcher.source",
            &matcher.source.service,
            &matcher.source.namespace,
            limits,
        )?;
        check_service_ref(
            "ruleMatcher.destination",
            &matcher.destination.service,
            &matcher.destination.namespace,
            limits,
        )
    }

    fn write_columns(&self, record: &mut RuleRecord) {
        let matcher = &self.rule_matcher;
        record.level = self.level.as_str().to_string();
        record.src_service = matcher.source.service.clone();
        record.src_namespace = matcher.source.namespace.clone();
        record.dst_service = matcher.destination.service.clone();
        record.dst_namespace = matcher.destination.namespace.clone();
        record.dst_method = matcher.destination.method.value.clone();
    }

    fn from_columns(record: &RuleRecord) -> Self {
        Self {
            level: CircuitBreakerLevel::parse(&record.level).unwrap_or_default(),
            rule_matcher: RuleMatcher {
                source: SourceService {
                    service: record.src_service.clone(),
                    namespace: record.src_namespace.clone(),
                },
                destination: DestinationService {
                    service: record.dst_service.clone(),
                    namespace: record.dst_namespace.clone(),
                    method: MatchString::exact(record.dst_method.clone()),
                },
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiCode;

    #[test]
    fn test_yaml_shape() {
        let yaml = r#"
level: METHOD
ruleMatcher:
  source:
    service: gateway
    namespace: default
  destination:
    service: orders
    namespace: default
    method:
      type: REGEX
      value: "^/pay.*"
errorConditions:
  - inputType: RET_CODE
    condition:
      type: IN
      value: "500,502"
triggerCondition:
  - triggerType: CONSECUTIVE_ERROR
    errorCount: 10
maxEjectionPercent: 50
recoverCondition:
  sleepWindow: 60
  consecutiveSuccess: 3
"#;
        let policy: CircuitBreakerPolicy = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(policy.level, CircuitBreakerLevel::Method);
        assert_eq!(policy.trigger_condition[0].trigger_type, TriggerType::ConsecutiveError);
        assert_eq!(policy.trigger_condition[0].error_count, 10);
        assert_eq!(policy.recover_condition.sleep_window, 60);

        let mut record = RuleRecord::new(RuleKind::CircuitBreaker);
        policy.write_columns(&mut record);
        assert_eq!(record.src_service, "gateway");
        assert_eq!(record.dst_method, "^/pay.*");
    }

    #[test]
    fn test_long_service_name_rejected() {
        let mut policy = CircuitBreakerPolicy::default();
        policy.rule_matcher.destination.service = "s".repeat(129);
        let err = policy.validate(&LimitsConfig::default()).unwrap_err();
        assert_eq!(err.code(), ApiCode::InvalidServiceName);
    }
}
