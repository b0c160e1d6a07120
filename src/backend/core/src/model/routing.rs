//! Routing rules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::meta::{MatchArgument, MatchString, RuleKind, RuleRecord};
use super::RulePolicy;
use crate::config::LimitsConfig;
use crate::error::Result;
use crate::validation::check_service_ref;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingPolicyType {
    #[default]
    RulePolicy,
    MetadataPolicy,
}

/// Caller side of a sub-rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceMatch {
    pub service: String,
    pub namespace: String,
    pub arguments: Vec<MatchArgument>,
}

/// Weighted target instance group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationGroup {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub service: String,
    pub namespace: String,
    pub labels: BTreeMap<String, MatchString>,
    pub weight: u32,
    pub priority: u32,
    pub isolate: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubRule {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub sources: Vec<SourceMatch>,
    pub destinations: Vec<DestinationGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutingPolicy {
    pub priority: u32,
    pub routing_policy: RoutingPolicyType,
    pub rules: Vec<SubRule>,
}

impl RoutingPolicy {
    fn first_source(&self) -> Option<&SourceMatch> {
        self.rules.iter().flat_map(|rule| rule.sources.iter()).next()
    }

    fn first_destination(&self) -> Option<&DestinationGroup> {
        self.rules.iter().flat_map(|rule| rule.destinations.iter()).next()
    }
}

impl RulePolicy for RoutingPolicy {
    const KIND: RuleKind = RuleKind::Routing;

    const QUERY_FILTERS: &'static [&'static str] = &[
        "service",
        "serviceNamespace",
        "srcService",
        "srcNamespace",
        "dstService",
        "dstNamespace",
    ];

    fn validate(&self, limits: &LimitsConfig) -> Result<()> {
        for rule in &self.rules {
            for source in &rule.sources {
                check_service_ref("rules.sources", &source.service, &source.namespace, limits)?;
            }
            for destination in &rule.destinations {
                check_service_ref(
                    "rules.destinations",
                    &destination.service,
                    &destination.namespace,
                    limits,
                )?;
            }
        }
        Ok(())
    }

    fn write_columns(&self, record: &mut RuleRecord) {
        record.priority = self.priority;
        if let Some(source) = self.first_source() {
            record.src_service = source.service.clone();
            record.src_namespace = source.namespace.clone();
        }
        if let Some(destination) = self.first_destination() {
            record.dst_service = destination.service.clone();
            record.dst_namespace = destination.namespace.clone();
        }
    }

    fn from_columns(record: &RuleRecord) -> Self {
        let mut sub_rule = SubRule::default();
        if !record.src_service.is_empty() || !record.src_namespace.is_empty() {
            sub_rule.sources.push(SourceMatch {
                service: record.src_service.clone(),
                namespace: record.src_namespace.clone(),
                arguments: Vec::new(),
            });
        }
        if !record.dst_service.is_empty() || !record.dst_namespace.is_empty() {
            sub_rule.destinations.push(DestinationGroup {
                service: record.dst_service.clone(),
                namespace: record.dst_namespace.clone(),
                ..Default::default()
            });
        }

        let rules = if sub_rule.sources.is_empty() && sub_rule.destinations.is_empty() {
            Vec::new()
        } else {
            vec![sub_rule]
        };
        Self {
            priority: record.priority,
            rules,
            ..Default::default()
        }
    }
}
