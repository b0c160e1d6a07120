//! Metadata and matching primitives shared by every rule kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Namespace assigned to rules that do not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ═══════════════════════════════════════════════════════════════════════════════
// Rule Kind
// ═══════════════════════════════════════════════════════════════════════════════

/// The governance rule families managed by the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    CircuitBreaker,
    RateLimit,
    Routing,
}

impl RuleKind {
    pub const ALL: [RuleKind; 3] = [Self::CircuitBreaker, Self::RateLimit, Self::Routing];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CircuitBreaker => "circuit_breaker",
            Self::RateLimit => "rate_limit",
            Self::Routing => "routing",
        }
    }

    /// Name used in operation labels, e.g. `CreateRateLimitRules`.
    pub const fn plural_name(&self) -> &'static str {
        match self {
            Self::CircuitBreaker => "CircuitBreakerRules",
            Self::RateLimit => "RateLimitRules",
            Self::Routing => "RoutingRules",
        }
    }

    /// URL segment of the console routes.
    pub const fn path_segment(&self) -> &'static str {
        match self {
            Self::CircuitBreaker => "circuit-breakers",
            Self::RateLimit => "rate-limits",
            Self::Routing => "routings",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value || kind.path_segment() == value)
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Rule Metadata
// ═══════════════════════════════════════════════════════════════════════════════

/// Fields common to all rule kinds, as seen by console clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleMeta {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub enable: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub revision: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ctime: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub mtime: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub etime: String,
}

impl RuleMeta {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Namespace with the default applied.
    pub fn effective_namespace(&self) -> &str {
        if self.namespace.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            &self.namespace
        }
    }

    /// Drop the fields storage derives on every write.
    pub fn strip_derived(&mut self) {
        self.revision.clear();
        self.ctime.clear();
        self.mtime.clear();
        self.etime.clear();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Matching
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    #[default]
    Exact,
    Regex,
    NotEquals,
    In,
    NotIn,
    Range,
}

/// A string matcher, e.g. `{type: REGEX, value: "^/api/.*"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchString {
    #[serde(rename = "type")]
    pub match_type: MatchType,
    pub value: String,
}

impl MatchString {
    pub fn exact(value: impl Into<String>) -> Self {
        Self {
            match_type: MatchType::Exact,
            value: value.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArgumentType {
    #[default]
    Custom,
    Method,
    Header,
    Query,
    CallerService,
    CallerIp,
    Path,
    Cookie,
}

/// A request attribute matched by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchArgument {
    #[serde(rename = "type")]
    pub argument_type: ArgumentType,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key: String,
    pub value: MatchString,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Storage Record
// ═══════════════════════════════════════════════════════════════════════════════

/// Storage-facing form of a rule.
///
/// `payload` is the JSON policy body; it is empty on records listed in brief
/// mode, where only the denormalized columns are populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRecord {
    pub id: String,
    pub kind: RuleKind,
    pub name: String,
    pub namespace: String,
    pub description: String,
    pub level: String,
    pub priority: u32,
    pub enable: bool,
    pub revision: String,
    pub payload: String,
    pub src_service: String,
    pub src_namespace: String,
    pub dst_service: String,
    pub dst_namespace: String,
    pub dst_method: String,
    pub ctime: Option<DateTime<Utc>>,
    pub mtime: Option<DateTime<Utc>>,
    pub etime: Option<DateTime<Utc>>,
}

impl RuleRecord {
    pub fn new(kind: RuleKind) -> Self {
        Self {
            id: String::new(),
            kind,
            name: String::new(),
            namespace: String::new(),
            description: String::new(),
            level: String::new(),
            priority: 0,
            enable: false,
            revision: String::new(),
            payload: String::new(),
            src_service: String::new(),
            src_namespace: String::new(),
            dst_service: String::new(),
            dst_namespace: String::new(),
            dst_method: String::new(),
            ctime: None,
            mtime: None,
            etime: None,
        }
    }

    pub fn is_brief(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Fresh rule identifier.
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Fresh revision token.
pub fn new_revision() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format(TIME_FORMAT).to_string())
        .unwrap_or_default()
}
