//! # Mesh Governance Console Core
//!
//! Console-side management of service-mesh governance rules: circuit-breaker,
//! rate-limit and routing rules.
//!
//! ## Architecture
//!
//! ```text
//! caller ─▶ PermissionGate ─▶ RuleEngine ──▶ RuleStore
//!              │                  │  └──────▶ HistoryRecorder
//!              ▼                  ▼
//!          AuthChecker      ArchiveTransfer (ZIP/YAML export + import)
//! ```
//!
//! - **Permission gate**: checks every call with an external checker and
//!   short-circuits on denial
//! - **Rule engine**: per-item validation, uniqueness and existence checks,
//!   persistence and partial-failure aggregation
//! - **Archive transfer**: bulk export to ZIP archives and reconciling import
//! - **Console adapter**: axum routes over all of the above

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod model;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod validation;

pub use error::{ApiCode, GovernanceError, Result};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::auth::{AccessMode, AuthChecker, OwnershipRelaxation};
    pub use crate::config::{Config, LimitsConfig};
    pub use crate::context::RequestContext;
    pub use crate::error::{ApiCode, GovernanceError, Result};
    pub use crate::model::{
        CircuitBreakerRule, GovernanceRule, RateLimitRule, RoutingRule, RuleKind, RuleMeta,
        RulePolicy,
    };
    pub use crate::service::{
        ArchiveSource, BatchQueryResponse, BatchWriteResponse, ExportResponse, GovernanceServices,
        RuleEngine, RuleService,
    };
    pub use crate::store::{InMemoryRuleStore, RuleStore};
}
