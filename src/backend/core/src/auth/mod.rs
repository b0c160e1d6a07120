//! Console authorization.
//!
//! Every console operation is described by an [`Operation`] (verb + rule kind)
//! which carries its true [`AccessMode`]. The permission gate builds an
//! [`AuthorizationContext`] per call and hands it to an [`AuthChecker`]; the
//! policy evaluation itself lives behind that trait.

pub mod checker;
pub mod relaxation;

pub use checker::{checker_from_config, AllowAllChecker, Permission, RoleTableChecker};
pub use relaxation::OwnershipRelaxation;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::context::RequestContext;
use crate::error::{ApiCode, GovernanceError};
use crate::model::RuleKind;

// ═══════════════════════════════════════════════════════════════════════════════
// Access Modes and Operations
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    Read,
    Create,
    Modify,
    Delete,
}

impl AccessMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "read" => Some(Self::Read),
            "create" => Some(Self::Create),
            "modify" => Some(Self::Modify),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationVerb {
    Create,
    Update,
    Delete,
    Enable,
    Query,
    Export,
    Import,
}

impl OperationVerb {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Enable => "Enable",
            Self::Query => "Get",
            Self::Export => "Export",
            Self::Import => "Import",
        }
    }

    /// The mode the operation needs absent any relaxation.
    pub const fn access_mode(&self) -> AccessMode {
        match self {
            Self::Create | Self::Import => AccessMode::Create,
            Self::Update | Self::Enable => AccessMode::Modify,
            Self::Delete => AccessMode::Delete,
            Self::Query | Self::Export => AccessMode::Read,
        }
    }
}

/// One console operation on one rule kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operation {
    pub verb: OperationVerb,
    pub kind: RuleKind,
}

impl Operation {
    pub const fn new(verb: OperationVerb, kind: RuleKind) -> Self {
        Self { verb, kind }
    }

    /// Label such as `CreateCircuitBreakerRules`.
    pub fn method_name(&self) -> String {
        format!("{}{}", self.verb.as_str(), self.kind.plural_name())
    }

    pub const fn access_mode(&self) -> AccessMode {
        self.verb.access_mode()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.verb.as_str(), self.kind.plural_name())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authorization Context
// ═══════════════════════════════════════════════════════════════════════════════

/// A rule targeted by a write operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    pub kind: RuleKind,
    pub id: String,
    pub name: String,
    pub namespace: String,
}

/// The identity the checker approved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: Vec::new(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new("anonymous")
    }
}

/// Ephemeral per-call authorization input, never persisted.
#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    request: RequestContext,
    operation: Operation,
    requested_mode: AccessMode,
    mode: AccessMode,
    resources: Vec<ResourceEntry>,
    principal: Option<Principal>,
}

impl AuthorizationContext {
    /// The request context is derived so the checker may replace it without
    /// touching the caller's.
    pub fn new(
        request: &RequestContext,
        operation: Operation,
        mode: AccessMode,
        resources: Vec<ResourceEntry>,
    ) -> Self {
        Self {
            request: request.child(),
            operation,
            requested_mode: operation.access_mode(),
            mode,
            resources,
            principal: None,
        }
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn set_request(&mut self, request: RequestContext) {
        self.request = request;
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn method_name(&self) -> String {
        self.operation.method_name()
    }

    /// Mode the operation needs before any relaxation.
    pub fn requested_mode(&self) -> AccessMode {
        self.requested_mode
    }

    /// Mode the checker must evaluate.
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn resources(&self) -> &[ResourceEntry] {
        &self.resources
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn set_principal(&mut self, principal: Principal) {
        self.principal = Some(principal);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Checker Contract
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("access token is missing or unknown")]
    TokenNotExisted,

    #[error("access token is disabled")]
    TokenDisabled,

    #[error("{0}")]
    Denied(String),
}

impl AuthError {
    pub const fn api_code(&self) -> ApiCode {
        match self {
            Self::TokenNotExisted => ApiCode::TokenNotExisted,
            Self::TokenDisabled => ApiCode::TokenDisabled,
            Self::Denied(_) => ApiCode::NotAllowedAccess,
        }
    }
}

impl From<AuthError> for GovernanceError {
    fn from(error: AuthError) -> Self {
        GovernanceError::new(error.api_code(), error.to_string())
    }
}

/// External policy checker consulted for every console call.
#[async_trait]
pub trait AuthChecker: Send + Sync {
    /// Approve or deny the call. The checker may replace the request context
    /// held by `auth`; the gate forwards whatever it holds afterwards.
    async fn check_console_permission(
        &self,
        auth: &mut AuthorizationContext,
    ) -> Result<Principal, AuthError>;
}
