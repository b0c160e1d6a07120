//! Reference policy checkers.
//!
//! `RoleTableChecker` answers "may the holder of token T perform mode M on
//! rule kind K?" from a static role table. `AllowAllChecker` approves every
//! call and is installed when console authorization is disabled.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{AccessMode, AuthChecker, AuthError, AuthorizationContext, Principal};
use crate::config::AuthConfig;

// ═══════════════════════════════════════════════════════════════════════════════
// Permission
// ═══════════════════════════════════════════════════════════════════════════════

/// `kind:mode` permission, e.g. `rate_limit:modify`.
///
/// A `*` on either side matches anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permission {
    pub resource: String,
    pub action: String,
}

impl Permission {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (resource, action) = s.split_once(':')?;
        if resource.is_empty() || action.is_empty() {
            return None;
        }
        Some(Self::new(resource, action))
    }

    pub fn matches(&self, other: &Permission) -> bool {
        let resource_match =
            self.resource == "*" || other.resource == "*" || self.resource == other.resource;
        let action_match =
            self.action == "*" || other.action == "*" || self.action == other.action;
        resource_match && action_match
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role Table Checker
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct TokenEntry {
    principal: String,
    roles: Vec<String>,
    disabled: bool,
}

/// Token and role table checker.
///
/// Thread-safe via `DashMap`.
#[derive(Debug, Clone, Default)]
pub struct RoleTableChecker {
    tokens: Arc<DashMap<String, TokenEntry>>,
    roles: Arc<DashMap<String, HashSet<Permission>>>,
}

impl RoleTableChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        let checker = Self::new();
        for role in &config.roles {
            let mut permissions = HashSet::new();
            for raw in &role.permissions {
                match Permission::parse(raw) {
                    Some(permission) => {
                        permissions.insert(permission);
                    }
                    None => warn!(role = %role.name, permission = %raw, "Ignoring malformed permission"),
                }
            }
            checker.add_role(&role.name, permissions);
        }
        for token in &config.tokens {
            checker.add_token(&token.token, &token.principal, token.roles.clone());
            if token.disabled {
                checker.disable_token(&token.token);
            }
        }
        checker
    }

    pub fn add_role(&self, name: &str, permissions: impl IntoIterator<Item = Permission>) {
        debug!(role = %name, "Adding role to checker");
        self.roles
            .insert(name.to_string(), permissions.into_iter().collect());
    }

    pub fn add_token(&self, token: &str, principal: &str, roles: Vec<String>) {
        self.tokens.insert(
            token.to_string(),
            TokenEntry {
                principal: principal.to_string(),
                roles,
                disabled: false,
            },
        );
    }

    /// Returns `false` if the token is unknown.
    pub fn disable_token(&self, token: &str) -> bool {
        match self.tokens.get_mut(token) {
            Some(mut entry) => {
                entry.disabled = true;
                true
            }
            None => false,
        }
    }

    fn has_permission(&self, roles: &[String], required: &Permission) -> bool {
        roles.iter().any(|role| {
            self.roles
                .get(role)
                .is_some_and(|perms| perms.iter().any(|p| p.matches(required)))
        })
    }
}

#[async_trait]
impl AuthChecker for RoleTableChecker {
    async fn check_console_permission(
        &self,
        auth: &mut AuthorizationContext,
    ) -> Result<Principal, AuthError> {
        let token = auth
            .request()
            .token()
            .ok_or(AuthError::TokenNotExisted)?
            .to_string();
        let entry = self
            .tokens
            .get(&token)
            .map(|e| e.clone())
            .ok_or(AuthError::TokenNotExisted)?;
        if entry.disabled {
            return Err(AuthError::TokenDisabled);
        }

        let required = permission_for(auth.operation().kind.as_str(), auth.mode());
        if !self.has_permission(&entry.roles, &required) {
            return Err(AuthError::Denied(format!(
                "{} does not have permission {} for {}",
                entry.principal,
                required,
                auth.method_name()
            )));
        }

        debug!(
            principal = %entry.principal,
            permission = %required,
            method = %auth.method_name(),
            "Permission granted"
        );

        // Stamp the operator so history entries carry the approved identity.
        let request = auth.request().clone().with_operator(entry.principal.clone());
        auth.set_request(request);

        let principal = Principal {
            name: entry.principal,
            roles: entry.roles,
        };
        auth.set_principal(principal.clone());
        Ok(principal)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Allow-All Checker
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllChecker;

#[async_trait]
impl AuthChecker for AllowAllChecker {
    async fn check_console_permission(
        &self,
        auth: &mut AuthorizationContext,
    ) -> Result<Principal, AuthError> {
        let principal = auth
            .request()
            .operator()
            .map(Principal::new)
            .unwrap_or_else(Principal::anonymous);
        auth.set_principal(principal.clone());
        Ok(principal)
    }
}

/// Checker matching the `auth` configuration section.
pub fn checker_from_config(config: &AuthConfig) -> Arc<dyn AuthChecker> {
    if config.enabled {
        Arc::new(RoleTableChecker::from_config(config))
    } else {
        Arc::new(AllowAllChecker)
    }
}

/// Permission string for a rule kind and mode.
pub fn permission_for(kind: &str, mode: AccessMode) -> Permission {
    Permission::new(kind, mode.as_str())
}
