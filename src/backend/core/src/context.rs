//! Request-scoped context threaded through every console call.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::auth::AuthorizationContext;

/// Per-call context: trace id, caller identity, cancellation and deadline.
///
/// After a call passes the permission gate, the approved
/// [`AuthorizationContext`] is attached so downstream code can attribute
/// history entries to the operator.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    operator: Option<String>,
    token: Option<String>,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
    auth: Option<Arc<AuthorizationContext>>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            operator: None,
            token: None,
            cancellation: CancellationToken::new(),
            deadline: None,
            auth: None,
        }
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Attach an approved authorization context.
    pub fn with_auth(mut self, auth: Arc<AuthorizationContext>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Derived context whose cancellation follows this one.
    pub fn child(&self) -> Self {
        Self {
            cancellation: self.cancellation.child_token(),
            ..self.clone()
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn operator(&self) -> Option<&str> {
        self.operator.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn auth(&self) -> Option<&Arc<AuthorizationContext>> {
        self.auth.as_ref()
    }

    /// Operator name for history entries, falling back to the approved
    /// principal.
    pub fn actor(&self) -> String {
        self.operator
            .clone()
            .or_else(|| {
                self.auth
                    .as_ref()
                    .and_then(|auth| auth.principal())
                    .map(|principal| principal.name.clone())
            })
            .unwrap_or_default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}
