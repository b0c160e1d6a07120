//! Permission gate.
//!
//! Wraps any [`RuleService`] and checks every call with the configured
//! [`AuthChecker`] before forwarding it. A denied call returns a same-shaped
//! response carrying the checker's code and message and touches neither the
//! store nor the history sink.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::response::{BatchQueryResponse, BatchWriteResponse, ExportResponse, Rejection};
use super::transfer::ArchiveSource;
use super::RuleService;
use crate::auth::{
    AuthChecker, AuthorizationContext, Operation, OperationVerb, OwnershipRelaxation,
    ResourceEntry,
};
use crate::context::RequestContext;
use crate::error::{GovernanceError, Result};
use crate::model::{GovernanceRule, RulePolicy};

pub struct PermissionGate<P: RulePolicy> {
    inner: Arc<dyn RuleService<P>>,
    checker: Arc<dyn AuthChecker>,
    relaxation: Arc<OwnershipRelaxation>,
}

impl<P: RulePolicy> PermissionGate<P> {
    pub fn new(
        inner: Arc<dyn RuleService<P>>,
        checker: Arc<dyn AuthChecker>,
        relaxation: Arc<OwnershipRelaxation>,
    ) -> Self {
        Self {
            inner,
            checker,
            relaxation,
        }
    }

    /// Check the call and return the context to forward.
    ///
    /// The forwarded context is whatever request context the authorization
    /// context holds after the check, with the approved authorization
    /// context attached.
    async fn authorize(
        &self,
        ctx: &RequestContext,
        verb: OperationVerb,
        resources: Vec<ResourceEntry>,
    ) -> Result<RequestContext> {
        let operation = Operation::new(verb, P::KIND);
        let mode = self.relaxation.effective_mode(operation);
        let mut auth = AuthorizationContext::new(ctx, operation, mode, resources);

        match self.checker.check_console_permission(&mut auth).await {
            Ok(principal) => {
                debug!(
                    request_id = %ctx.request_id(),
                    method = %operation,
                    mode = %mode,
                    principal = %principal.name,
                    "Console call approved"
                );
                auth.set_principal(principal);
                let forwarded = auth.request().clone();
                Ok(forwarded.with_auth(Arc::new(auth)))
            }
            Err(denied) => {
                let err = GovernanceError::from(denied);
                err.log(ctx.request_id());
                Err(err)
            }
        }
    }

    fn resources(rules: &[GovernanceRule<P>]) -> Vec<ResourceEntry> {
        rules
            .iter()
            .map(|rule| ResourceEntry {
                kind: P::KIND,
                id: rule.meta.id.clone(),
                name: rule.meta.name.clone(),
                namespace: rule.meta.effective_namespace().to_string(),
            })
            .collect()
    }
}

#[async_trait]
impl<P: RulePolicy> RuleService<P> for PermissionGate<P> {
    async fn create_rules(
        &self,
        ctx: &RequestContext,
        rules: Vec<GovernanceRule<P>>,
    ) -> BatchWriteResponse<P> {
        let resources = Self::resources(&rules);
        match self.authorize(ctx, OperationVerb::Create, resources).await {
            Ok(ctx) => self.inner.create_rules(&ctx, rules).await,
            Err(err) => BatchWriteResponse::rejected(err),
        }
    }

    async fn update_rules(
        &self,
        ctx: &RequestContext,
        rules: Vec<GovernanceRule<P>>,
    ) -> BatchWriteResponse<P> {
        let resources = Self::resources(&rules);
        match self.authorize(ctx, OperationVerb::Update, resources).await {
            Ok(ctx) => self.inner.update_rules(&ctx, rules).await,
            Err(err) => BatchWriteResponse::rejected(err),
        }
    }

    async fn delete_rules(
        &self,
        ctx: &RequestContext,
        rules: Vec<GovernanceRule<P>>,
    ) -> BatchWriteResponse<P> {
        let resources = Self::resources(&rules);
        match self.authorize(ctx, OperationVerb::Delete, resources).await {
            Ok(ctx) => self.inner.delete_rules(&ctx, rules).await,
            Err(err) => BatchWriteResponse::rejected(err),
        }
    }

    async fn enable_rules(
        &self,
        ctx: &RequestContext,
        rules: Vec<GovernanceRule<P>>,
    ) -> BatchWriteResponse<P> {
        let resources = Self::resources(&rules);
        match self.authorize(ctx, OperationVerb::Enable, resources).await {
            Ok(ctx) => self.inner.enable_rules(&ctx, rules).await,
            Err(err) => BatchWriteResponse::rejected(err),
        }
    }

    async fn query_rules(
        &self,
        ctx: &RequestContext,
        params: &HashMap<String, String>,
    ) -> BatchQueryResponse<P> {
        match self.authorize(ctx, OperationVerb::Query, Vec::new()).await {
            Ok(ctx) => self.inner.query_rules(&ctx, params).await,
            Err(err) => BatchQueryResponse::rejected(err),
        }
    }

    async fn export_rules(
        &self,
        ctx: &RequestContext,
        params: &HashMap<String, String>,
    ) -> ExportResponse {
        match self.authorize(ctx, OperationVerb::Export, Vec::new()).await {
            Ok(ctx) => self.inner.export_rules(&ctx, params).await,
            Err(err) => ExportResponse::rejected_for(P::KIND, err),
        }
    }

    async fn import_rules(
        &self,
        ctx: &RequestContext,
        sources: Vec<ArchiveSource>,
    ) -> BatchWriteResponse<P> {
        match self.authorize(ctx, OperationVerb::Import, Vec::new()).await {
            Ok(ctx) => self.inner.import_rules(&ctx, sources).await,
            Err(err) => BatchWriteResponse::rejected(err),
        }
    }
}
