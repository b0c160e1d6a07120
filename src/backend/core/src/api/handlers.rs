//! Console request handlers.
//!
//! Business outcomes always travel in the response body with HTTP 200; only
//! authorization failures change the transport status (see
//! [`ApiCode::transport_status`]).

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::context::RequestContext;
use crate::error::{ApiCode, GovernanceError};
use crate::model::{GovernanceRule, RulePolicy};
use crate::service::{
    ArchiveSource, BatchQueryResponse, BatchWriteResponse, ExportResponse, Rejection, RuleService,
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";
pub const OPERATOR_HEADER: &str = "x-operator";

/// Per-kind handler state.
pub struct RuleRoutes<P: RulePolicy> {
    pub service: Arc<dyn RuleService<P>>,
    pub request_timeout: Duration,
}

impl<P: RulePolicy> Clone for RuleRoutes<P> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Health Check
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Request Context
// ═══════════════════════════════════════════════════════════════════════════════

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Build the request context from console headers.
pub fn request_context(headers: &HeaderMap, timeout: Duration) -> RequestContext {
    let mut ctx = match header_str(headers, REQUEST_ID_HEADER) {
        Some(id) => RequestContext::new(id),
        None => RequestContext::default(),
    }
    .with_timeout(timeout);

    let token = header_str(headers, ACCESS_TOKEN_HEADER).or_else(|| {
        header_str(headers, header::AUTHORIZATION.as_str())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
    });
    if let Some(token) = token {
        ctx = ctx.with_token(token);
    }
    if let Some(operator) = header_str(headers, OPERATOR_HEADER) {
        ctx = ctx.with_operator(operator);
    }
    ctx
}

fn write_response<P: RulePolicy>(response: BatchWriteResponse<P>) -> Response {
    (response.code.transport_status(), Json(response)).into_response()
}

fn parse_rules<P: RulePolicy>(
    ctx: &RequestContext,
    body: &[u8],
) -> Result<Vec<GovernanceRule<P>>, Response> {
    serde_json::from_slice(body).map_err(|e| {
        let err = GovernanceError::from(e);
        err.log(ctx.request_id());
        write_response(BatchWriteResponse::<P>::rejected(err))
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Batch Writes
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn create_rules<P: RulePolicy>(
    State(state): State<RuleRoutes<P>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ctx = request_context(&headers, state.request_timeout);
    match parse_rules::<P>(&ctx, &body) {
        Ok(rules) => write_response(state.service.create_rules(&ctx, rules).await),
        Err(rejection) => rejection,
    }
}

pub async fn update_rules<P: RulePolicy>(
    State(state): State<RuleRoutes<P>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ctx = request_context(&headers, state.request_timeout);
    match parse_rules::<P>(&ctx, &body) {
        Ok(rules) => write_response(state.service.update_rules(&ctx, rules).await),
        Err(rejection) => rejection,
    }
}

pub async fn delete_rules<P: RulePolicy>(
    State(state): State<RuleRoutes<P>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ctx = request_context(&headers, state.request_timeout);
    match parse_rules::<P>(&ctx, &body) {
        Ok(rules) => write_response(state.service.delete_rules(&ctx, rules).await),
        Err(rejection) => rejection,
    }
}

pub async fn enable_rules<P: RulePolicy>(
    State(state): State<RuleRoutes<P>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ctx = request_context(&headers, state.request_timeout);
    match parse_rules::<P>(&ctx, &body) {
        Ok(rules) => write_response(state.service.enable_rules(&ctx, rules).await),
        Err(rejection) => rejection,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Query and Export
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn query_rules<P: RulePolicy>(
    State(state): State<RuleRoutes<P>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let ctx = request_context(&headers, state.request_timeout);
    let response: BatchQueryResponse<P> = state.service.query_rules(&ctx, &params).await;
    (response.code.transport_status(), Json(response)).into_response()
}

pub async fn export_rules<P: RulePolicy>(
    State(state): State<RuleRoutes<P>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let ctx = request_context(&headers, state.request_timeout);
    let mut response: ExportResponse = state.service.export_rules(&ctx, &params).await;
    if !response.is_success() {
        return (response.code.transport_status(), Json(response)).into_response();
    }

    let disposition = format!("attachment; filename=\"{}\"", response.file_name);
    let disposition = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    let archive = std::mem::take(&mut response.archive);
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive,
    )
        .into_response()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Import
// ═══════════════════════════════════════════════════════════════════════════════

/// One archive of a JSON upload.
#[derive(Debug, Deserialize, Serialize)]
pub struct UploadedArchive {
    pub name: String,
    /// Base64-encoded ZIP bytes
    pub content: String,
}

fn is_json(headers: &HeaderMap) -> bool {
    header_str(headers, header::CONTENT_TYPE.as_str())
        .is_some_and(|v| v.starts_with("application/json"))
}

/// Decode a JSON upload; archives whose content is not valid base64 are
/// skipped like any other unreadable archive.
fn decode_uploads(ctx: &RequestContext, uploads: Vec<UploadedArchive>) -> Vec<ArchiveSource> {
    uploads
        .into_iter()
        .filter_map(|upload| match STANDARD.decode(upload.content.trim()) {
            Ok(bytes) => Some(ArchiveSource::new(upload.name, bytes)),
            Err(err) => {
                warn!(
                    request_id = %ctx.request_id(),
                    archive = %upload.name,
                    error = %err,
                    "Skipping archive with undecodable content"
                );
                None
            }
        })
        .collect()
}

pub async fn import_rules<P: RulePolicy>(
    State(state): State<RuleRoutes<P>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ctx = request_context(&headers, state.request_timeout);

    let sources = if is_json(&headers) {
        match serde_json::from_slice::<Vec<UploadedArchive>>(&body) {
            Ok(uploads) => decode_uploads(&ctx, uploads),
            Err(e) => {
                let err = GovernanceError::from(e);
                err.log(ctx.request_id());
                return write_response(BatchWriteResponse::<P>::rejected(err));
            }
        }
    } else if body.is_empty() {
        Vec::new()
    } else {
        vec![ArchiveSource::new("upload.zip", body.to_vec())]
    };

    if sources.is_empty() {
        let err = GovernanceError::new(ApiCode::EmptyRequest, "no archive uploaded");
        err.log(ctx.request_id());
        return write_response(BatchWriteResponse::<P>::rejected(err));
    }

    write_response(state.service.import_rules(&ctx, sources).await)
}
