//! Archive export and import.
//!
//! An archive is a ZIP file holding one YAML document per rule. Export keeps
//! the rule id, which import uses to decide between create and update, so
//! re-importing an export never duplicates a rule.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Write};
use tracing::{info, instrument, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::engine::RuleEngine;
use super::response::{BatchWriteResponse, ExportResponse, ItemResponse, Rejection};
use crate::context::RequestContext;
use crate::error::{ApiCode, GovernanceError, Result};
use crate::model::{GovernanceRule, RulePolicy};

/// One uploaded archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSource {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ArchiveSource {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Export/import on top of a rule engine.
pub struct ArchiveTransfer<'a, P: RulePolicy> {
    engine: &'a RuleEngine<P>,
}

impl<'a, P: RulePolicy> ArchiveTransfer<'a, P> {
    pub fn new(engine: &'a RuleEngine<P>) -> Self {
        Self { engine }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Export
    // ─────────────────────────────────────────────────────────────────────────

    #[instrument(skip(self, ctx, params), fields(kind = %P::KIND, request_id = %ctx.request_id()))]
    pub async fn export(
        &self,
        ctx: &RequestContext,
        params: &HashMap<String, String>,
    ) -> ExportResponse {
        let rules = match self.collect_rules(ctx, params).await {
            Ok(rules) => rules,
            Err(err) => {
                err.log(ctx.request_id());
                return ExportResponse::rejected_for(P::KIND, err);
            }
        };

        if rules.is_empty() {
            let err = GovernanceError::new(
                ApiCode::NotFoundResource,
                format!("no {} rules matched the export filter", P::KIND),
            );
            err.log(ctx.request_id());
            return ExportResponse::rejected_for(P::KIND, err);
        }

        match build_archive(&rules) {
            Ok(archive) => {
                info!(
                    request_id = %ctx.request_id(),
                    entries = rules.len(),
                    bytes = archive.len(),
                    "Exported {} rules", P::KIND
                );
                ExportResponse::success(P::KIND, rules.len(), archive)
            }
            Err(err) => {
                let err = GovernanceError::new(
                    ApiCode::ExecuteException,
                    format!("failed to package archive: {}", err.message()),
                );
                err.log(ctx.request_id());
                ExportResponse::rejected_for(P::KIND, err)
            }
        }
    }

    /// Run the export query. Without explicit paging every page is fetched.
    async fn collect_rules(
        &self,
        ctx: &RequestContext,
        params: &HashMap<String, String>,
    ) -> Result<Vec<GovernanceRule<P>>> {
        let mut params = params.clone();
        // Payloads must survive the trip.
        params.remove("brief");

        if params.contains_key("offset") || params.contains_key("limit") {
            let page = self.engine.query(ctx, &params).await;
            if !page.is_success() {
                return Err(GovernanceError::new(page.code, page.info));
            }
            return Ok(page.data);
        }

        let page_size = self.engine.limits().query_max_limit.max(1);
        let mut offset = 0;
        let mut rules = Vec::new();
        loop {
            params.insert("offset".to_string(), offset.to_string());
            params.insert("limit".to_string(), page_size.to_string());
            let page = self.engine.query(ctx, &params).await;
            if !page.is_success() {
                return Err(GovernanceError::new(page.code, page.info));
            }
            let fetched = page.data.len();
            rules.extend(page.data);
            offset += page_size;
            if fetched == 0 || offset >= page.amount {
                break;
            }
        }
        Ok(rules)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Import
    // ─────────────────────────────────────────────────────────────────────────

    /// Create archived rules that are not stored yet and update the ones that are.
    ///
    /// Responses are not in archive order: creates come first, then updates,
    /// then rules whose existence check failed.
    #[instrument(skip(self, ctx, sources), fields(kind = %P::KIND, request_id = %ctx.request_id(), archives = sources.len()))]
    pub async fn import(
        &self,
        ctx: &RequestContext,
        sources: &[ArchiveSource],
    ) -> BatchWriteResponse<P> {
        let mut rules = Vec::new();
        for source in sources {
            match read_archive::<P>(ctx, source) {
                Ok(entries) => rules.extend(entries),
                Err(err) => warn!(
                    request_id = %ctx.request_id(),
                    archive = %source.name,
                    error = %err,
                    "Skipping unreadable archive"
                ),
            }
        }

        if rules.is_empty() {
            let err = GovernanceError::new(
                ApiCode::EmptyRequest,
                "no importable rule found in the uploaded archives",
            );
            err.log(ctx.request_id());
            return BatchWriteResponse::rejected(err);
        }

        let mut news = Vec::new();
        let mut exists = Vec::new();
        let mut probe_failures = Vec::new();
        for rule in rules {
            if rule.meta.id.is_empty() {
                news.push(rule);
                continue;
            }
            let probe = HashMap::from([("id".to_string(), rule.meta.id.clone())]);
            let found = self.engine.query(ctx, &probe).await;
            if !found.is_success() {
                let err = GovernanceError::new(found.code, found.info);
                probe_failures.push(ItemResponse::failed(&err, rule.meta.id.clone()));
            } else if found.amount == 0 {
                news.push(rule);
            } else {
                exists.push(rule);
            }
        }

        info!(
            request_id = %ctx.request_id(),
            new = news.len(),
            existing = exists.len(),
            "Reconciled imported {} rules", P::KIND
        );

        let chunk_size = self.engine.limits().max_batch_size.max(1);
        let mut merged = BatchWriteResponse::collect(Vec::new());
        for chunk in news.chunks(chunk_size) {
            merged = merged.merge(self.engine.create_batch(ctx, chunk.to_vec()).await);
        }
        for chunk in exists.chunks(chunk_size) {
            merged = merged.merge(self.engine.update_batch(ctx, chunk.to_vec()).await);
        }
        merged.merge(BatchWriteResponse::collect(probe_failures))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Archive Codec
// ═══════════════════════════════════════════════════════════════════════════════

fn sanitize(value: &str) -> String {
    value.replace(|c: char| c == '/' || c == '\\', "_")
}

/// Deterministic entry name; falls back to namespace then id on collision.
fn entry_name<P: RulePolicy>(rule: &GovernanceRule<P>, used: &mut HashSet<String>) -> String {
    let base = sanitize(&rule.meta.name);
    let candidates = [
        format!("{}.yaml", base),
        format!("{}_{}.yaml", base, sanitize(&rule.meta.namespace)),
        format!("{}_{}.yaml", base, sanitize(&rule.meta.id)),
    ];
    let mut name = candidates
        .iter()
        .find(|candidate| !used.contains(*candidate))
        .cloned()
        .unwrap_or_else(|| format!("{}_{}_{}.yaml", base, sanitize(&rule.meta.id), used.len()));
    while used.contains(&name) {
        name = format!("{}_{}.yaml", base, used.len());
    }
    used.insert(name.clone());
    name
}

pub fn build_archive<P: RulePolicy>(rules: &[GovernanceRule<P>]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut used = HashSet::new();

    for rule in rules {
        let mut document = rule.clone();
        document.meta.strip_derived();
        let yaml = serde_yaml::to_string(&document)?;

        writer.start_file(entry_name(rule, &mut used), options)?;
        writer.write_all(yaml.as_bytes())?;
    }

    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}

/// Decode every readable entry; unreadable or malformed entries are logged and
/// skipped. Fails only when the archive itself cannot be opened.
pub fn read_archive<P: RulePolicy>(
    ctx: &RequestContext,
    source: &ArchiveSource,
) -> Result<Vec<GovernanceRule<P>>> {
    let mut archive = ZipArchive::new(Cursor::new(source.bytes.as_slice()))?;
    let mut rules = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let mut file = match archive.by_index(index) {
            Ok(file) => file,
            Err(err) => {
                warn!(
                    request_id = %ctx.request_id(),
                    archive = %source.name,
                    index,
                    error = %err,
                    "Skipping unreadable archive entry"
                );
                continue;
            }
        };
        if file.is_dir() {
            continue;
        }

        let entry = file.name().to_string();
        let mut content = String::new();
        if let Err(err) = file.read_to_string(&mut content) {
            warn!(
                request_id = %ctx.request_id(),
                archive = %source.name,
                entry = %entry,
                error = %err,
                "Skipping unreadable archive entry"
            );
            continue;
        }

        match serde_yaml::from_str::<GovernanceRule<P>>(&content) {
            Ok(mut rule) => {
                rule.meta.strip_derived();
                rules.push(rule);
            }
            Err(err) => warn!(
                request_id = %ctx.request_id(),
                archive = %source.name,
                entry = %entry,
                error = %err,
                "Skipping malformed rule document"
            ),
        }
    }

    Ok(rules)
}
