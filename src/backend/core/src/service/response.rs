//! Console response shapes.
//!
//! Every response carries a business code and message. Batch writes carry one
//! item response per input item, in input order; the overall code is success
//! only if every item succeeded, otherwise the code of the first failing item.

use serde::{Serialize, Serializer};

use crate::error::{ApiCode, GovernanceError};
use crate::model::{GovernanceRule, RuleKind, RulePolicy};

fn numeric_code<S: Serializer>(code: &ApiCode, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u32(code.numeric_code())
}

/// Builds a same-shaped response for a call rejected before any work.
pub trait Rejection {
    fn rejected(error: GovernanceError) -> Self;

    fn code(&self) -> ApiCode;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Batch Write
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of one item of a batch write.
#[derive(Debug, Clone, Serialize)]
#[serde(bound = "P: RulePolicy")]
pub struct ItemResponse<P: RulePolicy> {
    #[serde(serialize_with = "numeric_code")]
    pub code: ApiCode,
    pub info: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<GovernanceRule<P>>,
}

impl<P: RulePolicy> ItemResponse<P> {
    /// Full echo of a created rule.
    pub fn created(rule: GovernanceRule<P>) -> Self {
        Self {
            code: ApiCode::ExecuteSuccess,
            info: ApiCode::ExecuteSuccess.default_message().to_string(),
            id: rule.meta.id.clone(),
            rule: Some(rule),
        }
    }

    /// Id-only echo.
    pub fn success(id: impl Into<String>) -> Self {
        Self {
            code: ApiCode::ExecuteSuccess,
            info: ApiCode::ExecuteSuccess.default_message().to_string(),
            id: id.into(),
            rule: None,
        }
    }

    pub fn failed(error: &GovernanceError, id: impl Into<String>) -> Self {
        Self {
            code: error.code(),
            info: error.message().to_string(),
            id: id.into(),
            rule: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(bound = "P: RulePolicy")]
pub struct BatchWriteResponse<P: RulePolicy> {
    #[serde(serialize_with = "numeric_code")]
    pub code: ApiCode,
    pub info: String,
    pub size: usize,
    pub responses: Vec<ItemResponse<P>>,
}

impl<P: RulePolicy> BatchWriteResponse<P> {
    /// Aggregate item outcomes.
    pub fn collect(responses: Vec<ItemResponse<P>>) -> Self {
        let (code, info) = match responses.iter().find(|r| !r.is_success()) {
            Some(failed) => (failed.code, failed.info.clone()),
            None => (
                ApiCode::ExecuteSuccess,
                ApiCode::ExecuteSuccess.default_message().to_string(),
            ),
        };
        Self {
            code,
            info,
            size: responses.len(),
            responses,
        }
    }

    /// Append another batch's items after this one's and re-aggregate.
    pub fn merge(self, other: Self) -> Self {
        let mut responses = self.responses;
        responses.extend(other.responses);
        Self::collect(responses)
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }

    pub fn failed_count(&self) -> usize {
        self.responses.iter().filter(|r| !r.is_success()).count()
    }
}

impl<P: RulePolicy> Rejection for BatchWriteResponse<P> {
    fn rejected(error: GovernanceError) -> Self {
        Self {
            code: error.code(),
            info: error.message().to_string(),
            size: 0,
            responses: Vec::new(),
        }
    }

    fn code(&self) -> ApiCode {
        self.code
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Query
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
#[serde(bound = "P: RulePolicy")]
pub struct BatchQueryResponse<P: RulePolicy> {
    #[serde(serialize_with = "numeric_code")]
    pub code: ApiCode,
    pub info: String,
    pub kind: RuleKind,
    /// Total matches in storage
    pub amount: usize,
    /// Items in this page
    pub size: usize,
    pub data: Vec<GovernanceRule<P>>,
}

impl<P: RulePolicy> BatchQueryResponse<P> {
    pub fn success(amount: usize, data: Vec<GovernanceRule<P>>) -> Self {
        Self {
            code: ApiCode::ExecuteSuccess,
            info: ApiCode::ExecuteSuccess.default_message().to_string(),
            kind: P::KIND,
            amount,
            size: data.len(),
            data,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

impl<P: RulePolicy> Rejection for BatchQueryResponse<P> {
    fn rejected(error: GovernanceError) -> Self {
        Self {
            code: error.code(),
            info: error.message().to_string(),
            kind: P::KIND,
            amount: 0,
            size: 0,
            data: Vec::new(),
        }
    }

    fn code(&self) -> ApiCode {
        self.code
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Export
// ═══════════════════════════════════════════════════════════════════════════════

/// Export outcome. The archive bytes are not part of the JSON form; the
/// console adapter streams them as the response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    #[serde(serialize_with = "numeric_code")]
    pub code: ApiCode,
    pub info: String,
    pub kind: RuleKind,
    pub entries: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file_name: String,
    #[serde(skip)]
    pub archive: Vec<u8>,
}

impl ExportResponse {
    pub fn success(kind: RuleKind, entries: usize, archive: Vec<u8>) -> Self {
        Self {
            code: ApiCode::ExecuteSuccess,
            info: ApiCode::ExecuteSuccess.default_message().to_string(),
            kind,
            entries,
            file_name: format!("{}_rules.zip", kind.as_str()),
            archive,
        }
    }

    /// Rejected export for `kind`.
    pub fn rejected_for(kind: RuleKind, error: GovernanceError) -> Self {
        Self {
            code: error.code(),
            info: error.message().to_string(),
            kind,
            entries: 0,
            file_name: String::new(),
            archive: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}
