//! Operation history.
//!
//! Every successful rule mutation appends one entry. Recording is
//! fire-and-forget: a slow or broken sink never fails the operation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::model::RuleKind;
use crate::telemetry::AUDIT_TARGET;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Create,
    Update,
    Delete,
    UpdateEnable,
}

impl OperationType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::UpdateEnable => "UPDATE_ENABLE",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One history entry.
#[derive(Debug, Clone, Serialize)]
pub struct RecordEntry {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub kind: RuleKind,
    pub operation: OperationType,
    pub rule_id: String,
    pub rule_name: String,
    pub namespace: String,
    pub operator: String,
}

/// Append-only history sink.
pub trait HistoryRecorder: Send + Sync {
    fn record(&self, entry: RecordEntry);
}

/// Sink that forwards entries over a bounded channel to a drain task logging
/// them on the `audit` target.
#[derive(Debug, Clone)]
pub struct ChannelHistoryRecorder {
    sender: mpsc::Sender<RecordEntry>,
}

impl ChannelHistoryRecorder {
    /// Spawns the drain task; must be called inside a tokio runtime.
    pub fn new(buffer: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<RecordEntry>(buffer.max(1));
        tokio::spawn(async move {
            while let Some(e) = rx.recv().await {
                info!(
                    target: AUDIT_TARGET,
                    request_id = %e.request_id,
                    kind = %e.kind,
                    operation = %e.operation,
                    rule_id = %e.rule_id,
                    rule_name = %e.rule_name,
                    namespace = %e.namespace,
                    operator = %e.operator,
                    "HISTORY"
                );
            }
        });
        Self { sender: tx }
    }
}

impl HistoryRecorder for ChannelHistoryRecorder {
    fn record(&self, entry: RecordEntry) {
        if let Err(e) = self.sender.try_send(entry) {
            let reason = match &e {
                mpsc::error::TrySendError::Full(_) => "channel full",
                mpsc::error::TrySendError::Closed(_) => "channel closed",
            };
            let entry = e.into_inner();
            warn!(
                reason,
                rule_id = %entry.rule_id,
                operation = %entry.operation,
                "Dropping history entry"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> RecordEntry {
        RecordEntry {
            timestamp: Utc::now(),
            request_id: "req".to_string(),
            kind: RuleKind::RateLimit,
            operation: OperationType::UpdateEnable,
            rule_id: id.to_string(),
            rule_name: "r".to_string(),
            namespace: "default".to_string(),
            operator: "ops".to_string(),
        }
    }

    #[tokio::test]
    async fn test_record_never_blocks() {
        let recorder = ChannelHistoryRecorder::new(1);
        for i in 0..10 {
            recorder.record(entry(&i.to_string()));
        }
    }

    #[test]
    fn test_operation_serialization() {
        let json = serde_json::to_value(entry("a")).unwrap();
        assert_eq!(json["operation"], "UPDATE_ENABLE");
        assert_eq!(json["kind"], "rate_limit");
    }
}
