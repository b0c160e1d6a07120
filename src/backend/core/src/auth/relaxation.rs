//! Ownership relaxation.
//!
//! Rule kinds without a fine-grained ownership model cannot be authorized per
//! resource yet, so their mutating operations are checked under read access.
//! The set of relaxed kinds is explicit and configurable; every relaxed check
//! is logged.

use std::collections::HashSet;
use tracing::debug;

use super::{AccessMode, Operation};
use crate::model::RuleKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipRelaxation {
    kinds: HashSet<RuleKind>,
}

impl Default for OwnershipRelaxation {
    fn default() -> Self {
        Self::from_kinds([RuleKind::CircuitBreaker, RuleKind::Routing])
    }
}

impl OwnershipRelaxation {
    /// No kind is relaxed; every operation is checked under its true mode.
    pub fn none() -> Self {
        Self {
            kinds: HashSet::new(),
        }
    }

    pub fn from_kinds(kinds: impl IntoIterator<Item = RuleKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    pub fn is_relaxed(&self, kind: RuleKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Mode the checker evaluates for `operation`.
    pub fn effective_mode(&self, operation: Operation) -> AccessMode {
        let requested = operation.access_mode();
        if requested == AccessMode::Read || !self.is_relaxed(operation.kind) {
            return requested;
        }

        debug!(
            method = %operation,
            requested_mode = %requested,
            effective_mode = %AccessMode::Read,
            "relaxed authorization: kind has no ownership model"
        );
        AccessMode::Read
    }
}
