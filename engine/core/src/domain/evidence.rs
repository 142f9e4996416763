// Copyright (c) 2026 Caseflow Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Evidence Model and Blocking-Condition Registry
//!
//! Evidence is the only writable fact in the system: recorded action tags
//! (audit events) and uploaded document types, both append-only and owned by
//! external collaborators. The engine reads evidence through the
//! [`EvidenceSource`] port and never writes it.
//!
//! Blocking conditions are named pure predicates over the evidence set,
//! registered in a [`ConditionRegistry`] so that new conditions can be added
//! without touching the step-walk logic.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::warn;

use crate::domain::repository::RepositoryError;
use crate::domain::workflow::CaseId;

/// Snapshot of a case's durably committed evidence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceSet {
    /// Distinct recorded action tags for the case
    pub actions: BTreeSet<String>,
    /// Distinct uploaded document types for the case
    pub documents: BTreeSet<String>,
}

impl EvidenceSet {
    pub fn new(actions: BTreeSet<String>, documents: BTreeSet<String>) -> Self {
        Self { actions, documents }
    }

    pub fn has_action(&self, tag: &str) -> bool {
        self.actions.contains(tag)
    }

    pub fn has_document(&self, doc_type: &str) -> bool {
        self.documents.contains(doc_type)
    }
}

/// Read-only port over the external evidence collections
///
/// Implementations must reflect only durably committed, immutable records.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    /// Distinct recorded action tags for the case
    async fn list_action_tags(&self, case_id: CaseId) -> Result<BTreeSet<String>, RepositoryError>;

    /// Distinct uploaded document types for the case
    async fn list_document_types(
        &self,
        case_id: CaseId,
    ) -> Result<BTreeSet<String>, RepositoryError>;

    /// Convenience: both evidence sets as one snapshot
    async fn evidence_for(&self, case_id: CaseId) -> Result<EvidenceSet, RepositoryError> {
        let actions = self.list_action_tags(case_id).await?;
        let documents = self.list_document_types(case_id).await?;
        Ok(EvidenceSet::new(actions, documents))
    }
}

/// A named blocking predicate: returns the block reason when it fires
pub type ConditionFn = dyn Fn(&EvidenceSet) -> Option<String> + Send + Sync;

/// Registry mapping condition tag → pure predicate over the evidence set
///
/// Unknown tags never fire; they are logged once per evaluation at warn
/// level so template typos surface in operations instead of silently
/// blocking nothing.
#[derive(Clone)]
pub struct ConditionRegistry {
    conditions: HashMap<String, Arc<ConditionFn>>,
}

impl ConditionRegistry {
    pub fn empty() -> Self {
        Self {
            conditions: HashMap::new(),
        }
    }

    /// Registry with the conditions the shipped templates reference
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("requires_valid_contact_channel", |evidence| {
            if evidence.has_action("valid_contact_channel_verified") {
                None
            } else {
                Some("missing_contact_channel".to_string())
            }
        });
        registry.register("compliance_overdue", |evidence| {
            if evidence.has_action("compliance_current") {
                None
            } else {
                Some("compliance_overdue".to_string())
            }
        });
        registry
    }

    pub fn register<F>(&mut self, tag: impl Into<String>, predicate: F)
    where
        F: Fn(&EvidenceSet) -> Option<String> + Send + Sync + 'static,
    {
        self.conditions.insert(tag.into(), Arc::new(predicate));
    }

    /// Evaluate an ordered condition list; first firing condition wins
    pub fn evaluate(&self, tags: &[String], evidence: &EvidenceSet) -> Option<String> {
        for tag in tags {
            match self.conditions.get(tag) {
                Some(predicate) => {
                    if let Some(reason) = predicate(evidence) {
                        return Some(reason);
                    }
                }
                None => {
                    warn!(condition = %tag, "Unknown blocking condition tag, skipping");
                }
            }
        }
        None
    }
}

impl Default for ConditionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
