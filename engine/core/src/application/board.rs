// Copyright (c) 2026 Caseflow Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Kanban Board Projection
//!
//! Read-side view bucketing every case into the display column of its
//! current step. Each case is re-synced before placement so the board never
//! shows stale derived state; a case whose sync loses a concurrent-write
//! race is retried once.
//!
//! Columns follow the step order of the program's latest template. Cases
//! locked to an older version whose column no longer exists land in a
//! trailing `Unmapped` column. Cards within a column are ordered
//! oldest-stuck-first to surface risk.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::application::workflow_engine::{EngineError, WorkflowEngine};
use crate::domain::workflow::{CaseId, StepKey, StepStatus};

/// Fallback column for cases whose locked display column is gone
const UNMAPPED_COLUMN: &str = "Unmapped";

/// One case card on the board
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseCard {
    pub case_id: CaseId,
    pub current_step: StepKey,
    pub days_in_stage: i64,
    pub block_reason: Option<String>,
    pub missing_documents: Vec<String>,
    pub next_required_actions: Vec<String>,
    pub sla_breach: bool,
    pub blocked: bool,
}

/// One display column with its cards, oldest-stuck-first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardColumn {
    pub name: String,
    pub cases: Vec<CaseCard>,
}

/// The full board, columns in template step order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KanbanBoard {
    pub columns: Vec<BoardColumn>,
}

impl KanbanBoard {
    pub fn total_cases(&self) -> usize {
        self.columns.iter().map(|c| c.cases.len()).sum()
    }
}

impl WorkflowEngine {
    /// Build the Kanban board over every known instance
    pub async fn board(&self) -> Result<KanbanBoard, EngineError> {
        let definition = self
            .templates()
            .find_latest(self.program_key())
            .await
            .map_err(EngineError::Repository)?
            .ok_or_else(|| EngineError::TemplateNotFound(self.program_key().to_string()))?;

        let column_order = definition.display_columns();
        let mut column_map: HashMap<String, Vec<CaseCard>> = HashMap::new();

        let instances = self
            .store()
            .list_instances()
            .await
            .map_err(EngineError::Repository)?;

        for instance in instances {
            let summary = match self.summary(instance.case_id).await {
                Ok(summary) => summary,
                Err(err) if err.is_retryable() => self.summary(instance.case_id).await?,
                Err(err) => {
                    // One case's failure must not take the whole board down.
                    warn!(case_id = %instance.case_id, error = %err, "Skipping case on board build");
                    continue;
                }
            };

            let current = summary
                .timeline
                .iter()
                .find(|entry| entry.step_key == summary.current_step);

            let (column, days_in_stage, block_reason, sla_breach, blocked) = match current {
                Some(entry) => {
                    let days = entry
                        .started_at
                        .map(|started| (chrono::Utc::now() - started).num_days().max(0))
                        .unwrap_or(0);
                    (
                        entry.display_column.clone(),
                        days,
                        entry.block_reason.clone(),
                        entry.sla_breach,
                        entry.status == StepStatus::Blocked,
                    )
                }
                None => (UNMAPPED_COLUMN.to_string(), 0, None, false, false),
            };

            let column = if column_order.contains(&column) {
                column
            } else {
                UNMAPPED_COLUMN.to_string()
            };

            column_map.entry(column).or_default().push(CaseCard {
                case_id: summary.case_id,
                current_step: summary.current_step.clone(),
                days_in_stage,
                block_reason,
                missing_documents: summary.missing_documents.clone(),
                next_required_actions: summary.next_required_actions.clone(),
                sla_breach,
                blocked,
            });
        }

        let mut columns: Vec<BoardColumn> = column_order
            .into_iter()
            .map(|name| {
                let mut cases = column_map.remove(&name).unwrap_or_default();
                cases.sort_by(|a, b| b.days_in_stage.cmp(&a.days_in_stage));
                BoardColumn { name, cases }
            })
            .collect();
        if let Some(mut unmapped) = column_map.remove(UNMAPPED_COLUMN) {
            unmapped.sort_by(|a, b| b.days_in_stage.cmp(&a.days_in_stage));
            columns.push(BoardColumn {
                name: UNMAPPED_COLUMN.to_string(),
                cases: unmapped,
            });
        }

        Ok(KanbanBoard { columns })
    }
}
