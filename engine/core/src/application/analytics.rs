// Copyright (c) 2026 Caseflow Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Portfolio Analytics Projection
//!
//! Aggregates dwell times, block reasons, SLA breaches, and override
//! patterns across all instances. Pure read-side: progress rows are read as
//! stored (every evidence write has already synced them), so this pass
//! writes nothing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::application::workflow_engine::{EngineError, WorkflowEngine};
use crate::domain::workflow::{StepKey, StepStatus, WorkflowStep};

/// Portfolio-wide workflow metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowAnalytics {
    pub case_count: usize,
    /// Average dwell days per step, over every row that ever started
    pub avg_days_per_stage: BTreeMap<String, f64>,
    pub blocked_case_count: usize,
    pub block_reason_frequency: BTreeMap<String, usize>,
    /// Open steps past their SLA (blocked or active)
    pub sla_breach_count: usize,
    /// Open steps past their SLA that are active (work is possible, just slow)
    pub time_risk_count: usize,
    /// Cases blocked specifically on the compliance window
    pub compliance_delay_count: usize,
    /// Days the case has dwelt in its current step, per case
    pub case_stage_duration_days: BTreeMap<String, i64>,
    pub default_sla_days: i64,
    pub override_count: usize,
    pub override_by_actor: BTreeMap<String, usize>,
    pub override_by_category: BTreeMap<String, usize>,
    pub override_by_case: BTreeMap<String, usize>,
}

impl WorkflowEngine {
    /// Aggregate portfolio metrics across all instances
    ///
    /// `default_sla_days` applies to progress rows whose step no longer
    /// exists in the latest template (older locked versions).
    pub async fn analytics(&self, default_sla_days: i64) -> Result<WorkflowAnalytics, EngineError> {
        let step_index: BTreeMap<StepKey, WorkflowStep> = self
            .templates()
            .find_latest(self.program_key())
            .await
            .map_err(EngineError::Repository)?
            .map(|definition| {
                definition
                    .steps()
                    .iter()
                    .map(|s| (s.step_key.clone(), s.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let instances = self
            .store()
            .list_instances()
            .await
            .map_err(EngineError::Repository)?;
        let now = chrono::Utc::now();

        let mut stage_durations: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        let mut blocked_case_count = 0;
        let mut block_reason_frequency: BTreeMap<String, usize> = BTreeMap::new();
        let mut sla_breach_count = 0;
        let mut time_risk_count = 0;
        let mut compliance_delay_count = 0;
        let mut case_stage_duration_days: BTreeMap<String, i64> = BTreeMap::new();

        for instance in &instances {
            let rows = self
                .store()
                .list_progress(instance.id)
                .await
                .map_err(EngineError::Repository)?;
            for row in rows {
                let Some(started) = row.started_at else {
                    continue;
                };
                let end = row.completed_at.unwrap_or(now);
                let duration = (end - started).num_days().max(0);
                stage_durations
                    .entry(row.step_key.as_str().to_string())
                    .or_default()
                    .push(duration);

                if row.status.is_open() && row.step_key == instance.current_step_key {
                    case_stage_duration_days.insert(instance.case_id.to_string(), duration);
                }

                let step_sla = step_index
                    .get(&row.step_key)
                    .map(|s| s.sla_days)
                    .unwrap_or(default_sla_days);
                if row.status.is_open() && duration > step_sla {
                    sla_breach_count += 1;
                    if row.status == StepStatus::Active {
                        time_risk_count += 1;
                    }
                }

                if row.status == StepStatus::Blocked {
                    blocked_case_count += 1;
                    let reason = row
                        .block_reason
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string());
                    if reason == "compliance_overdue" {
                        compliance_delay_count += 1;
                    }
                    *block_reason_frequency.entry(reason).or_insert(0) += 1;
                }
            }
        }

        let overrides = self
            .store()
            .list_overrides()
            .await
            .map_err(EngineError::Repository)?;
        let mut override_by_actor: BTreeMap<String, usize> = BTreeMap::new();
        let mut override_by_category: BTreeMap<String, usize> = BTreeMap::new();
        let mut override_by_case: BTreeMap<String, usize> = BTreeMap::new();
        for record in &overrides {
            *override_by_actor
                .entry(record.actor_id.to_string())
                .or_insert(0) += 1;
            *override_by_category
                .entry(record.reason_category.as_str().to_string())
                .or_insert(0) += 1;
            *override_by_case
                .entry(record.case_id.to_string())
                .or_insert(0) += 1;
        }

        let avg_days_per_stage = stage_durations
            .into_iter()
            .map(|(step, durations)| {
                let avg = if durations.is_empty() {
                    0.0
                } else {
                    durations.iter().sum::<i64>() as f64 / durations.len() as f64
                };
                (step, avg)
            })
            .collect();

        Ok(WorkflowAnalytics {
            case_count: instances.len(),
            avg_days_per_stage,
            blocked_case_count,
            block_reason_frequency,
            sla_breach_count,
            time_risk_count,
            compliance_delay_count,
            case_stage_duration_days,
            default_sla_days,
            override_count: overrides.len(),
            override_by_actor,
            override_by_category,
            override_by_case,
        })
    }
}
