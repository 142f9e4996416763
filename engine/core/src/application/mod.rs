// Copyright (c) 2026 Caseflow Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Application layer: the workflow engine service and its read-side
//! projections.

pub mod analytics;
pub mod board;
pub mod seed;
pub mod workflow_engine;

pub use analytics::WorkflowAnalytics;
pub use board::{BoardColumn, CaseCard, KanbanBoard};
pub use workflow_engine::{EngineError, TimelineEntry, WorkflowEngine, WorkflowSummary};
