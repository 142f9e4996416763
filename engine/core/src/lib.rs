// Copyright (c) 2026 Caseflow Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Caseflow Core
//!
//! Workflow state-machine engine for the Caseflow case-management backend.
//! Case progress is derived by replaying recorded evidence against versioned
//! step templates; the only mutation paths are `sync`, `apply_override`, and
//! `initialize`.
//!
//! # Architecture
//!
//! - **domain** - model, pure derivation, repository contracts
//! - **application** - `WorkflowEngine` service, board and analytics projections
//! - **infrastructure** - Postgres and in-memory backends, event bus, manifest parser
//! - **presentation** - HTTP API

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
