// Copyright (c) 2026 Caseflow Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the persistence contracts defined in
//! `crate::domain::repository`, following the Repository pattern from DDD.
//!
//! # Available Implementations
//!
//! ## PostgreSQL
//!
//! Production backend, selected when a `DATABASE_URL` is configured:
//! - **PostgresTemplateRepository** - append-only template versions
//! - **PostgresWorkflowStore** - per-case state, single-transaction commits
//! - **PostgresEvidenceSource** - evidence reads over `audit_logs`/`documents`
//! - **PostgresCaseDirectory** / **PostgresAuditSink** - collaborator tables
//!
//! ## In-Memory
//!
//! Lightweight backend for development and testing:
//! - **InMemoryTemplateRepository** - HashMap keyed by `(program_key, version)`
//! - **InMemoryWorkflowStore** - dashmap per-case records, entry-level locking
//! - **InMemoryEvidenceLog** - combined evidence source + audit sink
//! - **InMemoryCaseDirectory** - case registry with mutable status

pub mod memory;
pub mod postgres;

pub use memory::{
    InMemoryCaseDirectory, InMemoryEvidenceLog, InMemoryTemplateRepository, InMemoryWorkflowStore,
};
pub use postgres::{
    PostgresAuditSink, PostgresCaseDirectory, PostgresEvidenceSource, PostgresTemplateRepository,
    PostgresWorkflowStore,
};
