// Copyright (c) 2026 Caseflow Maintainers
// SPDX-License-Identifier: AGPL-3.0

//! Presentation layer: the HTTP API.

pub mod api;
