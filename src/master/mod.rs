// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use serde::{Deserialize, Serialize};

/// HTTP API facade and health endpoint.
pub mod api;
/// In-memory TTL tier of the account cache.
pub mod cache;
/// Read-through dispatch: caches, worker selection, request submission.
pub mod dispatch;
/// TCP session manager for connected client nodes.
pub mod sessions;
/// Durable tier: one SQLite row per resolved account.
pub mod store;

/// A resolved account as served to API callers and persisted in the durable
/// tier. `updated_at` is RFC3339 and reflects when the data was resolved,
/// not when it was last served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountData {
    pub puuid: String,
    pub region: String,
    pub account_level: i32,
    pub name: String,
    pub tag: String,
    pub card: String,
    pub title: String,
    pub updated_at: String,
}
