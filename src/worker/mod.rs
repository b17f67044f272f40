// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// TCP session with the master: registration, heartbeats, dispatch ingest.
pub mod agent;
/// HTTPS driver for the local game agent.
pub mod lcu;
/// Lockfile discovery and parsing.
pub mod lockfile;
/// The resolve state machine.
pub mod resolver;
/// Remote shard endpoints (match history/details).
pub mod shard;
