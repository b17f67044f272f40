// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Length-prefixed frame reader/writer.
pub mod framing;
/// Wire message envelope and payload variants.
pub mod messages;
