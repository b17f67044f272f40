// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};

/// Installs the global tracing subscriber.
///
/// The filter comes from `LOG_LEVEL` (falling back to `RUST_LOG`, then the
/// given default). The returned guard must be held for the lifetime of the
/// process so buffered lines are flushed on exit.
pub fn init_logger(default_level: &str) -> Result<WorkerGuard> {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let filter = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|lvl| EnvFilter::try_new(lvl).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));

    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .with_writer(writer)
            .with_target(false)
            .with_ansi(false),
    );

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set global default subscriber")?;

    Ok(guard)
}
