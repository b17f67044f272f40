// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use valorant_bridge_rs::master::cache::AccountCache;

use crate::integration_tests::common::{TestMaster, sample_account};

#[tokio::test]
async fn test_memory_cache_hit_skips_dispatch() -> Result<()> {
    let master = TestMaster::start().await?;

    // No worker is connected, so anything but a memory hit would fail.
    master.cache.insert(
        AccountCache::make_key("Alice", "NA1"),
        sample_account("P1", "Alice", "NA1"),
    );

    let data = master.dispatcher.resolve_account("Alice", "NA1").await?;
    assert_eq!(data.puuid, "P1");
    assert_eq!(data.account_level, 42);

    master.stop();
    Ok(())
}

#[tokio::test]
async fn test_fresh_durable_row_is_served_and_fills_memory() -> Result<()> {
    let master = TestMaster::start().await?;

    let mut stored = sample_account("P2", "Bob", "EU");
    let stored_at = (Utc::now() - ChronoDuration::minutes(30))
        .to_rfc3339_opts(SecondsFormat::Secs, true);
    stored.updated_at = stored_at.clone();
    master.store.upsert(&stored)?;

    let data = master.dispatcher.resolve_account("Bob", "EU").await?;
    assert_eq!(data.puuid, "P2");
    // Data-freshness semantics: the stored timestamp comes back untouched.
    assert_eq!(data.updated_at, stored_at);

    // The memory tier is now populated.
    let cached = master
        .cache
        .get(&AccountCache::make_key("Bob", "EU"))
        .expect("memory cache filled from durable hit");
    assert_eq!(cached.puuid, "P2");

    master.stop();
    Ok(())
}

#[tokio::test]
async fn test_stale_durable_row_falls_through_to_dispatch() -> Result<()> {
    let master = TestMaster::start().await?;

    let mut stored = sample_account("P2", "Bob", "EU");
    stored.updated_at = (Utc::now() - ChronoDuration::hours(2))
        .to_rfc3339_opts(SecondsFormat::Secs, true);
    master.store.upsert(&stored)?;

    // The row exists but is outside the freshness window; with no worker
    // connected the dispatch attempt is what fails.
    let err = master
        .dispatcher
        .resolve_account("Bob", "EU")
        .await
        .expect_err("stale row must not short-circuit");
    assert!(format!("{err:#}").contains("no available clients"));

    master.stop();
    Ok(())
}

#[tokio::test]
async fn test_unparsable_updated_at_degrades_to_miss() -> Result<()> {
    let master = TestMaster::start().await?;

    let mut stored = sample_account("P2", "Bob", "EU");
    stored.updated_at = "not-a-timestamp".to_string();
    master.store.upsert(&stored)?;

    let err = master
        .dispatcher
        .resolve_account("Bob", "EU")
        .await
        .expect_err("corrupt row must not be served");
    assert!(format!("{err:#}").contains("no available clients"));

    master.stop();
    Ok(())
}
