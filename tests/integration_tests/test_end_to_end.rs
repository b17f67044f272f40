// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, sync::Arc, time::Duration};

use anyhow::Result;
use serial_test::serial;
use valorant_bridge_rs::worker::{
    agent::SessionAgent, lcu::LcuClient, resolver::Resolver, shard::ShardClient,
};

use crate::integration_tests::{
    common::{TestMaster, wait_for_selectable},
    test_resolver::{StubRiot, start_stub},
};

/// Plants a lockfile under a private LOCALAPPDATA so the agent's
/// availability probe succeeds.
fn plant_lockfile() -> Result<()> {
    let dir = std::env::temp_dir().join("bridge-e2e-localappdata");
    let config_dir = dir.join("Riot Games").join("Riot Client").join("Config");
    fs::create_dir_all(&config_dir)?;
    fs::write(config_dir.join("lockfile"), "Riot Client:1:8402:pw:https")?;

    // Scoped to #[serial] tests; the probe reads it on every heartbeat.
    unsafe { std::env::set_var("LOCALAPPDATA", &dir) };
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_resolve_through_master_and_agent() -> Result<()> {
    plant_lockfile()?;

    let stub = Arc::new(StubRiot::default());
    let stub_addr = start_stub(Arc::clone(&stub)).await?;

    let master = TestMaster::start().await?;

    let resolver = Resolver::new(
        LcuClient::with_base(format!("http://{stub_addr}"), "pw".to_string())?,
        ShardClient::with_base(format!("http://{stub_addr}"))?,
    )
    .with_poll(3, Duration::from_millis(10));

    let agent = SessionAgent::new(
        master.addr.to_string(),
        "e2e-worker".to_string(),
        Arc::new(resolver),
        master.cancel.clone(),
    );
    tokio::spawn(async move {
        let _ = agent.run_once().await;
    });

    wait_for_selectable(&master).await;

    // Success path: RPC to dispatch to agent to resolver to stub and back.
    let data = master.dispatcher.resolve_account("Target", "T1").await?;
    assert_eq!(data.puuid, "p-1");
    assert_eq!(data.region, "eu1");
    assert_eq!(data.account_level, 42);
    assert_eq!(data.card, "card-1");
    assert_eq!(data.title, "title-1");
    assert_eq!(stub.deleted(), vec!["p-1".to_string()]);

    // Failure path: a tag the friend-request list never confirms exhausts
    // the worker's poll; the RESOLVE_FAILED message surfaces to the caller.
    // No puuid was captured for it, so nothing further was deleted.
    let err = master
        .dispatcher
        .resolve_account("Target", "T2")
        .await
        .expect_err("unconfirmed friend request must surface as an error");
    assert!(format!("{err:#}").contains("not found after 3 attempts"));
    assert_eq!(stub.deleted(), vec!["p-1".to_string()]);

    master.stop();
    Ok(())
}
