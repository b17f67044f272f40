// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use valorant_bridge_rs::{
    master::cache::AccountCache,
    proto::{framing::FrameError, messages::{Envelope, ResolveAccountResponse}},
};

use crate::integration_tests::common::{
    ScriptedWorker, TestMaster, wait_for_clients, wait_for_selectable, wait_until,
};

fn scripted_response() -> ResolveAccountResponse {
    ResolveAccountResponse {
        puuid: "P3".to_string(),
        region: "na1".to_string(),
        account_level: 7,
        card: "C".to_string(),
        title: "T".to_string(),
    }
}

#[tokio::test]
async fn test_full_dispatch_and_cache_fill() -> Result<()> {
    let master = TestMaster::start().await?;

    let mut worker = ScriptedWorker::connect(master.addr, "w1", true).await?;
    wait_for_selectable(&master).await;

    let echo = tokio::spawn(async move {
        let (id, req) = worker.expect_resolve_request().await.expect("request frame");
        assert_eq!(req.game_name, "Carol");
        assert_eq!(req.game_tag, "NA2");
        worker
            .respond_account(id, scripted_response())
            .await
            .expect("response frame");
        worker
    });

    let data = master.dispatcher.resolve_account("Carol", "NA2").await?;
    assert_eq!(data.puuid, "P3");
    assert_eq!(data.region, "na1");
    assert_eq!(data.account_level, 7);
    assert_eq!(data.card, "C");
    assert_eq!(data.title, "T");
    assert_eq!(data.name, "Carol");

    // The scripted worker only answers once; a second call must come out of
    // the memory tier without further TCP traffic.
    let _worker = echo.await.expect("worker script");
    let again = master.dispatcher.resolve_account("Carol", "NA2").await?;
    assert_eq!(again, data);

    // A successful resolve also lands in the durable tier (best effort, so
    // give the fire-and-forget write a moment).
    wait_until(
        || {
            master
                .store
                .get("Carol", "NA2")
                .is_ok_and(|row| row.is_some())
        },
        "durable write-back",
    )
    .await;

    master.stop();
    Ok(())
}

#[tokio::test]
async fn test_worker_without_lcu_is_not_selectable() -> Result<()> {
    let master = TestMaster::start().await?;

    let _worker = ScriptedWorker::connect(master.addr, "w1", false).await?;
    wait_for_clients(&master, 1).await;

    let err = master
        .dispatcher
        .resolve_account("Dave", "EU")
        .await
        .expect_err("ineligible worker must not be used");
    assert!(format!("{err:#}").contains("no available clients"));

    master.stop();
    Ok(())
}

#[tokio::test]
async fn test_mute_worker_times_out_and_late_reply_is_dropped() -> Result<()> {
    let master = TestMaster::start_with(
        Duration::from_millis(200),
        Duration::from_secs(30),
    )
    .await?;

    let mut worker = ScriptedWorker::connect(master.addr, "w1", true).await?;
    wait_for_selectable(&master).await;

    let err = master
        .dispatcher
        .resolve_account("Erin", "NA1")
        .await
        .expect_err("mute worker must time out");
    assert!(format!("{err:#}").contains("request timed out"));

    // The worker answers after the deadline; the reply hits an empty pending
    // map and is dropped, leaving the session healthy.
    let (id, _req) = worker.expect_resolve_request().await?;
    worker.respond_account(id, scripted_response()).await?;
    sleep(Duration::from_millis(100)).await;
    assert_eq!(master.sessions.client_count(), 1);

    // Nothing was cached for the timed-out request.
    assert!(master.cache.get(&AccountCache::make_key("Erin", "NA1")).is_none());

    master.stop();
    Ok(())
}

#[tokio::test]
async fn test_worker_error_is_surfaced_and_not_cached() -> Result<()> {
    let master = TestMaster::start().await?;

    let mut worker = ScriptedWorker::connect(master.addr, "w1", true).await?;
    wait_for_selectable(&master).await;

    let echo = tokio::spawn(async move {
        let (id, _req) = worker.expect_resolve_request().await.expect("request frame");
        worker
            .send(&Envelope::error(id, "RESOLVE_FAILED", "friend request not found after 10 attempts".to_string()))
            .await
            .expect("error frame");
    });

    let err = master
        .dispatcher
        .resolve_account("Frank", "NA1")
        .await
        .expect_err("worker error must fail the call");
    assert!(format!("{err:#}").contains("friend request not found"));
    echo.await.expect("worker script");

    assert!(master.cache.get(&AccountCache::make_key("Frank", "NA1")).is_none());
    assert!(master.store.get("Frank", "NA1")?.is_none());

    master.stop();
    Ok(())
}

#[tokio::test]
async fn test_worker_disconnect_mid_request_fails_the_call() -> Result<()> {
    let master = TestMaster::start().await?;

    let mut worker = ScriptedWorker::connect(master.addr, "w1", true).await?;
    wait_for_selectable(&master).await;

    let drop_conn = tokio::spawn(async move {
        let _ = worker.expect_resolve_request().await.expect("request frame");
        drop(worker);
    });

    let err = master
        .dispatcher
        .resolve_account("Grace", "NA1")
        .await
        .expect_err("disconnect must fail the call");
    assert!(format!("{err:#}").contains("failed to resolve account"));
    drop_conn.await.expect("worker script");

    // The session table no longer contains the worker.
    wait_for_clients(&master, 0).await;

    master.stop();
    Ok(())
}

#[tokio::test]
async fn test_stalled_heartbeat_makes_worker_ineligible() -> Result<()> {
    let master = TestMaster::start_with(
        Duration::from_secs(2),
        Duration::from_millis(100),
    )
    .await?;

    let _worker = ScriptedWorker::connect(master.addr, "w1", true).await?;
    wait_for_selectable(&master).await;

    // Still connected, but past the liveness window without a new beat.
    sleep(Duration::from_millis(200)).await;
    assert_eq!(master.sessions.client_count(), 1);
    assert!(master.sessions.select_worker().is_none());

    let err = master
        .dispatcher
        .resolve_account("Heidi", "NA1")
        .await
        .expect_err("stale worker must not be selected");
    assert!(format!("{err:#}").contains("no available clients"));

    master.stop();
    Ok(())
}

#[tokio::test]
async fn test_register_collision_closes_previous_transport() -> Result<()> {
    let master = TestMaster::start().await?;

    let mut first = ScriptedWorker::connect(master.addr, "w1", true).await?;
    wait_for_selectable(&master).await;

    let mut second = ScriptedWorker::connect(master.addr, "w1", true).await?;

    // The superseded transport is closed by the master; the first worker
    // observes EOF instead of lingering forever.
    let err = first.recv().await.expect_err("first transport must close");
    assert!(matches!(err, FrameError::Io(_)));

    // The table holds exactly the replacement, and dispatch reaches it.
    wait_for_clients(&master, 1).await;
    wait_for_selectable(&master).await;

    let echo = tokio::spawn(async move {
        let (id, _req) = second.expect_resolve_request().await.expect("request frame");
        second
            .respond_account(id, scripted_response())
            .await
            .expect("response frame");
    });

    let data = master.dispatcher.resolve_account("Ivan", "NA1").await?;
    assert_eq!(data.puuid, "P3");
    echo.await.expect("worker script");

    master.stop();
    Ok(())
}
