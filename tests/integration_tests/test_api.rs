// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use tokio::net::TcpListener;
use valorant_bridge_rs::master::{
    api::{self, ApiState},
    cache::AccountCache,
};

use crate::integration_tests::common::{TestMaster, sample_account};

async fn start_api(master: &TestMaster) -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let state = ApiState {
        dispatcher: Arc::clone(&master.dispatcher),
        sessions: Arc::clone(&master.sessions),
    };
    let cancel = master.cancel.clone();
    tokio::spawn(async move {
        let _ = api::serve(listener, state, cancel).await;
    });

    Ok(addr)
}

#[tokio::test]
async fn test_health_reports_client_count() -> Result<()> {
    let master = TestMaster::start().await?;
    let addr = start_api(&master).await?;

    let body = reqwest::get(format!("http://{addr}/health"))
        .await?
        .text()
        .await?;
    assert_eq!(body, "OK - 0 clients connected");

    master.stop();
    Ok(())
}

#[tokio::test]
async fn test_get_account_success_body() -> Result<()> {
    let master = TestMaster::start().await?;
    let addr = start_api(&master).await?;

    master.cache.insert(
        AccountCache::make_key("Alice", "NA1"),
        sample_account("P1", "Alice", "NA1"),
    );

    let client = reqwest::Client::new();
    let body: Value = client
        .post(format!("http://{addr}/v1/account"))
        .json(&serde_json::json!({"name": "Alice", "tag": "NA1"}))
        .send()
        .await?
        .json()
        .await?;

    assert_eq!(body["status"], 200);
    assert_eq!(body["data"]["puuid"], "P1");
    assert!(body.get("error").is_none());

    // The path-parameter route answers the same.
    let body: Value = client
        .get(format!("http://{addr}/v1/account/Alice/NA1"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["status"], 200);
    assert_eq!(body["data"]["puuid"], "P1");

    master.stop();
    Ok(())
}

#[tokio::test]
async fn test_get_account_failure_is_status_500_in_body() -> Result<()> {
    let master = TestMaster::start().await?;
    let addr = start_api(&master).await?;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{addr}/v1/account"))
        .json(&serde_json::json!({"name": "Nobody", "tag": "XX"}))
        .send()
        .await?;

    // The transport stays 200; the outcome is in the body.
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await?;
    assert_eq!(body["status"], 500);
    assert!(
        body["error"]
            .as_str()
            .expect("error message present")
            .contains("no available clients")
    );
    assert!(body.get("data").is_none());

    master.stop();
    Ok(())
}
