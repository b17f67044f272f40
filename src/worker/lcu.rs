// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::worker::lockfile::Lockfile;

const BASIC_AUTH_USER: &str = "riot";

/// Tokens the shard endpoints expect; obtained from the local agent.
#[derive(Debug, Clone, Deserialize)]
pub struct EntitlementsToken {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "token")]
    pub entitlement_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FriendRequest {
    #[serde(default)]
    pub game_name: String,
    #[serde(default)]
    pub game_tag: String,
    #[serde(default)]
    pub puuid: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub subscription: String,
}

#[derive(Debug, Deserialize)]
struct FriendRequestsResponse {
    #[serde(default)]
    requests: Vec<FriendRequest>,
}

#[derive(Debug, Serialize)]
struct SendFriendRequestBody<'a> {
    game_name: &'a str,
    game_tag: &'a str,
}

#[derive(Debug, Serialize)]
struct RemoveFriendRequestBody<'a> {
    puuid: &'a str,
}

/// HTTPS client for the local game agent. The endpoint presents a
/// self-signed certificate, so verification is disabled; auth is HTTP Basic
/// with the lockfile password.
#[derive(Debug, Clone)]
pub struct LcuClient {
    http: reqwest::Client,
    base_url: String,
    password: String,
}

impl LcuClient {
    pub fn new(lockfile: &Lockfile) -> Result<Self> {
        Self::with_base(lockfile.base_url(), lockfile.password.clone())
    }

    /// Builds a client against an explicit base URL. Used directly by tests
    /// that stand in for the local agent.
    pub fn with_base(base_url: String, password: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(true)
            .build()
            .context("failed to build LCU http client")?;

        Ok(Self {
            http,
            base_url,
            password,
        })
    }

    pub async fn entitlements(&self) -> Result<EntitlementsToken> {
        let url = format!("{}/entitlements/v1/token", self.base_url);
        debug!(%url, "LCU request");

        let resp = self
            .http
            .get(url)
            .basic_auth(BASIC_AUTH_USER, Some(&self.password))
            .send()
            .await
            .context("entitlements request failed")?;

        let status = resp.status();
        if status.as_u16() != 200 {
            let body = resp.text().await.unwrap_or_default();
            bail!("unexpected status {status}: {body}");
        }

        resp.json().await.context("failed to decode entitlements token")
    }

    pub async fn send_friend_request(&self, game_name: &str, game_tag: &str) -> Result<()> {
        let url = format!("{}/chat/v4/friendrequests", self.base_url);
        debug!(%url, game_name, game_tag, "LCU request");

        let resp = self
            .http
            .post(url)
            .basic_auth(BASIC_AUTH_USER, Some(&self.password))
            .json(&SendFriendRequestBody {
                game_name,
                game_tag,
            })
            .send()
            .await
            .context("send friend request failed")?;

        let status = resp.status();
        if !matches!(status.as_u16(), 200 | 201) {
            let body = resp.text().await.unwrap_or_default();
            bail!("unexpected status {status}: {body}");
        }

        Ok(())
    }

    pub async fn friend_requests(&self) -> Result<Vec<FriendRequest>> {
        let url = format!("{}/chat/v3/friendrequests", self.base_url);
        debug!(%url, "LCU request");

        let resp = self
            .http
            .get(url)
            .basic_auth(BASIC_AUTH_USER, Some(&self.password))
            .send()
            .await
            .context("list friend requests failed")?;

        let status = resp.status();
        if status.as_u16() != 200 {
            let body = resp.text().await.unwrap_or_default();
            bail!("unexpected status {status}: {body}");
        }

        let body: FriendRequestsResponse = resp
            .json()
            .await
            .context("failed to decode friend requests")?;
        Ok(body.requests)
    }

    pub async fn delete_friend_request(&self, puuid: &str) -> Result<()> {
        let url = format!("{}/chat/v4/friendrequests", self.base_url);
        debug!(%url, puuid, "LCU request");

        let resp = self
            .http
            .delete(url)
            .basic_auth(BASIC_AUTH_USER, Some(&self.password))
            .json(&RemoveFriendRequestBody { puuid })
            .send()
            .await
            .context("delete friend request failed")?;

        let status = resp.status();
        if !matches!(status.as_u16(), 200 | 204) {
            let body = resp.text().await.unwrap_or_default();
            bail!("unexpected status {status}: {body}");
        }

        Ok(())
    }
}
