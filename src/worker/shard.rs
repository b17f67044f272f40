// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::debug;

use crate::worker::lcu::EntitlementsToken;

/// Fixed `X-Riot-ClientPlatform` value the shard endpoints expect
/// (base64-encoded platform descriptor).
pub const CLIENT_PLATFORM: &str = "ew0KCSJwbGF0Zm9ybVR5cGUiOiAiUEMiLA0KCSJwbGF0Zm9ybU9TIjogIldpbmRvd3MiLA0KCSJwbGF0Zm9ybU9TVmVyc2lvbiI6ICIxMC4wLjE5MDQyLjEuMjU2LjY0Yml0IiwNCgkicGxhdGZvcm1DaGlwc2V0IjogIlVua25vd24iDQp9";

/// Maps a player region onto the shard hosting its match data. Exact match
/// first, then a two-letter prefix, then `na`.
pub fn region_to_shard(region: &str) -> &'static str {
    match region {
        "na1" | "na2" | "na3" | "latam" | "br" => "na",
        "pbe" => "pbe",
        "eu1" | "eu2" | "eu3" => "eu",
        "ap1" | "ap2" | "ap3" => "ap",
        "kr1" => "kr",
        "sa" | "sa1" | "sa2" => "eu",
        _ => match region.get(..2) {
            Some("na") | Some("la") | Some("br") => "na",
            Some("eu") => "eu",
            Some("ap") => "ap",
            Some("kr") => "kr",
            _ => "na",
        },
    }
}

#[derive(Debug, Deserialize)]
struct MatchHistoryResponse {
    #[serde(rename = "History", default)]
    history: Vec<MatchHistoryEntry>,
}

#[derive(Debug, Deserialize)]
struct MatchHistoryEntry {
    #[serde(rename = "MatchID")]
    match_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MatchDetails {
    #[serde(default)]
    pub players: Vec<Player>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Player {
    /// The player's puuid.
    pub subject: String,
    #[serde(rename = "playerCard", default)]
    pub player_card: String,
    #[serde(rename = "playerTitle", default)]
    pub player_title: String,
    #[serde(rename = "accountLevel", default)]
    pub account_level: i32,
}

impl MatchDetails {
    pub fn find_player(&self, puuid: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.subject == puuid)
    }
}

/// Read-only client for the remote shard endpoints.
#[derive(Debug, Clone)]
pub struct ShardClient {
    http: reqwest::Client,
    base_override: Option<String>,
}

impl ShardClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build shard http client")?;

        Ok(Self {
            http,
            base_override: None,
        })
    }

    /// Points every shard at a fixed base URL instead of
    /// `https://pd.<shard>.a.pvp.net`. Used by tests.
    pub fn with_base(base: String) -> Result<Self> {
        let mut client = Self::new()?;
        client.base_override = Some(base);
        Ok(client)
    }

    fn base(&self, shard: &str) -> String {
        match &self.base_override {
            Some(base) => base.clone(),
            None => format!("https://pd.{shard}.a.pvp.net"),
        }
    }

    /// Match ids for the player, most recent first.
    pub async fn match_history(
        &self,
        shard: &str,
        puuid: &str,
        tokens: &EntitlementsToken,
    ) -> Result<Vec<String>> {
        let url = format!("{}/match-history/v1/history/{puuid}", self.base(shard));
        let body: MatchHistoryResponse = self
            .get(&url, tokens)
            .await
            .context("failed to get match history")?;

        Ok(body.history.into_iter().map(|e| e.match_id).collect())
    }

    pub async fn match_details(
        &self,
        shard: &str,
        match_id: &str,
        tokens: &EntitlementsToken,
    ) -> Result<MatchDetails> {
        let url = format!("{}/match-details/v1/matches/{match_id}", self.base(shard));
        self.get(&url, tokens)
            .await
            .context("failed to get match details")
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        tokens: &EntitlementsToken,
    ) -> Result<T> {
        debug!(%url, "shard request");

        let resp = self
            .http
            .get(url)
            .header("X-Riot-ClientPlatform", CLIENT_PLATFORM)
            .header("X-Riot-ClientVersion", "unknown")
            .header("X-Riot-Entitlements-JWT", &tokens.entitlement_token)
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .context("shard request failed")?;

        let status = resp.status();
        if status.as_u16() != 200 {
            let body = resp.text().await.unwrap_or_default();
            bail!("unexpected status {status}: {body}");
        }

        resp.json().await.context("failed to decode shard response")
    }
}
