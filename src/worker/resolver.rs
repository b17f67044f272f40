// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::worker::{
    lcu::{EntitlementsToken, FriendRequest, LcuClient},
    shard::{ShardClient, region_to_shard},
};

const DEFAULT_POLL_ATTEMPTS: u32 = 10;
const DEFAULT_POLL_DELAY: Duration = Duration::from_millis(500);

/// Subscription state a friend request we just sent shows up with.
const SUBSCRIPTION_PENDING_OUT: &str = "pending_out";

/// Everything a successful resolve learns about the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccount {
    pub puuid: String,
    pub region: String,
    pub account_level: i32,
    pub name: String,
    pub tag: String,
    pub card: String,
    pub title: String,
}

#[derive(Debug)]
enum ResolveState {
    FetchEntitlements,
    SendFriend,
    Poll,
    FetchHistory,
    FetchDetails,
}

enum Transition {
    Next(ResolveState),
    Done(ResolvedAccount),
}

/// Per-resolve working set. The friend request captured during POLL is the
/// cleanup obligation: once set, the request must be deleted on every exit
/// path.
struct ResolveCtx<'a> {
    game_name: &'a str,
    game_tag: &'a str,

    tokens: Option<EntitlementsToken>,
    friend: Option<FriendRequest>,
    shard: &'static str,
    matches: Vec<String>,
}

/// Drives the local agent through the side-effect sequence that surfaces an
/// account's puuid, then reads the public profile off the shard endpoints.
#[derive(Debug, Clone)]
pub struct Resolver {
    lcu: LcuClient,
    shard: ShardClient,
    poll_attempts: u32,
    poll_delay: Duration,
}

impl Resolver {
    pub fn new(lcu: LcuClient, shard: ShardClient) -> Self {
        Self {
            lcu,
            shard,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
            poll_delay: DEFAULT_POLL_DELAY,
        }
    }

    /// Overrides the friend-request poll bounds. Production keeps the
    /// 10 x 500 ms defaults.
    pub fn with_poll(mut self, attempts: u32, delay: Duration) -> Self {
        self.poll_attempts = attempts;
        self.poll_delay = delay;
        self
    }

    pub async fn resolve(&self, game_name: &str, game_tag: &str) -> Result<ResolvedAccount> {
        info!(game_name, game_tag, "resolving account");

        let mut ctx = ResolveCtx {
            game_name,
            game_tag,
            tokens: None,
            friend: None,
            shard: "na",
            matches: Vec::new(),
        };

        let result = self.run_states(&mut ctx).await;

        // Cleanup obligation: once the friend request is confirmed the entry
        // must be removed no matter how the remaining states ended. Deletion
        // failure is logged and never overrides the primary result.
        if let Some(friend) = &ctx.friend {
            if let Err(e) = self.lcu.delete_friend_request(&friend.puuid).await {
                warn!(puuid = %friend.puuid, error = %e, "failed to delete friend request");
            }
        }

        if result.is_ok() {
            info!(game_name, game_tag, "account resolved");
        }
        result
    }

    async fn run_states(&self, ctx: &mut ResolveCtx<'_>) -> Result<ResolvedAccount> {
        let mut state = ResolveState::FetchEntitlements;
        loop {
            debug!(?state, "resolver step");
            let transition = match state {
                ResolveState::FetchEntitlements => self.fetch_entitlements(ctx).await?,
                ResolveState::SendFriend => self.send_friend(ctx).await?,
                ResolveState::Poll => self.poll_friend_request(ctx).await?,
                ResolveState::FetchHistory => self.fetch_history(ctx).await?,
                ResolveState::FetchDetails => self.fetch_details(ctx).await?,
            };

            match transition {
                Transition::Next(next) => state = next,
                Transition::Done(account) => return Ok(account),
            }
        }
    }

    async fn fetch_entitlements(&self, ctx: &mut ResolveCtx<'_>) -> Result<Transition> {
        let tokens = self
            .lcu
            .entitlements()
            .await
            .context("failed to get entitlements token")?;
        ctx.tokens = Some(tokens);
        Ok(Transition::Next(ResolveState::SendFriend))
    }

    async fn send_friend(&self, ctx: &mut ResolveCtx<'_>) -> Result<Transition> {
        self.lcu
            .send_friend_request(ctx.game_name, ctx.game_tag)
            .await
            .context("failed to send friend request")?;
        Ok(Transition::Next(ResolveState::Poll))
    }

    /// Bounded poll: the friend request we just sent becomes visible in the
    /// agent's outgoing list with a small, unpredictable delay.
    async fn poll_friend_request(&self, ctx: &mut ResolveCtx<'_>) -> Result<Transition> {
        for attempt in 0..self.poll_attempts {
            sleep(self.poll_delay).await;

            let requests = match self.lcu.friend_requests().await {
                Ok(reqs) => reqs,
                Err(e) => {
                    warn!(attempt, error = %e, "failed to list friend requests");
                    continue;
                },
            };

            let found = requests.into_iter().find(|r| {
                r.game_name == ctx.game_name
                    && r.game_tag == ctx.game_tag
                    && r.subscription == SUBSCRIPTION_PENDING_OUT
            });

            if let Some(friend) = found {
                debug!(puuid = %friend.puuid, region = %friend.region, "found friend request");
                ctx.shard = region_to_shard(&friend.region);
                ctx.friend = Some(friend);
                return Ok(Transition::Next(ResolveState::FetchHistory));
            }
        }

        bail!("friend request not found after {} attempts", self.poll_attempts)
    }

    async fn fetch_history(&self, ctx: &mut ResolveCtx<'_>) -> Result<Transition> {
        let friend = ctx.friend.as_ref().ok_or_else(|| anyhow!("no friend request in ctx"))?;
        let tokens = ctx.tokens.as_ref().ok_or_else(|| anyhow!("no tokens in ctx"))?;

        let matches = self
            .shard
            .match_history(ctx.shard, &friend.puuid, tokens)
            .await?;
        if matches.is_empty() {
            bail!("no match history found for player");
        }

        ctx.matches = matches;
        Ok(Transition::Next(ResolveState::FetchDetails))
    }

    async fn fetch_details(&self, ctx: &mut ResolveCtx<'_>) -> Result<Transition> {
        let friend = ctx.friend.as_ref().ok_or_else(|| anyhow!("no friend request in ctx"))?;
        let tokens = ctx.tokens.as_ref().ok_or_else(|| anyhow!("no tokens in ctx"))?;
        let match_id = ctx.matches.first().ok_or_else(|| anyhow!("no matches in ctx"))?;

        debug!(%match_id, "fetching match details");
        let details = self.shard.match_details(ctx.shard, match_id, tokens).await?;

        let player = details
            .find_player(&friend.puuid)
            .ok_or_else(|| anyhow!("player not found in match details"))?;

        Ok(Transition::Done(ResolvedAccount {
            puuid: friend.puuid.clone(),
            region: friend.region.clone(),
            account_level: player.account_level,
            name: ctx.game_name.to_string(),
            tag: ctx.game_tag.to_string(),
            card: player.player_card.clone(),
            title: player.player_title.clone(),
        }))
    }
}
