// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::master::{AccountData, dispatch::Dispatcher, sessions::SessionManager};

/// Thin unary facade over the dispatcher. The transport always answers
/// HTTP 200; the outcome lives in the body's `status` field.
#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<Dispatcher>,
    pub sessions: Arc<SessionManager>,
}

#[derive(Debug, Deserialize)]
pub struct GetAccountRequest {
    pub name: String,
    pub tag: String,
}

#[derive(Debug, Serialize)]
pub struct GetAccountResponse {
    pub status: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<AccountData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/v1/account", post(get_account))
        .route("/v1/account/{name}/{tag}", get(get_account_by_path))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    cancel: CancellationToken,
) -> Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .context("api server error")
}

async fn get_account(
    State(state): State<ApiState>,
    Json(req): Json<GetAccountRequest>,
) -> Json<GetAccountResponse> {
    Json(resolve(&state, &req.name, &req.tag).await)
}

async fn get_account_by_path(
    State(state): State<ApiState>,
    Path((name, tag)): Path<(String, String)>,
) -> Json<GetAccountResponse> {
    Json(resolve(&state, &name, &tag).await)
}

async fn resolve(state: &ApiState, name: &str, tag: &str) -> GetAccountResponse {
    info!(name, tag, "get account request");

    match state.dispatcher.resolve_account(name, tag).await {
        Ok(data) => GetAccountResponse {
            status: 200,
            data: Some(data),
            error: None,
        },
        Err(e) => {
            let message = format!("{e:#}");
            error!(error = %message, "get account failed");
            GetAccountResponse {
                status: 500,
                data: None,
                error: Some(message),
            }
        },
    }
}

async fn health(State(state): State<ApiState>) -> String {
    format!("OK - {} clients connected", state.sessions.client_count())
}
