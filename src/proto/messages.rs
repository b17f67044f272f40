// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use chrono::Utc;

/// Envelope carried in every frame on the master/client link.
///
/// `id` correlates a request with its response; messages that are not
/// responses use a placeholder id. Field numbers are frozen; additions to
/// the payload oneof must append new numbers, never renumber.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Envelope {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(oneof = "Payload", tags = "2, 3, 4, 5, 6")]
    pub payload: Option<Payload>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum Payload {
    #[prost(message, tag = "2")]
    ClientRegister(ClientRegister),
    #[prost(message, tag = "3")]
    ClientHeartbeat(ClientHeartbeat),
    #[prost(message, tag = "4")]
    ResolveAccountRequest(ResolveAccountRequest),
    #[prost(message, tag = "5")]
    ResolveAccountResponse(ResolveAccountResponse),
    #[prost(message, tag = "6")]
    ErrorResponse(ErrorResponse),
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ClientRegister {
    #[prost(string, tag = "1")]
    pub client_id: String,
    #[prost(string, tag = "2")]
    pub version: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ClientHeartbeat {
    /// Wall-clock send time in milliseconds; informational only, eligibility
    /// is judged by the master's own monotonic receive time.
    #[prost(int64, tag = "1")]
    pub timestamp_ms: i64,
    #[prost(bool, tag = "2")]
    pub lcu_available: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ResolveAccountRequest {
    #[prost(string, tag = "1")]
    pub game_name: String,
    #[prost(string, tag = "2")]
    pub game_tag: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ResolveAccountResponse {
    #[prost(string, tag = "1")]
    pub puuid: String,
    #[prost(string, tag = "2")]
    pub region: String,
    #[prost(int32, tag = "3")]
    pub account_level: i32,
    #[prost(string, tag = "4")]
    pub card: String,
    #[prost(string, tag = "5")]
    pub title: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ErrorResponse {
    #[prost(string, tag = "1")]
    pub code: String,
    #[prost(string, tag = "2")]
    pub message: String,
}

/// Id used by messages that do not participate in request/response
/// correlation.
pub const PLACEHOLDER_ID: &str = "0";

impl Envelope {
    pub fn register(client_id: &str, version: &str) -> Self {
        Self {
            id: PLACEHOLDER_ID.to_string(),
            payload: Some(Payload::ClientRegister(ClientRegister {
                client_id: client_id.to_string(),
                version: version.to_string(),
            })),
        }
    }

    pub fn heartbeat(lcu_available: bool) -> Self {
        Self {
            id: PLACEHOLDER_ID.to_string(),
            payload: Some(Payload::ClientHeartbeat(ClientHeartbeat {
                timestamp_ms: Utc::now().timestamp_millis(),
                lcu_available,
            })),
        }
    }

    pub fn resolve_request(id: String, game_name: &str, game_tag: &str) -> Self {
        Self {
            id,
            payload: Some(Payload::ResolveAccountRequest(ResolveAccountRequest {
                game_name: game_name.to_string(),
                game_tag: game_tag.to_string(),
            })),
        }
    }

    pub fn resolve_response(id: String, resp: ResolveAccountResponse) -> Self {
        Self {
            id,
            payload: Some(Payload::ResolveAccountResponse(resp)),
        }
    }

    pub fn error(id: String, code: &str, message: String) -> Self {
        Self {
            id,
            payload: Some(Payload::ErrorResponse(ErrorResponse {
                code: code.to_string(),
                message,
            })),
        }
    }
}
