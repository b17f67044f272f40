// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{env, fs, path::Path, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Master-side settings, read from the environment with defaults.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    /// Port the session manager listens on for client nodes.
    pub tcp_port: u16,
    /// Port the HTTP API binds to.
    pub api_port: u16,
    /// Path of the SQLite database file.
    pub database_path: String,
    /// TTL of the in-memory account cache.
    pub cache_ttl: Duration,
}

impl MasterConfig {
    pub fn from_env() -> Self {
        Self {
            tcp_port: env_parse("TCP_PORT", 8080),
            api_port: env_parse("API_PORT", 8081),
            database_path: env_or("DATABASE_PATH", "./data/valorant.db"),
            cache_ttl: Duration::from_secs(env_parse::<u64>("CACHE_TTL_MINUTES", 60) * 60),
        }
    }
}

/// Client-node settings. A `config.json` next to the binary overrides the
/// environment when present.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_master_address")]
    pub master_address: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_master_address() -> String {
    "localhost:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ClientConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.json"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = match fs::read_to_string(path) {
            Ok(data) => serde_json::from_str::<ClientConfig>(&data)
                .with_context(|| format!("failed to parse {}", path.display()))?,
            Err(_) => Self {
                master_address: env_or("MASTER_ADDRESS", "localhost:8080"),
                client_id: env_or("CLIENT_ID", ""),
                log_level: env_or("LOG_LEVEL", "info"),
            },
        };

        if cfg.client_id.is_empty() {
            cfg.client_id = format!(
                "client-{}",
                gethostname::gethostname().to_string_lossy()
            );
        }
        if cfg.log_level.is_empty() {
            cfg.log_level = "info".to_string();
        }

        Ok(cfg)
    }
}

fn env_or(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
