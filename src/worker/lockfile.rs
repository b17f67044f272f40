// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{env, fs, path::PathBuf};

use anyhow::{Context, Result, bail};

/// Connection credentials the Riot client drops next to itself while it is
/// running. Single line, five colon-separated fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lockfile {
    pub name: String,
    pub pid: String,
    pub port: String,
    pub password: String,
    pub protocol: String,
}

pub fn lockfile_path() -> Result<PathBuf> {
    let local_app_data = env::var("LOCALAPPDATA")
        .context("LOCALAPPDATA environment variable not set")?;

    Ok(PathBuf::from(local_app_data)
        .join("Riot Games")
        .join("Riot Client")
        .join("Config")
        .join("lockfile"))
}

impl Lockfile {
    pub fn read() -> Result<Self> {
        let path = lockfile_path()?;
        let contents = fs::read_to_string(&path).with_context(|| {
            format!(
                "failed to open lockfile {} (is the Riot client running?)",
                path.display()
            )
        })?;

        let line = contents.lines().next().context("lockfile is empty")?;
        Self::parse(line)
    }

    pub fn parse(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() != 5 {
            bail!(
                "invalid lockfile format: expected 5 fields, got {}",
                parts.len()
            );
        }

        Ok(Self {
            name: parts[0].to_string(),
            pid: parts[1].to_string(),
            port: parts[2].to_string(),
            password: parts[3].to_string(),
            protocol: parts[4].to_string(),
        })
    }

    pub fn base_url(&self) -> String {
        format!("https://127.0.0.1:{}", self.port)
    }
}

/// Whether the local game agent is reachable right now. Reported to the
/// master with every heartbeat.
pub fn probe() -> bool {
    Lockfile::read().is_ok()
}
