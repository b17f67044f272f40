// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    fs,
    path::Path,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};

use crate::master::AccountData;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS account (
    puuid         TEXT    NOT NULL,
    region        TEXT    NOT NULL,
    account_level INTEGER NOT NULL,
    name          TEXT    NOT NULL,
    tag           TEXT    NOT NULL,
    card          TEXT    NOT NULL,
    title         TEXT    NOT NULL,
    updated_at    TEXT    NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_account_name_tag ON account (name, tag);
";

/// Durable tier of the account cache. Rows are upserted on `(name, tag)`;
/// freshness of a row is the dispatcher's business, the store only keeps
/// `updated_at` verbatim.
///
/// All operations are synchronous; async callers go through
/// `spawn_blocking`.
pub struct AccountStore {
    conn: Mutex<Connection>,
}

impl AccountStore {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(dir) = Path::new(path).parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir).context("failed to create database directory")?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;
        Self::init(conn)
    }

    /// Private in-memory database; used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().context("failed to open in-memory database")?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)
            .context("failed to run account schema migration")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("account store mutex poisoned"))
    }

    pub fn get(&self, name: &str, tag: &str) -> Result<Option<AccountData>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT puuid, region, account_level, name, tag, card, title, updated_at
             FROM account WHERE name = ?1 AND tag = ?2",
        )?;

        let row = stmt
            .query_row(params![name, tag], |row| {
                Ok(AccountData {
                    puuid: row.get(0)?,
                    region: row.get(1)?,
                    account_level: row.get(2)?,
                    name: row.get(3)?,
                    tag: row.get(4)?,
                    card: row.get(5)?,
                    title: row.get(6)?,
                    updated_at: row.get(7)?,
                })
            })
            .optional()
            .context("failed to query account")?;

        Ok(row)
    }

    pub fn upsert(&self, account: &AccountData) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO account (puuid, region, account_level, name, tag, card, title, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (name, tag) DO UPDATE SET
                 puuid = excluded.puuid,
                 region = excluded.region,
                 account_level = excluded.account_level,
                 card = excluded.card,
                 title = excluded.title,
                 updated_at = excluded.updated_at",
            params![
                account.puuid,
                account.region,
                account.account_level,
                account.name,
                account.tag,
                account.card,
                account.title,
                account.updated_at,
            ],
        )
        .context("failed to upsert account")?;

        Ok(())
    }
}
