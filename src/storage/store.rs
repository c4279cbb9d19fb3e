//! SQLite energy store
//!
//! One connection guarded by a mutex. Interval tables are keyed on
//! `(home_id, from_time)`, prices on `(home_id, starts_at)` and real-time
//! measurements on `(home_id, timestamp)`, so repeated refreshes never
//! duplicate rows.
//!
//! Measurement timestamps are stored as UTC RFC 3339 with millisecond
//! precision, which keeps lexicographic order equal to time order.

use super::error::{StorageError, StorageResult};
use crate::model::{Consumption, Home, Measurement, Price, PriceInfo, PriceLevel, Production};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS homes (
        id TEXT PRIMARY KEY,
        nickname TEXT NOT NULL DEFAULT '',
        data TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS consumption (
        home_id TEXT NOT NULL,
        from_time TEXT NOT NULL,
        to_time TEXT NOT NULL,
        consumption REAL NOT NULL DEFAULT 0,
        cost REAL NOT NULL DEFAULT 0,
        unit_price REAL NOT NULL DEFAULT 0,
        unit_price_vat REAL NOT NULL DEFAULT 0,
        unit TEXT NOT NULL DEFAULT '',
        currency TEXT NOT NULL DEFAULT '',
        UNIQUE (home_id, from_time)
    );

    CREATE TABLE IF NOT EXISTS production (
        home_id TEXT NOT NULL,
        from_time TEXT NOT NULL,
        to_time TEXT NOT NULL,
        production REAL NOT NULL DEFAULT 0,
        profit REAL NOT NULL DEFAULT 0,
        unit_price REAL NOT NULL DEFAULT 0,
        unit_price_vat REAL NOT NULL DEFAULT 0,
        unit TEXT NOT NULL DEFAULT '',
        currency TEXT NOT NULL DEFAULT '',
        UNIQUE (home_id, from_time)
    );

    CREATE TABLE IF NOT EXISTS prices (
        home_id TEXT NOT NULL,
        starts_at TEXT NOT NULL,
        starts_epoch INTEGER NOT NULL,
        total REAL NOT NULL,
        energy REAL NOT NULL DEFAULT 0,
        tax REAL NOT NULL DEFAULT 0,
        currency TEXT NOT NULL DEFAULT '',
        level TEXT,
        UNIQUE (home_id, starts_at)
    );
    CREATE INDEX IF NOT EXISTS idx_prices_epoch ON prices(home_id, starts_epoch);

    CREATE TABLE IF NOT EXISTS price_snapshots (
        home_id TEXT PRIMARY KEY,
        data TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS real_time_measurements (
        home_id TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        power REAL NOT NULL DEFAULT 0,
        power_production REAL NOT NULL DEFAULT 0,
        min_power REAL NOT NULL DEFAULT 0,
        average_power REAL NOT NULL DEFAULT 0,
        max_power REAL NOT NULL DEFAULT 0,
        max_power_production REAL NOT NULL DEFAULT 0,
        accumulated_consumption REAL NOT NULL DEFAULT 0,
        accumulated_production REAL NOT NULL DEFAULT 0,
        last_meter_consumption REAL NOT NULL DEFAULT 0,
        last_meter_production REAL NOT NULL DEFAULT 0,
        current_l1 REAL,
        current_l2 REAL,
        current_l3 REAL,
        voltage_phase1 REAL,
        voltage_phase2 REAL,
        voltage_phase3 REAL,
        UNIQUE (home_id, timestamp)
    );
    CREATE INDEX IF NOT EXISTS idx_rtm_timestamp ON real_time_measurements(timestamp);
";

const MEASUREMENT_COLUMNS: &str = "timestamp, power, power_production, min_power, average_power,
    max_power, max_power_production, accumulated_consumption, accumulated_production,
    last_meter_consumption, last_meter_production, current_l1, current_l2, current_l3,
    voltage_phase1, voltage_phase2, voltage_phase3";

/// Row counts per table
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub homes: u64,
    pub consumption_rows: u64,
    pub production_rows: u64,
    pub price_rows: u64,
    pub measurement_rows: u64,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "homes={}, consumption={}, production={}, prices={}, measurements={}",
            self.homes,
            self.consumption_rows,
            self.production_rows,
            self.price_rows,
            self.measurement_rows
        )
    }
}

/// SQLite-backed store for homes, energy intervals, prices and live samples
pub struct EnergyStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl EnergyStore {
    /// Create or open a database file
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        Self::init(conn, Some(path))
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = ?path, "Energy store ready");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }

    // ------------------------------------------------------------------
    // Homes
    // ------------------------------------------------------------------

    /// Insert or replace homes
    pub fn upsert_homes(&self, homes: &[Home]) -> StorageResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO homes (id, nickname, data, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (id) DO UPDATE SET
                    nickname = excluded.nickname,
                    data = excluded.data,
                    updated_at = excluded.updated_at",
            )?;
            for home in homes {
                let data = serde_json::to_string(home)?;
                stmt.execute(params![home.id, home.app_nickname, data, now])?;
            }
        }
        tx.commit()?;
        Ok(homes.len())
    }

    /// All known homes ordered by nickname
    pub fn homes(&self) -> StorageResult<Vec<Home>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached("SELECT data FROM homes ORDER BY nickname, id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut homes = Vec::new();
        for data in rows {
            homes.push(serde_json::from_str(&data?)?);
        }
        Ok(homes)
    }

    pub fn home(&self, id: &str) -> StorageResult<Option<Home>> {
        let conn = self.conn()?;
        let data: Option<String> = conn
            .query_row("SELECT data FROM homes WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;

        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    /// Like [`home`](Self::home) but a missing home is an error
    pub fn require_home(&self, id: &str) -> StorageResult<Home> {
        self.home(id)?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    // ------------------------------------------------------------------
    // Consumption / production
    // ------------------------------------------------------------------

    /// Store consumption intervals, updating rows that already exist
    pub fn store_consumption(&self, home_id: &str, items: &[Consumption]) -> StorageResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO consumption
                    (home_id, from_time, to_time, consumption, cost, unit_price, unit_price_vat, unit, currency)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (home_id, from_time) DO UPDATE SET
                    to_time = excluded.to_time,
                    consumption = excluded.consumption,
                    cost = excluded.cost,
                    unit_price = excluded.unit_price,
                    unit_price_vat = excluded.unit_price_vat,
                    unit = excluded.unit,
                    currency = excluded.currency",
            )?;
            for c in items {
                stmt.execute(params![
                    home_id,
                    c.from,
                    c.to,
                    c.consumption,
                    c.cost,
                    c.unit_price,
                    c.unit_price_vat,
                    c.consumption_unit,
                    c.currency
                ])?;
            }
        }
        tx.commit()?;
        Ok(items.len())
    }

    /// Most recent consumption intervals, newest first
    pub fn consumption(&self, home_id: &str, limit: usize) -> StorageResult<Vec<Consumption>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT from_time, to_time, consumption, cost, unit_price, unit_price_vat, unit, currency
             FROM consumption WHERE home_id = ?1
             ORDER BY from_time DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![home_id, limit as i64], |row| {
            Ok(Consumption {
                from: row.get(0)?,
                to: row.get(1)?,
                consumption: row.get(2)?,
                cost: row.get(3)?,
                unit_price: row.get(4)?,
                unit_price_vat: row.get(5)?,
                consumption_unit: row.get(6)?,
                currency: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn store_production(&self, home_id: &str, items: &[Production]) -> StorageResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO production
                    (home_id, from_time, to_time, production, profit, unit_price, unit_price_vat, unit, currency)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (home_id, from_time) DO UPDATE SET
                    to_time = excluded.to_time,
                    production = excluded.production,
                    profit = excluded.profit,
                    unit_price = excluded.unit_price,
                    unit_price_vat = excluded.unit_price_vat,
                    unit = excluded.unit,
                    currency = excluded.currency",
            )?;
            for p in items {
                stmt.execute(params![
                    home_id,
                    p.from,
                    p.to,
                    p.production,
                    p.profit,
                    p.unit_price,
                    p.unit_price_vat,
                    p.production_unit,
                    p.currency
                ])?;
            }
        }
        tx.commit()?;
        Ok(items.len())
    }

    /// Most recent production intervals, newest first
    pub fn production(&self, home_id: &str, limit: usize) -> StorageResult<Vec<Production>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT from_time, to_time, production, profit, unit_price, unit_price_vat, unit, currency
             FROM production WHERE home_id = ?1
             ORDER BY from_time DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![home_id, limit as i64], |row| {
            Ok(Production {
                from: row.get(0)?,
                to: row.get(1)?,
                production: row.get(2)?,
                profit: row.get(3)?,
                unit_price: row.get(4)?,
                unit_price_vat: row.get(5)?,
                production_unit: row.get(6)?,
                currency: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ------------------------------------------------------------------
    // Prices
    // ------------------------------------------------------------------

    /// Record every hourly price and keep the full `PriceInfo` as the latest snapshot.
    ///
    /// Hourly rows are insert-or-ignore. Returns the number of new rows.
    pub fn store_prices(&self, home_id: &str, info: &PriceInfo) -> StorageResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO prices
                    (home_id, starts_at, starts_epoch, total, energy, tax, currency, level)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for price in info.all() {
                let Some(start) = price.start() else {
                    tracing::debug!(home_id = %home_id, starts_at = %price.starts_at, "Skipping price without valid start");
                    continue;
                };
                inserted += stmt.execute(params![
                    home_id,
                    price.starts_at,
                    start.timestamp(),
                    price.total,
                    price.energy,
                    price.tax,
                    price.currency,
                    price.level.map(|l| l.as_str())
                ])?;
            }

            let data = serde_json::to_string(info)?;
            tx.execute(
                "INSERT INTO price_snapshots (home_id, data, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (home_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
                params![home_id, data, Utc::now().to_rfc3339()],
            )?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Latest `PriceInfo` stored for a home
    pub fn price_info(&self, home_id: &str) -> StorageResult<Option<PriceInfo>> {
        let conn = self.conn()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM price_snapshots WHERE home_id = ?1",
                params![home_id],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    /// Prices starting in `[from, to)`, oldest first
    pub fn prices_between(
        &self,
        home_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Price>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT starts_at, total, energy, tax, currency, level FROM prices
             WHERE home_id = ?1 AND starts_epoch >= ?2 AND starts_epoch < ?3
             ORDER BY starts_epoch ASC",
        )?;
        let rows = stmt.query_map(params![home_id, from.timestamp(), to.timestamp()], |row| {
            let level: Option<String> = row.get(5)?;
            Ok(Price {
                starts_at: row.get(0)?,
                total: row.get(1)?,
                energy: row.get(2)?,
                tax: row.get(3)?,
                currency: row.get(4)?,
                level: level.as_deref().map(PriceLevel::parse),
                ends_at: None,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ------------------------------------------------------------------
    // Real-time measurements
    // ------------------------------------------------------------------

    /// Insert a live sample, replacing one with the same timestamp
    pub fn store_measurement(&self, home_id: &str, m: &Measurement) -> StorageResult<()> {
        let timestamp = m
            .timestamp
            .ok_or_else(|| StorageError::InvalidData("measurement has no timestamp".to_string()))?;

        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "INSERT INTO real_time_measurements (home_id, timestamp, power, power_production,
                min_power, average_power, max_power, max_power_production,
                accumulated_consumption, accumulated_production,
                last_meter_consumption, last_meter_production,
                current_l1, current_l2, current_l3,
                voltage_phase1, voltage_phase2, voltage_phase3)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
             ON CONFLICT (home_id, timestamp) DO UPDATE SET
                power = excluded.power,
                power_production = excluded.power_production,
                min_power = excluded.min_power,
                average_power = excluded.average_power,
                max_power = excluded.max_power,
                max_power_production = excluded.max_power_production,
                accumulated_consumption = excluded.accumulated_consumption,
                accumulated_production = excluded.accumulated_production,
                last_meter_consumption = excluded.last_meter_consumption,
                last_meter_production = excluded.last_meter_production,
                current_l1 = excluded.current_l1,
                current_l2 = excluded.current_l2,
                current_l3 = excluded.current_l3,
                voltage_phase1 = excluded.voltage_phase1,
                voltage_phase2 = excluded.voltage_phase2,
                voltage_phase3 = excluded.voltage_phase3",
        )?;
        stmt.execute(params![
            home_id,
            format_timestamp(&timestamp),
            m.power,
            m.power_production,
            m.min_power,
            m.average_power,
            m.max_power,
            m.max_power_production,
            m.accumulated_consumption,
            m.accumulated_production,
            m.last_meter_consumption,
            m.last_meter_production,
            m.current_l1,
            m.current_l2,
            m.current_l3,
            m.voltage_phase1,
            m.voltage_phase2,
            m.voltage_phase3
        ])?;
        Ok(())
    }

    /// Most recent samples, newest first
    pub fn latest_measurements(&self, home_id: &str, limit: usize) -> StorageResult<Vec<Measurement>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM real_time_measurements WHERE home_id = ?1
             ORDER BY timestamp DESC LIMIT ?2",
            MEASUREMENT_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![home_id, limit as i64], measurement_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Up to `limit` samples at or after `since`, oldest first
    pub fn measurements_since(
        &self,
        home_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<Measurement>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM real_time_measurements WHERE home_id = ?1 AND timestamp >= ?2
             ORDER BY timestamp ASC LIMIT ?3",
            MEASUREMENT_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(
            params![home_id, format_timestamp(&since), limit as i64],
            measurement_from_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete samples older than the cutoff. Returns rows deleted.
    pub fn cleanup_measurements(&self, older_than: DateTime<Utc>) -> StorageResult<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM real_time_measurements WHERE timestamp < ?1",
            params![format_timestamp(&older_than)],
        )?;
        Ok(deleted)
    }

    pub fn stats(&self) -> StorageResult<StoreStats> {
        let conn = self.conn()?;
        let count = |table: &str| -> StorageResult<u64> {
            let sql = format!("SELECT COUNT(*) FROM {}", table);
            let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(n as u64)
        };

        Ok(StoreStats {
            homes: count("homes")?,
            consumption_rows: count("consumption")?,
            production_rows: count("production")?,
            price_rows: count("prices")?,
            measurement_rows: count("real_time_measurements")?,
        })
    }

    /// Run a trivial query to confirm the database is usable
    pub fn ping(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn measurement_from_row(row: &Row<'_>) -> rusqlite::Result<Measurement> {
    let timestamp: String = row.get(0)?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Measurement {
        timestamp: Some(timestamp),
        power: row.get(1)?,
        power_production: row.get(2)?,
        min_power: row.get(3)?,
        average_power: row.get(4)?,
        max_power: row.get(5)?,
        max_power_production: row.get(6)?,
        accumulated_consumption: row.get(7)?,
        accumulated_production: row.get(8)?,
        last_meter_consumption: row.get(9)?,
        last_meter_production: row.get(10)?,
        current_l1: row.get(11)?,
        current_l2: row.get(12)?,
        current_l3: row.get(13)?,
        voltage_phase1: row.get(14)?,
        voltage_phase2: row.get(15)?,
        voltage_phase3: row.get(16)?,
    })
}
