//! Backing stores for spend counters and cost logs.
//!
//! Counters live under `cost:daily:<ISO-date>` and cost records under
//! `cost:log:<ISO-date>`. Because every key carries its date, a new day
//! naturally reads a fresh counter and history is never rewritten.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::CostRecord;
use crate::storage::SqliteDb;

/// Counter key for one day's spend.
pub fn daily_key(day: NaiveDate) -> String {
    format!("cost:daily:{}", day.format("%Y-%m-%d"))
}

fn month_pattern(year: i32, month: u32) -> String {
    format!("cost:daily:{:04}-{:02}-%", year, month)
}

/// List key for one day's cost records.
pub fn log_key(day: NaiveDate) -> String {
    format!("cost:log:{}", day.format("%Y-%m-%d"))
}

/// Day and month totals observed by one increment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpendTotals {
    pub daily: f64,
    pub monthly: f64,
}

/// Persistence for the budget ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Atomically add `amount` to the day's counter.
    ///
    /// Returns the day's and the month's totals as of this increment, read
    /// in the same critical section as the write.
    async fn add_spend(&self, day: NaiveDate, amount: f64) -> anyhow::Result<SpendTotals>;

    /// Total spend recorded for `day` (0 when nothing was recorded).
    async fn daily_total(&self, day: NaiveDate) -> anyhow::Result<f64>;

    /// Sum of all daily counters in the given calendar month.
    async fn monthly_total(&self, year: i32, month: u32) -> anyhow::Result<f64>;

    /// Append a record to the day's cost log.
    async fn append_record(&self, day: NaiveDate, record: &CostRecord) -> anyhow::Result<()>;

    /// All records logged for `day`, oldest first.
    async fn records(&self, day: NaiveDate) -> anyhow::Result<Vec<CostRecord>>;

    /// Drop cost logs older than `cutoff`. Counters are kept.
    async fn prune_logs_before(&self, cutoff: NaiveDate) -> anyhow::Result<usize>;

    /// Backend label for stats output.
    fn backend_name(&self) -> &'static str;
}

#[derive(Debug, Default)]
struct MemoryLedger {
    counters: BTreeMap<NaiveDate, f64>,
    logs: BTreeMap<NaiveDate, Vec<CostRecord>>,
}

/// In-process ledger store.
///
/// All mutation happens under one mutex, so concurrent increments are
/// never lost within a single process. State does not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    inner: Mutex<MemoryLedger>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, MemoryLedger>> {
        self.inner
            .lock()
            .map_err(|_| anyhow::anyhow!("ledger mutex poisoned"))
    }
}

fn month_sum(counters: &BTreeMap<NaiveDate, f64>, year: i32, month: u32) -> f64 {
    counters
        .iter()
        .filter(|(day, _)| day.year() == year && day.month() == month)
        .map(|(_, v)| *v)
        .sum()
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn add_spend(&self, day: NaiveDate, amount: f64) -> anyhow::Result<SpendTotals> {
        let mut inner = self.lock()?;
        let total = inner.counters.entry(day).or_insert(0.0);
        *total += amount;
        let daily = *total;
        let monthly = month_sum(&inner.counters, day.year(), day.month());
        Ok(SpendTotals { daily, monthly })
    }

    async fn daily_total(&self, day: NaiveDate) -> anyhow::Result<f64> {
        Ok(self.lock()?.counters.get(&day).copied().unwrap_or(0.0))
    }

    async fn monthly_total(&self, year: i32, month: u32) -> anyhow::Result<f64> {
        Ok(month_sum(&self.lock()?.counters, year, month))
    }

    async fn append_record(&self, day: NaiveDate, record: &CostRecord) -> anyhow::Result<()> {
        self.lock()?.logs.entry(day).or_default().push(record.clone());
        Ok(())
    }

    async fn records(&self, day: NaiveDate) -> anyhow::Result<Vec<CostRecord>> {
        Ok(self.lock()?.logs.get(&day).cloned().unwrap_or_default())
    }

    async fn prune_logs_before(&self, cutoff: NaiveDate) -> anyhow::Result<usize> {
        let mut inner = self.lock()?;
        let kept = inner.logs.split_off(&cutoff);
        let removed = std::mem::replace(&mut inner.logs, kept);
        Ok(removed.values().map(Vec::len).sum())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// SQLite-backed ledger store.
///
/// An increment runs the upsert and the month sum in one closure on the
/// shared connection, so no other statement lands between them.
#[derive(Debug, Clone)]
pub struct SqliteLedgerStore {
    db: SqliteDb,
}

impl SqliteLedgerStore {
    pub fn new(db: SqliteDb) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn add_spend(&self, day: NaiveDate, amount: f64) -> anyhow::Result<SpendTotals> {
        let key = daily_key(day);
        let pattern = month_pattern(day.year(), day.month());
        self.db
            .call(move |conn| {
                let tx = conn.unchecked_transaction()?;
                let daily: f64 = tx.query_row(
                    "INSERT INTO counters (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = value + excluded.value
                     RETURNING value",
                    params![key, amount],
                    |row| row.get(0),
                )?;
                let monthly: f64 = tx.query_row(
                    "SELECT COALESCE(SUM(value), 0.0) FROM counters WHERE key LIKE ?1",
                    params![pattern],
                    |row| row.get(0),
                )?;
                tx.commit()?;
                Ok(SpendTotals { daily, monthly })
            })
            .await
    }

    async fn daily_total(&self, day: NaiveDate) -> anyhow::Result<f64> {
        let key = daily_key(day);
        let value: Option<f64> = self
            .db
            .call(move |conn| {
                conn.query_row("SELECT value FROM counters WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()
            })
            .await?;
        Ok(value.unwrap_or(0.0))
    }

    async fn monthly_total(&self, year: i32, month: u32) -> anyhow::Result<f64> {
        let pattern = month_pattern(year, month);
        self.db
            .call(move |conn| {
                conn.query_row(
                    "SELECT COALESCE(SUM(value), 0.0) FROM counters WHERE key LIKE ?1",
                    params![pattern],
                    |row| row.get(0),
                )
            })
            .await
    }

    async fn append_record(&self, day: NaiveDate, record: &CostRecord) -> anyhow::Result<()> {
        let key = log_key(day);
        let day = day.format("%Y-%m-%d").to_string();
        let payload = serde_json::to_string(record)?;
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO cost_log (key, day, payload) VALUES (?1, ?2, ?3)",
                    params![key, day, payload],
                )
            })
            .await?;
        Ok(())
    }

    async fn records(&self, day: NaiveDate) -> anyhow::Result<Vec<CostRecord>> {
        let key = log_key(day);
        let payloads: Vec<String> = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT payload FROM cost_log WHERE key = ?1 ORDER BY id")?;
                let rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;
                rows.collect()
            })
            .await?;

        let mut records = Vec::with_capacity(payloads.len());
        for payload in payloads {
            match serde_json::from_str(&payload) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping unreadable cost record: {}", e),
            }
        }
        Ok(records)
    }

    async fn prune_logs_before(&self, cutoff: NaiveDate) -> anyhow::Result<usize> {
        let cutoff = cutoff.format("%Y-%m-%d").to_string();
        self.db
            .call(move |conn| conn.execute("DELETE FROM cost_log WHERE day < ?1", params![cutoff]))
            .await
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
