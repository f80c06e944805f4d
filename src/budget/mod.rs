//! Budget module - spend governance for paid AI calls.
//!
//! # Key Concepts
//! - Ledger: admission check before a paid call, cost recording after it
//! - Store: per-day counters and cost logs (in-memory or SQLite)
//! - Pricing: per-provider rates used to turn usage into USD

mod ledger;
mod pricing;
mod store;

pub use ledger::{
    AlertSink, BudgetAlert, BudgetLedger, BudgetLimits, BudgetStats, CostRecord, LogAlertSink,
    Period, ServiceBreakdown, LOG_RETENTION_DAYS,
};
pub use pricing::Pricing;
pub use store::{daily_key, log_key, LedgerStore, MemoryLedgerStore, SpendTotals, SqliteLedgerStore};
