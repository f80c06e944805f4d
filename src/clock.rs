//! Wall-clock abstraction.
//!
//! Budget periods and cache expiry both depend on "now". Components take an
//! `Arc<dyn Clock>` so tests can move time forward without sleeping.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current UTC calendar date (the budget period key).
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Create the default shared clock.
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
