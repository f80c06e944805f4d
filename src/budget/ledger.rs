//! The budget ledger: admission checks, spend recording, stats.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::store::LedgerStore;
use crate::clock::SharedClock;

/// Cost logs older than this are pruned.
pub const LOG_RETENTION_DAYS: i64 = 90;

/// Spend limits and policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetLimits {
    pub daily_usd: f64,
    pub monthly_usd: f64,
    /// Fraction of a limit (0-1) at which an alert fires.
    pub alert_threshold: f64,
    /// Administrative override: admit every request.
    pub skip_checks: bool,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            daily_usd: 50.0,
            monthly_usd: 1500.0,
            alert_threshold: 0.8,
            skip_checks: false,
        }
    }
}

/// One billed call. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    #[serde(rename = "costUSD")]
    pub cost_usd: f64,
    #[serde(rename = "costBDT")]
    pub cost_bdt: f64,
    #[serde(default)]
    pub usage: serde_json::Value,
}

impl CostRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        service: impl Into<String>,
        cost_usd: f64,
        usd_to_bdt: f64,
        usage: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            service: service.into(),
            cost_usd,
            cost_bdt: cost_usd * usd_to_bdt,
            usage,
        }
    }
}

/// Snapshot of current spend against limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BudgetStats {
    pub today: f64,
    pub month: f64,
    pub daily_budget: f64,
    pub monthly_budget: f64,
    pub daily_remaining: f64,
    pub monthly_remaining: f64,
    /// Percent of the daily limit used.
    pub utilization_daily: f64,
    /// Percent of the monthly limit used.
    pub utilization_monthly: f64,
}

/// Per-service aggregate for one day.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBreakdown {
    pub count: u64,
    pub total_cost: f64,
    pub avg_cost: f64,
}

/// Budget period granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Daily,
    Monthly,
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Monthly => write!(f, "monthly"),
        }
    }
}

/// Raised when spend crosses the alert threshold of a limit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetAlert {
    pub period: Period,
    /// Percent of the limit used.
    pub utilization: f64,
    pub spent: f64,
    pub limit: f64,
    pub remaining: f64,
}

/// Receiver of budget alerts.
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: &BudgetAlert);
}

/// Writes alerts to the log.
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, alert: &BudgetAlert) {
        tracing::warn!(
            period = %alert.period,
            utilization = alert.utilization,
            "AI budget alert: {} spending has reached {:.1}% of budget (current ${:.2}, budget ${:.2}, remaining ${:.2})",
            alert.period,
            alert.utilization,
            alert.spent,
            alert.limit,
            alert.remaining
        );
    }
}

/// Process-wide spend governor.
pub struct BudgetLedger {
    store: Arc<dyn LedgerStore>,
    limits: BudgetLimits,
    usd_to_bdt: f64,
    clock: SharedClock,
    alerts: Arc<dyn AlertSink>,
    log_records: bool,
    last_prune: Mutex<Option<NaiveDate>>,
}

impl BudgetLedger {
    pub fn new(store: Arc<dyn LedgerStore>, limits: BudgetLimits, clock: SharedClock) -> Self {
        Self {
            store,
            limits,
            usd_to_bdt: 110.0,
            clock,
            alerts: Arc::new(LogAlertSink),
            log_records: false,
            last_prune: Mutex::new(None),
        }
    }

    /// Fixed USD to BDT conversion used for `cost_bdt`.
    pub fn with_exchange_rate(mut self, usd_to_bdt: f64) -> Self {
        self.usd_to_bdt = usd_to_bdt;
        self
    }

    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alerts = sink;
        self
    }

    /// Emit every cost record as a structured log line.
    pub fn with_record_logging(mut self, enabled: bool) -> Self {
        self.log_records = enabled;
        self
    }

    pub fn limits(&self) -> &BudgetLimits {
        &self.limits
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Whether a paid call for `service` may proceed.
    ///
    /// Gates on today's spend only: denies once it has reached the daily
    /// limit. The monthly total feeds stats and alerts. A storage failure
    /// admits the call.
    pub async fn check_budget(&self, service: &str) -> bool {
        if self.limits.skip_checks {
            return true;
        }

        let daily = match self.store.daily_total(self.clock.today()).await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("Budget check for {} could not read spend: {}", service, e);
                return true;
            }
        };

        if daily >= self.limits.daily_usd {
            tracing::warn!(
                "Daily budget exceeded: ${:.2}/${} (service={})",
                daily,
                self.limits.daily_usd,
                service
            );
            return false;
        }
        true
    }

    /// Record a billed call. Storage failures are logged, never returned.
    pub async fn track_cost(
        &self,
        service: &str,
        cost_usd: f64,
        usage: serde_json::Value,
    ) -> CostRecord {
        let cost_usd = if cost_usd.is_finite() && cost_usd > 0.0 {
            cost_usd
        } else {
            if cost_usd != 0.0 {
                tracing::warn!("Ignoring invalid cost {} for {}", cost_usd, service);
            }
            0.0
        };

        let now = self.clock.now();
        let today = now.date_naive();
        let record = CostRecord::new(now, service, cost_usd, self.usd_to_bdt, usage);

        match self.store.add_spend(today, cost_usd).await {
            Ok(after) => {
                self.check_alert(Period::Daily, after.daily - cost_usd, after.daily);
                self.check_alert(Period::Monthly, after.monthly - cost_usd, after.monthly);
            }
            Err(e) => tracing::error!("Failed to record spend for {}: {}", service, e),
        }

        if let Err(e) = self.store.append_record(today, &record).await {
            tracing::error!("Failed to append cost record for {}: {}", service, e);
        }

        self.prune_if_due(today).await;

        if self.log_records {
            tracing::info!(
                target: "truetalk_ai::cost",
                service = %record.service,
                cost_usd = record.cost_usd,
                cost_bdt = record.cost_bdt,
                usage = %record.usage,
                "cost recorded"
            );
        }

        record
    }

    /// Current spend against limits for the clock's date.
    ///
    /// A new day reads a fresh counter, so `today` is 0 after rollover while
    /// the previous day's counter stays untouched.
    pub async fn get_stats(&self) -> BudgetStats {
        let today = self.clock.today();
        let daily = self.store.daily_total(today).await.unwrap_or_else(|e| {
            tracing::error!("Failed to read daily spend: {}", e);
            0.0
        });
        let monthly = self
            .store
            .monthly_total(today.year(), today.month())
            .await
            .unwrap_or_else(|e| {
                tracing::error!("Failed to read monthly spend: {}", e);
                0.0
            });

        BudgetStats {
            today: daily,
            month: monthly,
            daily_budget: self.limits.daily_usd,
            monthly_budget: self.limits.monthly_usd,
            daily_remaining: (self.limits.daily_usd - daily).max(0.0),
            monthly_remaining: (self.limits.monthly_usd - monthly).max(0.0),
            utilization_daily: utilization(daily, self.limits.daily_usd),
            utilization_monthly: utilization(monthly, self.limits.monthly_usd),
        }
    }

    /// Per-service totals for `date` (defaults to today).
    pub async fn cost_breakdown(&self, date: Option<NaiveDate>) -> BTreeMap<String, ServiceBreakdown> {
        let date = date.unwrap_or_else(|| self.clock.today());
        let records = self.store.records(date).await.unwrap_or_else(|e| {
            tracing::error!("Failed to read cost log for {}: {}", date, e);
            Vec::new()
        });

        let mut breakdown: BTreeMap<String, ServiceBreakdown> = BTreeMap::new();
        for record in records {
            let entry = breakdown.entry(record.service).or_default();
            entry.count += 1;
            entry.total_cost += record.cost_usd;
        }
        for entry in breakdown.values_mut() {
            entry.avg_cost = entry.total_cost / entry.count as f64;
        }
        breakdown
    }

    fn check_alert(&self, period: Period, before: f64, after: f64) {
        let limit = match period {
            Period::Daily => self.limits.daily_usd,
            Period::Monthly => self.limits.monthly_usd,
        };
        if limit <= 0.0 {
            return;
        }

        let trigger = limit * self.limits.alert_threshold;
        if before < trigger && after >= trigger {
            self.alerts.notify(&BudgetAlert {
                period,
                utilization: utilization(after, limit),
                spent: after,
                limit,
                remaining: (limit - after).max(0.0),
            });
        }
    }

    async fn prune_if_due(&self, today: NaiveDate) {
        {
            let Ok(mut last) = self.last_prune.lock() else {
                return;
            };
            if *last == Some(today) {
                return;
            }
            *last = Some(today);
        }

        let cutoff = today - Duration::days(LOG_RETENTION_DAYS);
        match self.store.prune_logs_before(cutoff).await {
            Ok(0) => {}
            Ok(n) => tracing::debug!("Pruned {} cost records older than {}", n, cutoff),
            Err(e) => tracing::warn!("Failed to prune cost logs: {}", e),
        }
    }
}

fn utilization(spent: f64, limit: f64) -> f64 {
    if limit > 0.0 {
        spent / limit * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::store::MemoryLedgerStore;
    use crate::clock::Clock;
    use crate::testing::{ManualClock, RecordingAlertSink};

    fn limits(daily: f64, monthly: f64) -> BudgetLimits {
        BudgetLimits {
            daily_usd: daily,
            monthly_usd: monthly,
            alert_threshold: 0.8,
            skip_checks: false,
        }
    }

    fn ledger_with(limits: BudgetLimits, clock: Arc<ManualClock>) -> (BudgetLedger, Arc<MemoryLedgerStore>) {
        let store = Arc::new(MemoryLedgerStore::new());
        let ledger = BudgetLedger::new(store.clone(), limits, clock);
        (ledger, store)
    }

    #[tokio::test]
    async fn test_fresh_ledger_admits() {
        let clock = Arc::new(ManualClock::at(2026, 3, 14));
        let (ledger, _) = ledger_with(limits(10.0, 1000.0), clock);
        assert!(ledger.check_budget("chatbot").await);
        assert_eq!(ledger.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_check_budget_exact_limit_denies() {
        let clock = Arc::new(ManualClock::at(2026, 3, 14));
        let (ledger, _) = ledger_with(limits(10.0, 1000.0), clock);

        ledger.track_cost("embedding", 4.0, serde_json::Value::Null).await;
        assert!(ledger.check_budget("embedding").await);
        ledger.track_cost("embedding", 6.0, serde_json::Value::Null).await;
        assert!(!ledger.check_budget("embedding").await);
    }

    #[tokio::test]
    async fn test_monthly_total_over_limit_still_admits_under_daily() {
        let clock = Arc::new(ManualClock::at(2026, 3, 10));
        let (ledger, _) = ledger_with(limits(50.0, 60.0), clock.clone());

        ledger.track_cost("chatbot", 40.0, serde_json::Value::Null).await;
        clock.advance_days(1);
        ledger.track_cost("chatbot", 20.0, serde_json::Value::Null).await;

        let stats = ledger.get_stats().await;
        assert_eq!(stats.today, 20.0);
        assert_eq!(stats.month, 60.0);
        assert_eq!(stats.monthly_remaining, 0.0);
        assert!(ledger.check_budget("chatbot").await);
    }

    #[tokio::test]
    async fn test_concurrent_spend_fires_monthly_alert_once() {
        let clock = Arc::new(ManualClock::at(2026, 3, 14));
        let sink = Arc::new(RecordingAlertSink::default());
        let (ledger, _) = ledger_with(limits(1000.0, 100.0), clock);
        let ledger = Arc::new(ledger.with_alert_sink(sink.clone()));

        let mut handles = Vec::new();
        for _ in 0..40 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger.track_cost("chatbot", 5.0, serde_json::Value::Null).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let monthly: Vec<_> = sink
            .alerts()
            .into_iter()
            .filter(|a| a.period == Period::Monthly)
            .collect();
        assert_eq!(monthly.len(), 1);
        assert_eq!(monthly[0].spent, 80.0);
    }

    #[tokio::test]
    async fn test_skip_checks_always_admits() {
        let clock = Arc::new(ManualClock::at(2026, 3, 14));
        let mut l = limits(1.0, 1.0);
        l.skip_checks = true;
        let (ledger, _) = ledger_with(l, clock);

        ledger.track_cost("chatbot", 5.0, serde_json::Value::Null).await;
        assert!(ledger.check_budget("chatbot").await);
    }

    #[tokio::test]
    async fn test_rollover_reports_zero_without_touching_history() {
        let clock = Arc::new(ManualClock::at(2026, 3, 14));
        let (ledger, store) = ledger_with(limits(50.0, 1500.0), clock.clone());
        let day_d = clock.today();

        ledger.track_cost("chatbot", 40.0, serde_json::Value::Null).await;
        assert!(ledger.check_budget("chatbot").await);

        clock.advance_days(1);
        let stats = ledger.get_stats().await;
        assert_eq!(stats.today, 0.0);
        assert_eq!(stats.month, 40.0);
        assert_eq!(stats.daily_remaining, 50.0);

        assert_eq!(store.daily_total(day_d).await.unwrap(), 40.0);
        assert_eq!(store.records(day_d).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_track_cost_record_fields() {
        let clock = Arc::new(ManualClock::at(2026, 3, 14));
        let (ledger, _) = ledger_with(limits(50.0, 1500.0), clock);
        let ledger = ledger.with_exchange_rate(120.0);

        let record = ledger
            .track_cost("embedding", 0.5, serde_json::json!({"total_tokens": 42}))
            .await;
        assert_eq!(record.service, "embedding");
        assert_eq!(record.cost_usd, 0.5);
        assert_eq!(record.cost_bdt, 60.0);
        assert_eq!(record.usage["total_tokens"], 42);
    }

    #[tokio::test]
    async fn test_negative_cost_is_recorded_as_zero() {
        let clock = Arc::new(ManualClock::at(2026, 3, 14));
        let (ledger, _) = ledger_with(limits(50.0, 1500.0), clock);

        ledger.track_cost("chatbot", 2.0, serde_json::Value::Null).await;
        let record = ledger.track_cost("chatbot", -1.0, serde_json::Value::Null).await;
        assert_eq!(record.cost_usd, 0.0);
        assert_eq!(ledger.get_stats().await.today, 2.0);
    }

    #[tokio::test]
    async fn test_alert_fires_once_when_threshold_crossed() {
        let clock = Arc::new(ManualClock::at(2026, 3, 14));
        let sink = Arc::new(RecordingAlertSink::default());
        let (ledger, _) = ledger_with(limits(10.0, 1000.0), clock);
        let ledger = ledger.with_alert_sink(sink.clone());

        ledger.track_cost("chatbot", 7.0, serde_json::Value::Null).await;
        assert!(sink.alerts().is_empty());

        ledger.track_cost("chatbot", 1.5, serde_json::Value::Null).await;
        let alerts = sink.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].period, Period::Daily);
        assert_eq!(alerts[0].spent, 8.5);

        ledger.track_cost("chatbot", 0.5, serde_json::Value::Null).await;
        assert_eq!(sink.alerts().len(), 1);
    }

    #[tokio::test]
    async fn test_stats_utilization() {
        let clock = Arc::new(ManualClock::at(2026, 3, 14));
        let (ledger, _) = ledger_with(limits(50.0, 1500.0), clock);

        ledger.track_cost("chatbot", 25.0, serde_json::Value::Null).await;
        let stats = ledger.get_stats().await;
        assert_eq!(stats.utilization_daily, 50.0);
        assert_eq!(stats.daily_remaining, 25.0);
        assert_eq!(stats.monthly_remaining, 1475.0);
    }

    #[tokio::test]
    async fn test_cost_breakdown_groups_by_service() {
        let clock = Arc::new(ManualClock::at(2026, 3, 14));
        let (ledger, _) = ledger_with(limits(50.0, 1500.0), clock);

        ledger.track_cost("chatbot", 1.0, serde_json::Value::Null).await;
        ledger.track_cost("chatbot", 3.0, serde_json::Value::Null).await;
        ledger.track_cost("embedding", 0.5, serde_json::Value::Null).await;

        let breakdown = ledger.cost_breakdown(None).await;
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown["chatbot"].count, 2);
        assert_eq!(breakdown["chatbot"].total_cost, 4.0);
        assert_eq!(breakdown["chatbot"].avg_cost, 2.0);
        assert_eq!(breakdown["embedding"].count, 1);
    }

    #[tokio::test]
    async fn test_old_logs_are_pruned() {
        let clock = Arc::new(ManualClock::at(2026, 1, 1));
        let (ledger, store) = ledger_with(limits(50.0, 1500.0), clock.clone());
        let first_day = clock.today();

        ledger.track_cost("chatbot", 1.0, serde_json::Value::Null).await;
        clock.advance_days(LOG_RETENTION_DAYS + 1);
        ledger.track_cost("chatbot", 1.0, serde_json::Value::Null).await;

        assert!(store.records(first_day).await.unwrap().is_empty());
        assert_eq!(store.daily_total(first_day).await.unwrap(), 1.0);
    }
}
