use std::time::Duration;

use chrono::NaiveDate;
use moka::future::Cache;
use tads_models::analysis::{AnalysisReport, AnalystKind};

type ReportKey = (String, NaiveDate, AnalystKind);

/// In-memory cache of successful analyst reports.
///
/// Keyed by (symbol, trade date, analyst). Entries are evicted after the TTL.
/// Degraded reports are never cached.
pub struct ReportCache {
    inner: Cache<ReportKey, AnalysisReport>,
}

impl ReportCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(
        &self,
        symbol: &str,
        trade_date: NaiveDate,
        analyst: AnalystKind,
    ) -> Option<AnalysisReport> {
        self.inner
            .get(&(symbol.to_string(), trade_date, analyst))
            .await
    }

    /// Cache a report. Returns false for degraded reports, which are skipped.
    pub async fn insert(&self, report: &AnalysisReport) -> bool {
        if report.is_degraded() {
            return false;
        }
        self.inner
            .insert(
                (report.symbol.clone(), report.trade_date, report.analyst),
                report.clone(),
            )
            .await;
        true
    }

    pub async fn invalidate(&self, symbol: &str, trade_date: NaiveDate, analyst: AnalystKind) {
        self.inner
            .invalidate(&(symbol.to_string(), trade_date, analyst))
            .await;
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}
