use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tads_models::analysis::{AnalysisReport, AnalystKind, AnalystRequest, ReportRating};
use tads_models::trading_state::MarketData;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::analyst::AnalystCapability;
use crate::error::AgentError;
use crate::report_cache::ReportCache;

/// Reports gathered by one fan-out. When `cancelled` is set, analysts that
/// had not finished carry an `error` report with a "cancelled" warning.
#[derive(Debug, Clone)]
pub struct CollectOutcome {
    pub reports: Vec<AnalysisReport>,
    pub cancelled: bool,
}

impl CollectOutcome {
    pub fn into_result(self) -> Result<Vec<AnalysisReport>, AgentError> {
        if self.cancelled {
            Err(AgentError::Cancelled)
        } else {
            Ok(self.reports)
        }
    }
}

/// Runs every analyst as its own task and waits for all of them.
///
/// Failures and timeouts never fail the fan-out; they become degraded reports.
#[derive(Default)]
pub struct ReportAggregator {
    cache: Option<Arc<ReportCache>>,
}

impl ReportAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(cache: Arc<ReportCache>) -> Self {
        Self { cache: Some(cache) }
    }

    pub async fn collect(
        &self,
        symbol: &str,
        trade_date: NaiveDate,
        market_data: &[MarketData],
        analysts: &[Arc<dyn AnalystCapability>],
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> CollectOutcome {
        let start = Instant::now();
        let mut reports = Vec::with_capacity(analysts.len());
        let mut handles = Vec::new();

        for analyst in analysts {
            let kind = analyst.kind();
            if let Some(cache) = &self.cache {
                if let Some(hit) = cache.get(symbol, trade_date, kind).await {
                    info!(analyst = %kind, symbol, "Analyst report served from cache");
                    reports.push(hit);
                    continue;
                }
            }

            let analyst = Arc::clone(analyst);
            let request = AnalystRequest {
                request_id: Uuid::new_v4(),
                analyst: kind,
                symbol: symbol.to_string(),
                trade_date,
                market_data: market_data.to_vec(),
            };
            handles.push((
                kind,
                tokio::spawn(async move {
                    let agent_start = Instant::now();
                    let result = tokio::time::timeout(deadline, analyst.analyze(&request)).await;
                    (result, agent_start.elapsed())
                }),
            ));
        }

        let mut cancelled = false;
        for (kind, mut handle) in handles {
            // After cancellation only tasks that already finished are joined.
            let joined = if cancelled {
                if handle.is_finished() {
                    Some((&mut handle).await)
                } else {
                    None
                }
            } else {
                tokio::select! {
                    biased;
                    joined = &mut handle => Some(joined),
                    _ = cancel.cancelled() => None,
                }
            };
            let Some(joined) = joined else {
                handle.abort();
                cancelled = true;
                warn!(analyst = %kind, symbol, "Analyst aborted by cancellation");
                reports.push(cancelled_report(kind, symbol, trade_date));
                continue;
            };

            let report = match joined {
                Ok((Ok(Ok(mut report)), elapsed)) => {
                    report.analyst = kind;
                    match report.validate() {
                        Ok(()) => {
                            info!(
                                analyst = %kind,
                                rating = report.rating.as_str(),
                                confidence = %report.confidence,
                                elapsed_ms = elapsed.as_millis(),
                                "Analyst succeeded"
                            );
                            if let Some(cache) = &self.cache {
                                cache.insert(&report).await;
                            }
                            report
                        }
                        Err(e) => {
                            warn!(analyst = %kind, error = %e, "Analyst report rejected");
                            AnalysisReport::degraded(
                                kind,
                                symbol,
                                trade_date,
                                ReportRating::Error,
                                format!("{kind} analyst report rejected: {e}"),
                            )
                        }
                    }
                }
                Ok((Ok(Err(e)), elapsed)) => {
                    warn!(analyst = %kind, error = %e, elapsed_ms = elapsed.as_millis(), "Analyst failed");
                    AnalysisReport::degraded(
                        kind,
                        symbol,
                        trade_date,
                        ReportRating::Error,
                        format!("{kind} analyst failed: {e}"),
                    )
                }
                Ok((Err(_), elapsed)) => {
                    let timeout = AgentError::timeout(kind.agent_name(), deadline.as_secs());
                    warn!(analyst = %kind, error = %timeout, elapsed_ms = elapsed.as_millis(), "Analyst timed out");
                    AnalysisReport::degraded(
                        kind,
                        symbol,
                        trade_date,
                        ReportRating::Timeout,
                        timeout.to_string(),
                    )
                }
                Err(e) => {
                    error!(analyst = %kind, error = %e, "Analyst task panicked");
                    AnalysisReport::degraded(
                        kind,
                        symbol,
                        trade_date,
                        ReportRating::Error,
                        format!("{kind} analyst task failed: {e}"),
                    )
                }
            };
            reports.push(report);
        }

        info!(
            symbol,
            reports = reports.len(),
            degraded = reports.iter().filter(|r| r.is_degraded()).count(),
            cancelled,
            elapsed_ms = start.elapsed().as_millis(),
            "Analyst fan-out complete"
        );

        CollectOutcome { reports, cancelled }
    }
}

fn cancelled_report(kind: AnalystKind, symbol: &str, trade_date: NaiveDate) -> AnalysisReport {
    AnalysisReport::degraded(
        kind,
        symbol,
        trade_date,
        ReportRating::Error,
        format!("{kind} analyst cancelled"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockAnalyst;
    use rust_decimal_macros::dec;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[tokio::test]
    async fn failures_and_timeouts_become_degraded_reports() {
        let ok = Arc::new(MockAnalyst::new(AnalystKind::Market, ReportRating::Bullish, dec!(0.8)));
        let failing = Arc::new(MockAnalyst::failing(AnalystKind::News));
        let slow = Arc::new(MockAnalyst::slow(AnalystKind::Social, Duration::from_secs(5)));
        let analysts = vec![
            ok as Arc<dyn AnalystCapability>,
            failing as Arc<dyn AnalystCapability>,
            slow as Arc<dyn AnalystCapability>,
        ];

        let outcome = ReportAggregator::new()
            .collect(
                "AAPL",
                date(),
                &[],
                &analysts,
                Duration::from_millis(50),
                &CancellationToken::new(),
            )
            .await;

        assert!(!outcome.cancelled);
        assert_eq!(outcome.reports.len(), 3);
        assert_eq!(outcome.reports[0].rating, ReportRating::Bullish);
        assert_eq!(outcome.reports[1].rating, ReportRating::Error);
        assert!(outcome.reports[1].content.is_empty());
        assert!(outcome.reports[1].warning.is_some());
        assert_eq!(outcome.reports[2].rating, ReportRating::Timeout);
        assert!(outcome.reports[2].warning.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn cancellation_keeps_finished_reports() {
        let fast = Arc::new(MockAnalyst::new(AnalystKind::Market, ReportRating::Neutral, dec!(0.5)));
        let slow = Arc::new(MockAnalyst::slow(AnalystKind::Fundamentals, Duration::from_secs(30)));
        let analysts = vec![
            fast as Arc<dyn AnalystCapability>,
            slow as Arc<dyn AnalystCapability>,
        ];

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = ReportAggregator::new()
            .collect("AAPL", date(), &[], &analysts, Duration::from_secs(60), &cancel)
            .await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.reports[0].rating, ReportRating::Neutral);
        assert_eq!(outcome.reports[1].rating, ReportRating::Error);
        assert!(outcome.reports[1].warning.as_deref().unwrap().contains("cancelled"));
        assert!(matches!(outcome.into_result(), Err(AgentError::Cancelled)));
    }

    #[tokio::test]
    async fn cancellation_keeps_reports_finished_behind_a_slow_analyst() {
        let cache = Arc::new(ReportCache::new(10, Duration::from_secs(60)));
        let slow = Arc::new(MockAnalyst::slow(AnalystKind::Fundamentals, Duration::from_secs(30)));
        let fast = Arc::new(MockAnalyst::new(AnalystKind::Market, ReportRating::Bullish, dec!(0.8)));
        let analysts = vec![
            slow as Arc<dyn AnalystCapability>,
            fast.clone() as Arc<dyn AnalystCapability>,
        ];

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let outcome = ReportAggregator::with_cache(cache.clone())
            .collect("AAPL", date(), &[], &analysts, Duration::from_secs(60), &cancel)
            .await;

        assert!(outcome.cancelled);
        assert_eq!(fast.calls(), 1);
        assert_eq!(outcome.reports[0].rating, ReportRating::Error);
        assert!(outcome.reports[0].warning.as_deref().unwrap().contains("cancelled"));
        assert_eq!(outcome.reports[1].analyst, AnalystKind::Market);
        assert_eq!(outcome.reports[1].rating, ReportRating::Bullish);
        assert!(outcome.reports[1].warning.is_none());
        assert!(cache.get("AAPL", date(), AnalystKind::Market).await.is_some());
    }

    #[tokio::test]
    async fn cached_reports_skip_the_analyst() {
        let cache = Arc::new(ReportCache::new(10, Duration::from_secs(60)));
        let analyst = Arc::new(MockAnalyst::new(AnalystKind::Market, ReportRating::Bullish, dec!(0.7)));
        let analysts = vec![analyst.clone() as Arc<dyn AnalystCapability>];
        let aggregator = ReportAggregator::with_cache(cache.clone());

        for _ in 0..2 {
            let outcome = aggregator
                .collect("AAPL", date(), &[], &analysts, Duration::from_secs(1), &CancellationToken::new())
                .await;
            assert_eq!(outcome.reports[0].rating, ReportRating::Bullish);
        }
        assert_eq!(analyst.calls(), 1);
    }
}
