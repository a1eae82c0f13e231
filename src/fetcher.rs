//! Cost and drill-down fetchers.
//!
//! Both take the user identity explicitly. Without one nothing is requested
//! and nothing is reported: access is gated further out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::{CostBackend, CostQuery, DetailQuery};
use crate::error::{CostError, ErrorKind};
use crate::types::{CostDetailLine, CostFilter, PlotCost};

/// Fixed budget for the per-plot cost query.
pub const COST_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Resolved, authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

#[derive(Debug)]
pub enum FetchOutcome {
    /// No session; no request was issued.
    Skipped,
    Loaded(Vec<PlotCost>),
    Empty,
    Failed(CostError),
}

impl FetchOutcome {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            FetchOutcome::Skipped => Some(ErrorKind::AuthMissing),
            FetchOutcome::Loaded(_) => None,
            FetchOutcome::Empty => Some(ErrorKind::EmptyResult),
            FetchOutcome::Failed(e) => Some(e.kind()),
        }
    }
}

#[derive(Debug)]
pub enum DetailOutcome {
    Skipped,
    Lines(Vec<CostDetailLine>),
}

pub struct CostFetcher<B: CostBackend + ?Sized> {
    backend: Arc<B>,
    timeout: Duration,
}

impl<B: CostBackend + ?Sized> Clone for CostFetcher<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            timeout: self.timeout,
        }
    }
}

impl<B: CostBackend + ?Sized> CostFetcher<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_timeout(backend, COST_FETCH_TIMEOUT)
    }

    pub fn with_timeout(backend: Arc<B>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// One request raced against the timeout. Errors and timeouts become
    /// `Failed`; there is no retry and no cache.
    pub async fn fetch_plot_costs(
        &self,
        session: Option<&Session>,
        filter: &CostFilter,
    ) -> FetchOutcome {
        let Some(session) = session else {
            tracing::debug!("No session, skipping cost fetch");
            return FetchOutcome::Skipped;
        };
        let query = CostQuery::new(&session.user_id, filter);
        let started = Instant::now();
        tracing::info!(
            "Fetching plot costs (backend={}, season={}, plots={})",
            self.backend.backend_tag(),
            filter.season,
            filter.plot_names.len()
        );

        let result =
            tokio::time::timeout(self.timeout, self.backend.fetch_plot_costs(&query)).await;
        let elapsed_ms = started.elapsed().as_millis();
        match result {
            Ok(Ok(rows)) if rows.is_empty() => {
                tracing::info!("No plot costs for season {} ({}ms)", filter.season, elapsed_ms);
                FetchOutcome::Empty
            }
            Ok(Ok(rows)) => {
                tracing::info!("Loaded {} plot cost rows ({}ms)", rows.len(), elapsed_ms);
                FetchOutcome::Loaded(rows)
            }
            Ok(Err(e)) => {
                tracing::warn!("Plot cost fetch failed: {}", e);
                FetchOutcome::Failed(e)
            }
            Err(_) => {
                tracing::warn!("Plot cost fetch timed out after {:?}", self.timeout);
                FetchOutcome::Failed(CostError::Timeout(self.timeout))
            }
        }
    }

    /// Itemized lines for one plot. No local timeout; failures collapse to
    /// an empty list.
    pub async fn fetch_cost_details(
        &self,
        session: Option<&Session>,
        plot_id: &str,
        filter: &CostFilter,
    ) -> DetailOutcome {
        let Some(session) = session else {
            return DetailOutcome::Skipped;
        };
        let query = DetailQuery::new(&session.user_id, plot_id, filter);
        match self.backend.fetch_cost_details(&query).await {
            Ok(lines) => {
                tracing::info!("Loaded {} detail lines for plot {}", lines.len(), plot_id);
                DetailOutcome::Lines(lines)
            }
            Err(e) => {
                tracing::warn!("Detail fetch for plot {} failed: {}", plot_id, e);
                DetailOutcome::Lines(Vec::new())
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeBackend;
    use super::*;
    use crate::filter::FilterState;
    use crate::types::CategoryTotals;
    use chrono::NaiveDate;
    use std::sync::atomic::Ordering;

    fn filter() -> CostFilter {
        FilterState::new(NaiveDate::from_ymd_opt(2024, 9, 1).unwrap())
            .current()
            .clone()
    }

    fn plot(id: &str) -> PlotCost {
        let totals = CategoryTotals {
            inputs: 100.0,
            ..Default::default()
        };
        PlotCost::new(id, id, 1.0, totals)
    }

    #[tokio::test]
    async fn test_missing_session_is_silent() {
        let backend = Arc::new(FakeBackend::default());
        let fetcher = CostFetcher::new(backend.clone());

        let outcome = fetcher.fetch_plot_costs(None, &filter()).await;
        assert!(matches!(outcome, FetchOutcome::Skipped));
        assert_eq!(outcome.kind(), Some(ErrorKind::AuthMissing));
        let details = fetcher.fetch_cost_details(None, "t1", &filter()).await;
        assert!(matches!(details, DetailOutcome::Skipped));
        assert_eq!(backend.cost_calls.load(Ordering::Relaxed), 0);
        assert_eq!(backend.detail_calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_loaded_and_empty() {
        let session = Session::new("user-1");
        let empty = CostFetcher::new(Arc::new(FakeBackend::default()));
        let outcome = empty.fetch_plot_costs(Some(&session), &filter()).await;
        assert!(matches!(outcome, FetchOutcome::Empty));

        let backend = FakeBackend {
            plots: vec![plot("t1"), plot("t2")],
            ..Default::default()
        };
        let fetcher = CostFetcher::new(Arc::new(backend));
        match fetcher.fetch_plot_costs(Some(&session), &filter()).await {
            FetchOutcome::Loaded(rows) => assert_eq!(rows.len(), 2),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_times_out_at_15s() {
        let backend = FakeBackend {
            plots: vec![plot("t1")],
            cost_delay: Duration::from_secs(60),
            ..Default::default()
        };
        let fetcher = CostFetcher::new(Arc::new(backend));
        let started = tokio::time::Instant::now();

        let outcome = fetcher
            .fetch_plot_costs(Some(&Session::new("user-1")), &filter())
            .await;

        assert!(matches!(outcome, FetchOutcome::Failed(CostError::Timeout(_))));
        assert_eq!(outcome.kind(), Some(ErrorKind::NetworkTimeout));
        let elapsed = started.elapsed();
        assert!(elapsed >= COST_FETCH_TIMEOUT && elapsed < Duration::from_secs(16));
    }

    #[tokio::test]
    async fn test_backend_error_is_network_error() {
        let backend = FakeBackend {
            fail_costs: true,
            ..Default::default()
        };
        let fetcher = CostFetcher::new(Arc::new(backend));
        let outcome = fetcher
            .fetch_plot_costs(Some(&Session::new("user-1")), &filter())
            .await;
        assert_eq!(outcome.kind(), Some(ErrorKind::NetworkError));
    }

    #[tokio::test]
    async fn test_detail_errors_become_empty() {
        let backend = FakeBackend {
            fail_details: true,
            ..Default::default()
        };
        let fetcher = CostFetcher::new(Arc::new(backend));
        match fetcher
            .fetch_cost_details(Some(&Session::new("user-1")), "t1", &filter())
            .await
        {
            DetailOutcome::Lines(lines) => assert!(lines.is_empty()),
            DetailOutcome::Skipped => panic!("session was present"),
        }
    }
}
