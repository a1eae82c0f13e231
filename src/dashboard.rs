//! Ties filter state, fetchers and view state together.
//!
//! Every filter change refetches the plot costs. Selecting a plot opens the
//! drill-down and fetches its lines. The session is injected once here and
//! handed to every fetch.

use chrono::NaiveDate;

use crate::backend::CostBackend;
use crate::fetcher::{CostFetcher, DetailOutcome, FetchOutcome, Session};
use crate::filter::{FilterPatch, FilterState};
use crate::state::{CostView, DrillDown, RequestTicket};
use crate::types::{Category, CostFilter};

/// A cost fetch that has been started but not applied yet.
#[derive(Debug, Clone)]
pub struct ReloadRequest {
    pub ticket: RequestTicket,
    pub filter: CostFilter,
}

/// A drill-down fetch that has been started but not applied yet.
#[derive(Debug, Clone)]
pub struct DetailRequest {
    pub ticket: RequestTicket,
    pub plot_id: String,
    pub filter: CostFilter,
}

pub struct Dashboard<B: CostBackend + ?Sized> {
    filters: FilterState,
    session: Option<Session>,
    fetcher: CostFetcher<B>,
    costs: CostView,
    details: DrillDown,
}

impl<B: CostBackend + ?Sized> Dashboard<B> {
    pub fn new(fetcher: CostFetcher<B>, session: Option<Session>, today: NaiveDate) -> Self {
        Self {
            filters: FilterState::new(today),
            session,
            fetcher,
            costs: CostView::new(),
            details: DrillDown::new(),
        }
    }

    pub fn filter(&self) -> &CostFilter {
        self.filters.current()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn fetcher(&self) -> &CostFetcher<B> {
        &self.fetcher
    }

    pub fn costs(&self) -> &CostView {
        &self.costs
    }

    pub fn details(&self) -> &DrillDown {
        &self.details
    }

    /// Mark the cost view loading and return what must be fetched.
    pub fn begin_reload(&mut self) -> ReloadRequest {
        ReloadRequest {
            ticket: self.costs.begin(),
            filter: self.filters.current().clone(),
        }
    }

    /// Apply a finished cost fetch; only the newest request lands.
    pub fn finish_reload(&mut self, request: &ReloadRequest, outcome: FetchOutcome) -> bool {
        if let Some(kind) = outcome.kind() {
            tracing::debug!("Cost fetch finished without rows: {:?}", kind);
        }
        self.costs.complete(request.ticket, outcome)
    }

    /// Fetch plot costs for the current filter. Also the manual retry.
    pub async fn reload(&mut self) {
        let request = self.begin_reload();
        let outcome = self
            .fetcher
            .fetch_plot_costs(self.session.as_ref(), &request.filter)
            .await;
        self.finish_reload(&request, outcome);
    }

    /// Apply a filter patch without fetching. `Some` when the filter changed;
    /// an open drill-down is closed since its lines belong to the old filter.
    pub fn change_filter(&mut self, patch: FilterPatch) -> Option<ReloadRequest> {
        if !self.filters.apply(patch) {
            return None;
        }
        self.details.close();
        Some(self.begin_reload())
    }

    /// Apply a filter patch and refetch when something changed.
    pub async fn update_filter(&mut self, patch: FilterPatch) -> bool {
        let Some(request) = self.change_filter(patch) else {
            return false;
        };
        let outcome = self
            .fetcher
            .fetch_plot_costs(self.session.as_ref(), &request.filter)
            .await;
        self.finish_reload(&request, outcome);
        true
    }

    pub async fn toggle_plot(&mut self, name: &str) {
        if self.filters.toggle_plot(name) {
            self.details.close();
            self.reload().await;
        }
    }

    pub async fn clear_plots(&mut self) {
        if self.filters.clear_plots() {
            self.details.close();
            self.reload().await;
        }
    }

    /// Open the drill-down for `plot_id` and return what must be fetched.
    pub fn begin_details(&mut self, plot_id: &str) -> DetailRequest {
        DetailRequest {
            ticket: self.details.open(plot_id),
            plot_id: plot_id.to_string(),
            filter: self.filters.current().clone(),
        }
    }

    /// Apply a finished drill-down fetch; stale ones are dropped.
    pub fn finish_details(&mut self, request: &DetailRequest, outcome: DetailOutcome) -> bool {
        self.details
            .complete(request.ticket, &request.plot_id, outcome)
    }

    /// Without a session nothing is fetched and the drill-down stays closed.
    pub async fn select_plot(&mut self, plot_id: &str) {
        if self.session.is_none() {
            tracing::debug!("No session, not opening details for {}", plot_id);
            return;
        }
        let request = self.begin_details(plot_id);
        let outcome = self
            .fetcher
            .fetch_cost_details(self.session.as_ref(), &request.plot_id, &request.filter)
            .await;
        self.finish_details(&request, outcome);
    }

    pub fn set_detail_group(&mut self, group: Option<Category>) {
        self.details.set_group(group);
    }

    pub fn close_details(&mut self) {
        self.details.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::grand_totals;
    use crate::error::ErrorKind;
    use crate::fetcher::testing::FakeBackend;
    use crate::state::{CostViewState, DrillDownState, COST_ERROR_BANNER};
    use crate::types::{CategoryTotals, CostDetailLine, PlotCost, SourceSystem};
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 1).unwrap()
    }

    fn plot(id: &str, area: f64, total: f64) -> PlotCost {
        let totals = CategoryTotals {
            inputs: total,
            ..Default::default()
        };
        PlotCost::new(id, id, area, totals)
    }

    fn line(description: &str) -> CostDetailLine {
        CostDetailLine {
            date: NaiveDate::from_ymd_opt(2024, 8, 1).unwrap(),
            category: "Adubo".to_string(),
            description: description.to_string(),
            source: SourceSystem::Financial,
            amount: 10.0,
            category_group: Some(Category::Inputs),
        }
    }

    fn dashboard(backend: FakeBackend) -> (Dashboard<FakeBackend>, Arc<FakeBackend>) {
        let backend = Arc::new(backend);
        let dash = Dashboard::new(
            CostFetcher::new(backend.clone()),
            Some(Session::new("user-1")),
            today(),
        );
        (dash, backend)
    }

    #[tokio::test]
    async fn test_filter_change_triggers_fetch() {
        let (mut dash, backend) = dashboard(FakeBackend {
            plots: vec![plot("t1", 2.0, 200.0), plot("t2", 3.0, 300.0), plot("t3", 5.0, 500.0)],
            ..Default::default()
        });

        assert!(dash.update_filter(FilterPatch::season("2023/2024")).await);
        assert!(!dash.update_filter(FilterPatch::season("2023/2024")).await);
        dash.toggle_plot("t1").await;
        dash.toggle_plot("t1").await;
        assert_eq!(backend.cost_calls.load(Ordering::Relaxed), 3);

        let g = grand_totals(dash.costs().rows());
        assert_eq!(g.total_area, 10.0);
        assert_eq!(g.grand_total, 1000.0);
        assert_eq!(g.cost_per_hectare, 100.0);
    }

    #[tokio::test]
    async fn test_empty_response_yields_zero_totals() {
        let (mut dash, _) = dashboard(FakeBackend::default());
        dash.update_filter(FilterPatch::season("2024/2025")).await;
        dash.reload().await;
        assert_eq!(dash.filter().season, "2024/2025");
        assert!(dash.filter().plot_names.is_empty());
        assert_eq!(dash.costs().state(), &CostViewState::Empty);

        let g = grand_totals(dash.costs().rows());
        assert_eq!(g.grand_total, 0.0);
        assert_eq!(g.total_area, 0.0);
        assert_eq!(g.totals.sum(), 0.0);
    }

    #[tokio::test]
    async fn test_no_session_no_fetch_no_banner() {
        let backend = Arc::new(FakeBackend::default());
        let mut dash = Dashboard::new(CostFetcher::new(backend.clone()), None, today());
        dash.reload().await;
        dash.select_plot("t1").await;
        assert_eq!(backend.cost_calls.load(Ordering::Relaxed), 0);
        assert_eq!(backend.detail_calls.load(Ordering::Relaxed), 0);
        assert_eq!(dash.costs().state(), &CostViewState::Idle);
        assert_eq!(dash.costs().banner(), None);
        assert_eq!(dash.details().state(), &DrillDownState::Closed);
        assert_eq!(dash.details().active_plot(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_costs_end_in_error_banner() {
        let (mut dash, _) = dashboard(FakeBackend {
            plots: vec![plot("t1", 1.0, 1.0)],
            cost_delay: Duration::from_secs(20),
            ..Default::default()
        });
        dash.reload().await;
        assert_eq!(
            dash.costs().state(),
            &CostViewState::Failed(ErrorKind::NetworkTimeout)
        );
        assert_eq!(dash.costs().banner(), Some(COST_ERROR_BANNER));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_plot_selection_keeps_latest() {
        let mut details = HashMap::new();
        details.insert("Talhão A".to_string(), vec![line("A")]);
        details.insert("Talhão B".to_string(), vec![line("B")]);
        let mut delays = HashMap::new();
        delays.insert("Talhão A".to_string(), Duration::from_secs(3));
        delays.insert("Talhão B".to_string(), Duration::from_millis(200));
        let (mut dash, _) = dashboard(FakeBackend {
            details,
            detail_delays: delays,
            ..Default::default()
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        for plot_id in ["Talhão A", "Talhão B"] {
            let request = dash.begin_details(plot_id);
            let fetcher = dash.fetcher().clone();
            let session = dash.session().cloned();
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = fetcher
                    .fetch_cost_details(session.as_ref(), &request.plot_id, &request.filter)
                    .await;
                let _ = tx.send((request, outcome));
            });
        }
        drop(tx);

        let mut applied = Vec::new();
        while let Some((request, outcome)) = rx.recv().await {
            applied.push((request.plot_id.clone(), dash.finish_details(&request, outcome)));
        }

        assert_eq!(
            applied,
            vec![("Talhão B".to_string(), true), ("Talhão A".to_string(), false)]
        );
        match dash.details().state() {
            DrillDownState::Loaded { plot_id, lines } => {
                assert_eq!(plot_id, "Talhão B");
                assert_eq!(lines.len(), 1);
                assert_eq!(lines[0].description, "B");
            }
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_season_change_keeps_latest() {
        let mut season_plots = HashMap::new();
        season_plots.insert("2023/2024".to_string(), vec![plot("old", 1.0, 10.0)]);
        season_plots.insert("2022/2023".to_string(), vec![plot("older", 1.0, 20.0)]);
        let mut season_delays = HashMap::new();
        season_delays.insert("2023/2024".to_string(), Duration::from_secs(3));
        season_delays.insert("2022/2023".to_string(), Duration::from_millis(200));
        let (mut dash, _) = dashboard(FakeBackend {
            season_plots,
            season_delays,
            ..Default::default()
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        for season in ["2023/2024", "2022/2023"] {
            let request = dash.change_filter(FilterPatch::season(season)).unwrap();
            let fetcher = dash.fetcher().clone();
            let session = dash.session().cloned();
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = fetcher
                    .fetch_plot_costs(session.as_ref(), &request.filter)
                    .await;
                let _ = tx.send((request, outcome));
            });
        }
        drop(tx);
        assert_eq!(dash.costs().state(), &CostViewState::Loading);

        let mut applied = Vec::new();
        while let Some((request, outcome)) = rx.recv().await {
            applied.push((request.filter.season.clone(), dash.finish_reload(&request, outcome)));
        }

        assert_eq!(
            applied,
            vec![("2022/2023".to_string(), true), ("2023/2024".to_string(), false)]
        );
        assert_eq!(dash.filter().season, "2022/2023");
        assert_eq!(dash.costs().rows().len(), 1);
        assert_eq!(dash.costs().rows()[0].id, "older");
    }

    #[tokio::test]
    async fn test_filter_change_closes_drill_down() {
        let mut details = HashMap::new();
        details.insert("t1".to_string(), vec![line("x")]);
        let (mut dash, _) = dashboard(FakeBackend {
            details,
            ..Default::default()
        });
        dash.select_plot("t1").await;
        assert_eq!(dash.details().active_plot(), Some("t1"));
        dash.update_filter(FilterPatch::category(Some(Category::Inputs)))
            .await;
        assert_eq!(dash.details().state(), &DrillDownState::Closed);
    }
}
