//! View state for the cost table and the drill-down panel.
//!
//! Fetches are not cancelled when re-triggered. Each trigger takes a
//! [`RequestTicket`] and a response is applied only if its ticket is still
//! the newest one, so a late response can never overwrite fresher state.

use crate::aggregator::filter_details_by_group;
use crate::error::ErrorKind;
use crate::fetcher::{DetailOutcome, FetchOutcome};
use crate::types::{Category, CostDetailLine, PlotCost};

pub const COST_ERROR_BANNER: &str =
    "Não foi possível carregar os custos por talhão. Tente novamente.";
pub const EMPTY_COSTS_MESSAGE: &str =
    "Nenhum custo encontrado para os filtros selecionados.";
pub const NO_DETAILS_MESSAGE: &str = "Nenhum lançamento encontrado para este talhão.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum CostViewState {
    Idle,
    Loading,
    Loaded(Vec<PlotCost>),
    Empty,
    Failed(ErrorKind),
}

#[derive(Debug)]
pub struct CostView {
    state: CostViewState,
    generation: u64,
}

impl Default for CostView {
    fn default() -> Self {
        Self::new()
    }
}

impl CostView {
    pub fn new() -> Self {
        Self {
            state: CostViewState::Idle,
            generation: 0,
        }
    }

    pub fn state(&self) -> &CostViewState {
        &self.state
    }

    /// Rows on display; empty unless loaded.
    pub fn rows(&self) -> &[PlotCost] {
        match &self.state {
            CostViewState::Loaded(rows) => rows,
            _ => &[],
        }
    }

    pub fn begin(&mut self) -> RequestTicket {
        self.generation += 1;
        self.state = CostViewState::Loading;
        RequestTicket(self.generation)
    }

    /// Apply a finished fetch. Returns `false` when the ticket is stale and
    /// the outcome was dropped.
    pub fn complete(&mut self, ticket: RequestTicket, outcome: FetchOutcome) -> bool {
        if ticket.0 != self.generation {
            tracing::warn!(
                "Discarding stale cost response (request {}, current {})",
                ticket.0,
                self.generation
            );
            return false;
        }
        self.state = match outcome {
            FetchOutcome::Skipped => CostViewState::Idle,
            FetchOutcome::Loaded(rows) => CostViewState::Loaded(rows),
            FetchOutcome::Empty => CostViewState::Empty,
            FetchOutcome::Failed(e) => CostViewState::Failed(e.kind()),
        };
        true
    }

    /// Error banner with retry hint. Timeouts and network errors share it.
    pub fn banner(&self) -> Option<&'static str> {
        match self.state {
            CostViewState::Failed(_) => Some(COST_ERROR_BANNER),
            _ => None,
        }
    }

    /// Informational message for a successful query with no rows.
    pub fn empty_message(&self) -> Option<&'static str> {
        match self.state {
            CostViewState::Empty => Some(EMPTY_COSTS_MESSAGE),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrillDownState {
    Closed,
    Loading { plot_id: String },
    Loaded { plot_id: String, lines: Vec<CostDetailLine> },
    NoData { plot_id: String },
}

#[derive(Debug)]
pub struct DrillDown {
    state: DrillDownState,
    generation: u64,
    group: Option<Category>,
}

impl Default for DrillDown {
    fn default() -> Self {
        Self::new()
    }
}

impl DrillDown {
    pub fn new() -> Self {
        Self {
            state: DrillDownState::Closed,
            generation: 0,
            group: None,
        }
    }

    pub fn state(&self) -> &DrillDownState {
        &self.state
    }

    pub fn active_plot(&self) -> Option<&str> {
        match &self.state {
            DrillDownState::Closed => None,
            DrillDownState::Loading { plot_id }
            | DrillDownState::Loaded { plot_id, .. }
            | DrillDownState::NoData { plot_id } => Some(plot_id.as_str()),
        }
    }

    /// Select a plot. Any response still in flight for a previous
    /// selection becomes stale. The group filter resets.
    pub fn open(&mut self, plot_id: &str) -> RequestTicket {
        self.generation += 1;
        self.group = None;
        self.state = DrillDownState::Loading {
            plot_id: plot_id.to_string(),
        };
        RequestTicket(self.generation)
    }

    pub fn close(&mut self) {
        self.generation += 1;
        self.group = None;
        self.state = DrillDownState::Closed;
    }

    /// Apply detail lines for `plot_id` if the ticket is current and the
    /// plot is still the active one.
    pub fn complete(&mut self, ticket: RequestTicket, plot_id: &str, outcome: DetailOutcome) -> bool {
        if ticket.0 != self.generation || self.active_plot() != Some(plot_id) {
            tracing::warn!("Discarding stale detail response for plot {}", plot_id);
            return false;
        }
        let plot_id = plot_id.to_string();
        self.state = match outcome {
            DetailOutcome::Lines(lines) if !lines.is_empty() => {
                DrillDownState::Loaded { plot_id, lines }
            }
            DetailOutcome::Lines(_) | DetailOutcome::Skipped => DrillDownState::NoData { plot_id },
        };
        true
    }

    pub fn set_group(&mut self, group: Option<Category>) {
        self.group = group;
    }

    pub fn group(&self) -> Option<Category> {
        self.group
    }

    /// Loaded lines narrowed to the selected group, without refetching.
    pub fn visible_lines(&self) -> Vec<CostDetailLine> {
        match &self.state {
            DrillDownState::Loaded { lines, .. } => filter_details_by_group(lines, self.group),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CostError;
    use crate::types::{CategoryTotals, SourceSystem};
    use chrono::NaiveDate;
    use std::time::Duration;

    fn plot(id: &str) -> PlotCost {
        PlotCost::new(id, id, 1.0, CategoryTotals::default())
    }

    fn line(description: &str, group: Option<Category>) -> CostDetailLine {
        CostDetailLine {
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            category: "Adubo".to_string(),
            description: description.to_string(),
            source: SourceSystem::Inventory,
            amount: 50.0,
            category_group: group,
        }
    }

    #[test]
    fn test_most_recent_cost_request_wins() {
        let mut view = CostView::new();
        let first = view.begin();
        let second = view.begin();

        assert!(view.complete(second, FetchOutcome::Loaded(vec![plot("novo")])));
        assert!(!view.complete(first, FetchOutcome::Loaded(vec![plot("antigo")])));
        assert_eq!(view.rows()[0].id, "novo");
    }

    #[test]
    fn test_timeout_shows_banner_not_spinner() {
        let mut view = CostView::new();
        let t = view.begin();
        assert_eq!(view.state(), &CostViewState::Loading);
        view.complete(
            t,
            FetchOutcome::Failed(CostError::Timeout(Duration::from_secs(15))),
        );
        assert_eq!(view.state(), &CostViewState::Failed(ErrorKind::NetworkTimeout));
        assert_eq!(view.banner(), Some(COST_ERROR_BANNER));
        assert!(view.rows().is_empty());
    }

    #[test]
    fn test_empty_is_not_an_error() {
        let mut view = CostView::new();
        let t = view.begin();
        view.complete(t, FetchOutcome::Empty);
        assert_eq!(view.banner(), None);
        assert_eq!(view.empty_message(), Some(EMPTY_COSTS_MESSAGE));
    }

    #[test]
    fn test_drill_down_discards_previous_plot() {
        let mut dd = DrillDown::new();
        let a = dd.open("Talhão A");
        let b = dd.open("Talhão B");

        assert!(dd.complete(b, "Talhão B", DetailOutcome::Lines(vec![line("B", None)])));
        assert!(!dd.complete(a, "Talhão A", DetailOutcome::Lines(vec![line("A", None)])));
        match dd.state() {
            DrillDownState::Loaded { plot_id, lines } => {
                assert_eq!(plot_id, "Talhão B");
                assert_eq!(lines[0].description, "B");
            }
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[test]
    fn test_drill_down_late_response_after_close() {
        let mut dd = DrillDown::new();
        let t = dd.open("Talhão A");
        dd.close();
        assert!(!dd.complete(t, "Talhão A", DetailOutcome::Lines(vec![line("A", None)])));
        assert_eq!(dd.state(), &DrillDownState::Closed);
    }

    #[test]
    fn test_no_data_distinct_from_loading() {
        let mut dd = DrillDown::new();
        let t = dd.open("Talhão A");
        assert!(matches!(dd.state(), DrillDownState::Loading { .. }));
        dd.complete(t, "Talhão A", DetailOutcome::Lines(Vec::new()));
        assert!(matches!(dd.state(), DrillDownState::NoData { .. }));
    }

    #[test]
    fn test_group_filter_is_local() {
        let mut dd = DrillDown::new();
        let t = dd.open("Talhão A");
        dd.complete(
            t,
            "Talhão A",
            DetailOutcome::Lines(vec![
                line("adubo", Some(Category::Inputs)),
                line("frete", Some(Category::ServicesLogistics)),
            ]),
        );
        assert_eq!(dd.visible_lines().len(), 2);
        dd.set_group(Some(Category::Inputs));
        let visible = dd.visible_lines();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].description, "adubo");
    }
}
