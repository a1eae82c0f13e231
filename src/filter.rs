// Filter state for the cost view.
//
// `FilterState` is the only writer of the `CostFilter`; fetchers get a clone
// or a shared reference. A safra runs from May 1 of year N to April 30 of
// year N+1 and is written "N/N+1".
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeSet;

use crate::error::{CostError, Result};
use crate::types::{Category, CostFilter};

/// Harvest season identified by the calendar year it starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Season {
    pub start_year: i32,
}

impl Season {
    pub fn containing(date: NaiveDate) -> Self {
        let start_year = if date.month() >= 5 {
            date.year()
        } else {
            date.year() - 1
        };
        Season { start_year }
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.start_year, self.start_year + 1)
    }

    /// First and last day of the season, inclusive.
    pub fn bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let start = NaiveDate::from_ymd_opt(self.start_year, 5, 1)?;
        let end = NaiveDate::from_ymd_opt(self.start_year + 1, 4, 30)?;
        Some((start, end))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        Season::containing(date) == *self
    }
}

pub fn default_season(today: NaiveDate) -> String {
    Season::containing(today).label()
}

/// Parse `"2024/2025"`. The second year must follow the first.
pub fn parse_season(s: &str) -> Result<Season> {
    let invalid = || CostError::InvalidFilter(format!("season '{}' is not in YYYY/YYYY form", s));
    let (a, b) = s.trim().split_once('/').ok_or_else(invalid)?;
    let start: i32 = a.trim().parse().map_err(|_| invalid())?;
    let end: i32 = b.trim().parse().map_err(|_| invalid())?;
    if end != start + 1 {
        return Err(CostError::InvalidFilter(format!(
            "season '{}' must span consecutive years",
            s
        )));
    }
    Ok(Season { start_year: start })
}

/// Parse `"2024-07"` into (year, month).
pub fn parse_year_month(s: &str) -> Result<(i32, u32)> {
    let invalid = || CostError::InvalidFilter(format!("month '{}' is not in YYYY-MM form", s));
    let (y, m) = s.trim().split_once('-').ok_or_else(invalid)?;
    let year: i32 = y.parse().map_err(|_| invalid())?;
    let month: u32 = m.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    Ok((year, month))
}

/// Replaces any subset of filter fields. `None` leaves a field untouched;
/// the nullable fields take `Some(None)` to clear them.
#[derive(Debug, Clone, Default)]
pub struct FilterPatch {
    pub season: Option<String>,
    pub farm: Option<Option<String>>,
    pub plot_names: Option<BTreeSet<String>>,
    pub category: Option<Option<Category>>,
    pub year_month: Option<Option<String>>,
}

impl FilterPatch {
    pub fn season(s: impl Into<String>) -> Self {
        FilterPatch {
            season: Some(s.into()),
            ..Default::default()
        }
    }

    pub fn category(c: Option<Category>) -> Self {
        FilterPatch {
            category: Some(c),
            ..Default::default()
        }
    }

    pub fn year_month(m: Option<String>) -> Self {
        FilterPatch {
            year_month: Some(m),
            ..Default::default()
        }
    }

    pub fn farm(f: Option<String>) -> Self {
        FilterPatch {
            farm: Some(f),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterState {
    filter: CostFilter,
    default_season: String,
}

impl FilterState {
    pub fn new(today: NaiveDate) -> Self {
        let season = default_season(today);
        Self {
            filter: CostFilter {
                season: season.clone(),
                farm: None,
                plot_names: BTreeSet::new(),
                category: None,
                year_month: None,
            },
            default_season: season,
        }
    }

    pub fn current(&self) -> &CostFilter {
        &self.filter
    }

    /// Apply a patch. Returns `true` when the filter changed, which is the
    /// caller's cue to refetch.
    pub fn apply(&mut self, patch: FilterPatch) -> bool {
        let before = self.filter.clone();
        if let Some(season) = patch.season {
            let season = season.trim();
            self.filter.season = if season.is_empty() {
                self.default_season.clone()
            } else {
                season.to_string()
            };
        }
        if let Some(farm) = patch.farm {
            self.filter.farm = farm.filter(|f| !f.trim().is_empty());
        }
        if let Some(plots) = patch.plot_names {
            self.filter.plot_names = plots;
        }
        if let Some(category) = patch.category {
            self.filter.category = category;
        }
        if let Some(month) = patch.year_month {
            self.filter.year_month = month.filter(|m| !m.trim().is_empty());
        }
        self.filter != before
    }

    /// Add the plot when absent, remove it when present. Always a change.
    pub fn toggle_plot(&mut self, name: &str) -> bool {
        if !self.filter.plot_names.remove(name) {
            self.filter.plot_names.insert(name.to_string());
        }
        true
    }

    pub fn clear_plots(&mut self) -> bool {
        let changed = !self.filter.plot_names.is_empty();
        self.filter.plot_names.clear();
        changed
    }
}
