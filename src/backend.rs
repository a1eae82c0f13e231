//! Cost backend query interfaces.
//!
//! The hosted backend exposes two RPC functions: one returning pre-aggregated
//! cost rows per plot, one returning the itemized lines behind a plot. Both
//! are reached through [`CostBackend`] so the fetchers can run against the
//! HTTP backend, an offline CSV export or a test double.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use reqwest::{Client as HttpClient, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CostError, Result};
use crate::filter::{parse_season, parse_year_month};
use crate::loader;
use crate::types::{
    Category, CategoryTotals, CostDetailLine, CostDetailRecord, CostFilter, PlotCost,
    PlotCostRecord,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostQuery {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub farm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plot_names: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_month: Option<String>,
}

impl CostQuery {
    pub fn new(user_id: &str, filter: &CostFilter) -> Self {
        let plot_names = if filter.plot_names.is_empty() {
            None
        } else {
            Some(filter.plot_names.iter().cloned().collect())
        };
        CostQuery {
            user_id: user_id.to_string(),
            season: Some(filter.season.clone()),
            farm: filter.farm.clone(),
            plot_names,
            category: filter.category,
            year_month: filter.year_month.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailQuery {
    pub user_id: String,
    pub plot_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_month: Option<String>,
}

impl DetailQuery {
    pub fn new(user_id: &str, plot_id: &str, filter: &CostFilter) -> Self {
        DetailQuery {
            user_id: user_id.to_string(),
            plot_id: plot_id.to_string(),
            season: Some(filter.season.clone()),
            year_month: filter.year_month.clone(),
        }
    }
}

#[async_trait]
pub trait CostBackend: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn fetch_plot_costs(&self, query: &CostQuery) -> Result<Vec<PlotCost>>;

    async fn fetch_cost_details(&self, query: &DetailQuery) -> Result<Vec<CostDetailLine>>;
}

/// PostgREST-style HTTP backend (`POST /rest/v1/rpc/<function>`).
#[derive(Clone)]
pub struct HttpBackend {
    http_client: HttpClient,
    base_url: String,
    api_key: String,
    plot_costs_fn: String,
    details_fn: String,
}

impl HttpBackend {
    /// `transport_timeout` bounds every request, including drill-down
    /// queries which have no timeout of their own.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        plot_costs_fn: impl Into<String>,
        details_fn: impl Into<String>,
        transport_timeout: Duration,
    ) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(transport_timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| CostError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            plot_costs_fn: plot_costs_fn.into(),
            details_fn: details_fn.into(),
        })
    }

    async fn call_rpc<Q: Serialize + Sync, T: DeserializeOwned>(
        &self,
        function: &str,
        body: &Q,
    ) -> Result<T> {
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, function);

        tracing::debug!("POST {}", url);

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let response = Self::handle_response(response).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn handle_response(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        tracing::error!("Cost backend error {}: {}", status, message);
        Err(CostError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl CostBackend for HttpBackend {
    fn backend_tag(&self) -> &'static str {
        "http"
    }

    async fn fetch_plot_costs(&self, query: &CostQuery) -> Result<Vec<PlotCost>> {
        let records: Vec<PlotCostRecord> = self.call_rpc(&self.plot_costs_fn, query).await?;
        Ok(records
            .into_iter()
            .map(PlotCostRecord::into_plot_cost)
            .collect())
    }

    async fn fetch_cost_details(&self, query: &DetailQuery) -> Result<Vec<CostDetailLine>> {
        let records: Vec<CostDetailRecord> = self.call_rpc(&self.details_fn, query).await?;
        let total = records.len();
        let lines: Vec<CostDetailLine> = records
            .into_iter()
            .filter_map(CostDetailRecord::into_detail_line)
            .collect();
        if lines.len() < total {
            tracing::warn!(
                "Dropped {} detail lines without a valid date or source",
                total - lines.len()
            );
        }
        Ok(lines)
    }
}

/// Offline backend over CSV exports in a directory:
/// `custos_talhao.csv` (already aggregated per plot, one file per export)
/// and `detalhes_custo.csv` (itemized lines with a `talhao_id` column).
///
/// Plot rows are already aggregated for the exported season. They are
/// filtered by plot name and by the optional `fazenda` column, and a category
/// filter keeps only that group's amount. With a month filter the plot
/// totals are rebuilt from the detail lines of that month, since the
/// aggregated rows cannot be split by date. Detail lines are filtered by
/// season and month.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

pub const PLOT_COSTS_FILE: &str = "custos_talhao.csv";
pub const DETAILS_FILE: &str = "detalhes_custo.csv";

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Itemized lines of the season, keyed by plot id. Lines without a
    /// macrogrupo count as "outros".
    fn load_details(
        &self,
        season: Option<&str>,
        year_month: Option<&str>,
    ) -> Result<Vec<(String, CostDetailLine)>> {
        let (rows, report) = loader::load_cost_details(&self.dir.join(DETAILS_FILE))?;
        tracing::debug!(
            "Loaded {} of {} detail rows ({} parse errors)",
            report.loaded_rows,
            report.total_rows,
            report.parse_errors
        );
        let season = season.map(parse_season).transpose()?;
        let mut kept = Vec::new();
        for (plot_id, line) in rows {
            if let Some(s) = &season {
                if !s.contains(line.date) {
                    continue;
                }
            }
            if !month_matches(line.date, year_month)? {
                continue;
            }
            kept.push((plot_id, line));
        }
        Ok(kept)
    }

    fn monthly_totals(&self, query: &CostQuery) -> Result<HashMap<String, CategoryTotals>> {
        let mut totals: HashMap<String, CategoryTotals> = HashMap::new();
        for (plot_id, line) in
            self.load_details(query.season.as_deref(), query.year_month.as_deref())?
        {
            totals
                .entry(plot_id)
                .or_default()
                .add(line.category_group.unwrap_or(Category::Other), line.amount);
        }
        Ok(totals)
    }
}

fn farm_matches(farm: Option<&str>, wanted: Option<&str>) -> bool {
    match wanted.map(str::trim).filter(|w| !w.is_empty()) {
        None => true,
        Some(w) => farm.map_or(false, |f| f.eq_ignore_ascii_case(w)),
    }
}

fn month_matches(date: NaiveDate, year_month: Option<&str>) -> Result<bool> {
    match year_month {
        None => Ok(true),
        Some(ym) => {
            let (y, m) = parse_year_month(ym)?;
            Ok(date.year() == y && date.month() == m)
        }
    }
}

#[async_trait]
impl CostBackend for FileBackend {
    fn backend_tag(&self) -> &'static str {
        "file"
    }

    async fn fetch_plot_costs(&self, query: &CostQuery) -> Result<Vec<PlotCost>> {
        let (rows, report) = loader::load_plot_costs(&self.dir.join(PLOT_COSTS_FILE))?;
        tracing::debug!(
            "Loaded {} of {} plot rows ({} parse errors)",
            report.loaded_rows,
            report.total_rows,
            report.parse_errors
        );
        let wanted: Option<BTreeSet<&str>> = query
            .plot_names
            .as_ref()
            .map(|names| names.iter().map(String::as_str).collect());
        let monthly = match query.year_month {
            Some(_) => Some(self.monthly_totals(query)?),
            None => None,
        };
        Ok(rows
            .into_iter()
            .filter(|r| {
                wanted
                    .as_ref()
                    .map_or(true, |w| w.contains(r.plot_name.as_str()))
            })
            .filter(|r| farm_matches(r.farm.as_deref(), query.farm.as_deref()))
            .map(|r| {
                let totals = match &monthly {
                    Some(m) => m.get(&r.id).copied().unwrap_or_default(),
                    None => r.totals,
                };
                let totals = match query.category {
                    Some(c) => totals.only(c),
                    None => totals,
                };
                r.with_totals(totals)
            })
            .collect())
    }

    async fn fetch_cost_details(&self, query: &DetailQuery) -> Result<Vec<CostDetailLine>> {
        Ok(self
            .load_details(query.season.as_deref(), query.year_month.as_deref())?
            .into_iter()
            .filter(|(plot_id, _)| *plot_id == query.plot_id)
            .map(|(_, line)| line)
            .collect())
    }
}
