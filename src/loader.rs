use crate::error::Result;
use crate::types::{Category, CategoryTotals, CostDetailLine, PlotCost, SourceSystem};
use crate::util::{parse_date_safe, parse_f64_safe};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub loaded_rows: usize,
    pub parse_errors: usize,
}

#[derive(Debug, Deserialize)]
struct RawPlotRow {
    #[serde(alias = "talhao_id")]
    id: Option<String>,
    #[serde(alias = "talhao_nome", alias = "nome")]
    talhao: Option<String>,
    #[serde(alias = "area")]
    area_ha: Option<String>,
    insumos: Option<String>,
    operacional: Option<String>,
    servicos_logistica: Option<String>,
    administrativo: Option<String>,
    outros: Option<String>,
    #[serde(alias = "farm")]
    fazenda: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDetailRow {
    talhao_id: Option<String>,
    data: Option<String>,
    categoria: Option<String>,
    descricao: Option<String>,
    origem: Option<String>,
    valor: Option<String>,
    macrogrupo: Option<String>,
}

pub fn load_plot_costs(path: &Path) -> Result<(Vec<PlotCost>, LoadReport)> {
    let file = std::fs::File::open(path)?;
    read_plot_costs(file)
}

/// Rows without a plot name or with an unreadable area are skipped and
/// counted; blank category amounts count as zero.
pub fn read_plot_costs<R: Read>(reader: R) -> Result<(Vec<PlotCost>, LoadReport)> {
    let mut rdr = ReaderBuilder::new().flexible(true).trim(csv::Trim::All).from_reader(reader);
    let mut report = LoadReport::default();
    let mut rows = Vec::new();

    for result in rdr.deserialize::<RawPlotRow>() {
        report.total_rows += 1;
        let row = match result {
            Ok(r) => r,
            Err(_) => { report.parse_errors += 1; continue; }
        };
        let name = match row.talhao.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => { report.parse_errors += 1; continue; }
        };
        let area = match row.area_ha.as_deref() {
            None => 0.0,
            Some(s) if s.trim().is_empty() => 0.0,
            Some(s) => match parse_f64_safe(Some(s)) { Some(v) => v, None => { report.parse_errors += 1; continue; } },
        };
        let amount = |s: &Option<String>| parse_f64_safe(s.as_deref()).unwrap_or(0.0);
        let totals = CategoryTotals {
            inputs: amount(&row.insumos),
            operational: amount(&row.operacional),
            services_logistics: amount(&row.servicos_logistica),
            administrative: amount(&row.administrativo),
            other: amount(&row.outros),
        };
        let id = row.id.filter(|i| !i.trim().is_empty()).unwrap_or_else(|| name.clone());
        rows.push(PlotCost::new(id, name, area, totals).with_farm(row.fazenda));
    }

    report.loaded_rows = rows.len();
    Ok((rows, report))
}

pub fn load_cost_details(path: &Path) -> Result<(Vec<(String, CostDetailLine)>, LoadReport)> {
    let file = std::fs::File::open(path)?;
    read_cost_details(file)
}

/// Detail lines keyed by plot id. Lines without plot id, date, source or
/// amount are skipped.
pub fn read_cost_details<R: Read>(reader: R) -> Result<(Vec<(String, CostDetailLine)>, LoadReport)> {
    let mut rdr = ReaderBuilder::new().flexible(true).trim(csv::Trim::All).from_reader(reader);
    let mut report = LoadReport::default();
    let mut lines = Vec::new();

    for result in rdr.deserialize::<RawDetailRow>() {
        report.total_rows += 1;
        let row = match result {
            Ok(r) => r,
            Err(_) => { report.parse_errors += 1; continue; }
        };
        let plot_id = match row.talhao_id.filter(|p| !p.is_empty()) { Some(p) => p, None => { report.parse_errors += 1; continue; } };
        let date = match parse_date_safe(row.data.as_deref()) { Some(d) => d, None => { report.parse_errors += 1; continue; } };
        let source = match row.origem.as_deref().and_then(SourceSystem::from_key) { Some(s) => s, None => { report.parse_errors += 1; continue; } };
        let amount = match parse_f64_safe(row.valor.as_deref()) { Some(v) => v, None => { report.parse_errors += 1; continue; } };

        let category = row.categoria.unwrap_or_default();
        let category_group = row
            .macrogrupo
            .as_deref()
            .and_then(Category::from_key)
            .or_else(|| Category::from_key(&category));
        lines.push((
            plot_id,
            CostDetailLine {
                date,
                category,
                description: row.descricao.unwrap_or_default(),
                source,
                amount,
                category_group,
            },
        ));
    }

    report.loaded_rows = lines.len();
    Ok((lines, report))
}
