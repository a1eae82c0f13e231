use crate::types::{
    Category, CategoryShareRow, CategorySummary, CategoryTotals, CostDetailLine, CostDetailRow,
    CostSummary, PlotCost, PlotCostRow,
};
use crate::util::{format_area, format_brl, format_percent};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GrandTotals {
    pub totals: CategoryTotals,
    pub grand_total: f64,
    pub total_area: f64,
    pub cost_per_hectare: f64,
}

/// Per-category sums across all rows, accumulated in row order.
pub fn group_totals(rows: &[PlotCost]) -> CategoryTotals {
    let mut acc = CategoryTotals::default();
    for r in rows {
        for (category, amount) in r.totals.iter() {
            acc.add(category, amount);
        }
    }
    acc
}

pub fn grand_totals(rows: &[PlotCost]) -> GrandTotals {
    let totals = group_totals(rows);
    let grand_total: f64 = rows.iter().map(|r| r.grand_total).sum();
    let total_area: f64 = rows.iter().map(|r| r.area_hectares).sum();
    let cost_per_hectare = if total_area > 0.0 {
        grand_total / total_area
    } else {
        0.0
    };
    GrandTotals {
        totals,
        grand_total,
        total_area,
        cost_per_hectare,
    }
}

pub fn percentage_of_total(part: f64, whole: f64) -> f64 {
    if whole == 0.0 || !whole.is_finite() {
        return 0.0;
    }
    (part / whole) * 100.0
}

pub fn category_shares(rows: &[PlotCost]) -> Vec<(Category, f64, f64)> {
    let totals = group_totals(rows);
    let whole = totals.sum();
    totals
        .iter()
        .map(|(c, v)| (c, v, percentage_of_total(v, whole)))
        .collect()
}

/// Highest grand total first; ties by plot name.
pub fn sort_by_cost(rows: &mut [PlotCost]) {
    rows.sort_by(|a, b| {
        b.grand_total
            .partial_cmp(&a.grand_total)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.plot_name.cmp(&b.plot_name))
    });
}

/// Local drill-down filter; `None` keeps every line.
pub fn filter_details_by_group(
    lines: &[CostDetailLine],
    group: Option<Category>,
) -> Vec<CostDetailLine> {
    match group {
        None => lines.to_vec(),
        Some(g) => lines
            .iter()
            .filter(|l| l.category_group == Some(g))
            .cloned()
            .collect(),
    }
}

pub fn detail_total(lines: &[CostDetailLine]) -> f64 {
    lines.iter().map(|l| l.amount).sum()
}

pub fn plot_rows(rows: &[PlotCost]) -> Vec<PlotCostRow> {
    rows.iter()
        .map(|r| PlotCostRow {
            plot_name: r.plot_name.clone(),
            area: format_area(r.area_hectares),
            inputs: format_brl(r.totals.inputs),
            operational: format_brl(r.totals.operational),
            services_logistics: format_brl(r.totals.services_logistics),
            administrative: format_brl(r.totals.administrative),
            other: format_brl(r.totals.other),
            total: format_brl(r.grand_total),
            cost_per_hectare: format_brl(r.cost_per_hectare),
        })
        .collect()
}

/// The "Total" footer line of the plot table.
pub fn total_row(rows: &[PlotCost]) -> PlotCostRow {
    let g = grand_totals(rows);
    PlotCostRow {
        plot_name: "TOTAL".to_string(),
        area: format_area(g.total_area),
        inputs: format_brl(g.totals.inputs),
        operational: format_brl(g.totals.operational),
        services_logistics: format_brl(g.totals.services_logistics),
        administrative: format_brl(g.totals.administrative),
        other: format_brl(g.totals.other),
        total: format_brl(g.grand_total),
        cost_per_hectare: format_brl(g.cost_per_hectare),
    }
}

pub fn share_rows(rows: &[PlotCost]) -> Vec<CategoryShareRow> {
    category_shares(rows)
        .into_iter()
        .map(|(c, total, pct)| CategoryShareRow {
            category: c.label().to_string(),
            total: format_brl(total),
            percentage: format_percent(pct),
        })
        .collect()
}

pub fn detail_rows(lines: &[CostDetailLine]) -> Vec<CostDetailRow> {
    lines
        .iter()
        .map(|l| CostDetailRow {
            date: l.date.format("%d/%m/%Y").to_string(),
            source: l.source.label().to_string(),
            category: l.category.clone(),
            description: l.description.clone(),
            amount: format_brl(l.amount),
        })
        .collect()
}

pub fn generate_summary(season: &str, rows: &[PlotCost]) -> CostSummary {
    let g = grand_totals(rows);
    let per_category = category_shares(rows)
        .into_iter()
        .map(|(category, total, percentage)| CategorySummary {
            category,
            total,
            percentage,
        })
        .collect();
    CostSummary {
        season: season.to_string(),
        total_plots: rows.len(),
        total_area: g.total_area,
        grand_total: g.grand_total,
        cost_per_hectare: g.cost_per_hectare,
        per_category,
    }
}
