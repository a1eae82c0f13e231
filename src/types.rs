use chrono::NaiveDate;
use deunicode::deunicode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use tabled::Tabled;

use crate::util::{parse_date_safe, parse_f64_safe};

/// One of the five fixed cost groups (macrogrupos) expenses are bucketed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "insumos")]
    Inputs,
    #[serde(rename = "operacional")]
    Operational,
    #[serde(rename = "servicos_logistica")]
    ServicesLogistics,
    #[serde(rename = "administrativo")]
    Administrative,
    #[serde(rename = "outros")]
    Other,
}

impl Category {
    /// Fixed accumulation and display order.
    pub const ALL: [Category; 5] = [
        Category::Inputs,
        Category::Operational,
        Category::ServicesLogistics,
        Category::Administrative,
        Category::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Inputs => "Insumos",
            Category::Operational => "Operacional",
            Category::ServicesLogistics => "Serviços/Logística",
            Category::Administrative => "Administrativo",
            Category::Other => "Outros",
        }
    }

    /// Parse a backend or user supplied group name.
    ///
    /// Accepts the canonical keys, the display labels, accented or not, and
    /// the English names. Anything else is `None`.
    pub fn from_key(raw: &str) -> Option<Category> {
        let norm: String = deunicode(raw.trim())
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let norm = norm.trim_matches('_');
        match norm {
            "insumos" | "insumo" | "inputs" => Some(Category::Inputs),
            "operacional" | "operacionais" | "operational" => Some(Category::Operational),
            "servicos_logistica" | "servicos_e_logistica" | "servicos" | "logistica"
            | "services_logistics" => Some(Category::ServicesLogistics),
            "administrativo" | "administrativos" | "administrative" => {
                Some(Category::Administrative)
            }
            "outros" | "outro" | "other" => Some(Category::Other),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Canonical filter the fetchers read. `season` is never empty; an empty
/// `plot_names` set means every plot; `category == None` means all groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostFilter {
    pub season: String,
    pub farm: Option<String>,
    pub plot_names: BTreeSet<String>,
    pub category: Option<Category>,
    pub year_month: Option<String>,
}

/// Per-category amounts of a single plot or of an aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CategoryTotals {
    pub inputs: f64,
    pub operational: f64,
    pub services_logistics: f64,
    pub administrative: f64,
    pub other: f64,
}

impl CategoryTotals {
    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::Inputs => self.inputs,
            Category::Operational => self.operational,
            Category::ServicesLogistics => self.services_logistics,
            Category::Administrative => self.administrative,
            Category::Other => self.other,
        }
    }

    pub fn add(&mut self, category: Category, amount: f64) {
        let slot = match category {
            Category::Inputs => &mut self.inputs,
            Category::Operational => &mut self.operational,
            Category::ServicesLogistics => &mut self.services_logistics,
            Category::Administrative => &mut self.administrative,
            Category::Other => &mut self.other,
        };
        *slot += amount;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, f64)> + '_ {
        Category::ALL.into_iter().map(move |c| (c, self.get(c)))
    }

    /// Copy keeping only `category`; the other groups are zeroed.
    pub fn only(&self, category: Category) -> Self {
        let mut totals = CategoryTotals::default();
        totals.add(category, self.get(category));
        totals
    }

    /// Sum in `Category::ALL` order.
    pub fn sum(&self) -> f64 {
        self.iter().map(|(_, v)| v).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlotCost {
    pub id: String,
    pub plot_name: String,
    pub area_hectares: f64,
    pub totals: CategoryTotals,
    pub grand_total: f64,
    pub cost_per_hectare: f64,
    pub farm: Option<String>,
}

impl PlotCost {
    /// Builds a plot row, deriving `grand_total` and `cost_per_hectare` from
    /// the category totals. Negative or non-finite areas count as 0.
    pub fn new(
        id: impl Into<String>,
        plot_name: impl Into<String>,
        area_hectares: f64,
        totals: CategoryTotals,
    ) -> Self {
        let area_hectares = if area_hectares.is_finite() && area_hectares > 0.0 {
            area_hectares
        } else {
            0.0
        };
        let grand_total = totals.sum();
        let cost_per_hectare = if area_hectares > 0.0 {
            grand_total / area_hectares
        } else {
            0.0
        };
        Self {
            id: id.into(),
            plot_name: plot_name.into(),
            area_hectares,
            totals,
            grand_total,
            cost_per_hectare,
            farm: None,
        }
    }

    pub fn with_farm(mut self, farm: Option<String>) -> Self {
        self.farm = farm
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());
        self
    }

    /// Same plot with its totals replaced; derived fields are recomputed.
    pub fn with_totals(self, totals: CategoryTotals) -> Self {
        let farm = self.farm;
        PlotCost::new(self.id, self.plot_name, self.area_hectares, totals).with_farm(farm)
    }
}

/// Which ledger an itemized cost line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceSystem {
    #[serde(rename = "financeiro", alias = "financial", alias = "lancamento")]
    Financial,
    #[serde(
        rename = "atividade",
        alias = "atividade_agricola",
        alias = "agricultural_activity"
    )]
    AgriculturalActivity,
    #[serde(rename = "estoque", alias = "inventory")]
    Inventory,
}

impl SourceSystem {
    /// Accepts the Portuguese keys and their English aliases.
    pub fn from_key(raw: &str) -> Option<SourceSystem> {
        match raw.trim().to_lowercase().as_str() {
            "financeiro" | "financial" | "lancamento" => Some(SourceSystem::Financial),
            "atividade" | "atividade_agricola" | "agricultural_activity" => {
                Some(SourceSystem::AgriculturalActivity)
            }
            "estoque" | "inventory" => Some(SourceSystem::Inventory),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SourceSystem::Financial => "Financeiro",
            SourceSystem::AgriculturalActivity => "Atividade agrícola",
            SourceSystem::Inventory => "Estoque",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CostDetailLine {
    pub date: NaiveDate,
    pub category: String,
    pub description: String,
    pub source: SourceSystem,
    pub amount: f64,
    pub category_group: Option<Category>,
}

/// Numbers from the backend arrive either as JSON numbers or as
/// (possibly localized) strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Number(f64),
    Text(String),
}

impl RawNumber {
    pub fn value(&self) -> Option<f64> {
        match self {
            RawNumber::Number(n) if n.is_finite() => Some(*n),
            RawNumber::Number(_) => None,
            RawNumber::Text(s) => parse_f64_safe(Some(s)),
        }
    }
}

fn amount(raw: &Option<RawNumber>) -> f64 {
    raw.as_ref().and_then(RawNumber::value).unwrap_or(0.0)
}

/// Plot cost row as returned by the cost backend.
#[derive(Debug, Clone, Deserialize)]
pub struct PlotCostRecord {
    #[serde(default, alias = "talhao_id")]
    pub id: Value,
    #[serde(alias = "talhao", alias = "nome_talhao", alias = "talhao_nome")]
    pub nome: Option<String>,
    #[serde(alias = "area", alias = "area_hectares")]
    pub area_ha: Option<RawNumber>,
    pub insumos: Option<RawNumber>,
    pub operacional: Option<RawNumber>,
    #[serde(alias = "servicos", alias = "servicos_e_logistica")]
    pub servicos_logistica: Option<RawNumber>,
    pub administrativo: Option<RawNumber>,
    pub outros: Option<RawNumber>,
    #[serde(alias = "farm")]
    pub fazenda: Option<String>,
}

impl PlotCostRecord {
    pub fn into_plot_cost(self) -> PlotCost {
        let id = match &self.id {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        let totals = CategoryTotals {
            inputs: amount(&self.insumos),
            operational: amount(&self.operacional),
            services_logistics: amount(&self.servicos_logistica),
            administrative: amount(&self.administrativo),
            other: amount(&self.outros),
        };
        let name = self.nome.unwrap_or_else(|| "Sem nome".to_string());
        PlotCost::new(id, name.trim(), amount(&self.area_ha), totals).with_farm(self.fazenda)
    }
}

/// Itemized line as returned by the detail backend.
#[derive(Debug, Clone, Deserialize)]
pub struct CostDetailRecord {
    pub data: Option<String>,
    pub categoria: Option<String>,
    pub descricao: Option<String>,
    pub origem: Option<String>,
    pub valor: Option<RawNumber>,
    pub macrogrupo: Option<String>,
}

impl CostDetailRecord {
    /// `None` when the date is missing or unreadable, or when the source
    /// ledger is unknown; such lines are dropped.
    pub fn into_detail_line(self) -> Option<CostDetailLine> {
        let date = parse_date_safe(self.data.as_deref())?;
        let source = self.origem.as_deref().and_then(SourceSystem::from_key)?;
        let category = self.categoria.unwrap_or_default().trim().to_string();
        let category_group = self
            .macrogrupo
            .as_deref()
            .and_then(Category::from_key)
            .or_else(|| Category::from_key(&category));
        Some(CostDetailLine {
            date,
            category,
            description: self.descricao.unwrap_or_default().trim().to_string(),
            source,
            amount: amount(&self.valor),
            category_group,
        })
    }
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct PlotCostRow {
    #[serde(rename = "Talhao")]
    #[tabled(rename = "Talhão")]
    pub plot_name: String,
    #[serde(rename = "AreaHa")]
    #[tabled(rename = "Área (ha)")]
    pub area: String,
    #[serde(rename = "Insumos")]
    #[tabled(rename = "Insumos")]
    pub inputs: String,
    #[serde(rename = "Operacional")]
    #[tabled(rename = "Operacional")]
    pub operational: String,
    #[serde(rename = "ServicosLogistica")]
    #[tabled(rename = "Serviços/Logística")]
    pub services_logistics: String,
    #[serde(rename = "Administrativo")]
    #[tabled(rename = "Administrativo")]
    pub administrative: String,
    #[serde(rename = "Outros")]
    #[tabled(rename = "Outros")]
    pub other: String,
    #[serde(rename = "Total")]
    #[tabled(rename = "Total")]
    pub total: String,
    #[serde(rename = "CustoPorHa")]
    #[tabled(rename = "Custo/ha")]
    pub cost_per_hectare: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct CategoryShareRow {
    #[serde(rename = "Macrogrupo")]
    #[tabled(rename = "Macrogrupo")]
    pub category: String,
    #[serde(rename = "Total")]
    #[tabled(rename = "Total")]
    pub total: String,
    #[serde(rename = "Percentual")]
    #[tabled(rename = "% do total")]
    pub percentage: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct CostDetailRow {
    #[serde(rename = "Data")]
    #[tabled(rename = "Data")]
    pub date: String,
    #[serde(rename = "Origem")]
    #[tabled(rename = "Origem")]
    pub source: String,
    #[serde(rename = "Categoria")]
    #[tabled(rename = "Categoria")]
    pub category: String,
    #[serde(rename = "Descricao")]
    #[tabled(rename = "Descrição")]
    pub description: String,
    #[serde(rename = "Valor")]
    #[tabled(rename = "Valor")]
    pub amount: String,
}

#[derive(Debug, Serialize)]
pub struct CostSummary {
    pub season: String,
    pub total_plots: usize,
    pub total_area: f64,
    pub grand_total: f64,
    pub cost_per_hectare: f64,
    pub per_category: Vec<CategorySummary>,
}

#[derive(Debug, Serialize)]
pub struct CategorySummary {
    pub category: Category,
    pub total: f64,
    pub percentage: f64,
}
