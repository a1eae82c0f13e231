// Entry point and interactive menu.
//
// - Settings and logging are loaded once; the session (user id) comes from
//   configuration and is handed to the dashboard explicitly.
// - Every filter change reloads the plot costs. Failures show a banner and
//   wait for the user to retry with option [1].
// - Option [7] opens the drill-down of one plot.
mod aggregator;
mod backend;
mod dashboard;
mod error;
mod fetcher;
mod filter;
mod loader;
mod logging;
mod output;
mod settings;
mod state;
mod types;
mod util;

use anyhow::Context;
use chrono::Local;
use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use backend::{CostBackend, FileBackend, HttpBackend};
use dashboard::Dashboard;
use fetcher::{CostFetcher, Session};
use filter::{parse_season, parse_year_month, FilterPatch};
use settings::{BackendKind, Settings};
use state::{CostViewState, DrillDownState, NO_DETAILS_MESSAGE};
use types::Category;

type App = Dashboard<dyn CostBackend>;

fn prompt(label: &str) -> String {
    print!("{}: ", label);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

fn read_choice() -> String {
    prompt("Opção")
}

/// Empty input means "all groups".
fn read_category(label: &str) -> Option<Option<Category>> {
    let raw = prompt(label);
    if raw.is_empty() || raw.eq_ignore_ascii_case("todos") {
        return Some(None);
    }
    match Category::from_key(&raw) {
        Some(c) => Some(Some(c)),
        None => {
            println!("Macrogrupo desconhecido: {}\n", raw);
            None
        }
    }
}

fn print_filter(app: &App) {
    let f = app.filter();
    let period = parse_season(&f.season)
        .ok()
        .and_then(|s| s.bounds())
        .map(|(start, end)| format!(" ({} a {})", start.format("%d/%m/%Y"), end.format("%d/%m/%Y")))
        .unwrap_or_default();
    let plots = if f.plot_names.is_empty() {
        "todos".to_string()
    } else {
        f.plot_names.iter().cloned().collect::<Vec<_>>().join(", ")
    };
    println!(
        "Safra {}{} | Fazenda: {} | Talhões: {} | Macrogrupo: {} | Mês: {}",
        f.season,
        period,
        f.farm.as_deref().unwrap_or("todas"),
        plots,
        f.category.map(|c| c.label()).unwrap_or("todos"),
        f.year_month.as_deref().unwrap_or("todos")
    );
}

fn render_costs(app: &App) {
    println!();
    print_filter(app);
    println!();
    match app.costs().state() {
        CostViewState::Idle => {
            if app.session().is_none() {
                println!("(usuário não identificado, configure session.user_id)\n");
            } else {
                println!("(custos ainda não carregados)\n");
            }
        }
        CostViewState::Loading => println!("Carregando...\n"),
        CostViewState::Empty => {
            println!("{}\n", app.costs().empty_message().unwrap_or_default());
        }
        CostViewState::Failed(_) => {
            println!("⚠ {}", app.costs().banner().unwrap_or_default());
            println!("  Use a opção [1] para tentar novamente.\n");
        }
        CostViewState::Loaded(rows) => {
            let mut rows = rows.clone();
            aggregator::sort_by_cost(&mut rows);
            let mut table = aggregator::plot_rows(&rows);
            table.push(aggregator::total_row(&rows));
            println!("Custo por Talhão ({} talhões)\n", util::format_int(rows.len()));
            output::preview_table_rows(&table, table.len());
            println!("Participação por macrogrupo\n");
            output::preview_table_rows(&aggregator::share_rows(&rows), Category::ALL.len());
        }
    }
}

fn render_details(app: &App) {
    match app.details().state() {
        DrillDownState::Closed => {}
        DrillDownState::Loading { plot_id } => println!("Carregando lançamentos de {}...\n", plot_id),
        DrillDownState::NoData { plot_id } => println!("{} ({})\n", NO_DETAILS_MESSAGE, plot_id),
        DrillDownState::Loaded { plot_id, .. } => {
            let lines = app.details().visible_lines();
            let group = app.details().group().map(|c| c.label()).unwrap_or("todos");
            println!("Lançamentos de {} (macrogrupo: {})\n", plot_id, group);
            if lines.is_empty() {
                println!("{}\n", NO_DETAILS_MESSAGE);
                return;
            }
            output::preview_table_rows(&aggregator::detail_rows(&lines), lines.len());
            println!(
                "Total: {}\n",
                util::format_brl(aggregator::detail_total(&lines))
            );
        }
    }
}

/// Look a plot up by name or id among the loaded rows.
fn resolve_plot_id(app: &App, input: &str) -> Option<String> {
    app.costs()
        .rows()
        .iter()
        .find(|r| r.id == input || r.plot_name.eq_ignore_ascii_case(input))
        .map(|r| r.id.clone())
}

async fn handle_details(app: &mut App) {
    if app.costs().rows().is_empty() {
        println!("Carregue os custos antes de detalhar um talhão.\n");
        return;
    }
    let input = prompt("Talhão (nome ou id)");
    let Some(plot_id) = resolve_plot_id(app, &input) else {
        println!("Talhão não encontrado: {}\n", input);
        return;
    };
    app.select_plot(&plot_id).await;
    loop {
        render_details(app);
        if !matches!(app.details().state(), DrillDownState::Loaded { .. }) {
            break;
        }
        let raw = prompt("Filtrar macrogrupo (Enter = todos, F = fechar)");
        if raw.eq_ignore_ascii_case("f") {
            break;
        }
        if raw.is_empty() {
            app.set_detail_group(None);
        } else {
            match Category::from_key(&raw) {
                Some(c) => app.set_detail_group(Some(c)),
                None => println!("Macrogrupo desconhecido: {}\n", raw),
            }
        }
    }
    app.close_details();
}

fn handle_export(app: &App) {
    let rows = app.costs().rows();
    if rows.is_empty() {
        println!("Nada para exportar.\n");
        return;
    }
    let slug = app.filter().season.replace('/', "-");
    let csv_path = format!("custo_por_talhao_{}.csv", slug);
    let json_path = format!("resumo_custos_{}.json", slug);

    let mut table = aggregator::plot_rows(rows);
    table.push(aggregator::total_row(rows));
    match output::write_csv(Path::new(&csv_path), &table) {
        Ok(()) => logging::log_export_written(&csv_path, table.len()),
        Err(e) => eprintln!("Erro ao gravar {}: {}", csv_path, e),
    }
    let summary = aggregator::generate_summary(&app.filter().season, rows);
    if let Err(e) = output::write_json(Path::new(&json_path), &summary) {
        eprintln!("Erro ao gravar {}: {}", json_path, e);
    }
    println!("Relatório exportado para {} e {}\n", csv_path, json_path);
}

fn build_backend(settings: &Settings) -> anyhow::Result<Arc<dyn CostBackend>> {
    let backend: Arc<dyn CostBackend> = match settings.backend_kind()? {
        BackendKind::Files { dir } => Arc::new(FileBackend::new(dir)),
        BackendKind::Http { base_url, api_key } => Arc::new(HttpBackend::new(
            base_url,
            api_key,
            settings.backend.plot_costs_fn.clone(),
            settings.backend.details_fn.clone(),
            settings.transport_timeout(),
        )?),
    };
    Ok(backend)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::new().context("failed to load configuration")?;
    logging::init(&settings.log.level);

    let backend = build_backend(&settings)?;
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
    logging::log_config_loaded(&run_mode, backend.backend_tag());

    let fetcher = CostFetcher::with_timeout(backend, settings.cost_timeout()?);
    let session = settings
        .session
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(Session::new);
    let mut app: App = Dashboard::new(fetcher, session, Local::now().date_naive());
    tracing::info!("Cost query timeout: {:?}", app.fetcher().timeout());

    app.reload().await;
    render_costs(&app);

    loop {
        println!("Zé da Safra · Custo por Talhão");
        println!("[1] Recarregar custos");
        println!("[2] Alterar safra");
        println!("[3] Filtrar talhões");
        println!("[4] Filtrar macrogrupo");
        println!("[5] Filtrar mês");
        println!("[6] Filtrar fazenda");
        println!("[7] Detalhar talhão");
        println!("[8] Exportar relatório");
        println!("[0] Sair\n");
        match read_choice().as_str() {
            "1" => {
                app.reload().await;
                render_costs(&app);
            }
            "2" => {
                let raw = prompt("Safra (AAAA/AAAA, Enter = atual)");
                if !raw.is_empty() {
                    if let Err(e) = parse_season(&raw) {
                        println!("{}\n", e);
                        continue;
                    }
                }
                app.update_filter(FilterPatch::season(raw)).await;
                render_costs(&app);
            }
            "3" => {
                let raw = prompt("Talhões separados por vírgula (alterna seleção, Enter = todos)");
                if raw.is_empty() {
                    app.clear_plots().await;
                } else {
                    let names: BTreeSet<String> = raw
                        .split(',')
                        .map(|n| n.trim().to_string())
                        .filter(|n| !n.is_empty())
                        .collect();
                    for name in names {
                        app.toggle_plot(&name).await;
                    }
                }
                render_costs(&app);
            }
            "4" => {
                if let Some(category) = read_category("Macrogrupo (Enter = todos)") {
                    app.update_filter(FilterPatch::category(category)).await;
                    render_costs(&app);
                }
            }
            "5" => {
                let raw = prompt("Mês (AAAA-MM, Enter = todos)");
                if !raw.is_empty() {
                    if let Err(e) = parse_year_month(&raw) {
                        println!("{}\n", e);
                        continue;
                    }
                }
                app.update_filter(FilterPatch::year_month(Some(raw))).await;
                render_costs(&app);
            }
            "6" => {
                let raw = prompt("Fazenda (Enter = todas)");
                app.update_filter(FilterPatch::farm(Some(raw))).await;
                render_costs(&app);
            }
            "7" => handle_details(&mut app).await,
            "8" => handle_export(&app),
            "0" => {
                println!("Saindo.");
                break;
            }
            _ => println!("Opção inválida.\n"),
        }
    }
    Ok(())
}
