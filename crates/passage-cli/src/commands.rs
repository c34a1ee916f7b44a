//! CLI command implementations.

use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use passage_core::{AnalysisConfig, SpeciesCode, Tier};
use passage_graph::{
    load_network, run_species, species_to_run, JsonWatershed, ResultStore, RunStatus,
    SpeciesOutcome, SpeciesReport,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

const PASSAGE_DIR: &str = ".passage";

fn config_path(path: &Path) -> PathBuf {
    path.join(PASSAGE_DIR).join("config.json")
}

fn store_path(path: &Path) -> PathBuf {
    path.join(PASSAGE_DIR).join("results")
}

/// Loads `.passage/config.json`, or the defaults when there is none.
fn load_config(path: &Path) -> Result<AnalysisConfig> {
    let config_path = config_path(path);
    if !config_path.exists() {
        debug!("No config at {}, using defaults", config_path.display());
        return Ok(AnalysisConfig::default());
    }
    Ok(AnalysisConfig::load(&config_path)?)
}

/// Initialize Passage in a directory.
pub fn init(path: &Path) -> Result<()> {
    let passage_dir = path.join(PASSAGE_DIR);

    if passage_dir.exists() {
        println!("{} Already initialized", "✓".green());
        return Ok(());
    }

    fs::create_dir_all(&passage_dir)?;
    AnalysisConfig::default().save(&config_path(path))?;

    println!("{} Initialized Passage in {}", "✓".green(), path.display());
    println!(
        "  Run {} to analyze a watershed",
        "passage analyze <watershed.json>".cyan()
    );

    Ok(())
}

/// Analyze every species of a watershed, one blocking task per species.
pub async fn analyze(
    path: &Path,
    input: &Path,
    watershed: Option<String>,
    species: Vec<String>,
    top: usize,
) -> Result<()> {
    let mut config = load_config(path)?;
    if !species.is_empty() {
        config.species = species.into_iter().map(SpeciesCode::new).collect();
    }

    let source = JsonWatershed::open(input)?;
    let watershed = watershed.unwrap_or_else(|| source.watershed_id().to_string());
    println!("{}", format!("Analyzing watershed {}...", watershed).cyan());

    let network = Arc::new(load_network(&source, &watershed)?);
    let stats = network.stats();
    println!(
        "{} Loaded {} segments ({} mainstems, {:.1} km)",
        "✓".green(),
        stats.segment_count.to_string().cyan(),
        stats.mainstems,
        stats.total_length
    );

    let species = species_to_run(&network, &config);
    if species.is_empty() {
        println!("{} No species with habitat in this watershed", "⚠".yellow());
        return Ok(());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(format!("Running {} species...", species.len()));

    let config = Arc::new(config);
    let tasks: Vec<_> = species
        .into_iter()
        .map(|code| {
            let source = source.clone();
            let network = Arc::clone(&network);
            let config = Arc::clone(&config);
            let watershed = watershed.clone();
            tokio::task::spawn_blocking(move || {
                run_species(&source, &watershed, &network, &code, &config)
            })
        })
        .collect();

    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        let (report, outcome) = task.await?;
        spinner.set_message(format!("Finished {}", report.species));
        results.push((report, outcome));
    }
    spinner.finish_and_clear();

    fs::create_dir_all(path.join(PASSAGE_DIR))?;
    let store = ResultStore::open(store_path(path))?;
    let mut sink = store.watershed(&watershed);
    for (report, outcome) in &results {
        store.save_report(&watershed, report)?;
        if let Some(outcome) = outcome {
            store.clear_species(&watershed, &outcome.species)?;
            outcome.write_to(&mut sink)?;
        }
    }
    store.flush()?;

    for (report, outcome) in &results {
        print_species(report, outcome.as_ref(), top);
    }

    let failed = results.iter().filter(|(report, _)| !report.succeeded()).count();
    if failed > 0 {
        println!(
            "\n{} {} of {} species failed",
            "⚠".yellow(),
            failed,
            results.len()
        );
    }

    Ok(())
}

fn tier_label(tier: Tier) -> ColoredString {
    match tier {
        Tier::A => "A".green().bold(),
        Tier::B => "B".cyan(),
        Tier::C => "C".yellow(),
        Tier::D => "D".dimmed(),
    }
}

/// Ranked barriers ordered by composite rank, then id.
fn top_barriers(outcome: &SpeciesOutcome, limit: usize) -> Vec<(&str, u32, Tier, u32, f64)> {
    let mut ranked: Vec<_> = outcome
        .ranked()
        .map(|(assessment, ranked)| {
            (
                assessment.barrier.as_str(),
                ranked.ranks.composite,
                ranked.ranks.tier,
                ranked.group.group.0,
                assessment.dci,
            )
        })
        .collect();
    ranked.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(limit);
    ranked
}

fn print_species(report: &SpeciesReport, outcome: Option<&SpeciesOutcome>, top: usize) {
    let outcome = match (&report.status, outcome) {
        (RunStatus::Succeeded, Some(outcome)) => outcome,
        (RunStatus::Succeeded, None) => return,
        (RunStatus::Failed { kind, message }, _) => {
            println!(
                "\n{} {}: {} {}",
                "✗".red(),
                report.species.to_string().cyan().bold(),
                kind.red(),
                message
            );
            return;
        }
    };

    println!(
        "\n{} {}: connectivity {:.4} of {:.4}, {} ranked in {} groups ({}ms)",
        "✓".green(),
        report.species.to_string().cyan().bold(),
        outcome.baseline,
        outcome.max_connectivity,
        report.ranked,
        report.groups,
        report.duration_ms
    );
    for (barrier, composite, tier, group, dci) in top_barriers(outcome, top) {
        println!(
            "  {:>4}  {}  {:<16} {} {:>3}  {} {:.4}",
            composite,
            tier_label(tier),
            barrier,
            "group".dimmed(),
            group,
            "DCI".dimmed(),
            dci
        );
    }

    if !report.truncations.is_empty() {
        println!(
            "  {} {} cyclic walks truncated",
            "⚠".yellow(),
            report.truncations.len()
        );
    }
    if !report.defaulted_passability.is_empty() {
        println!(
            "  {} {} barriers without passability, treated as impassable",
            "⚠".yellow(),
            report.defaulted_passability.len()
        );
    }
    for negative in &report.negative_dci {
        println!(
            "  {} negative DCI {} on {}",
            "⚠".yellow(),
            negative.value,
            negative.barrier.as_str().red()
        );
    }
}

/// Stored results as `{ reports, results: { watershed: { species: [...] } } }`.
fn export_document(store: &ResultStore, only: Option<&SpeciesCode>) -> Result<serde_json::Value> {
    let wanted = |code: &SpeciesCode| only.map_or(true, |only| only == code);

    let mut results = serde_json::Map::new();
    for watershed in store.watersheds()? {
        let mut by_species = serde_json::Map::new();
        for code in store.species(&watershed)?.into_iter().filter(|code| wanted(code)) {
            by_species.insert(
                code.to_string(),
                serde_json::to_value(store.barriers(&watershed, &code)?)?,
            );
        }
        results.insert(watershed, serde_json::Value::Object(by_species));
    }
    let reports: Vec<_> = store
        .reports()?
        .into_iter()
        .filter(|(_, report)| wanted(&report.species))
        .map(|(watershed, report)| serde_json::json!({ "watershed": watershed, "report": report }))
        .collect();

    Ok(serde_json::json!({
        "version": "1.0",
        "reports": reports,
        "results": results
    }))
}

/// Export stored results to JSON.
pub fn export(path: &Path, output: Option<&Path>, species: Option<&str>) -> Result<()> {
    let store_path = store_path(path);
    if !store_path.exists() {
        println!("{} No stored results in {}", "✗".red(), path.display());
        println!("  Run {} first", "passage analyze".cyan());
        return Ok(());
    }
    let store = ResultStore::open(store_path)?;
    let species = species.map(SpeciesCode::new);
    let export = export_document(&store, species.as_ref())?;
    let json = serde_json::to_string_pretty(&export)?;

    match output {
        Some(out_path) => {
            fs::write(out_path, json)?;
            println!("{} Exported to {}", "✓".green(), out_path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}

/// Show configuration and stored run reports.
pub fn status(path: &Path) -> Result<()> {
    let passage_dir = path.join(PASSAGE_DIR);

    if !passage_dir.exists() {
        println!("{} Passage not initialized in this directory", "✗".red());
        println!("  Run {} to initialize", "passage init".cyan());
        return Ok(());
    }

    let config = load_config(path)?;

    println!("{}", "Passage Status".cyan().bold());
    println!();
    let species = if config.species.is_empty() {
        "all with habitat".to_string()
    } else {
        config
            .species
            .iter()
            .map(|code| code.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!("  {} {}", "Species:".dimmed(), species);
    println!(
        "  {} {}",
        "Gain band threshold:".dimmed(),
        config.gain_band_threshold
    );
    println!("  {} {}", "Tier width:".dimmed(), config.tier_width);

    let store_path = store_path(path);
    if !store_path.exists() {
        println!("  {} none", "Runs:".dimmed());
        return Ok(());
    }

    let store = ResultStore::open(store_path)?;
    let reports = store.reports()?;
    println!("  {} {}", "Runs:".dimmed(), reports.len());
    for (watershed, report) in reports {
        let mark = if report.succeeded() {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "    {} {}/{} {} ranked, {}",
            mark,
            watershed,
            report.species,
            report.ranked,
            report.completed_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }

    Ok(())
}
