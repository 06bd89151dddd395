mod constants;

use anyhow::{bail, Context, Result};
use clap::Parser;
use latmap_core::table::{self, Feature};
use latmap_core::{
    legend, ColorRamp, Dataset, FeatureRole, FeatureStyle, LegendStop, Metric, RefreshPhase,
    RefreshScheduler, RenderState, RenderStateCoordinator, Rgb, ScaleConfig, SelectionInputs,
    Transform,
};
use log::{info, warn};
use serde::Serialize;
use std::io::{self, BufRead};
use std::path::PathBuf;

use constants::*;

#[derive(Parser, Debug)]
#[command(about = "Color a world map by country-pair latency measured from one source")]
struct Args {
    /// Row table (CSV, or JSONL for .jsonl/.ndjson)
    #[arg(long)]
    rows: PathBuf,

    /// GeoJSON FeatureCollection of countries
    #[arg(long)]
    geo: Option<PathBuf>,

    /// Scale configuration JSON
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    source: Option<String>,

    #[arg(long, default_value = "average_ms")]
    metric: Metric,

    #[arg(long, conflicts_with = "manual")]
    auto: bool,

    #[arg(long)]
    manual: bool,

    #[arg(long)]
    min_ms: Option<f64>,

    #[arg(long)]
    max_ms: Option<f64>,

    #[arg(long)]
    p_low: Option<f64>,

    #[arg(long)]
    p_high: Option<f64>,

    #[arg(long)]
    log: bool,

    #[arg(long)]
    missing_color: Option<Rgb>,

    #[arg(long, default_value_t = DEFAULT_LEGEND_STEPS)]
    legend_steps: usize,

    #[arg(long)]
    list_sources: bool,

    /// Read selection changes from stdin, one burst per line
    #[arg(long)]
    watch: bool,

    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct FeatureReport {
    code: String,
    name: String,
    role: FeatureRole,
    value_ms: Option<f64>,
    style: FeatureStyle,
    tooltip: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct Coverage {
    colored: usize,
    missing: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    state: RenderState,
    features: Vec<FeatureReport>,
    legend: Vec<LegendStop>,
    coverage: Coverage,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_LOG_FILTER))
        .init();
    let args = Args::parse();

    let raw = table::load_rows(&args.rows)
        .with_context(|| format!("failed to load rows from {}", args.rows.display()))?;
    let dataset = Dataset::from_raw(&raw);
    if dataset.is_empty() {
        bail!("{} contains no usable rows", args.rows.display());
    }

    if args.list_sources {
        for src in dataset.sources() {
            println!("{}", src);
        }
        return Ok(());
    }

    let geography = match &args.geo {
        Some(path) => Some(
            table::load_features(path)
                .with_context(|| format!("failed to load geography from {}", path.display()))?,
        ),
        None => None,
    };

    let scale = scale_config(&args)?;
    let source = match &args.source {
        Some(src) => src.clone(),
        None => match dataset.sources().into_iter().next() {
            Some(first) => {
                info!("no --source given, using {}", first);
                first
            }
            None => bail!("no sources in row table"),
        },
    };

    let selection = SelectionInputs {
        source: Some(source),
        metric: args.metric,
        scale,
    };
    let mut coordinator = RenderStateCoordinator::new(dataset, ColorRamp::default());

    if args.watch {
        return watch(&mut coordinator, selection, geography.as_deref(), &args);
    }

    coordinator.recompute(&selection);
    let report = build_report(&coordinator, geography.as_deref(), args.legend_steps);
    if args.json {
        let text = serde_json::to_string_pretty(&report)
            .unwrap_or_else(|_| "{\"error\":\"failed to serialize\"}".to_string());
        println!("{text}");
    } else {
        print_report(&report);
    }
    Ok(())
}

fn scale_config(args: &Args) -> Result<ScaleConfig> {
    let mut cfg = match &args.config {
        Some(path) => ScaleConfig::load(path)?,
        None => ScaleConfig::default(),
    };
    if args.auto {
        cfg.auto = true;
    }
    if args.manual {
        cfg.auto = false;
    }
    if let Some(v) = args.min_ms {
        cfg.min_ms = v;
    }
    if let Some(v) = args.max_ms {
        cfg.max_ms = v;
    }
    if let Some(v) = args.p_low {
        cfg.p_low = v;
    }
    if let Some(v) = args.p_high {
        cfg.p_high = v;
    }
    if args.log {
        cfg.transform = Transform::Log;
    }
    if let Some(c) = args.missing_color {
        cfg.missing_color = c;
    }
    Ok(cfg)
}

/// Without geography, the map is the source plus every destination it reports.
fn feature_set(
    coordinator: &RenderStateCoordinator,
    geography: Option<&[Feature]>,
) -> Vec<Feature> {
    if let Some(features) = geography {
        return features.to_vec();
    }
    let Some(src) = coordinator.state().selected_source.clone() else {
        return Vec::new();
    };
    let mut codes = coordinator.dataset().destinations(&src);
    if !codes.contains(&src) {
        codes.insert(0, src);
    }
    codes
        .into_iter()
        .map(|code| Feature {
            name: code.clone(),
            code,
        })
        .collect()
}

fn build_report(
    coordinator: &RenderStateCoordinator,
    geography: Option<&[Feature]>,
    legend_steps: usize,
) -> Report {
    let state = coordinator.state().clone();
    let mut coverage = Coverage::default();
    let features: Vec<FeatureReport> = feature_set(coordinator, geography)
        .into_iter()
        .map(|f| {
            let role = coordinator.role_for(&f.code);
            match role {
                FeatureRole::Colored => coverage.colored += 1,
                FeatureRole::Missing => coverage.missing += 1,
                FeatureRole::Source => {}
            }
            FeatureReport {
                role,
                value_ms: coordinator.value_for(&f.code).valid(),
                style: coordinator.style_for(&f.code),
                tooltip: coordinator.tooltip_for(&f.name, &f.code),
                code: f.code,
                name: f.name,
            }
        })
        .collect();
    Report {
        legend: legend(&state.range(), coordinator.ramp(), legend_steps),
        state,
        features,
        coverage,
    }
}

fn print_state(state: &RenderState) {
    println!(
        "source={} metric={} scale=[{:.1}, {:.1}] transform={:?}",
        state.selected_source.as_deref().unwrap_or("-"),
        state.selected_metric,
        state.scale_min,
        state.scale_max,
        state.transform
    );
}

fn legend_header(metric: Metric) -> String {
    format!("legend, {}", metric.label())
}

fn print_report(report: &Report) {
    print_state(&report.state);
    println!(
        "\nfeatures (colored={} missing={}):",
        report.coverage.colored, report.coverage.missing
    );
    for f in &report.features {
        println!(
            "- {} fill={} weight={:.1} role={:?} tooltip=\"{}\"",
            if f.code.is_empty() { "??" } else { f.code.as_str() },
            f.style.fill_color,
            f.style.weight,
            f.role,
            f.tooltip.replace('\n', " | ")
        );
    }
    println!("\n{}:", legend_header(report.state.selected_metric));
    for stop in &report.legend {
        println!("- {:>8.1} ms {}", stop.value, stop.color);
    }
}

/// Applies one `key=value` selection command. Returns false for `quit`.
fn apply_command(selection: &mut SelectionInputs, command: &str) -> Result<bool, String> {
    let (key, value) = match command.split_once('=') {
        Some((k, v)) => (k.trim(), v.trim()),
        None => (command.trim(), ""),
    };
    let number = || value.parse::<f64>().map_err(|_| format!("{key}: not a number: {value}"));
    match key {
        "quit" | "exit" => return Ok(false),
        "source" => selection.source = Some(value.to_string()).filter(|s| !s.is_empty()),
        "metric" => selection.metric = value.parse()?,
        "transform" => selection.scale.transform = value.parse()?,
        "log" => selection.scale.transform = Transform::Log,
        "linear" => selection.scale.transform = Transform::Linear,
        "auto" => selection.scale.auto = true,
        "manual" => selection.scale.auto = false,
        "min" => selection.scale.min_ms = number()?,
        "max" => selection.scale.max_ms = number()?,
        "plow" => selection.scale.p_low = number()?,
        "phigh" => selection.scale.p_high = number()?,
        "missing" => selection.scale.missing_color = value.parse()?,
        other => return Err(format!("unknown command: {other}")),
    }
    Ok(true)
}

fn watch(
    coordinator: &mut RenderStateCoordinator,
    mut selection: SelectionInputs,
    geography: Option<&[Feature]>,
    args: &Args,
) -> Result<()> {
    let mut scheduler = RefreshScheduler::new();
    scheduler.signal();
    pump(&mut scheduler, coordinator, &selection, geography, args.legend_steps, args.json);

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let keep_going = apply_burst(&mut selection, &mut scheduler, &line);
        pump(&mut scheduler, coordinator, &selection, geography, args.legend_steps, args.json);
        if !keep_going {
            break;
        }
    }
    info!(
        "watch finished: {} signals, {} passes",
        scheduler.signals(),
        scheduler.passes()
    );
    Ok(())
}

/// Applies one stdin line of commands, signaling once per accepted change.
/// Stops at `quit`; returns false if it was seen.
fn apply_burst(
    selection: &mut SelectionInputs,
    scheduler: &mut RefreshScheduler,
    line: &str,
) -> bool {
    for command in line.split(COMMAND_SEPARATOR).filter(|c| !c.trim().is_empty()) {
        match apply_command(selection, command) {
            Ok(true) => scheduler.signal(),
            Ok(false) => return false,
            Err(err) => warn!("{}", err),
        }
    }
    true
}

/// Stands in for the host's paint cycle: ticks frames until the scheduler idles.
fn pump(
    scheduler: &mut RefreshScheduler,
    coordinator: &mut RenderStateCoordinator,
    selection: &SelectionInputs,
    geography: Option<&[Feature]>,
    legend_steps: usize,
    json: bool,
) {
    for _ in 0..MAX_FRAMES_PER_BURST {
        if scheduler.phase() == RefreshPhase::Idle {
            break;
        }
        scheduler.on_frame(|_| {
            coordinator.recompute(selection);
            let report = build_report(coordinator, geography, legend_steps);
            if json {
                match serde_json::to_string(&report) {
                    Ok(text) => println!("{text}"),
                    Err(err) => warn!("failed to serialize report: {}", err),
                }
            } else {
                print_state(&report.state);
                println!(
                    "  colored={} missing={}",
                    report.coverage.colored, report.coverage.missing
                );
            }
        });
    }
}
