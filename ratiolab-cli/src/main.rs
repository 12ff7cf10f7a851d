//! RatioLab CLI: ratio ranking, sweeps, downloads and cache management.
//!
//! Commands:
//! - `rank`: rank a universe by the change of each ticker's ratio to a reference
//! - `sweep`: rank against every universe member as reference, in parallel
//! - `download`: fetch price history from Yahoo Finance and cache as Parquet
//! - `universe`: list the configured universe
//! - `cache status`: report cache size, symbol count and date ranges

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use ratiolab_core::data::{
    download_symbols, CacheMeta, CircuitBreaker, ParquetCache, PriceHistoryProvider,
    StdoutProgress, Universe, YahooProvider,
};
use ratiolab_core::{PctChange, RatioRow, SortOrder};
use ratiolab_runner::{
    export_sweep_csv, load_panel, min_start_date, run_config, save_artifacts, sweep_references,
    LoadOptions, LoadedPanel, PipelineError, RankingConfig, RankingReport, RankingRequest,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ratiolab",
    about = "RatioLab CLI: relative performance ranking against a reference ticker"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by `rank` and `sweep`.
#[derive(clap::Args)]
struct RankArgs {
    /// Path to a TOML ranking config. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start date (YYYY-MM-DD). Defaults to one year ago.
    #[arg(long)]
    start: Option<String>,

    /// End date (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    end: Option<String>,

    /// Sort order: asc or desc. Defaults to asc.
    #[arg(long)]
    order: Option<SortOrder>,

    /// Offline mode: no network access.
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Use synthetic data as fallback.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Cache directory. Defaults to ./data.
    #[arg(long, default_value = "data")]
    cache_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank the universe by change in ratio to a reference ticker.
    Rank {
        /// Reference ticker (e.g., GGAL.BA).
        #[arg(long)]
        reference: Option<String>,

        #[command(flatten)]
        args: RankArgs,

        /// Output directory for report artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Also list tickers whose change is undefined.
        #[arg(long, default_value_t = false)]
        show_undefined: bool,
    },
    /// Rank against every universe member as reference.
    Sweep {
        #[command(flatten)]
        args: RankArgs,

        /// Write the per-reference summary as CSV to this file.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Download price history from Yahoo Finance and cache as Parquet.
    Download {
        /// Symbols to download. Defaults to the whole Merval universe.
        symbols: Vec<String>,

        /// Start date (YYYY-MM-DD). Defaults to 2010-01-01.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,

        /// Force re-download even if cached.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// List the tickers of a universe.
    Universe {
        /// Universe TOML file. Defaults to the built-in Merval universe.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cache size, symbol count, and date ranges.
    Status {
        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Rank {
            reference,
            args,
            output_dir,
            show_undefined,
        } => run_rank(reference, args, output_dir, show_undefined),
        Commands::Sweep { args, csv } => run_sweep(args, csv),
        Commands::Download {
            symbols,
            start,
            end,
            force,
            cache_dir,
        } => run_download(symbols, start, end, force, cache_dir),
        Commands::Universe { file } => run_universe(file),
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => run_cache_status(&cache_dir),
        },
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}

/// Config file (if any) with command-line overrides applied.
fn build_config(reference: Option<String>, args: &RankArgs) -> Result<RankingConfig> {
    let start = args.start.as_deref().map(parse_date).transpose()?;
    let end = args.end.as_deref().map(parse_date).transpose()?;

    let mut config = match (&args.config, reference.as_deref()) {
        (Some(path), _) => RankingConfig::from_file(path)?,
        (None, Some(reference)) => {
            let default_start = today() - chrono::Duration::days(365);
            RankingConfig::new(reference, start.unwrap_or(default_start))
        }
        (None, None) => {
            // sweeps ignore the reference; any universe member validates
            let universe = Universe::default_merval();
            let Some(first) = universe.tickers.first() else {
                bail!("built-in universe is empty");
            };
            let default_start = today() - chrono::Duration::days(365);
            RankingConfig::new(first.clone(), start.unwrap_or(default_start))
        }
    };

    if let Some(reference) = reference {
        config.ranking.reference = reference;
    }
    if let Some(start) = start {
        config.ranking.start_date = start;
    }
    if end.is_some() {
        config.ranking.end_date = end;
    }
    if let Some(order) = args.order {
        config.ranking.order = order;
    }
    Ok(config)
}

fn make_provider() -> Result<YahooProvider> {
    let circuit_breaker = Arc::new(CircuitBreaker::default_provider());
    Ok(YahooProvider::new(circuit_breaker)?)
}

fn fail(err: &PipelineError) -> ! {
    eprintln!("Error: {}: {err}", err.kind().message());
    std::process::exit(1);
}

fn run_rank(
    reference: Option<String>,
    args: RankArgs,
    output_dir: PathBuf,
    show_undefined: bool,
) -> Result<()> {
    if args.config.is_none() && reference.is_none() {
        bail!("one of --config or --reference is required");
    }
    let config = build_config(reference, &args)?;

    let cache = ParquetCache::new(&args.cache_dir);
    let provider = make_provider()?;
    let provider_ref: Option<&dyn PriceHistoryProvider> =
        if args.offline { None } else { Some(&provider) };

    let (report, loaded) = match run_config(
        &config,
        today(),
        &cache,
        provider_ref,
        Some(&StdoutProgress),
        args.offline,
        args.synthetic,
    ) {
        Ok(out) => out,
        Err(e) => fail(&e),
    };

    print_load_warnings(&loaded);
    print_ranking(&report, show_undefined);

    let run_dir = save_artifacts(&report, &output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn print_load_warnings(loaded: &LoadedPanel) {
    for (symbol, reason) in &loaded.missing {
        println!("WARNING: {symbol} unavailable: {reason}");
    }
    for symbol in &loaded.stale {
        println!("WARNING: {symbol} cached history may not reach the requested dates");
    }
}

fn run_sweep(args: RankArgs, csv: Option<PathBuf>) -> Result<()> {
    let config = build_config(None, &args)?;
    if let Err(e) = config.validate(today()) {
        fail(&e.into());
    }

    let cache = ParquetCache::new(&args.cache_dir);
    let provider = make_provider()?;
    let provider_ref: Option<&dyn PriceHistoryProvider> =
        if args.offline { None } else { Some(&provider) };

    let opts = LoadOptions {
        start: config.ranking.start_date,
        end: config.end_date_or(today()),
        offline: args.offline,
        synthetic: args.synthetic,
        force: false,
    };
    let loaded = match load_panel(
        &config.universe.all_tickers(),
        &cache,
        provider_ref,
        Some(&StdoutProgress),
        &opts,
    ) {
        Ok(loaded) => loaded,
        Err(e) => fail(&e.into()),
    };
    print_load_warnings(&loaded);

    let references: Vec<&str> = loaded.panel.instruments().collect();
    let template = RankingRequest::from_config(&config, today());
    info!(references = references.len(), "starting sweep");
    let results = match sweep_references(&loaded.panel, &references, &template) {
        Ok(results) => results,
        Err(e) => fail(&e),
    };

    println!();
    println!(
        "=== Sweep {} to {} ({}) ===",
        results.start, results.end, template.order
    );
    println!(
        "{:<10} {:>6} {:<10} {:>10} {:<10} {:>10}",
        "Reference", "Ranked", "Best", "Change", "Worst", "Change"
    );
    println!("{}", "-".repeat(62));
    for row in results.summary() {
        if let Some(err) = &row.error {
            println!("{:<10} ERROR: {err}", row.reference);
            continue;
        }
        let (best, best_pct) = pick_cells(&row.best);
        let (worst, worst_pct) = pick_cells(&row.worst);
        println!(
            "{:<10} {:>6} {:<10} {:>10} {:<10} {:>10}",
            row.reference, row.ranked, best, best_pct, worst, worst_pct
        );
    }
    if loaded.has_synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }

    if let Some(path) = csv {
        std::fs::write(&path, export_sweep_csv(&results)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Sweep summary saved to: {}", path.display());
    }
    Ok(())
}

fn pick_cells(pick: &Option<(String, f64)>) -> (String, String) {
    match pick {
        Some((symbol, pct)) => (symbol.clone(), format!("{pct:+.2}%")),
        None => ("-".into(), "-".into()),
    }
}

fn run_download(
    symbols: Vec<String>,
    start: Option<String>,
    end: Option<String>,
    force: bool,
    cache_dir: PathBuf,
) -> Result<()> {
    let start_date = start
        .as_deref()
        .map(parse_date)
        .transpose()?
        .unwrap_or_else(min_start_date);
    let end_date = end.as_deref().map(parse_date).transpose()?.unwrap_or_else(today);
    if start_date > end_date {
        bail!("start date {start_date} is after end date {end_date}");
    }

    let symbols = if symbols.is_empty() {
        Universe::default_merval().tickers
    } else {
        symbols
    };

    let provider = make_provider()?;
    let cache = ParquetCache::new(cache_dir);
    let sym_refs: Vec<&str> = symbols.iter().map(|s| s.as_str()).collect();

    let summary = download_symbols(
        &provider,
        &cache,
        &sym_refs,
        start_date,
        end_date,
        force,
        &StdoutProgress,
    );

    if !summary.all_succeeded() {
        for (sym, err) in &summary.errors {
            eprintln!("Error for {sym}: {err}");
        }
        std::process::exit(1);
    }

    Ok(())
}

fn run_universe(file: Option<PathBuf>) -> Result<()> {
    let universe = match file {
        Some(path) => Universe::from_file(&path)?,
        None => Universe::default_merval(),
    };
    println!(
        "Universe: {} ({} tickers)",
        universe.name,
        universe.ticker_count()
    );
    for chunk in universe.tickers.chunks(8) {
        println!("  {}", chunk.join("  "));
    }
    Ok(())
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let mut total_size: u64 = 0;
    let mut rows: Vec<(String, String, String, u64)> = Vec::new();

    for entry in std::fs::read_dir(cache_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(symbol) = name.strip_prefix("symbol=") else {
            continue;
        };

        let meta_path = entry.path().join("meta.json");
        let (date_range, quote_count) = match std::fs::read_to_string(&meta_path) {
            Ok(content) => match serde_json::from_str::<CacheMeta>(&content) {
                Ok(meta) => (
                    format!("{} to {}", meta.start_date, meta.end_date),
                    meta.quote_count,
                ),
                Err(_) => ("(corrupt meta)".into(), 0),
            },
            Err(_) => ("(no meta)".into(), 0),
        };

        let size = dir_size(&entry.path());
        total_size += size;
        rows.push((symbol.to_string(), date_range, format!("{quote_count} quotes"), size));
    }

    if rows.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    rows.sort_by(|a, b| a.0.cmp(&b.0));

    println!("Cache: {}", cache_dir.display());
    println!("Symbols: {}", rows.len());
    println!("Total size: {}", format_size(total_size));
    println!();
    println!("{:<10} {:<25} {:<14} {:>10}", "Symbol", "Date Range", "Quotes", "Size");
    println!("{}", "-".repeat(62));
    for (sym, range, quotes, size) in &rows {
        println!("{:<10} {:<25} {:<14} {:>10}", sym, range, quotes, format_size(*size));
    }

    Ok(())
}

fn dir_size(path: &Path) -> u64 {
    let mut size = 0u64;
    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            if let Ok(meta) = entry.metadata() {
                size += meta.len();
            }
        }
    }
    size
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn format_ratio(row: &RatioRow) -> (String, String) {
    let fmt = |v: Option<f64>| v.map(|v| format!("{v:.4}")).unwrap_or_else(|| "-".into());
    (fmt(row.ratio_start), fmt(row.ratio_end))
}

fn print_ranking(report: &RankingReport, show_undefined: bool) {
    let result = &report.result;
    println!();
    println!("=== Ranked Changes in Ratios ===");
    println!("Reference:      {}", result.reference);
    println!("Comparing:      {} and {}", result.start, result.end);
    println!("Order:          {}", result.order);
    println!();
    println!(
        "{:>4} {:<10} {:>12} {:>12} {:>10}",
        "#", "Symbol", "Ratio Start", "Ratio End", "Change"
    );
    println!("{}", "-".repeat(52));
    for (i, row) in result.ranked().iter().enumerate() {
        let (start, end) = format_ratio(row);
        println!(
            "{:>4} {:<10} {:>12} {:>12} {:>9.2}%",
            i + 1,
            row.symbol,
            start,
            end,
            row.pct_change.value().unwrap_or_default()
        );
    }

    if !result.undefined().is_empty() {
        println!();
        if show_undefined {
            println!("Undefined changes:");
            for row in result.undefined() {
                let (start, end) = format_ratio(row);
                let reason = match row.pct_change {
                    PctChange::Undefined(reason) => reason.to_string(),
                    PctChange::Defined(_) => String::new(),
                };
                println!("     {:<10} {:>12} {:>12} {}", row.symbol, start, end, reason);
            }
        } else {
            println!(
                "{} ticker(s) with undefined change (pass --show-undefined to list)",
                result.undefined().len()
            );
        }
    }

    if report.has_synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    println!();
}
