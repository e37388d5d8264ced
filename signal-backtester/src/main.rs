use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use signal_backtester::{
    build_signal, generate_synthetic_candles, load_file, BacktestEngine, Candle, GridTable,
    RunSettings, SignalConfig, TextReport, WalkForwardReport, DEFAULT_SPLIT_RATIO,
};

#[derive(Parser, Debug)]
#[command(name = "signal-backtester")]
#[command(version)]
#[command(about = "Signal backtester with statistical validation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Backtest one configuration over the full data set
    Run {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Chronological train/test split with a robustness verdict
    WalkForward {
        #[command(flatten)]
        common: CommonArgs,

        /// Fraction of candles in the in-sample partition
        #[arg(long, default_value_t = DEFAULT_SPLIT_RATIO)]
        split_ratio: f64,
    },
    /// Rank every combination of the parameter grid by expectancy
    GridSearch {
        #[command(flatten)]
        common: CommonArgs,

        /// Number of ranked results to print
        #[arg(long, default_value = "10")]
        top: usize,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Data file path (CSV/JSON). If not provided, uses synthetic data.
    #[arg(short = 'f', long)]
    data_file: Option<PathBuf>,

    /// Number of synthetic hourly candles
    #[arg(long, default_value = "2000")]
    synthetic: usize,

    /// Initial price for synthetic data
    #[arg(long, default_value = "100.0")]
    initial_price: f64,

    /// Seed for synthetic data and bootstrap resampling
    #[arg(long)]
    seed: Option<u64>,

    /// TOML settings file (backtest, analysis, signal, grid tables)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop loss percentage (10 = 10%)
    #[arg(long)]
    stop_loss: Option<f64>,

    /// Take profit percentage
    #[arg(long)]
    take_profit: Option<f64>,

    /// Trailing stop percentage (0 disables)
    #[arg(long)]
    trailing_stop: Option<f64>,

    /// Maximum candles a trade stays open
    #[arg(long)]
    max_hold: Option<usize>,

    /// Slippage percentage applied on exit
    #[arg(long)]
    slippage: Option<f64>,

    /// Fee percentage per side
    #[arg(long)]
    fee: Option<f64>,

    /// Enter every N candles instead of the configured signal
    #[arg(long)]
    signal_interval: Option<usize>,

    /// Label attached to results
    #[arg(short, long, default_value = "backtest")]
    label: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    output: OutputFormat,

    /// Pretty print JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

/// Settings file merged with command-line overrides
fn resolve_settings(args: &CommonArgs) -> Result<RunSettings> {
    let mut settings = match &args.config {
        Some(path) => RunSettings::from_toml_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => RunSettings::default(),
    };

    let bt = &mut settings.backtest;
    if let Some(v) = args.stop_loss {
        bt.stop_loss_pct = v;
    }
    if let Some(v) = args.take_profit {
        bt.take_profit_pct = v;
    }
    if let Some(v) = args.trailing_stop {
        bt.trailing_stop_pct = v;
    }
    if let Some(v) = args.max_hold {
        bt.max_hold_candles = v;
    }
    if let Some(v) = args.slippage {
        bt.slippage_pct = v;
    }
    if let Some(v) = args.fee {
        bt.fee_pct = v;
    }
    if let Some(interval) = args.signal_interval {
        settings.signal = SignalConfig::EveryNth { interval };
    }
    if let Some(seed) = args.seed {
        settings.analysis.bootstrap.seed = seed;
    }

    let signal = build_signal(&settings.signal)?;
    settings.backtest.entry_signal = Some(signal);

    Ok(settings)
}

fn load_candles(args: &CommonArgs) -> Result<Vec<Candle>> {
    let candles = if let Some(path) = &args.data_file {
        info!(path = %path.display(), "loading candles");
        load_file(path).with_context(|| format!("failed to load {}", path.display()))?
    } else {
        let seed = args.seed.unwrap_or(42);
        info!(
            candles = args.synthetic,
            initial_price = args.initial_price,
            seed,
            "generating synthetic candles"
        );
        generate_synthetic_candles(args.synthetic, args.initial_price, seed)
    };

    info!(candles = candles.len(), "data ready");
    Ok(candles)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("signal_backtester=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { common } => {
            let settings = resolve_settings(&common)?;
            let candles = load_candles(&common)?;
            let engine = BacktestEngine::new(settings.analysis);

            let result = engine.run(&candles, &settings.backtest, &common.label)?;

            match common.output {
                OutputFormat::Json => print_json(&result, common.pretty)?,
                OutputFormat::Text => print!("{}", TextReport(&result)),
            }
        }
        Command::WalkForward {
            common,
            split_ratio,
        } => {
            let settings = resolve_settings(&common)?;
            let candles = load_candles(&common)?;
            let engine = BacktestEngine::new(settings.analysis);

            let wf = engine.walk_forward(&candles, &settings.backtest, &common.label, split_ratio)?;

            match common.output {
                OutputFormat::Json => print_json(&wf, common.pretty)?,
                OutputFormat::Text => {
                    print!("{}", WalkForwardReport(&wf));
                    print!("{}", TextReport(&wf.out_of_sample));
                }
            }
        }
        Command::GridSearch { common, top } => {
            let settings = resolve_settings(&common)?;
            let candles = load_candles(&common)?;
            let engine = BacktestEngine::new(settings.analysis);

            let results = engine.grid_search(
                &candles,
                &settings.backtest,
                &settings.grid,
                &common.label,
                None,
            )?;
            let shown = &results[..top.min(results.len())];

            match common.output {
                OutputFormat::Json => print_json(&shown, common.pretty)?,
                OutputFormat::Text => print!(
                    "{}",
                    GridTable {
                        results: &results,
                        top
                    }
                ),
            }
        }
    }

    Ok(())
}
