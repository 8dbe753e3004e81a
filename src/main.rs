use anyhow::{Context, Result};
use clap::Parser;
use crypto_predictor::backtest::{MarketScenario, SyntheticDataGenerator};
use crypto_predictor::{Candle, Prediction, PredictorSession, Settings, TrainingReport};
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Train an LSTM up/down classifier on OHLCV bars, backtest it and predict the next bar
#[derive(Parser, Debug)]
#[command(name = "crypto-predictor", version)]
struct Cli {
    /// TOML settings file (env: PREDICTOR__*)
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON array of bars: {timestamp, open, high, low, close, volume}
    #[arg(long, conflicts_with_all = ["scenario", "bars"])]
    input: Option<PathBuf>,

    /// Synthetic market to generate when no input file is given
    #[arg(long, value_enum, default_value = "uptrend")]
    scenario: MarketScenario,

    /// Number of synthetic bars
    #[arg(long, default_value_t = 500)]
    bars: usize,

    /// Minutes between synthetic bars
    #[arg(long, default_value_t = 60)]
    interval_minutes: i64,

    /// Seed for synthetic bars and, unless configured, the model
    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long)]
    sequence_length: Option<usize>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    test_fraction: Option<f64>,

    /// Print the training report and prediction as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Output<'a> {
    report: &'a TrainingReport,
    prediction: &'a Prediction,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    apply_overrides(&mut settings, &cli);
    settings.training.validate()?;

    setup_logging(&settings.log_filter);
    tracing::debug!("Loaded settings: {:?}", settings);

    let bars = load_bars(&cli)?;
    tracing::info!("Loaded {} bars", bars.len());

    let mut session = PredictorSession::new();
    let report = session.train(&bars, &settings.training)?;
    let prediction = session.predict_next(&bars)?;

    if cli.json {
        let output = Output {
            report: &report,
            prediction: &prediction,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_training(&report);
        report.backtest.print_report();
        print_prediction(&prediction);
    }

    Ok(())
}

fn apply_overrides(settings: &mut Settings, cli: &Cli) {
    let training = &mut settings.training;
    if let Some(v) = cli.sequence_length {
        training.sequence_length = v;
    }
    if let Some(v) = cli.epochs {
        training.epochs = v;
    }
    if let Some(v) = cli.batch_size {
        training.batch_size = v;
    }
    if let Some(v) = cli.test_fraction {
        training.test_fraction = v;
    }
    training.classifier.seed.get_or_insert(cli.seed);
}

/// Logs go to stderr so `--json` output stays parseable. `RUST_LOG` wins
/// over the configured filter.
fn setup_logging(filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_bars(cli: &Cli) -> Result<Vec<Candle>> {
    match &cli.input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            let bars: Vec<Candle> = serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("failed to parse bars from {}", path.display()))?;
            Ok(bars)
        }
        None => {
            let mut generator = SyntheticDataGenerator::new(cli.seed);
            Ok(generator.generate(cli.scenario, cli.bars, cli.interval_minutes))
        }
    }
}

fn print_training(report: &TrainingReport) {
    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║                   TRAINING SUMMARY                    ║");
    println!("╚═══════════════════════════════════════════════════════╝\n");

    println!("  Run:                   {}", report.run_id);
    println!("  Model:                 {}", report.model);
    println!("  Feature Rows:          {}", report.feature_rows);
    println!(
        "  Windows:               {} train / {} test",
        report.train_windows, report.test_windows
    );

    println!(
        "\n{:>6} {:>10} {:>10} {:>10} {:>10}",
        "Epoch", "Loss", "Acc", "Val Loss", "Val Acc"
    );
    println!("{}", "─".repeat(50));

    for epoch in &report.history.epochs {
        let fmt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{:.4}", v));
        println!(
            "{:>6} {:>10.4} {:>10.4} {:>10} {:>10}",
            epoch.epoch,
            epoch.loss,
            epoch.accuracy,
            fmt(epoch.val_loss),
            fmt(epoch.val_accuracy)
        );
    }
}

fn print_prediction(prediction: &Prediction) {
    let arrow = match prediction.direction {
        crypto_predictor::Direction::Up => "📈",
        crypto_predictor::Direction::Down => "📉",
    };

    println!("🔮 NEXT BAR PREDICTION");
    println!("  After:                 {}", prediction.as_of);
    println!(
        "  Direction:             {} {}",
        arrow, prediction.direction
    );
    println!(
        "  Confidence:            {:.2}%",
        prediction.confidence() * 100.0
    );
}
