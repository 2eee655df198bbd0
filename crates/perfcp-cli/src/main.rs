// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use perfcp_cli::{PredictionDocument, VoteMode, run_detect, run_eval, run_vote};
use perfcp_consensus::{CandidateSets, ConsensusConfig, PairwiseStrategy};
use perfcp_core::{Representative, TimeSeriesRecord};
use perfcp_detect::{AlertChangeMode, AlertConfig, Polarity, WindowedDetectorConfig};
use perfcp_eval::Annotations;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "perfcp", version, about = "Performance change-point detection and consensus")]
struct Cli {
    /// Log debug output to stderr.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the windowed t-test detector over a time-series record.
    Detect(DetectArgs),
    /// Merge per-method change points into one list.
    Vote(VoteArgs),
    /// Score predicted change points against annotations.
    Eval(EvalArgs),
}

#[derive(Debug, Args)]
struct DetectArgs {
    #[arg(long)]
    input: PathBuf,
    /// Statistic cutoff; repeat to run one configuration per value.
    #[arg(long = "threshold", default_values_t = [7.0])]
    thresholds: Vec<f64>,
    #[arg(long, default_value_t = 12)]
    min_back_window: usize,
    #[arg(long, default_value_t = 24)]
    max_back_window: usize,
    #[arg(long, default_value_t = 12)]
    fore_window: usize,
    #[arg(long, value_enum, default_value_t = PolarityArg::LowerIsBetter)]
    polarity: PolarityArg,
    #[arg(long, value_enum, default_value_t = ChangeModeArg::Percentage)]
    change_mode: ChangeModeArg,
    #[arg(long, default_value_t = 2.0)]
    min_alert_change: f64,
    #[arg(long)]
    no_noise_profile: bool,
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct VoteArgs {
    /// JSON object mapping method name to its change points.
    #[arg(long)]
    input: PathBuf,
    /// Method whose points are always kept.
    #[arg(long, conflicts_with = "pairwise")]
    veto: Option<String>,
    #[arg(long, default_value_t = 3)]
    min_votes: usize,
    #[arg(long, default_value_t = 5)]
    margin: usize,
    #[arg(long, value_enum, default_value_t = RepresentativeArg::Median)]
    representative: RepresentativeArg,
    #[arg(long, value_enum, requires_all = ["first", "second"])]
    pairwise: Option<PairwiseArg>,
    #[arg(long)]
    first: Option<String>,
    #[arg(long)]
    second: Option<String>,
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct EvalArgs {
    /// JSON object mapping annotator id to its change points.
    #[arg(long)]
    annotations: PathBuf,
    /// Index list, or an object with `cplocations`.
    #[arg(long)]
    predictions: PathBuf,
    #[arg(long, default_value_t = 5)]
    margin: usize,
    /// Observation count for the covering score.
    #[arg(long, conflicts_with = "series")]
    n_obs: Option<usize>,
    /// Time-series record whose `n_obs` is used for the covering score.
    #[arg(long)]
    series: Option<PathBuf>,
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolarityArg {
    LowerIsBetter,
    HigherIsBetter,
}

impl PolarityArg {
    fn as_polarity(self) -> Polarity {
        match self {
            Self::LowerIsBetter => Polarity::LowerIsBetter,
            Self::HigherIsBetter => Polarity::HigherIsBetter,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ChangeModeArg {
    Percentage,
    Absolute,
}

impl ChangeModeArg {
    fn as_change_mode(self) -> AlertChangeMode {
        match self {
            Self::Percentage => AlertChangeMode::Percentage,
            Self::Absolute => AlertChangeMode::Absolute,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RepresentativeArg {
    Median,
    Mean,
    First,
}

impl RepresentativeArg {
    fn as_representative(self) -> Representative {
        match self {
            Self::Median => Representative::Median,
            Self::Mean => Representative::Mean,
            Self::First => Representative::First,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PairwiseArg {
    Union,
    IntersectionStrict,
    IntersectionFirst,
}

impl PairwiseArg {
    fn as_strategy(self) -> PairwiseStrategy {
        match self {
            Self::Union => PairwiseStrategy::Union,
            Self::IntersectionStrict => PairwiseStrategy::IntersectionStrict,
            Self::IntersectionFirst => PairwiseStrategy::IntersectionFirst,
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorPayload,
}

#[derive(Serialize)]
struct ErrorPayload {
    message: String,
    causes: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli.command) {
        emit_structured_error(&err);
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Detect(args) => handle_detect(args),
        Command::Vote(args) => handle_vote(args),
        Command::Eval(args) => handle_eval(args),
    }
}

fn detector_configs(args: &DetectArgs) -> Vec<WindowedDetectorConfig> {
    let alert = AlertConfig {
        polarity: args.polarity.as_polarity(),
        change_mode: args.change_mode.as_change_mode(),
        min_alert_change: args.min_alert_change,
    };
    args.thresholds
        .iter()
        .map(|&threshold| WindowedDetectorConfig {
            min_back_window: args.min_back_window,
            max_back_window: args.max_back_window,
            fore_window: args.fore_window,
            threshold,
            alert,
            noise_profiling: !args.no_noise_profile,
        })
        .collect()
}

fn handle_detect(args: DetectArgs) -> Result<()> {
    let record: TimeSeriesRecord = read_json(&args.input)?;
    let configs = detector_configs(&args);
    debug!(
        configurations = configs.len(),
        n_obs = record.n_obs,
        "running detector grid"
    );
    let outcomes = run_detect(&record, &configs)
        .with_context(|| format!("invalid time series in '{}'", args.input.display()))?;
    write_json_output(&outcomes, args.output.as_deref())
}

fn vote_mode(args: &VoteArgs) -> Result<VoteMode> {
    if let Some(strategy) = args.pairwise {
        let (Some(first), Some(second)) = (args.first.clone(), args.second.clone()) else {
            bail!("--pairwise requires both --first and --second");
        };
        return Ok(VoteMode::Pairwise {
            strategy: strategy.as_strategy(),
            first,
            second,
        });
    }
    Ok(match &args.veto {
        Some(method) => VoteMode::Veto {
            method: method.clone(),
        },
        None => VoteMode::Quorum,
    })
}

fn handle_vote(args: VoteArgs) -> Result<()> {
    let sets: CandidateSets = read_json(&args.input)?;
    let mode = vote_mode(&args)?;
    let config = ConsensusConfig {
        min_votes: args.min_votes,
        margin: args.margin,
        strategy: args.representative.as_representative(),
        ..ConsensusConfig::default()
    };
    let output = run_vote(&sets, &mode, config).context("voting failed")?;
    write_json_output(&output, args.output.as_deref())
}

fn handle_eval(args: EvalArgs) -> Result<()> {
    let annotations: Annotations = read_json(&args.annotations)?;
    let predicted = read_json::<PredictionDocument>(&args.predictions)?.into_points();
    let n_obs = match (&args.series, args.n_obs) {
        (Some(path), _) => Some(read_json::<TimeSeriesRecord>(path)?.n_obs),
        (None, n_obs) => n_obs,
    };
    let output =
        run_eval(&annotations, &predicted, args.margin, n_obs).context("evaluation failed")?;
    write_json_output(&output, args.output.as_deref())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON in '{}'", path.display()))
}

fn write_json_output<T: Serialize>(payload: &T, output_path: Option<&Path>) -> Result<()> {
    let encoded =
        serde_json::to_string_pretty(payload).context("failed to serialize JSON output")?;

    if let Some(path) = output_path {
        fs::write(path, format!("{encoded}\n"))
            .with_context(|| format!("failed to write '{}'", path.display()))
    } else {
        println!("{encoded}");
        Ok(())
    }
}

fn emit_structured_error(err: &anyhow::Error) {
    let envelope = ErrorEnvelope {
        error: ErrorPayload {
            message: err.to_string(),
            causes: err.chain().skip(1).map(ToString::to_string).collect(),
        },
    };

    match serde_json::to_string_pretty(&envelope) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!("error: {err:#}"),
    }
}
