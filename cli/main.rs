#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;

use qblend::config::BlendConfig;
use qblend::diagnostics::{self, STRONG_CORRELATION};
use qblend::matrix::PredictionMatrix;
use qblend::progress::{BlendProgressObserver, BlendStage, NoopBlendProgress};
use qblend::solver::{BlendError, BlendSolver, predictor_correlation};

/// Blend quiz predictions with ridge regression, using only each predictor's quiz RMSE
#[derive(Parser)]
#[command(name = "quiz_blend", version, about)]
struct Cli {
    /// Path of the blended prediction file to write
    output: PathBuf,

    /// Print progress, the predictor correlation heatmap and the blend weights
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding the <name>_QRMSE_<rmse>.dta prediction files
    #[arg(long, value_name = "DIR")]
    pred_dir: Option<PathBuf>,

    /// TOML file overriding any blend constant
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Ridge constant (overrides the configuration file)
    #[arg(long, value_name = "X")]
    lambda: Option<f64>,
}

fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let draw_target = if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };
    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    pb.set_style(
        ProgressStyle::with_template(
            "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .expect("Internal Error: Invalid progress bar template string.")
        .progress_chars("█▉▊▋▌▍▎▏  "),
    );
    pb.set_message(message.to_string());
    pb
}

/// Terminal progress for verbose runs: a bar while the prediction files are read and a
/// status line for the other stages.
#[derive(Default)]
struct TerminalProgress {
    bar: Option<ProgressBar>,
}

impl BlendProgressObserver for TerminalProgress {
    fn on_stage_start(&mut self, stage: BlendStage, total: usize) {
        match stage {
            BlendStage::LoadPredictions => {
                self.bar = Some(create_progress_bar(total as u64, stage.describe()));
            }
            _ => eprintln!("> Starting {stage}..."),
        }
    }

    fn on_stage_advance(&mut self, _stage: BlendStage, processed: usize, label: &str) {
        if let Some(bar) = &self.bar {
            bar.set_position(processed as u64);
            bar.set_message(label.to_string());
        }
    }

    fn on_stage_finish(&mut self, stage: BlendStage) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        eprintln!("> Finished {stage}.");
    }
}

fn print_correlation_diagnostics(matrix: &PredictionMatrix) {
    let names = matrix.predictor_names();
    let correlation = predictor_correlation(matrix);
    eprintln!("> Predictor correlation:");
    eprintln!(
        "{}",
        diagnostics::render_correlation_heatmap(correlation.view(), &names)
    );
    let strong = diagnostics::strongly_correlated_pairs(correlation.view(), STRONG_CORRELATION);
    for (i, j, r) in strong {
        log::warn!(
            "Predictors {} and {} are almost collinear (r = {r:.4}); their weights may be unstable.",
            names[i],
            names[j]
        );
    }
}

fn run(cli: Cli) -> Result<(), BlendError> {
    let mut config = match &cli.config {
        Some(path) => BlendConfig::from_toml_file(path)?,
        None => BlendConfig::default(),
    };
    if let Some(dir) = cli.pred_dir {
        config.prediction_dir = dir;
    }
    if let Some(lambda) = cli.lambda {
        config.lambda = lambda;
    }
    let solver = BlendSolver::new(config)?;

    let mut terminal = TerminalProgress::default();
    let mut quiet = NoopBlendProgress;
    let progress: &mut dyn BlendProgressObserver = if cli.verbose {
        &mut terminal
    } else {
        &mut quiet
    };

    let predictors = solver.discover()?;
    if cli.verbose {
        eprintln!(
            "> Blending {} predictor(s) from {}",
            predictors.len(),
            solver.config().prediction_dir.display()
        );
    }
    let matrix = solver.load(predictors, progress)?;
    if cli.verbose {
        print_correlation_diagnostics(&matrix);
    }

    let (weights, predictions) = solver.run_with_matrix(&matrix, &cli.output, progress)?;
    if cli.verbose {
        eprintln!("> Blend weights:");
        eprintln!(
            "{}",
            diagnostics::format_weight_report(&matrix.predictor_names(), weights.beta.view())
        );
        eprintln!(
            "> Condition number of the regularized Gram matrix: {}",
            diagnostics::format_cond(weights.condition_number)
        );
        eprintln!(
            "> Clipped {} of {} predictions ({} raised to the minimum, {} lowered to the maximum).",
            predictions.clipped_low + predictions.clipped_high,
            predictions.len(),
            predictions.clipped_low,
            predictions.clipped_high
        );
    }
    eprintln!("> Saved blended predictions to {}", cli.output.display());
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
