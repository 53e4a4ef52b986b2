#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use qblend::config::RatingBounds;
use qblend::helpers::HelperError;
use qblend::helpers::bound::bound_file;
use qblend::helpers::combine::{CombinePlan, WeightedInput, combine_files};
use qblend::helpers::probe::fit_probe_weights;

#[derive(Parser)]
#[command(
    name = "blend_tools",
    version,
    about = "Helpers for preparing and combining prediction files"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clamp every prediction in a single-column file into the rating range
    Bound(BoundArgs),
    /// Write the weighted sum of several prediction files
    Combine(CombineArgs),
    /// Fit least-squares blending weights against the probe ratings
    ProbeWeights(ProbeArgs),
}

#[derive(Args)]
struct BoundArgs {
    input: PathBuf,
    output: PathBuf,

    #[arg(long, default_value_t = qblend::config::MIN_RATING)]
    min: f64,

    #[arg(long, default_value_t = qblend::config::MAX_RATING)]
    max: f64,
}

#[derive(Args)]
struct CombineArgs {
    /// Output prediction file
    output: PathBuf,

    /// Weighted input as PATH=WEIGHT; repeat for every file
    #[arg(long = "input", value_name = "PATH=WEIGHT", conflicts_with = "plan")]
    inputs: Vec<WeightedInput>,

    /// TOML combine plan, e.g. one written by `probe-weights --write-plan`
    #[arg(long, value_name = "FILE")]
    plan: Option<PathBuf>,
}

#[derive(Args)]
struct ProbeArgs {
    /// Probe file with `user movie date rating` rows
    #[arg(long, value_name = "FILE")]
    probe: PathBuf,

    /// Probe prediction files, one value per probe row
    #[arg(required = true)]
    predictors: Vec<PathBuf>,

    /// Save the weights as a combine plan
    #[arg(long, value_name = "FILE")]
    write_plan: Option<PathBuf>,

    /// Point the saved plan at same-named files in this directory (e.g. the qual predictions)
    #[arg(long, value_name = "DIR", requires = "write_plan")]
    plan_dir: Option<PathBuf>,
}

fn run_bound(args: BoundArgs) -> Result<(), HelperError> {
    let summary = bound_file(
        &args.input,
        &args.output,
        RatingBounds {
            min: args.min,
            max: args.max,
        },
    )?;
    eprintln!(
        "> Bounded {} predictions into {} ({} below {}, {} above {}).",
        summary.lines,
        args.output.display(),
        summary.clipped_low,
        args.min,
        summary.clipped_high,
        args.max
    );
    Ok(())
}

fn run_combine(args: CombineArgs) -> Result<(), HelperError> {
    let plan = match args.plan {
        Some(path) => CombinePlan::from_toml_file(&path)?,
        None => CombinePlan {
            inputs: args.inputs,
        },
    };
    let lines = combine_files(&plan, &args.output)?;
    eprintln!(
        "> Combined {} file(s) into {} ({lines} lines).",
        plan.inputs.len(),
        args.output.display()
    );
    Ok(())
}

fn run_probe(args: ProbeArgs) -> Result<(), HelperError> {
    let fit = fit_probe_weights(&args.probe, &args.predictors)?;
    println!("{}", fit.report());
    if let Some(path) = args.write_plan {
        fit.to_plan(args.plan_dir.as_deref()).write_toml_file(&path)?;
        eprintln!("> Saved combine plan to {}", path.display());
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let result = match Cli::parse().command {
        Commands::Bound(args) => run_bound(args),
        Commands::Combine(args) => run_combine(args),
        Commands::ProbeWeights(args) => run_probe(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
