use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use pcb_placement_trials::aggregate::BatchSummary;
use pcb_placement_trials::config::ExperimentConfig;
use pcb_placement_trials::descriptor::{Device, PolicyKind, ReplayBufferGrowth};
use pcb_placement_trials::orchestrator::{
    run_batch, serve, InProcessWorker, ProcessWorker, Worker, WorkerPool,
};
use pcb_placement_trials::placement::SandboxBackend;
use pcb_placement_trials::training::{TrialExecutor, TrialRunner};

/// Run a batch of RL component-placement training trials.
#[derive(Parser)]
#[command(
    name = "train",
    version,
    about = "Run a batch of RL placement training trials",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    batch: BatchArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve runs over stdin/stdout for a parent `train` process
    #[command(hide = true)]
    Worker {
        #[arg(long, default_value_t = 8)]
        components: usize,

        #[arg(long, default_value_t = 0)]
        verbose: u8,
    },
}

#[derive(clap::Args)]
struct BatchArgs {
    /// Path to TOML configuration file
    #[arg(long, default_value = "experiment.toml")]
    config: PathBuf,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Policy to train: TD3 or SAC
    #[arg(long)]
    policy: Option<String>,

    /// One seed per run
    #[arg(long, num_args = 1..)]
    seed: Option<Vec<u32>>,

    /// Draw seeds from a clock-seeded generator (overrides --seed)
    #[arg(long)]
    auto_seed: bool,

    #[arg(long)]
    runs: Option<usize>,

    #[arg(long)]
    workers: Option<usize>,

    /// Runs buffered ahead of the workers (defaults to the worker count)
    #[arg(long)]
    queue_capacity: Option<usize>,

    #[arg(long)]
    max_timesteps: Option<u64>,

    #[arg(long)]
    start_timesteps: Option<u64>,

    #[arg(long)]
    target_exploration_steps: Option<u64>,

    #[arg(long)]
    evaluate_every: Option<u64>,

    /// Timesteps without improvement before a run stops early
    #[arg(long)]
    early_stopping: Option<u64>,

    #[arg(long)]
    training_pcb: Option<PathBuf>,

    #[arg(long)]
    evaluation_pcb: Option<PathBuf>,

    /// TOML file with learner hyperparameters
    #[arg(long)]
    hyperparameters: Option<PathBuf>,

    /// cuda or cpu
    #[arg(long)]
    device: Option<String>,

    /// Replay buffer growth: double, triple or quadruple
    #[arg(long)]
    incremental_replay_buffer: Option<String>,

    #[arg(long)]
    shuffle_training_idxs: bool,

    #[arg(long)]
    shuffle_evaluation_idxs: bool,

    #[arg(long)]
    eval_episodes: Option<usize>,

    /// Steps per training episode
    #[arg(long)]
    max_steps: Option<u32>,

    /// Reward weight of the own-wirelength term
    #[arg(long)]
    w: Option<f64>,

    /// Reward weight of the HPWL term
    #[arg(long)]
    hpwl: Option<f64>,

    /// Reward weight of the overlap term
    #[arg(long)]
    o: Option<f64>,

    /// Components on the sandbox board
    #[arg(long, default_value_t = 8)]
    components: usize,

    #[arg(long)]
    run_name: Option<String>,

    #[arg(long)]
    experiment: Option<String>,

    /// Root directory for run logs and models
    #[arg(long)]
    tensorboard_dir: Option<PathBuf>,

    /// Run trials on threads of this process instead of worker processes
    #[arg(long)]
    in_process: bool,

    /// 0 = info, 1 = debug, 2+ = trace (when RUST_LOG is unset)
    #[arg(long)]
    verbose: Option<u8>,
}

fn enable_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Worker {
            components,
            verbose,
        }) => {
            enable_tracing(verbose);
            run_worker(components)
        }
        None => {
            enable_tracing(cli.batch.verbose.unwrap_or(0));
            run_parent(cli.batch)
        }
    }
}

fn run_worker(components: usize) -> Result<()> {
    let runner = TrialExecutor::new(Arc::new(SandboxBackend::new(components)));
    let completed = serve(&runner, io::stdin().lock(), io::stdout().lock())
        .context("worker stopped")?;
    debug!(completed, "worker exiting");
    Ok(())
}

fn parse_policy(value: &str) -> Result<PolicyKind> {
    match value.to_ascii_uppercase().as_str() {
        "TD3" => Ok(PolicyKind::Td3),
        "SAC" => Ok(PolicyKind::Sac),
        _ => bail!("unknown policy '{}' (expected 'TD3' or 'SAC')", value),
    }
}

fn parse_device(value: &str) -> Result<Device> {
    match value {
        "cuda" => Ok(Device::Cuda),
        "cpu" => Ok(Device::Cpu),
        other => bail!("unknown device '{}' (expected 'cuda' or 'cpu')", other),
    }
}

fn parse_growth(value: &str) -> Result<ReplayBufferGrowth> {
    match value {
        "double" => Ok(ReplayBufferGrowth::Double),
        "triple" => Ok(ReplayBufferGrowth::Triple),
        "quadruple" => Ok(ReplayBufferGrowth::Quadruple),
        other => bail!(
            "unknown replay buffer growth '{}' (expected 'double', 'triple' or 'quadruple')",
            other
        ),
    }
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_overrides(config: &mut ExperimentConfig, args: &BatchArgs) -> Result<()> {
    let batch = &mut config.batch;
    if let Some(policy) = &args.policy {
        batch.policy = parse_policy(policy)?;
    }
    if let Some(device) = &args.device {
        batch.device = parse_device(device)?;
    }
    if let Some(growth) = &args.incremental_replay_buffer {
        batch.replay_growth = Some(parse_growth(growth)?);
    }
    if let Some(seeds) = &args.seed {
        batch.seeds = Some(seeds.clone());
    }
    batch.auto_seed |= args.auto_seed;
    if let Some(runs) = args.runs {
        batch.runs = runs;
    }
    if let Some(workers) = args.workers {
        batch.workers = workers;
    }
    if args.queue_capacity.is_some() {
        batch.queue_capacity = args.queue_capacity;
    }
    if args.run_name.is_some() {
        batch.run_name = args.run_name.clone();
    }
    if args.experiment.is_some() {
        batch.experiment = args.experiment.clone();
    }
    if let Some(verbose) = args.verbose {
        batch.verbose = verbose;
    }

    let budgets = &mut config.budgets;
    if let Some(v) = args.max_timesteps {
        budgets.max_timesteps = v;
    }
    if let Some(v) = args.start_timesteps {
        budgets.start_timesteps = v;
    }
    if let Some(v) = args.target_exploration_steps {
        budgets.target_exploration_steps = v;
    }
    if let Some(v) = args.evaluate_every {
        budgets.evaluate_every = v;
    }
    if args.early_stopping.is_some() {
        budgets.early_stopping = args.early_stopping;
    }

    let paths = &mut config.paths;
    if args.training_pcb.is_some() {
        paths.training_board = args.training_pcb.clone();
    }
    if args.evaluation_pcb.is_some() {
        paths.evaluation_board = args.evaluation_pcb.clone();
    }
    if args.hyperparameters.is_some() {
        paths.hyperparameters = args.hyperparameters.clone();
    }
    if let Some(dir) = &args.tensorboard_dir {
        paths.output_root = dir.clone();
    }

    let env = &mut config.environment;
    env.shuffle_training_idxs |= args.shuffle_training_idxs;
    env.shuffle_evaluation_idxs |= args.shuffle_evaluation_idxs;
    if let Some(v) = args.max_steps {
        env.max_steps = v;
    }
    if let Some(v) = args.w {
        env.w = v;
    }
    if let Some(v) = args.hpwl {
        env.hpwl = v;
    }
    if let Some(v) = args.o {
        env.o = v;
    }
    if let Some(v) = args.eval_episodes {
        config.evaluation.episodes = v;
    }
    Ok(())
}

fn program_info(device: Device) {
    println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    println!("device: {device}");
}

fn worker_command(exe: &Path, components: usize, verbose: u8) -> std::process::Command {
    let mut command = std::process::Command::new(exe);
    command
        .arg("worker")
        .arg("--components")
        .arg(components.to_string())
        .arg("--verbose")
        .arg(verbose.to_string());
    command
}

fn start_pool(config: &ExperimentConfig, args: &BatchArgs) -> Result<WorkerPool> {
    let workers = config.batch.workers;
    let capacity = config.queue_capacity();

    let pool = if args.in_process {
        let runner: Arc<dyn TrialRunner> =
            Arc::new(TrialExecutor::new(Arc::new(SandboxBackend::new(args.components))));
        WorkerPool::with_capacity(workers, capacity, |_| {
            Ok(Box::new(InProcessWorker::new(Arc::clone(&runner))) as Box<dyn Worker>)
        })
    } else {
        let exe = std::env::current_exe().context("locating the train executable")?;
        let verbose = config.batch.verbose;
        WorkerPool::with_capacity(workers, capacity, |_| {
            ProcessWorker::spawn(worker_command(&exe, args.components, verbose))
                .map(|w| Box::new(w) as Box<dyn Worker>)
        })
    };
    pool.context("starting worker pool")
}

fn run_parent(args: BatchArgs) -> Result<()> {
    if args.print_config {
        print!("{}", ExperimentConfig::default_toml()?);
        return Ok(());
    }

    let mut config = ExperimentConfig::load_or_default(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;
    apply_overrides(&mut config, &args)?;
    config.validate().context("invalid configuration")?;

    program_info(config.batch.device);

    let run_name = config
        .batch
        .run_name
        .clone()
        .unwrap_or_else(|| Utc::now().timestamp().to_string());
    let descriptors = config.descriptors(&run_name);
    let seeds: Vec<u32> = descriptors.iter().map(|d| d.seed).collect();
    info!(
        run_name = %run_name,
        runs = descriptors.len(),
        workers = config.batch.workers,
        ?seeds,
        "starting batch"
    );

    let pool = start_pool(&config, &args)?;
    let report = run_batch(pool, descriptors);

    for result in &report.results {
        println!("{result}");
    }
    for failed in &report.failed {
        warn!(run = failed.run_index, reason = %failed.reason, "run produced no result");
    }
    println!("{}", BatchSummary::from_results(&report.results));
    Ok(())
}
