use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use ferrous_poa::core::compute::host::HostBatchFactory;
use ferrous_poa::core::io::result_writer::ResultWriter;
use ferrous_poa::core::io::window_reader::load_windows;
use ferrous_poa::core::types::OutputMode;
use ferrous_poa::defaults;
use ferrous_poa::pipelines::batched::{CapacityPlanner, RunCoordinator, RunStatistics};
use ferrous_poa::poa_opt::PoaOpt;

#[derive(Parser)]
#[command(name = "ferrous-poa")]
#[command(about = "FerrousPOA - batched partial-order alignment consensus and MSA", long_about = None)]
#[command(version)]
struct Cli {
    /// Window file: blocks of a sequence count followed by that many sequences (optionally gzipped)
    #[arg(value_name = "WINDOWS")]
    input: PathBuf,

    // ===== Alignment Options =====
    /// Generate MSA (default: consensus)
    #[arg(short = 'm', long)]
    msa: bool,

    /// Perform full alignment (default: banded)
    #[arg(short = 'f', long)]
    full: bool,

    /// Band width for banded alignment
    #[arg(short = 'w', long, value_name = "INT", default_value_t = defaults::BAND_WIDTH)]
    band_width: usize,

    // ===== Scoring Options =====
    /// Score for a match
    #[arg(long = "match", value_name = "INT", default_value_t = defaults::MATCH_SCORE)]
    match_score: i32,

    /// Score for a mismatch
    #[arg(long = "mismatch", value_name = "INT", default_value_t = defaults::MISMATCH_SCORE, allow_hyphen_values = true)]
    mismatch_score: i32,

    /// Score for a gap
    #[arg(long = "gap", value_name = "INT", default_value_t = defaults::GAP_SCORE, allow_hyphen_values = true)]
    gap_score: i32,

    // ===== Input/Output Options =====
    /// Print the MSA or consensus output to stdout
    #[arg(short = 'p', long)]
    print: bool,

    /// Print POA graphs in DOT format to stdout
    #[arg(short = 'g', long)]
    print_graph: bool,

    /// Load at most INT windows
    #[arg(short = 'n', long, value_name = "INT")]
    max_windows: Option<usize>,

    /// Short-read run: load at most 1000 windows unless -n is given
    #[arg(short = 's', long)]
    short_read: bool,

    /// Verbose level: 1=error, 2=warning, 3=message, 4=debug, 5+=trace
    #[arg(short = 'v', long, value_name = "INT", default_value_t = defaults::VERBOSITY)]
    verbosity: i32,

    // ===== Device Options =====
    /// Device id
    #[arg(long, value_name = "INT", default_value_t = defaults::DEVICE_ID)]
    device: usize,

    /// Memory available to the host backend, in MB
    #[arg(long, value_name = "INT", default_value_t = defaults::HOST_MEMORY_MB)]
    memory_mb: usize,

    /// Fraction of free device memory used for batches
    #[arg(long, value_name = "FLOAT", default_value_t = defaults::MEMORY_FRACTION)]
    memory_fraction: f64,

    /// Compute timeout per batch flush, in seconds
    #[arg(long, value_name = "INT")]
    timeout_secs: Option<u64>,

    // ===== Processing Options =====
    /// Run batch configurations on INT threads in parallel (default: 1, sequential)
    #[arg(short = 't', long, value_name = "INT")]
    threads: Option<usize>,
}

impl Cli {
    fn into_opt(self) -> PoaOpt {
        let max_windows = match (self.max_windows, self.short_read) {
            (Some(n), _) => Some(n),
            (None, true) => Some(defaults::SHORT_READ_MAX_WINDOWS),
            (None, false) => None,
        };
        PoaOpt {
            input: self.input,
            max_windows,
            output_mode: OutputMode::from_msa_flag(self.msa),
            banded: !self.full,
            band_width: self.band_width,
            match_score: self.match_score,
            mismatch_score: self.mismatch_score,
            gap_score: self.gap_score,
            device_id: self.device,
            memory_mb: self.memory_mb,
            memory_fraction: self.memory_fraction,
            timeout: self.timeout_secs.map(Duration::from_secs),
            n_threads: self.threads.unwrap_or(1),
            print: self.print,
            print_graph: self.print_graph,
            verbosity: self.verbosity,
            ..PoaOpt::default()
        }
    }
}

fn init_logging(verbosity: i32) {
    // Map verbosity (1=error, 2=warning, 3=message, 4=debug, 5+=trace)
    // to Rust log levels
    let log_level = match verbosity {
        v if v <= 1 => log::LevelFilter::Error,
        2 => log::LevelFilter::Warn,
        3 => log::LevelFilter::Info,
        4 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace, // 5+ = trace
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None) // Don't show timestamps
        .format_target(false) // Don't show module names
        .init();
}

fn configure_threads(requested: usize) -> usize {
    let mut num_threads = requested;
    if num_threads < 1 {
        log::warn!("Invalid thread count {}, using 1 thread", num_threads);
        num_threads = 1;
    }
    let max_threads = num_cpus::get() * 2;
    if num_threads > max_threads {
        log::warn!(
            "Thread count {} exceeds recommended maximum {}, capping at {}",
            num_threads,
            max_threads,
            max_threads
        );
        num_threads = max_threads;
    }
    if num_threads > 1 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
        {
            Ok(_) => log::debug!("Configured rayon thread pool with {} threads", num_threads),
            Err(e) => log::warn!(
                "Failed to configure thread pool: {} (using {} threads)",
                e,
                rayon::current_num_threads()
            ),
        }
    }
    num_threads
}

fn run(opt: &PoaOpt) -> Result<RunStatistics> {
    if let Err(errors) = opt.validate() {
        for e in &errors {
            log::error!("{}", e);
        }
        bail!("{} invalid option(s)", errors.len());
    }

    let groups = load_windows(&opt.input, opt.max_windows)
        .with_context(|| format!("failed to load windows from {}", opt.input.display()))?;

    let factory = HostBatchFactory::new(opt.memory_bytes());
    let coordinator = RunCoordinator::new(&factory, opt.scoring_params(), opt.run_options());

    let budget = coordinator.memory_budget()?;
    let plan = CapacityPlanner::new()
        .plan(&groups, &opt.plan_options(budget))
        .context("capacity planning failed")?;

    let stdout = io::stdout();
    let mut writer = ResultWriter::new(stdout.lock(), opt.print, opt.print_graph);
    let stats = coordinator.run(&groups, &plan, &mut writer)?;
    Ok(stats)
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbosity);

    let mut opt = cli.into_opt();
    opt.n_threads = configure_threads(opt.n_threads);

    log::info!("Input: {}", opt.input.display());
    log::info!(
        "Mode: {}, {} alignment{}",
        opt.output_mode,
        if opt.banded { "banded" } else { "full" },
        if opt.banded {
            format!(" (width {})", opt.band_width)
        } else {
            String::new()
        }
    );
    log::info!(
        "Scoring: match {}, mismatch {}, gap {}",
        opt.match_score,
        opt.mismatch_score,
        opt.gap_score
    );

    match run(&opt) {
        Ok(stats) => log::info!("Done: {}", stats),
        Err(e) => {
            log::error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
