mod interactive;

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use cache_sim::{
    config::SimConfig,
    memory::MainMemory,
    pattern::AccessPattern,
    sim::{self, Simulator},
    stat::Rate,
};
use clap::{Args, Parser, Subcommand};
use terminal_size::terminal_size;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// preload, then run the sequential, round robin, random and strided patterns
    Run(RunArgs),
    /// replay addresses from a trace file
    Trace(TraceArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// File path to a JSON simulation config
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Block size in bytes (power of two)
    #[arg(long)]
    block_size: Option<usize>,
    /// Total cache capacity in bytes
    #[arg(long)]
    cache_size: Option<usize>,
    /// Backing memory size in bytes
    #[arg(long)]
    memory_size: Option<usize>,
    /// Number of blocks to preload before measuring
    #[arg(long)]
    preload_blocks: Option<usize>,
    /// Enable interactive mode after preloading
    #[arg(long)]
    interactive: bool,
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    delegate: CommonArgs,
    /// Seed of the random pattern
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct TraceArgs {
    #[command(flatten)]
    delegate: CommonArgs,
    /// File path to the trace (one address per line)
    #[arg(short, long)]
    input: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    match args.command {
        Command::Run(RunArgs { delegate, seed }) => {
            let mut cfg = load_config(&delegate)?;
            if let Some(seed) = seed {
                cfg.seed = seed;
            }
            let mut sim = sim::prepare(&cfg)?;
            if delegate.interactive {
                return interactive::execute_interactive(&mut sim);
            }
            sim.run_all(&sim::default_patterns(&cfg))?;
            output_reports(&sim);
            Ok(())
        }
        Command::Trace(TraceArgs { delegate, input }) => {
            let cfg = load_config(&delegate)?;
            let src = fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let name = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "trace".to_string());
            let pattern = AccessPattern::from_trace(name, &src)?;
            log::info!("finished parsing trace. # of addresses: {}", pattern.addresses().len());
            let mut sim = sim::prepare(&cfg)?;
            sim.run(&pattern)?;
            if delegate.interactive {
                return interactive::execute_interactive(&mut sim);
            }
            output_reports(&sim);
            Ok(())
        }
    }
}

fn init_logger(verbose: bool) {
    if verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::init();
    }
}

fn load_config(args: &CommonArgs) -> Result<SimConfig> {
    init_logger(args.verbose);
    let mut cfg = match &args.config {
        Some(p) => SimConfig::from_json_file(p)
            .with_context(|| format!("failed to load config {}", p.display()))?,
        None => Default::default(),
    };
    macro_rules! apply {
        ($($arg:ident => $($field:ident).+),* $(,)?) => {
            $(if let Some(v) = args.$arg {
                cfg.$($field).+ = v;
            })*
        };
    }
    apply!(
        block_size => cache.block_size,
        cache_size => cache.cache_size,
        memory_size => cache.memory_size,
        preload_blocks => preload_blocks,
    );
    log::info!("config: {cfg:?}");
    Ok(cfg)
}

fn output_reports(sim: &Simulator<MainMemory>) {
    for r in sim.reports() {
        println!("{r}");
    }
    println!("Overall Hit Rate: {}", Rate(sim.overall().hit_rate()));
    output_stat(sim);
}

fn output_stat(sim: &Simulator<MainMemory>) {
    let max_width = get_terminal_width().unwrap_or(120) as usize;
    log::info!("statistics:\n{}", sim.collect_stat().view(max_width));
}

fn get_terminal_width() -> Option<u16> {
    terminal_size().map(|(w, _)| w.0.saturating_sub(20))
}
