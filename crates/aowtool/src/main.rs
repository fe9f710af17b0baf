use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use aowtool_core::config::{ResolvedConfig, default_config_path, load_config, render_config};
use aowtool_core::duplicates::{DuplicateReport, latest_stage_table, render_groups, scan_duplicates};
use aowtool_core::pipeline::{RunOptions, StagePaths, StageReport, run_all, run_stage2, run_stage3};
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

#[derive(Debug, Parser)]
#[command(
    name = "aowtool",
    version,
    about = "Consolidate Ashes of War attack data tables"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    work_dir: Option<PathBuf>,
    #[arg(
        short,
        long,
        global = true,
        action = ArgAction::Count,
        help = "Increase log verbosity and show per-row diffs"
    )]
    verbose: u8,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Collapse extracted attack rows into one row per key and slot")]
    Stage2(Stage2Args),
    #[command(about = "Build slot series and merge weapons with identical layouts")]
    Stage3(Stage3Args),
    #[command(about = "Run stage 2 and stage 3 back to back")]
    Run(Stage2Args),
    #[command(about = "Report rows sharing the same Skill and Part")]
    Duplicates(DuplicatesArgs),
    #[command(about = "Print the resolved configuration as TOML")]
    Config,
}

#[derive(Debug, Args)]
struct Stage2Args {
    #[arg(long, value_name = "PATH", help = "Extracted attack table")]
    input: Option<PathBuf>,
    #[arg(long, value_name = "PATH", help = "Stage-2 table to write")]
    output: Option<PathBuf>,
    #[arg(long, value_name = "PATH", help = "Forced-collapse and blacklist JSON")]
    overrides: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct Stage3Args {
    #[arg(long, value_name = "PATH", help = "Stage-2 table to read")]
    input: Option<PathBuf>,
    #[arg(long, value_name = "PATH", help = "Stage-3 table to write")]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct DuplicatesArgs {
    #[arg(
        long,
        value_name = "PATH",
        help = "Table to scan (default: highest-numbered AoW-data-<n>.csv in the work dir)"
    )]
    input: Option<PathBuf>,
    #[arg(
        long,
        value_name = "COLUMN",
        num_args = 1..,
        action = ArgAction::Append,
        help = "Extra columns to match on; repeatable, comma-separated"
    )]
    ignore: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_logging(cli.verbose);

    let Some(command) = cli.command else {
        let mut command = Cli::command();
        command.print_help()?;
        println!();
        return Ok(());
    };
    let config = resolve_config(cli.config.as_deref(), cli.work_dir.as_deref())?;
    let options = RunOptions {
        verbose: cli.verbose > 0,
    };

    match command {
        Commands::Stage2(args) => run_stage2_command(&config, args, options),
        Commands::Stage3(args) => run_stage3_command(&config, args, options),
        Commands::Run(args) => run_all_command(&config, args, options),
        Commands::Duplicates(args) => run_duplicates_command(&config, args, options),
        Commands::Config => {
            print!("{}", render_config(&config)?);
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn resolve_config(config_flag: Option<&Path>, work_dir: Option<&Path>) -> Result<ResolvedConfig> {
    let config_path = config_flag
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_config_path(work_dir));
    let config = load_config(&config_path)?;
    config.resolve(work_dir)
}

fn run_stage2_command(config: &ResolvedConfig, args: Stage2Args, options: RunOptions) -> Result<()> {
    let paths = StagePaths {
        input: args.input.unwrap_or_else(|| config.stage1_path.clone()),
        output: args.output.unwrap_or_else(|| config.stage2_path.clone()),
    };
    let overrides = args
        .overrides
        .unwrap_or_else(|| config.overrides_path.clone());
    let report = run_stage2(&paths, &overrides, config, options)?;
    println!("overrides: {}", normalize_path(&overrides));
    print_report(&report, config);
    Ok(())
}

fn run_stage3_command(config: &ResolvedConfig, args: Stage3Args, options: RunOptions) -> Result<()> {
    let paths = StagePaths {
        input: args.input.unwrap_or_else(|| config.stage2_path.clone()),
        output: args.output.unwrap_or_else(|| config.stage3_path.clone()),
    };
    let report = run_stage3(&paths, config, options)?;
    print_report(&report, config);
    Ok(())
}

fn run_all_command(config: &ResolvedConfig, args: Stage2Args, options: RunOptions) -> Result<()> {
    let paths = StagePaths {
        input: args.input.unwrap_or_else(|| config.stage1_path.clone()),
        output: config.stage2_path.clone(),
    };
    let stage3_output = args.output.unwrap_or_else(|| config.stage3_path.clone());
    let overrides = args
        .overrides
        .unwrap_or_else(|| config.overrides_path.clone());
    let (stage2, stage3) = run_all(&paths, &stage3_output, &overrides, config, options)?;
    println!("overrides: {}", normalize_path(&overrides));
    print_report(&stage2, config);
    println!();
    print_report(&stage3, config);
    Ok(())
}

fn run_duplicates_command(
    config: &ResolvedConfig,
    args: DuplicatesArgs,
    options: RunOptions,
) -> Result<()> {
    let input = match args.input {
        Some(input) => input,
        None => match latest_stage_table(&config.work_dir)? {
            Some(path) => path,
            None => bail!(
                "no AoW-data-<n>.csv found in {}",
                normalize_path(&config.work_dir)
            ),
        },
    };
    let report = scan_duplicates(&input, &args.ignore)?;
    print_duplicates(&report, options.verbose);
    Ok(())
}

fn print_duplicates(report: &DuplicateReport, verbose: bool) {
    if verbose {
        println!(
            "Scanning {} (match columns: {})",
            normalize_path(&report.input),
            report.match_fields.join(" | ")
        );
    } else {
        println!("Scanning {}", normalize_path(&report.input));
    }
    if report.groups.is_empty() {
        println!("No duplicate groups found.");
        return;
    }
    for line in render_groups(&report.groups, verbose) {
        println!("{line}");
    }
}

fn print_report(report: &StageReport, config: &ResolvedConfig) {
    println!("{}", report.label);
    println!("input: {}", normalize_path(&report.input));
    println!("output: {}", normalize_path(&report.output));
    println!("rows_in: {}", report.rows_in);
    println!("rows_out: {}", report.rows_out);
    println!("sha256: {}", report.sha256);
    println!("warnings: {}", format_flag(!report.diagnostics.is_empty()));
    for line in &report.delta.lines {
        println!("{line}");
    }
    for line in report
        .diagnostics
        .summary_lines(config.format.warning_sample)
    {
        println!("{line}");
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
