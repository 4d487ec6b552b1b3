//! fontfill CLI (made by FontLab https://www.fontlab.com/)

pub mod server;

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::SystemTime;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use fontfill_core::cleanup::sweep_expired;
use fontfill_core::config::{timeout_from_secs, ttl_from_hours};
use fontfill_core::output::{write_json_pretty, write_ndjson, write_plain};
use fontfill_core::validate::validate_font_directory;
use fontfill_core::{Config, PreviewGenerator};

/// CLI entrypoint for fontfill.
#[derive(Debug, Parser)]
#[command(
    name = "fontfill",
    about = "Fill in missing web/desktop font formats (made by FontLab https://www.fontlab.com/)"
)]
pub struct Cli {
    /// Show more log output on stderr (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the local web service
    Serve(ServeArgs),
    /// Convert one directory and print what every font now has
    Convert(ConvertArgs),
    /// Remove converted files older than the cache lifetime
    Clean(CleanArgs),
}

/// Locations shared by every subcommand.
#[derive(Debug, Default, Args)]
struct DirArgs {
    /// Output root; converted fonts go to <static-dir>/converted
    #[arg(long = "static-dir", value_hint = ValueHint::DirPath)]
    static_dir: Option<PathBuf>,

    /// Directory for the daily log file
    #[arg(long = "log-dir", value_hint = ValueHint::DirPath)]
    log_dir: Option<PathBuf>,
}

/// External tool settings for commands that convert.
#[derive(Debug, Default, Args)]
struct ToolArgs {
    /// Program used to produce .woff2 files
    #[arg(long = "compress-tool", value_hint = ValueHint::CommandName)]
    compress_tool: Option<PathBuf>,

    /// Program used to produce .ttf files from .woff2
    #[arg(long = "decompress-tool", value_hint = ValueHint::CommandName)]
    decompress_tool: Option<PathBuf>,

    /// Kill a tool after this many seconds (0 waits forever)
    #[arg(long = "tool-timeout", value_name = "SECS")]
    tool_timeout: Option<u64>,

    /// Upper bound on conversions running at once
    #[arg(short = 'j', long = "max-concurrent", value_parser = clap::value_parser!(u64).range(1..))]
    max_concurrent: Option<u64>,
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// Interface to bind
    #[arg(long = "host", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on (defaults to $PORT or 8080)
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,

    /// Largest file /download will serve, in bytes
    #[arg(long = "max-file-size", value_name = "BYTES")]
    max_file_size: Option<u64>,

    #[command(flatten)]
    dirs: DirArgs,

    #[command(flatten)]
    tools: ToolArgs,
}

#[derive(Debug, Args)]
struct ConvertArgs {
    /// Directory tree to scan
    #[arg(value_hint = ValueHint::DirPath)]
    dir: PathBuf,

    /// Follow symlinks while walking
    #[arg(long = "follow-symlinks", action = ArgAction::SetTrue)]
    follow_symlinks: bool,

    /// Emit a single JSON array
    #[arg(long = "json", action = ArgAction::SetTrue, conflicts_with = "ndjson")]
    json: bool,

    /// Emit newline-delimited JSON
    #[arg(long = "ndjson", action = ArgAction::SetTrue)]
    ndjson: bool,

    /// Do not echo progress lines on stderr
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,

    #[command(flatten)]
    dirs: DirArgs,

    #[command(flatten)]
    tools: ToolArgs,
}

#[derive(Debug, Args)]
struct CleanArgs {
    /// Remove files older than this many hours (defaults to the cache lifetime)
    #[arg(long = "ttl-hours", value_name = "HOURS")]
    ttl_hours: Option<u64>,

    #[command(flatten)]
    dirs: DirArgs,
}

/// Parse CLI args and execute the selected command.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    match cli.command {
        Command::Serve(args) => run_serve(args, verbose),
        Command::Convert(args) => run_convert(args, verbose),
        Command::Clean(args) => run_clean(args, verbose),
    }
}

fn run_serve(args: ServeArgs, verbose: u8) -> Result<()> {
    let mut config = build_config(&args.dirs, &args.tools)?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(size) = args.max_file_size {
        config.max_file_size = size;
    }
    config.validate().context("invalid configuration")?;
    // `serve` logs lifecycle events to stderr by default
    let _guard = init_tracing(&config.log_dir, verbose.max(1))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    runtime.block_on(server::serve(config, &args.host))
}

fn run_convert(args: ConvertArgs, verbose: u8) -> Result<()> {
    let config = build_config(&args.dirs, &args.tools)?;
    config.validate().context("invalid configuration")?;
    let _guard = init_tracing(&config.log_dir, verbose)?;

    let dir = validate_font_directory(&args.dir)?;
    let generator = PreviewGenerator::builder(config)
        .follow_symlinks(args.follow_symlinks)
        .build();

    let echo = if args.quiet {
        None
    } else {
        generator.subscribe().map(|lines| {
            thread::spawn(move || {
                while let Ok(line) = lines.recv_blocking() {
                    eprintln!("{line}");
                }
            })
        })
    };

    let results = generator.process_fonts(&dir);
    generator.close();
    if let Some(echo) = echo {
        let _ = echo.join();
    }
    let results = results.with_context(|| format!("converting fonts in {}", dir.display()))?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if args.ndjson {
        write_ndjson(&results, &mut handle)?;
    } else if args.json {
        write_json_pretty(&results, &mut handle)?;
    } else {
        write_plain(&results, &mut handle)?;
    }

    Ok(())
}

fn run_clean(args: CleanArgs, verbose: u8) -> Result<()> {
    let mut config = build_config(&args.dirs, &ToolArgs::default())?;
    if let Some(hours) = args.ttl_hours {
        config.cache_ttl = ttl_from_hours(hours)
            .with_context(|| format!("--ttl-hours {hours} is too large"))?;
    }
    config.validate().context("invalid configuration")?;
    let _guard = init_tracing(&config.log_dir, verbose)?;

    let dir = config.converted_dir();
    let report = sweep_expired(&dir, config.cache_ttl, SystemTime::now())?;
    println!(
        "removed {} of {} files in {} ({} failed)",
        report.removed,
        report.scanned,
        dir.display(),
        report.failed
    );
    Ok(())
}

/// Environment first, then flags on top.
fn build_config(dirs: &DirArgs, tools: &ToolArgs) -> Result<Config> {
    let mut config = Config::from_env();
    apply_overrides(&mut config, dirs, tools)?;
    Ok(config)
}

fn apply_overrides(config: &mut Config, dirs: &DirArgs, tools: &ToolArgs) -> Result<()> {
    if let Some(dir) = &dirs.static_dir {
        config.static_dir = dir.clone();
    }
    if let Some(dir) = &dirs.log_dir {
        config.log_dir = dir.clone();
    }
    if let Some(tool) = &tools.compress_tool {
        config.compress_tool = tool.clone();
    }
    if let Some(tool) = &tools.decompress_tool {
        config.decompress_tool = tool.clone();
    }
    if let Some(secs) = tools.tool_timeout {
        config.tool_timeout = timeout_from_secs(secs);
    }
    if let Some(n) = tools.max_concurrent {
        config.max_concurrent =
            usize::try_from(n).context("--max-concurrent does not fit this platform")?;
    }
    Ok(())
}

/// Daily log file (filtered by `RUST_LOG`) plus stderr at the verbosity asked for.
///
/// Keep the returned guard alive until exit so the file writer can flush.
fn init_tracing(log_dir: &Path, verbose: u8) -> Result<WorkerGuard> {
    let file = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("fontfill")
        .filename_suffix("log")
        .build(log_dir)
        .with_context(|| format!("opening log directory {}", log_dir.display()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(file);

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,fontfill=debug".into());
    let stderr_level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer)
                .with_filter(file_filter),
        )
        .with(
            fmt::layer()
                .with_ansi(io::stderr().is_terminal())
                .with_writer(io::stderr)
                .with_filter(stderr_level),
        )
        .try_init()
        .context("installing log subscriber")?;

    Ok(guard)
}
