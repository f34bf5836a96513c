use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use sharecast::app::{AppCommand, LogView, PointerEvent, ShareApp, ShutdownReason};
use sharecast::broadcast::BroadcastChannel;
use sharecast::capture::{CaptureSource, MockCaptureSource};
use sharecast::geometry::{Point, Rectangle};
use sharecast::ShareConfig;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    /// Synthetic frames, no display required
    Mock,
    /// X11 capture through GStreamer
    Gstreamer,
}

#[derive(Parser, Debug)]
#[command(name = "sharecast")]
#[command(about = "Screen sharing with region selection and low-rate frame broadcasting")]
#[command(version)]
#[command(long_about = "Captures the screen (or a selected area of it), announces the stream \
on an in-process broadcast channel and publishes sampled JPEG frames to every viewer. \
Interactive sessions are driven from the keyboard.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "sharecast.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Capture backend
    #[arg(long, value_enum, default_value_t = SourceKind::Mock)]
    source: SourceKind,

    /// Share only this area of the viewport
    #[arg(long, value_name = "X,Y,W,H", value_parser = parse_rect, conflicts_with = "section")]
    crop: Option<Rectangle>,

    /// Share this section of the viewport
    #[arg(long, value_name = "X,Y,W,H", value_parser = parse_rect)]
    section: Option<Rectangle>,

    /// Start sharing the whole screen immediately
    #[arg(long)]
    start: bool,

    /// Keep the latest broadcast frame in this file
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,

    /// Do not read commands from the terminal
    #[arg(long)]
    no_keyboard: bool,
}

fn parse_rect(value: &str) -> std::result::Result<Rectangle, String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in '{}': {}", value, e))?;

    match parts.as_slice() {
        [x, y, width, height] if *width > 0.0 && *height > 0.0 => {
            Ok(Rectangle::new(*x, *y, *width, *height))
        }
        [_, _, _, _] => Err("width and height must be positive".to_string()),
        _ => Err(format!("expected X,Y,W,H but got '{}'", value)),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting sharecast v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = ShareConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }
    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let source = create_source(args.source)?;
    let channel = BroadcastChannel::new(
        config.broadcast.channel_name.clone(),
        config.broadcast.channel_capacity,
    );

    let keyboard = !args.no_keyboard && std::io::stdin().is_terminal();
    let mut app = ShareApp::new(config, source, channel, Arc::new(LogView))
        .with_keyboard(keyboard)
        .with_exit_when_stopped(!keyboard);
    if let Some(path) = &args.snapshot {
        app = app.with_snapshot(path);
    }

    queue_startup_commands(&args, keyboard, &app.command_sender()).await?;

    let reason = app.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("sharecast exited: {:?}", reason);
    if let ShutdownReason::Error(message) = reason {
        eprintln!("✗ {}", message);
        std::process::exit(1);
    }
    Ok(())
}

fn create_source(kind: SourceKind) -> Result<Arc<dyn CaptureSource>> {
    match kind {
        SourceKind::Mock => Ok(Arc::new(MockCaptureSource::new())),
        #[cfg(all(feature = "gstreamer", target_os = "linux"))]
        SourceKind::Gstreamer => Ok(Arc::new(sharecast::capture::GstScreenSource::new())),
        #[cfg(not(all(feature = "gstreamer", target_os = "linux")))]
        SourceKind::Gstreamer => anyhow::bail!("sharecast was built without the 'gstreamer' feature"),
    }
}

/// Drive a requested selection as a drag followed by a confirm, or start a
/// full capture when nobody is at the keyboard
async fn queue_startup_commands(
    args: &Args,
    keyboard: bool,
    commands: &mpsc::Sender<AppCommand>,
) -> Result<()> {
    let selection = match (args.crop, args.section) {
        (Some(rect), _) => Some((AppCommand::ToggleCropMode, rect)),
        (None, Some(rect)) => Some((AppCommand::ToggleSectionMode, rect)),
        (None, None) => None,
    };

    let mut queue = Vec::new();
    if let Some((enter, rect)) = selection {
        queue.push(enter);
        queue.push(AppCommand::Pointer(PointerEvent::Down(Point::new(
            rect.x, rect.y,
        ))));
        queue.push(AppCommand::Pointer(PointerEvent::Up(Point::new(
            rect.right(),
            rect.bottom(),
        ))));
        queue.push(AppCommand::ConfirmSelection);
    } else if args.start || !keyboard {
        queue.push(AppCommand::StartSharing);
    }

    for command in queue {
        commands
            .send(command)
            .await
            .context("Command queue closed before startup")?;
    }
    Ok(())
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sharecast={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let mut layers = vec![fmt_layer];
    let mut guard = None;
    if let Some(dir) = &args.log_dir {
        let appender = tracing_appender::rolling::daily(dir, "sharecast.log");
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        layers.push(fmt::layer().with_ansi(false).with_writer(writer).boxed());
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("Failed to initialise logging")?;

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    let rendered = toml::to_string_pretty(&ShareConfig::default())
        .context("Failed to render default configuration")?;

    println!("# sharecast configuration file");
    println!("# Every key is optional; values can also be set with SHARECAST_<SECTION>__<KEY>");
    println!();
    println!("{}", rendered);
    Ok(())
}
