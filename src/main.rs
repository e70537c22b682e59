use anyhow::Result;
use clap::Parser;
use proctorcam::{
    error::EventBusError, CameraDriver, EventFilter, ProctorConfig, ProctorEvent, Scene, ScriptedScene,
    SessionController, SyntheticCameraDriver,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "proctorcam")]
#[command(about = "Multi-camera behavioral integrity monitor for timed assessments")]
#[command(version)]
#[command(long_about = "Watches a candidate through every configured camera during a timed \
assessment, issues warnings for suspicious behaviour and auto-submits the assessment once \
the warning limit is reached or a camera drops out. Observer updates are printed to stdout \
as JSON lines.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "proctorcam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Candidate to monitor
    #[arg(long, default_value = "candidate", help = "Candidate identifier used in snapshot names")]
    candidate_id: String,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECONDS", help = "Stop the session after the given number of seconds")]
    duration_seconds: Option<u64>,

    /// People the scripted detectors report
    #[arg(long, default_value_t = 1, help = "Number of people the scripted detectors report")]
    faces: usize,

    /// Use the synthetic camera even when a hardware backend is compiled in
    #[arg(long, help = "Use synthetic test-pattern cameras")]
    synthetic: bool,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Print every session event, not only observer updates
    #[arg(long, help = "Also print internal session events (snapshots, camera failures)")]
    all_events: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting a session")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to daily files in this directory
    #[arg(long, value_name = "DIR", help = "Directory for daily rolling log files")]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let log_guard = init_logging(&args)?;

    info!("Starting proctorcam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = ProctorConfig::load_from_file(&args.config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let scene = ScriptedScene::new(Scene {
        people: args.faces,
        ..Scene::calm()
    });

    let controller = SessionController::builder()
        .config(config)
        .driver(camera_driver(&args))
        .detectors(move || scene.detectors())
        .build()?;

    let mut observer = if args.all_events {
        controller.event_bus().subscribe_filtered(EventFilter::All, "cli")
    } else {
        controller.subscribe()
    };

    controller.start(&args.candidate_id).await.map_err(|e| {
        error!("Failed to start session: {}", e);
        e
    })?;

    let deadline = async {
        match args.duration_seconds {
            Some(seconds) => tokio::time::sleep(Duration::from_secs(seconds)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let exit_code = loop {
        tokio::select! {
            event = observer.recv() => match event {
                Ok(event) => {
                    match event.observer_payload() {
                        Some(payload) => println!("{}", serde_json::to_string(&payload)?),
                        None => println!(
                            "{}",
                            serde_json::json!({
                                "event": event.event_type(),
                                "detail": event.description(),
                            })
                        ),
                    }
                    if let ProctorEvent::AutoSubmitted { reason, .. } = event {
                        warn!("Assessment auto-submitted: {}", reason);
                        break 2;
                    }
                }
                Err(EventBusError::ChannelClosed) => {
                    error!("Event bus closed while session was running");
                    controller.stop().await;
                    break 1;
                }
                Err(e) => warn!("Observer fell behind: {}", e),
            },
            _ = &mut ctrl_c => {
                info!("Received Ctrl+C, stopping session");
                controller.stop().await;
                break 0;
            }
            _ = &mut deadline => {
                info!("Session duration elapsed, stopping session");
                controller.stop().await;
                break 0;
            }
        }
    };

    let status = controller.status();
    info!(
        "Final status: {}",
        serde_json::to_string(&status).unwrap_or_else(|_| format!("{:?}", status))
    );

    drop(log_guard);
    std::process::exit(exit_code);
}

fn camera_driver(args: &Args) -> Arc<dyn CameraDriver> {
    if !args.synthetic {
        match hardware_driver() {
            Some(driver) => return driver,
            None => info!("No hardware camera backend compiled in, using synthetic cameras"),
        }
    }
    Arc::new(SyntheticCameraDriver::new())
}

#[cfg(all(feature = "gstreamer", target_os = "linux"))]
fn hardware_driver() -> Option<Arc<dyn CameraDriver>> {
    Some(Arc::new(proctorcam::GstCameraDriver::new()))
}

#[cfg(not(all(feature = "gstreamer", target_os = "linux")))]
fn hardware_driver() -> Option<Arc<dyn CameraDriver>> {
    None
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
        .unwrap_or_else(|_| EnvFilter::new(format!("proctorcam={}", log_level)));

    // stdout carries observer payloads, so logs go to stderr
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "proctorcam.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Proctorcam Configuration File");
    println!("# Every option with its default value");
    println!("# Environment overrides: PROCTORCAM__<SECTION>__<KEY>, e.g. PROCTORCAM__CAMERA__COUNT=3");
    println!();
    println!("{}", toml::to_string_pretty(&ProctorConfig::default())?);
    Ok(())
}
