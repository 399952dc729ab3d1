//! Activity Logger CLI

use activity_logger::{
    collector::{self, check_permission, Capability, Collector, CollectorConfig, PointerButton},
    config::{Config, SourceConfig},
    logging::init_logging,
    server::{self, AppState},
    AggregateSnapshot, AggregationService, CsvStore, EventStore, Pipeline, TimeWindow,
    DISPLAY_TIME_FORMAT, VERSION,
};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "activity-logger")]
#[command(version = VERSION)]
#[command(
    about = "Logs input activity and serves statistics to a local dashboard",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start capturing and serving the dashboard
    Start {
        /// Input sources to capture (pointer, keyboard, controller, or all)
        #[arg(long)]
        sources: Option<String>,

        /// Dashboard port (overrides the config file)
        #[arg(long)]
        port: Option<u16>,

        /// Do not start the dashboard server
        #[arg(long)]
        no_server: bool,

        /// Seconds between writes to the log
        #[arg(long)]
        flush_interval: Option<f64>,
    },

    /// Show logged totals
    Status,

    /// Show configuration
    Config {
        /// Write the current settings to the config file if it does not exist
        #[arg(long)]
        init: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Commands::Start {
            sources,
            port,
            no_server,
            flush_interval,
        } => cmd_start(sources, port, no_server, flush_interval),
        Commands::Status => cmd_status(),
        Commands::Config { init } => cmd_config(init),
    }
}

fn cmd_start(
    sources: Option<String>,
    port: Option<u16>,
    no_server: bool,
    flush_interval: Option<f64>,
) -> anyhow::Result<()> {
    let mut config = Config::load().context("loading configuration")?;
    if let Some(sources) = sources {
        config.sources = SourceConfig::from_csv(&sources);
    }
    if !config.sources.any_enabled() {
        bail!("at least one source must be enabled (pointer, keyboard or controller)");
    }
    if config.sources.controller && !config.sources.pointer && !config.sources.keyboard {
        bail!("controller input has no built-in capture source; enable pointer or keyboard too");
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if no_server {
        config.server.enabled = false;
    }
    if let Some(secs) = flush_interval {
        config.flush_interval =
            Duration::try_from_secs_f64(secs).context("--flush-interval must be non-negative")?;
    }
    config
        .ensure_directories()
        .context("creating data directory")?;

    println!("Activity Logger v{VERSION}");
    println!();

    if (config.sources.pointer || config.sources.keyboard) && !check_permission() {
        eprintln!("Warning: Input Monitoring permission not granted.");
        eprintln!(
            "Capture will keep retrying; grant permission in \
             System Settings > Privacy & Security > Input Monitoring."
        );
        eprintln!();
    }

    let collector_config = CollectorConfig::from_config(&config);
    for capability in collector_config.without_native_source() {
        eprintln!("Warning: {capability} input has no capture backend on this platform.");
        if capability == Capability::Controller {
            eprintln!("Controller events are only recorded from an embedded input source.");
        }
    }

    let pipeline = Pipeline::open(&config).context("opening event log")?;

    println!("Starting collection...");
    println!("  Log file: {}", config.log_path().display());
    println!("  Pointer: {}", enabled(config.sources.pointer));
    println!("  Keyboard: {}", enabled(config.sources.keyboard));
    println!("  Controller: {}", enabled(config.sources.controller));
    println!("  Flush interval: {:?}", config.flush_interval);
    println!("  Total distance so far: {:.2} in", pipeline.cumulative.get());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let flush = pipeline.flush_worker().spawn(config.flush_interval);

    let mut collector = Collector::new(collector_config.clone(), pipeline.queue.clone());
    collector.add_source(collector::platform_source(&collector_config));
    collector.start()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    ctrlc_handler(shutdown_tx);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building async runtime")?;
    runtime.block_on(serve(&config, &pipeline, shutdown_rx))?;

    println!();
    println!("Stopping collection...");
    collector.stop();

    if let Some(worker) = flush.shutdown() {
        if worker.retained() > 0 {
            eprintln!(
                "Warning: {} events could not be written and were lost",
                worker.retained()
            );
        }
    }

    println!();
    println!("{}", pipeline.stats.summary());
    println!("Total distance: {:.2} in", pipeline.cumulative.get());
    Ok(())
}

/// Run the dashboard and session reaper until shutdown is signalled.
async fn serve(
    config: &Config,
    pipeline: &Pipeline,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut handles = None;

    if config.server.enabled {
        let state = Arc::new(AppState::new(pipeline, config));
        let reaper = state
            .sessions
            .clone()
            .spawn_reaper(config.reap_interval, shutdown.clone());
        let (addr, server_tx) = server::run(&config.server, state)
            .await
            .context("starting dashboard server")?;
        println!("Dashboard: http://{addr}/data");
        handles = Some((reaper, server_tx));
    }

    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }

    if let Some((reaper, server_tx)) = handles {
        let _ = server_tx.send(());
        let _ = reaper.await;
    }
    Ok(())
}

fn cmd_status() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;

    println!("Activity Logger Status");
    println!("======================");
    println!();
    println!(
        "Input Monitoring Permission: {}",
        if check_permission() {
            "Granted ✓"
        } else {
            "Not Granted ✗"
        }
    );
    println!("Log file: {}", config.log_path().display());
    println!();

    if !config.log_path().exists() {
        println!("No events logged yet.");
        println!("Run 'activity-logger start' to begin collecting data.");
        return Ok(());
    }

    let store: Arc<dyn EventStore> =
        Arc::new(CsvStore::open(config.log_path()).context("opening event log")?);
    let service = AggregationService::from_config(store, &config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building async runtime")?;
    let all_time = runtime.block_on(service.snapshot(None));

    if let Some(since) = all_time.logging_since {
        println!("Logging since: {}", since.format(DISPLAY_TIME_FORMAT));
    }
    println!("Log size: {:.1} KB", all_time.store_size_bytes as f64 / 1024.0);
    println!();

    print_totals("All time", &all_time);
    if let Some(window) = config.default_window {
        let recent = runtime.block_on(service.snapshot(Some(window)));
        println!();
        print_totals(&format!("Last {}", TimeWindow::Last(window)), &recent);
    }
    Ok(())
}

fn print_totals(title: &str, snapshot: &AggregateSnapshot) {
    println!("{title}:");
    println!("  Left clicks: {}", snapshot.clicks(PointerButton::Left));
    println!("  Right clicks: {}", snapshot.clicks(PointerButton::Right));
    println!("  Middle clicks: {}", snapshot.clicks(PointerButton::Middle));
    println!("  Key presses: {}", snapshot.key_presses());
    println!("  Gamepad actions: {}", snapshot.gamepad_actions());
    println!("  Pointer movement: {:.0} in", snapshot.total_distance);
}

fn cmd_config(init: bool) -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;

    if init {
        if Config::config_path().exists() {
            println!("Config file already exists, leaving it unchanged.");
        } else {
            config.save().context("writing configuration")?;
            println!("Wrote default configuration.");
        }
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!(
        "Display density: {:.2} px/in ({}x{} at {}\")",
        config.display.density(),
        config.display.width_px,
        config.display.height_px,
        config.display.diagonal_in
    );
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn enabled(on: bool) -> &'static str {
    if on {
        "enabled"
    } else {
        "disabled"
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(shutdown: watch::Sender<bool>) {
    ctrlc::set_handler(move || {
        let _ = shutdown.send(true);
    })
    .expect("Error setting Ctrl+C handler");
}
