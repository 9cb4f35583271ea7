//! Wi-Fi Presence Agent CLI
//!
//! Aggregates probe-request scans and serves presence statistics.

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wifi_presence_agent::{
    classifier::Classifier,
    config::{Config, FilterConfig},
    ingest::{FilterPolicy, IngestWorker, Ingestor, Normalizer, PayloadSender},
    store::PresenceStore,
    VERSION,
};

#[cfg(feature = "server")]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(feature = "server")]
use std::time::Duration;
#[cfg(feature = "server")]
use wifi_presence_agent::{
    query::QueryService,
    server::{self, AppState},
};

#[derive(Parser)]
#[command(name = "wifi-presence")]
#[command(version = VERSION)]
#[command(about = "Wi-Fi probe-request presence aggregation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dashboard API and ingest scanner payloads
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, 0 for random (overrides config)
        #[arg(long)]
        port: Option<u16>,

        /// Also read newline-delimited payloads from stdin
        #[arg(long)]
        stdin: bool,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Classify a single MAC address
    Classify {
        mac: String,

        /// IEEE OUI registry file (overrides config)
        #[arg(long)]
        oui_file: Option<PathBuf>,

        /// Randomization flag as reported by the scanner (0 or 1)
        #[arg(long)]
        hint: Option<i64>,

        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        rssi: i32,
    },

    /// Feed a file of newline-delimited payloads through the pipeline
    Replay {
        file: PathBuf,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Show configuration
    Config,
}

/// Options shared by commands that run the ingest pipeline.
#[derive(clap::Args)]
struct PipelineArgs {
    /// Drop devices whose type is not allowed
    #[arg(long)]
    filter: bool,

    /// Allowed device types, comma-separated (implies --filter)
    #[arg(long)]
    allow: Option<String>,

    /// Device summaries kept before eviction
    #[arg(long)]
    max_devices: Option<usize>,

    /// Snapshots kept in history
    #[arg(long)]
    max_snapshots: Option<usize>,

    /// IEEE OUI registry file (overrides config)
    #[arg(long)]
    oui_file: Option<PathBuf>,
}

impl PipelineArgs {
    fn apply(&self, config: &mut Config) -> Result<(), String> {
        if self.filter {
            config.filter.enabled = true;
        }
        if let Some(allow) = &self.allow {
            config.filter.allowed_types =
                FilterConfig::types_from_csv(allow).map_err(|e| e.to_string())?;
            config.filter.enabled = true;
        }
        if let Some(n) = self.max_devices {
            config.store.max_devices = n;
        }
        if let Some(n) = self.max_snapshots {
            config.store.max_snapshots = n;
        }
        if let Some(path) = &self.oui_file {
            config.classifier.oui_file = Some(path.clone());
        }
        Ok(())
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            stdin,
            pipeline,
        } => {
            cmd_serve(host, port, stdin, &pipeline);
        }
        Commands::Classify {
            mac,
            oui_file,
            hint,
            rssi,
        } => {
            cmd_classify(&mac, oui_file, hint, rssi);
        }
        Commands::Replay { file, pipeline } => {
            cmd_replay(&file, &pipeline);
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration and apply CLI overrides, exiting on invalid input.
fn load_config(pipeline: &PipelineArgs) -> Config {
    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config ({e}), using defaults");
            let mut config = Config::default();
            config.apply_env();
            config
        }
    };
    if let Err(e) = pipeline.apply(&mut config) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    config
}

fn load_classifier(config: &Config) -> Classifier {
    match Classifier::from_config(&config.classifier) {
        Ok(classifier) => classifier,
        Err(e) => {
            eprintln!("Error loading OUI registry: {e}");
            std::process::exit(1);
        }
    }
}

fn build_ingestor(config: &Config) -> Ingestor {
    let normalizer = Normalizer::new(
        Arc::new(load_classifier(config)),
        FilterPolicy::from_config(&config.filter),
    );
    Ingestor::new(normalizer, PresenceStore::from_config(&config.store).shared())
}

#[cfg(feature = "server")]
fn cmd_serve(host: Option<String>, port: Option<u16>, read_stdin: bool, pipeline: &PipelineArgs) {
    let mut config = load_config(pipeline);
    if let Some(host) = host {
        config.api.host = host;
    }
    if let Some(port) = port {
        config.api.port = port;
    }

    let ingestor = build_ingestor(&config);
    let store = ingestor.store().clone();

    println!("Wi-Fi Presence Agent v{VERSION}");
    println!();
    println!("  Max devices: {}", store.max_devices());
    println!("  Max snapshots: {}", store.max_snapshots());
    println!(
        "  Device filtering: {}",
        if config.filter.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    if let Some(path) = &config.classifier.oui_file {
        println!("  OUI registry: {}", path.display());
    }
    let (sender, worker) = IngestWorker::spawn(ingestor, config.ingest_queue_capacity);

    if read_stdin {
        spawn_stdin_reader(sender.clone());
        println!("  Reading payloads from stdin");
    }

    let state = AppState::new(QueryService::from_config(store.clone(), &config)).with_ingest(sender);
    println!("  Instance ID: {}", state.instance_id());

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting async runtime: {e}");
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(async {
        let (addr, shutdown_tx) = server::run(&config.api, state).await?;
        println!("  Listening on http://{addr}");
        println!();
        println!("Press Ctrl+C to stop");
        println!();

        while running.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        let _ = shutdown_tx.send(());
        anyhow::Ok(())
    });

    if let Err(e) = result {
        eprintln!("Error running server: {e}");
        std::process::exit(1);
    }

    let processed = worker.shutdown();
    println!();
    println!("Payloads processed: {processed}");
    println!("{}", store.counters().summary());
}

#[cfg(not(feature = "server"))]
fn cmd_serve(_host: Option<String>, _port: Option<u16>, read_stdin: bool, pipeline: &PipelineArgs) {
    let config = load_config(pipeline);
    if !read_stdin {
        eprintln!("Error: the server feature is not enabled; use --stdin to ingest without the API");
        std::process::exit(1);
    }

    let ingestor = build_ingestor(&config);
    let store = ingestor.store().clone();
    let (sender, worker) = IngestWorker::spawn(ingestor, config.ingest_queue_capacity);
    let reader = spawn_stdin_reader(sender);
    if reader.join().is_err() {
        eprintln!("Warning: stdin reader panicked");
    }

    let processed = worker.shutdown();
    println!("Payloads processed: {processed}");
    println!("{}", store.counters().summary());
}

/// Forward stdin lines to the ingest queue until EOF.
fn spawn_stdin_reader(sender: PayloadSender) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("Stopped reading stdin: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            if sender.submit_blocking(line.into_bytes()).is_err() {
                break;
            }
        }
    })
}

fn cmd_classify(mac: &str, oui_file: Option<PathBuf>, hint: Option<i64>, rssi: i32) {
    let mut config = Config::load().unwrap_or_default();
    if oui_file.is_some() {
        config.classifier.oui_file = oui_file;
    }
    let classifier = load_classifier(&config);
    let result = classifier.classify(mac, rssi, hint);

    match &result.mac {
        Some(normalized) => println!("MAC:         {normalized}"),
        None => println!("MAC:         {mac} (not a valid MAC address)"),
    }
    println!("Vendor:      {}", result.vendor.as_deref().unwrap_or("unknown"));
    println!("Type:        {}", result.device_type);
    println!("Brand:       {}", result.device_brand.as_deref().unwrap_or("-"));
    println!("Randomized:  {}", result.randomized);
}

fn cmd_replay(file: &Path, pipeline: &PipelineArgs) {
    let config = load_config(pipeline);

    let content = match std::fs::read(file) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading {file:?}: {e}");
            std::process::exit(1);
        }
    };

    let ingestor = build_ingestor(&config);
    let mut payloads = 0;
    let mut kept = 0;
    for line in content.split(|b| *b == b'\n') {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let report = ingestor.handle_payload(line);
        payloads += 1;
        kept += report.kept;
    }

    let store = ingestor.store();
    let summary = store.get_snapshot_summary();

    println!("Replayed {payloads} payload(s), {kept} observation(s) kept");
    println!();
    println!("{}", store.counters().summary());
    println!();
    println!("Snapshot Summary:");
    println!("  Peak devices in one scan: {}", summary.peak_all_time);
    println!("  Devices in last scan: {}", summary.last_snapshot);
    println!("  Devices tracked: {}", summary.total_unique);

    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    for device in store.get_devices(None) {
        *by_type.entry(device.device_type.to_string()).or_insert(0) += 1;
    }
    if !by_type.is_empty() {
        println!();
        println!("Devices by type:");
        for (device_type, count) in by_type {
            println!("  {device_type}: {count}");
        }
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
#[cfg(feature = "server")]
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}
