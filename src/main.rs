use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use infrakit::aggregate::{
    run_sync, Fetcher, HierarchySource, ScopedFetcher, SyncOptions, SyncOutcome, SyncSources,
    SyncTarget,
};
use infrakit::aws::cli::{AwsCli, AwsCliRunner};
use infrakit::aws::{Ec2Fetcher, IamRoleFetcher};
use infrakit::config::Config;
use infrakit::flow::trace_flows;
use infrakit::gcp::client::GcpClient;
use infrakit::gcp::GcpInventory;
use infrakit::model::Provider;
use infrakit::search::rank;
use infrakit::store::{children_by_service, group_by_parent, SnapshotStore};
use infrakit::{server, ui, VERSION};
use serde::Serialize;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Inventory AWS and GCP resources and query the snapshot offline
#[derive(Parser, Debug)]
#[command(name = "infrakit", version, about, long_about = None)]
struct Cli {
    /// Directory holding the snapshot (overrides INFRAKIT_CACHE_DIR and the config file)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch resources and write them to the snapshot
    Sync {
        /// Only this provider: aws or gcp
        provider: Option<String>,

        /// Only this GCP project, merged into the existing snapshot
        project: Option<String>,

        /// Keep the records of fetchers that succeeded when others fail
        #[arg(long)]
        keep_going: bool,

        /// Run fetchers at the same time
        #[arg(long)]
        concurrent: bool,

        /// GCP organization to walk instead of discovering one
        #[arg(long)]
        organization: Option<String>,
    },

    /// Fuzzy search the snapshot
    Search {
        /// Initial query
        query: Option<String>,

        /// Print ranked matches instead of opening the picker
        #[arg(long)]
        print: bool,
    },

    /// Serve the snapshot over a local HTTP API
    Serve {
        /// Listen address, e.g. 127.0.0.1:8080
        #[arg(long)]
        addr: Option<String>,
    },

    /// Print the load balancer flows of a GCP project as JSON
    Flows { project: String },

    /// Print the children of a project grouped by service as JSON, or every
    /// parent's children when no project is given
    Resources { parent: Option<String> },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

/// Install the global subscriber. The picker owns the terminal, so it logs
/// to a file; every other command logs to stderr.
fn setup_logging(level: LogLevel, to_file: bool) -> Option<WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let (writer, guard) = if to_file {
        let log_path = get_log_path();
        match open_log_file(&log_path) {
            Ok(file) => tracing_appender::non_blocking(file),
            Err(e) => {
                eprintln!("Logging disabled: {:#}", e);
                return None;
            }
        }
    } else {
        tracing_appender::non_blocking(io::stderr())
    };

    // INFRAKIT_LOG takes per-target directives, e.g. "infrakit::gcp=trace"
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(tracing_level).into())
        .with_env_var("INFRAKIT_LOG")
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(!to_file)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(to_file)
        .with_line_number(to_file)
        .init();

    tracing::info!("infrakit {} started with log level: {:?}", VERSION, level);
    Some(guard)
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {:?}", path))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("infrakit").join("infrakit.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".infrakit").join("infrakit.log");
    }
    PathBuf::from("infrakit.log")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let interactive = matches!(cli.command, Command::Search { print: false, .. });
    let _log_guard = setup_logging(cli.log_level, interactive);

    let config = Config::load();
    let store = config.snapshot_store(cli.cache_dir.as_deref());
    tracing::debug!("Using snapshot {:?}", store.path());

    match cli.command {
        Command::Sync {
            provider,
            project,
            keep_going,
            concurrent,
            organization,
        } => {
            let target = SyncTarget::from_args(provider.as_deref(), project.as_deref())?;
            let options = SyncOptions {
                keep_going: keep_going || config.keep_going,
                concurrent: concurrent || config.concurrent_fetch,
                organization: organization.or_else(|| config.gcp_organization.clone()),
            };
            sync(&config, &store, &target, &options).await
        }
        Command::Search { query, print } => search(&store, query.as_deref().unwrap_or_default(), print),
        Command::Serve { addr } => server::serve(&config.effective_serve_addr(addr.as_deref()), store).await,
        Command::Flows { project } => {
            let records = store.load()?;
            print_json(&trace_flows(&records, &project))
        }
        Command::Resources { parent } => {
            let records = store.load()?;
            match parent {
                Some(parent) => print_json(&children_by_service(&records, &parent)),
                None => print_json(&group_by_parent(&records)),
            }
        }
    }
}

async fn sync(
    config: &Config,
    store: &SnapshotStore,
    target: &SyncTarget,
    options: &SyncOptions,
) -> Result<()> {
    let aws_cli: Arc<dyn AwsCli> = Arc::new(AwsCliRunner::new(config.aws_region.clone()));
    let aws: Vec<Box<dyn Fetcher>> = vec![
        Box::new(Ec2Fetcher::new(aws_cli.clone())),
        Box::new(IamRoleFetcher::new(aws_cli)),
    ];

    let inventory = if *target == SyncTarget::Provider(Provider::Aws) {
        None
    } else {
        let client = GcpClient::connect()
            .await
            .context("Failed to set up GCP access")?;
        Some(GcpInventory::new(client))
    };
    let project_fetcher = inventory.as_ref().map(GcpInventory::project_fetcher);

    let sources = SyncSources {
        aws,
        gcp: inventory.as_ref().map(|i| i as &dyn HierarchySource),
        gcp_project: project_fetcher.as_ref().map(|f| f as &dyn ScopedFetcher),
    };

    let summary = run_sync(target, sources, store, options).await?;

    for warning in &summary.warnings {
        eprintln!("warning: {} failed: {:#}", warning.fetcher, warning.error);
    }

    match summary.outcome {
        SyncOutcome::Replaced => {
            println!("Saved {} resources to {}", summary.fetched, store.path().display())
        }
        SyncOutcome::Merged(report) => println!(
            "Merged {} resources: {} kept, {} replaced, {} added",
            summary.fetched, report.retained, report.removed, report.added
        ),
        SyncOutcome::Skipped => println!("No resources fetched, snapshot left unchanged"),
    }
    Ok(())
}

fn search(store: &SnapshotStore, query: &str, print: bool) -> Result<()> {
    let records = store.load()?;

    if print {
        for hit in rank(&records, query) {
            let res = hit.resource;
            println!("{}\t{}\t{}\t{}\t{}", hit.score, res.provider, res.service, res.name, res.id);
        }
        return Ok(());
    }

    if let Some(picked) = ui::pick(&records, query)? {
        print_json(&picked)?;
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", out);
    Ok(())
}
