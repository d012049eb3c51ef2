mod config;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use config::Config;
use octoterra::export::{run_export, ExportSettings, LabelPolicy};
use octoterra::octopus::{ApiKey, OctopusClient, API_KEY_ENV};
use octoterra::resource::{CancelToken, Catalog};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Export an Octopus Deploy space as Terraform configuration
#[derive(Parser, Debug)]
#[command(name = "octoterra", version, about, long_about = None)]
struct Args {
    /// Octopus server URL
    #[arg(long)]
    server: Option<String>,

    /// Octopus API key
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Space to export, e.g. Spaces-1
    #[arg(long)]
    space: Option<String>,

    /// Directory the .tf files are written to
    #[arg(long)]
    dest: Option<PathBuf>,

    /// Items requested per collection page
    #[arg(long)]
    page_size: Option<usize>,

    /// Export every resource of this kind (repeatable)
    #[arg(long = "kind", value_name = "KIND")]
    kinds: Vec<String>,

    /// Export this project and its dependencies (repeatable)
    #[arg(long = "project-id", value_name = "ID")]
    project_ids: Vec<String>,

    /// What to do when two resources share a name
    #[arg(long, value_enum, default_value = "suffix-id")]
    label_policy: LabelPolicyArg,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Remember server, space, destination and page size
    #[arg(long)]
    save_config: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LabelPolicyArg {
    SuffixId,
    Keep,
}

impl From<LabelPolicyArg> for LabelPolicy {
    fn from(arg: LabelPolicyArg) -> Self {
        match arg {
            LabelPolicyArg::SuffixId => LabelPolicy::SuffixId,
            LabelPolicyArg::Keep => LabelPolicy::Keep,
        }
    }
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

fn setup_logging(
    level: LogLevel,
    log_file: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let (non_blocking, guard, ansi) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            (writer, guard, false)
        }
        None => {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
            (writer, guard, true)
        }
    };

    // RUST_LOG, when set, refines the level per target
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(tracing_level).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(ansi)
        .with_target(false)
        .init();

    tracing::debug!("octoterra started with log level: {:?}", level);
    if let Some(path) = log_file {
        tracing::debug!("Log file: {:?}", path);
    }

    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level, args.log_file.as_deref())?;

    // Step 1: Resolve configuration (CLI > config file > environment > default)
    let mut config = Config::load();
    let server = config
        .effective_server(args.server.as_deref())
        .context("No Octopus server configured. Set OCTOPUS_CLI_SERVER or use --server")?;
    let space_id = config.effective_space(args.space.as_deref());
    let dest = config.effective_dest(args.dest.clone());
    let page_size = config.effective_page_size(args.page_size);

    if args.save_config {
        config.server = Some(server.clone());
        config.space_id = space_id.clone();
        config.dest = Some(dest.clone());
        config.page_size = Some(page_size);
        config.save().context("Failed to save configuration")?;
    }

    let api_key = ApiKey::resolve(args.api_key.as_deref()).context("Failed to read API key")?;

    // Step 2: Catalog and client
    let catalog = Arc::new(Catalog::embedded().context("Failed to load resource catalog")?);
    for kind in &args.kinds {
        catalog
            .get(kind)
            .with_context(|| format!("Cannot export --kind {}", kind))?;
    }

    let client = OctopusClient::new(&server, api_key, space_id, catalog.clone())
        .context("Failed to create Octopus client")?;

    // Step 3: Ctrl-C cancels in-flight fetches; whatever was found is still written
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling export");
                cancel.cancel();
            }
        });
    }

    // Step 4: Export
    let settings = ExportSettings {
        dest,
        page_size,
        label_policy: args.label_policy.into(),
        kinds: args.kinds,
        project_ids: args.project_ids,
    };

    let report = run_export(Arc::new(client), catalog, &settings, cancel)
        .await
        .context("Export failed")?;

    println!(
        "Wrote {} files to {}",
        report.written.len(),
        settings.dest.display()
    );

    report
        .into_result()
        .context("Export finished with errors")?;

    Ok(())
}
