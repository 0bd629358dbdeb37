//! Command line entry point for registry blob audits.

use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use eyre::{WrapErr, eyre};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use registry_audit::config::{AuditConfig, MetadataConfig};
use registry_audit::output::OutputTarget;
use registry_audit::{BlobFilter, ImageRef, OutputFormat, check_tag, find_missing_blobs};
use storage::StorageConfig;

#[derive(Debug, Parser)]
#[command(name = "registry-audit", version, about)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Detect blobs recorded in metadata whose content is missing from storage
    MissingBlobs(MissingBlobs),
}

#[derive(Debug, Args)]
struct MissingBlobs {
    /// Replica ID of the metadata database
    #[arg(long)]
    replica_id: Option<String>,

    /// File name to write results to, inside the output directory
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Organization name of blobs to process
    #[arg(long)]
    org: Option<String>,

    /// Repository name of blobs to process
    #[arg(long)]
    repo: Option<String>,

    /// Check only the blobs of this tag. Requires --org and --repo
    #[arg(long, requires_all = ["org", "repo"])]
    tag: Option<String>,

    /// Write a verbose log to the log file in the output directory
    #[arg(short, long)]
    verbose: bool,

    /// Produce JSON output instead of a text list
    #[arg(long)]
    json: bool,

    /// Directory results and logs are written to
    #[arg(long)]
    output_dir: Option<Utf8PathBuf>,

    /// Directory holding the sharded blob content
    #[arg(long)]
    storage_root: Option<Utf8PathBuf>,

    /// Metadata table export to read, instead of the replica's default export
    #[arg(long)]
    snapshot: Option<Utf8PathBuf>,
}

impl MissingBlobs {
    fn apply(&self, config: &mut AuditConfig) {
        if let Some(replica) = &self.replica_id {
            config.replica_id = Some(replica.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(root) = &self.storage_root {
            config.storage = StorageConfig::Local { path: root.clone() };
        }
        if let Some(snapshot) = &self.snapshot {
            let database = match &config.metadata {
                MetadataConfig::Snapshot { database, .. } => database.clone(),
                MetadataConfig::Memory => registry_audit::metadata::DEFAULT_DATABASE.to_owned(),
            };
            config.metadata = MetadataConfig::Snapshot {
                path: Some(snapshot.clone()),
                database,
            };
        }
    }

    fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Install the stderr logger and, when requested, the verbose log file.
fn init_tracing(log_file: Option<&Utf8Path>) {
    let stderr = fmt::layer().with_writer(std::io::stderr).with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );

    let (file, file_error) = match log_file.map(std::fs::File::create) {
        Some(Ok(file)) => (Some(file), None),
        Some(Err(error)) => (None, Some(error)),
        None => (None, None),
    };
    let verbose = file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .with_filter(EnvFilter::new("debug"))
    });

    tracing_subscriber::registry()
        .with(stderr)
        .with(verbose)
        .with(tracing_error::ErrorLayer::default())
        .init();

    if let (Some(path), Some(error)) = (log_file, file_error) {
        tracing::error!("Could not create log file {path}: {error}");
    }
}

async fn missing_blobs(config: AuditConfig, args: MissingBlobs) -> eyre::Result<()> {
    let ctx = config.context().await.wrap_err("preparing audit")?;
    let format = args.format();
    let target = OutputTarget::resolve(&config.output_dir, args.output.as_deref());

    let rendered = if let Some(tag) = args.tag.filter(|tag| !tag.is_empty()) {
        let (Some(org), Some(repo)) = (args.org, args.repo) else {
            return Err(eyre!(
                "when specifying a tag the repo and org must also be specified"
            ));
        };
        let image = ImageRef::new(org, repo, tag);
        let check = check_tag(&ctx, &image)
            .await
            .wrap_err_with(|| format!("checking {image}"))?;
        check.render(format)?
    } else {
        let filter = BlobFilter::new(args.org, args.repo);
        let report = find_missing_blobs(&ctx, &filter)
            .await
            .wrap_err("failed to retrieve missing blobs")?;
        report.render(format)?
    };

    target.write(&rendered).await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AuditConfig::load(path).await?,
        None => AuditConfig::default(),
    };

    match cli.command {
        Command::MissingBlobs(args) => {
            args.apply(&mut config);
            let log_path = config.log_path();
            init_tracing(args.verbose.then_some(log_path.as_path()));
            tracing::debug!(?config, "Starting missing blob audit");
            missing_blobs(config, args).await
        }
    }
}
