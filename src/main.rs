//! Nagari Upload - upload one file to the Nagari portal
//!
//! Validates, optimizes and uploads a file, printing the stored URL on stdout.

use anyhow::Context;
use clap::Parser;
use nagari_upload::client::UploadTarget;
use nagari_upload::upload::{Category, ErrorInfo, UploadCallbacks, UploadFile};
use nagari_upload::{config::Config, logging, metrics, Uploader};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

const DEFAULT_ENDPOINT: &str = "http://localhost:8000/api/upload";

/// Nagari Upload - validating, compressing, retrying file upload
#[derive(Parser, Debug)]
#[command(name = "nagari-upload")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Target category; inferred from the MIME type when omitted
    #[arg(long)]
    category: Option<Category>,

    /// Destination folder; defaults to the category's folder
    #[arg(long)]
    folder: Option<String>,

    /// MIME type; inferred from the file extension when omitted
    #[arg(long)]
    mime: Option<String>,

    /// Upload as private
    #[arg(long)]
    private: bool,

    /// Skip image optimization
    #[arg(long)]
    no_optimize: bool,

    /// Print Prometheus metrics to stderr when done
    #[arg(long)]
    print_metrics: bool,

    /// File to upload
    file: PathBuf,
}

/// Reports progress and retries on stderr
struct ConsoleProgress;

impl UploadCallbacks for ConsoleProgress {
    fn on_progress(&self, percent: u8) {
        eprintln!("[{:>3}%]", percent);
    }

    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &ErrorInfo) {
        eprintln!(
            "attempt {}/{} failed ({}): {}",
            attempt, max_attempts, error.code, error.message
        );
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => {
            let endpoint = std::env::var("NAGARI_API_URL")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
            let config = Config::with_endpoint(endpoint);
            config.validate()?;
            config
        }
    };

    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.no_optimize {
        config.optimize.enabled = false;
    }
    if args.private {
        config.client.public = false;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let config = load_config(&args)?;
    logging::init_subscriber(&config.logging)?;

    info!("Starting Nagari Upload v{}", nagari_upload::VERSION);

    let file = UploadFile::from_path(&args.file, args.mime.as_deref())
        .await
        .with_context(|| format!("Failed to read {:?}", args.file))?;

    let category = args
        .category
        .unwrap_or_else(|| Category::from_mime(&file.mime_type));
    let mut target = UploadTarget::for_category(category, config.client.public);
    if let Some(folder) = &args.folder {
        target = target.with_folder(folder.clone());
    }

    let uploader = Uploader::from_config(&config)?;
    let result = uploader.upload(file, &target, &ConsoleProgress).await;

    if args.print_metrics {
        eprintln!("{}", metrics::render());
    }

    match result {
        Ok(uploaded) => {
            println!("{}", uploaded.url);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("error[{}]: {}", e.code(), e);
            Ok(ExitCode::FAILURE)
        }
    }
}
