use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

use video_downloader::downloader::{
    platform, tools, JobFilter, SortField, SortOrder, StatusFilter,
};
use video_downloader::{logging, DownloadError, DownloaderConfig, Orchestrator, SubmitOverrides};

#[derive(Parser)]
#[command(name = "video-downloader", version, about = "Download videos with yt-dlp and track jobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download a URL and wait for it to finish
    Submit {
        url: String,
        /// best, 1080p, 720p, 480p, 360p or audio (default: platform default)
        #[arg(long, short, default_value = "")]
        quality: String,
        /// Output directory instead of the per-platform one
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Output file name
        #[arg(long)]
        filename: Option<String>,
        /// Pick "name (n).mp4" when the file already exists
        #[arg(long)]
        force: bool,
    },
    /// List recorded jobs
    List {
        #[arg(long, default_value = "all")]
        status: String,
        #[arg(long)]
        platform: Option<String>,
        /// started_at, updated_at, completed_at, title, platform or status
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        desc: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Jobs still in progress
    Active,
    /// Delete a job record
    Remove { id: String },
    /// Delete records older than the retention period
    Prune {
        #[arg(long)]
        days: Option<u32>,
    },
    /// Supported platforms
    Platforms,
    /// yt-dlp location and version
    Tools,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), DownloadError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Resolves on Ctrl-C; never resolves when the handler cannot be installed
async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::warn!("Interrupted, cancelling download"),
        Err(e) => {
            tracing::warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await
        }
    }
}

async fn run(cli: Cli) -> Result<bool, DownloadError> {
    let config = DownloaderConfig::from_env()?;

    match cli.command {
        Command::Submit {
            url,
            quality,
            dir,
            filename,
            force,
        } => {
            let orchestrator = Orchestrator::start(config).await;
            let overrides = SubmitOverrides {
                output_dir: dir,
                filename,
                force_new_file: force,
            };
            let result = orchestrator
                .submit_until(&url, &quality, overrides, ctrl_c())
                .await;
            print_json(&result)?;
            Ok(result.is_success())
        }
        Command::List {
            status,
            platform,
            sort,
            desc,
            limit,
        } => {
            let order = if desc {
                SortOrder::Descending
            } else {
                SortOrder::Ascending
            };
            let filter = JobFilter {
                status: status.parse::<StatusFilter>()?,
                platform,
                sort: sort
                    .map(|s| s.parse::<SortField>())
                    .transpose()?
                    .map(|field| (field, order)),
                limit,
            };
            print_json(&Orchestrator::new(config).list_jobs(&filter).await)?;
            Ok(true)
        }
        Command::Active => {
            print_json(&Orchestrator::new(config).get_active_jobs().await)?;
            Ok(true)
        }
        Command::Remove { id } => {
            let removed = Orchestrator::new(config).remove_job(&id).await?;
            print_json(&serde_json::json!({ "id": id, "removed": removed }))?;
            Ok(removed)
        }
        Command::Prune { days } => {
            let orchestrator = Orchestrator::new(config);
            let days = days.unwrap_or(orchestrator.config().retention_days);
            let pruned = orchestrator.prune_jobs(Some(days)).await?;
            print_json(&serde_json::json!({ "days": days, "pruned": pruned }))?;
            Ok(true)
        }
        Command::Platforms => {
            print_json(&platform::list_profiles())?;
            Ok(true)
        }
        Command::Tools => {
            print_json(&tools::tool_info(&config.external_tool_path).await)?;
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init(logging::DEFAULT_FILTER);

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(code = e.code(), "{}", e);
            ExitCode::FAILURE
        }
    }
}
