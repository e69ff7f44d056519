pub mod config;
pub mod downloader;
pub mod logging;

pub use config::DownloaderConfig;
pub use downloader::{DownloadError, Orchestrator, SubmitOverrides, SubmitResult};
