// Seams between the orchestrator and the external tool

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use super::cleaner::CleanupReport;
use super::errors::Result;
use super::models::{DownloadRequest, VideoMetadata};

/// Source of video metadata. Implementations must not fail: on any problem
/// they return `VideoMetadata::unknown`.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Name of the source (for logging)
    fn name(&self) -> &'static str;

    async fn fetch(&self, url: &str, timeout: Duration) -> VideoMetadata;
}

/// Runs one download to a terminal outcome
#[async_trait]
pub trait DownloadBackend: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    /// Download `request.source_url` to `request.output_path`.
    ///
    /// Returns the artifact cleanup report on success. Setting `cancel` to
    /// `true` must terminate the download and yield `DownloadError::Cancelled`.
    async fn download(
        &self,
        request: &DownloadRequest,
        progress: Arc<dyn ProgressSink>,
        cancel: watch::Receiver<bool>,
    ) -> Result<CleanupReport>;
}

/// Receives progress percentages. Fire-and-forget: implementations must not
/// block and must not fail the download.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, percent: f32);
}

/// Forwards progress into an unbounded channel
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<f32>,
}

impl ChannelProgress {
    pub fn new(tx: mpsc::UnboundedSender<f32>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgress {
    fn on_progress(&self, percent: f32) {
        // Receiver gone means the job already finished; dropping is fine
        let _ = self.tx.send(percent);
    }
}

/// Discards progress
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _percent: f32) {}
}
