// Process supervisor - runs yt-dlp for one job, streams progress, handles cancel

use async_trait::async_trait;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::cleaner::{self, CleanupReport};
use super::diagnostics;
use super::errors::{DownloadError, Result};
use super::models::{DownloadRequest, Quality};
use super::progress::{parse_destination, ProgressTracker};
use super::traits::{DownloadBackend, ProgressSink};
use super::utils::pipe_error;
use crate::config::DownloaderConfig;

/// Stderr lines retained for the failure message
const STDERR_TAIL: usize = 20;

pub struct YtDlpSupervisor {
    ytdlp_path: String,
    max_retries: u32,
    fragment_retries: u32,
    concurrent_fragments: u32,
    throttle_rate: String,
}

impl YtDlpSupervisor {
    pub fn new(ytdlp_path: impl Into<String>) -> Self {
        Self::from_config(&DownloaderConfig {
            external_tool_path: ytdlp_path.into(),
            ..DownloaderConfig::default()
        })
    }

    pub fn from_config(config: &DownloaderConfig) -> Self {
        Self {
            ytdlp_path: config.external_tool_path.clone(),
            max_retries: config.max_retries,
            fragment_retries: config.fragment_retries,
            concurrent_fragments: config.concurrent_fragments,
            throttle_rate: config.throttle_rate.clone(),
        }
    }

    pub fn build_args(&self, request: &DownloadRequest) -> Vec<String> {
        // Keep the final file at exactly `-o`, never `X.mp4.webm`
        let container = match request.quality {
            Quality::Audio => "--remux-video",
            _ => "--merge-output-format",
        };
        vec![
            "--continue".to_string(),
            "--keep-fragments".to_string(),
            "--no-warnings".to_string(),
            "--newline".to_string(),
            "--no-playlist".to_string(),
            "--concurrent-fragments".to_string(),
            self.concurrent_fragments.to_string(),
            "--retries".to_string(),
            self.max_retries.to_string(),
            "--fragment-retries".to_string(),
            self.fragment_retries.to_string(),
            "--limit-rate".to_string(),
            self.throttle_rate.clone(),
            "-f".to_string(),
            request.quality.format_selector().to_string(),
            container.to_string(),
            "mp4".to_string(),
            "-o".to_string(),
            request.output_path.to_string_lossy().to_string(),
            request.source_url.clone(),
        ]
    }
}

/// Next line of child output, decoded lossily. `None` at EOF or on a read error.
/// Invalid UTF-8 never ends the loop; the pipe must stay drained until EOF.
async fn next_lossy_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    match reader.read_until(b'\n', buf).await {
        Ok(0) => None,
        Ok(_) => {
            let line = String::from_utf8_lossy(buf);
            Some(line.trim_end_matches(|c: char| c == '\n' || c == '\r').to_string())
        }
        Err(e) => {
            warn!("Failed to read yt-dlp output: {}", e);
            None
        }
    }
}

/// Resolves once the flag is raised. A dropped sender means no cancel will ever come.
async fn cancel_requested(mut cancel: watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl DownloadBackend for YtDlpSupervisor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        progress: Arc<dyn ProgressSink>,
        cancel: watch::Receiver<bool>,
    ) -> Result<CleanupReport> {
        let args = self.build_args(request);
        info!(job_id = %request.job_id, "Starting download: {}", request.source_url);
        debug!(job_id = %request.job_id, "{} {}", self.ytdlp_path, args.join(" "));

        let mut child = Command::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DownloadError::ProcessSpawn {
                program: self.ytdlp_path.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| pipe_error(&self.ytdlp_path, "stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| pipe_error(&self.ytdlp_path, "stderr"))?;

        let job_id = request.job_id.clone();
        let job_id_out = job_id.clone();
        let stdout_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            let mut tracker = ProgressTracker::new();
            while let Some(line) = next_lossy_line(&mut reader, &mut buf).await {
                if let Some(percent) = tracker.observe(&line) {
                    progress.on_progress(percent);
                } else if let Some(dest) = parse_destination(&line) {
                    debug!(job_id = %job_id_out, "Writing {}", dest);
                }
            }
            tracker.last()
        });

        let job_id_err = job_id.clone();
        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL);
            while let Some(line) = next_lossy_line(&mut reader, &mut buf).await {
                debug!(job_id = %job_id_err, "[yt-dlp] {}", line);
                if tail.len() == STDERR_TAIL {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        });

        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancel_requested(cancel) => {
                info!(job_id = %job_id, "Download cancelled, killing yt-dlp");
                if let Err(e) = child.kill().await {
                    warn!(job_id = %job_id, "Failed to kill yt-dlp: {}", e);
                }
                stdout_task.abort();
                stderr_task.abort();
                return Err(DownloadError::Cancelled);
            }
        };

        let last_percent = stdout_task.await.unwrap_or_else(|e| {
            warn!(job_id = %job_id, "Progress reader failed: {}", e);
            None
        });
        let stderr_tail = stderr_task.await.unwrap_or_else(|e| {
            warn!(job_id = %job_id, "Stderr reader failed: {}", e);
            String::new()
        });

        let status = status?;
        if !status.success() {
            let err = DownloadError::ProcessExit {
                code: status.code(),
                detail: diagnostics::failure_detail(&stderr_tail),
            };
            warn!(job_id = %job_id, "{}", err);
            return Err(err);
        }

        debug!(job_id = %job_id, last_percent = ?last_percent, "yt-dlp finished");
        Ok(cleaner::cleanup(&request.output_path).await)
    }
}
