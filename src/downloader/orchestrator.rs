// Orchestrator - drives one submission from URL to a terminal ledger record

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use url::Url;

use super::errors::{DownloadError, Result};
use super::ledger::{JobFilter, JobLedger};
use super::metadata::CliMetadataFetcher;
use super::models::{
    DownloadRequest, JobRecord, JobStatus, JobUpdate, NewJob, Quality, SubmitOverrides,
    SubmitResult,
};
use super::paths::{build_output_path, generate_unique_filename};
use super::platform;
use super::supervisor::YtDlpSupervisor;
use super::traits::{ChannelProgress, DownloadBackend, MetadataSource};
use crate::config::DownloaderConfig;

type ActiveJobs = Arc<Mutex<HashMap<String, watch::Sender<bool>>>>;

pub struct Orchestrator {
    config: DownloaderConfig,
    ledger: Arc<JobLedger>,
    metadata: Box<dyn MetadataSource>,
    backend: Arc<dyn DownloadBackend>,
    /// Cancel switches of jobs currently downloading
    active: ActiveJobs,
}

/// Accept only absolute http(s) URLs; blank quality means "profile default"
fn validate(url: &str, quality: &str) -> Result<Option<Quality>> {
    let parsed = Url::parse(url.trim())
        .map_err(|e| DownloadError::validation(format!("invalid URL '{}': {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(DownloadError::validation(format!(
            "unsupported URL scheme '{}'",
            parsed.scheme()
        )));
    }
    if quality.trim().is_empty() {
        return Ok(None);
    }
    quality.parse().map(Some)
}

fn register(active: &ActiveJobs, job_id: &str, cancel: watch::Sender<bool>) {
    let mut active = active.lock().unwrap_or_else(|e| e.into_inner());
    active.insert(job_id.to_string(), cancel);
}

fn unregister(active: &ActiveJobs, job_id: &str) {
    let mut active = active.lock().unwrap_or_else(|e| e.into_inner());
    active.remove(job_id);
}

fn signal_cancel(active: &ActiveJobs, job_id: &str) -> bool {
    let active = active.lock().unwrap_or_else(|e| e.into_inner());
    match active.get(job_id) {
        Some(cancel) => cancel.send(true).is_ok(),
        None => false,
    }
}

/// Cancels the job if the submitting future is dropped before the job ends
struct CancelOnDrop {
    active: ActiveJobs,
    job_id: String,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if signal_cancel(&self.active, &self.job_id) {
            warn!(job_id = %self.job_id, "Submitter went away, cancelling download");
        }
    }
}

/// Download plus terminal ledger update, run on its own task so the record
/// is finalized even when the submitter stops waiting.
struct DownloadTask {
    ledger: Arc<JobLedger>,
    backend: Arc<dyn DownloadBackend>,
    active: ActiveJobs,
    request: DownloadRequest,
}

impl DownloadTask {
    async fn run(self, cancel: watch::Receiver<bool>) -> SubmitResult {
        let job_id = self.request.job_id.clone();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let drain = tokio::spawn(drain_progress(
            self.ledger.clone(),
            job_id.clone(),
            progress_rx,
        ));

        info!(
            job_id = %job_id,
            backend = self.backend.name(),
            "Downloading to {}",
            self.request.output_path.display()
        );
        let outcome = self
            .backend
            .download(&self.request, Arc::new(ChannelProgress::new(progress_tx)), cancel)
            .await;

        unregister(&self.active, &job_id);
        if let Err(e) = drain.await {
            warn!(job_id = %job_id, "Progress drain task failed: {}", e);
        }

        match outcome {
            Ok(report) => {
                finish_success(
                    &self.ledger,
                    job_id,
                    self.request.output_path,
                    report.files_removed,
                )
                .await
            }
            Err(e) => finish_failure(&self.ledger, job_id, e).await,
        }
    }
}

async fn finish_success(
    ledger: &JobLedger,
    job_id: String,
    output_path: PathBuf,
    files_cleaned: usize,
) -> SubmitResult {
    let file_size_bytes = file_size(&output_path).await;
    let update = JobUpdate::completed(output_path.clone(), file_size_bytes);
    match ledger.update(&job_id, update).await {
        Ok(_) => {
            info!(job_id = %job_id, size = ?file_size_bytes, "Download completed");
            SubmitResult::Completed {
                job_id,
                output_path,
                file_size_bytes,
                files_cleaned,
            }
        }
        Err(e) => {
            warn!(job_id = %job_id, "Download finished but ledger update failed: {}", e);
            SubmitResult::failed(Some(job_id), &e)
        }
    }
}

async fn finish_failure(ledger: &JobLedger, job_id: String, error: DownloadError) -> SubmitResult {
    warn!(job_id = %job_id, code = error.code(), "Download failed: {}", error);
    if let Err(e) = ledger.update(&job_id, JobUpdate::failed(&error)).await {
        warn!(job_id = %job_id, "Failed to record failure: {}", e);
    }
    SubmitResult::failed(Some(job_id), &error)
}

impl Orchestrator {
    /// Wire the yt-dlp metadata fetcher and supervisor from `config`
    pub fn new(config: DownloaderConfig) -> Self {
        let ledger = Arc::new(JobLedger::new(config.ledger_path.clone()));
        let metadata = Box::new(CliMetadataFetcher::new(config.external_tool_path.clone()));
        let backend = Box::new(YtDlpSupervisor::from_config(&config));
        Self::with_components(config, ledger, metadata, backend)
    }

    /// `new`, then fail the jobs a previous run left `in_progress`
    pub async fn start(config: DownloaderConfig) -> Self {
        let orchestrator = Self::new(config);
        if let Err(e) = orchestrator.recover_interrupted_jobs().await {
            warn!("Cannot recover interrupted jobs: {}", e);
        }
        orchestrator
    }

    pub fn with_components(
        config: DownloaderConfig,
        ledger: Arc<JobLedger>,
        metadata: Box<dyn MetadataSource>,
        backend: Box<dyn DownloadBackend>,
    ) -> Self {
        Self {
            config,
            ledger,
            metadata,
            backend: Arc::from(backend),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Mark `in_progress` records with no download in this process as failed
    /// (`INTERRUPTED`). Returns how many were changed.
    pub async fn recover_interrupted_jobs(&self) -> Result<usize> {
        let running: Vec<String> = {
            let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            active.keys().cloned().collect()
        };
        let failed = self.ledger.fail_interrupted(&running).await?;
        for job_id in &failed {
            warn!(job_id = %job_id, "Job was interrupted by a previous run");
        }
        Ok(failed.len())
    }

    /// Run one download to completion. Never errors: every outcome is a `SubmitResult`.
    ///
    /// Once the job is recorded it runs on a spawned task. Dropping this future
    /// cancels the download and the task still writes the terminal record.
    pub async fn submit_download(
        &self,
        url: &str,
        quality: &str,
        overrides: SubmitOverrides,
    ) -> SubmitResult {
        let requested_quality = match validate(url, quality) {
            Ok(q) => q,
            Err(e) => {
                warn!("Rejected submission: {}", e);
                return SubmitResult::failed(None, &e);
            }
        };
        let url = url.trim();

        let (profile, domain) = platform::resolve_host(url);
        let quality = requested_quality.unwrap_or(profile.default_quality);
        debug!(platform = profile.name, domain = %domain, %quality, "Resolved platform");

        let metadata = self.metadata.fetch(url, self.config.metadata_timeout).await;
        debug!(source = self.metadata.name(), title = %metadata.title, "Fetched metadata");

        let mut output_path = match build_output_path(
            &metadata,
            profile,
            &self.config.download_base_dir,
            overrides.output_dir.as_deref(),
            overrides.filename.as_deref(),
        ) {
            Ok(path) => path,
            Err(e) => {
                warn!(url, "Cannot prepare output path: {}", e);
                return SubmitResult::failed(None, &e);
            }
        };

        if output_path.exists() {
            if overrides.force_new_file {
                output_path = generate_unique_filename(&output_path);
            } else {
                info!(path = %output_path.display(), "Output already exists, skipping download");
                return SubmitResult::AlreadyExists { output_path };
            }
        }

        let job_id = match self
            .ledger
            .create(NewJob {
                source_url: url.to_string(),
                title: metadata.title.clone(),
                platform_name: profile.name.to_string(),
                output_path: output_path.clone(),
                quality,
                status: JobStatus::InProgress,
                metadata,
            })
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(url, "Cannot record job: {}", e);
                return SubmitResult::failed(None, &e);
            }
        };

        let (cancel_tx, cancel_rx) = watch::channel(false);
        register(&self.active, &job_id, cancel_tx);
        let _cancel_on_drop = CancelOnDrop {
            active: self.active.clone(),
            job_id: job_id.clone(),
        };

        let task = DownloadTask {
            ledger: self.ledger.clone(),
            backend: self.backend.clone(),
            active: self.active.clone(),
            request: DownloadRequest {
                job_id: job_id.clone(),
                source_url: url.to_string(),
                output_path,
                quality,
            },
        };
        match tokio::spawn(task.run(cancel_rx)).await {
            Ok(result) => result,
            Err(e) => {
                warn!(job_id = %job_id, "Download task ended abnormally: {}", e);
                unregister(&self.active, &job_id);
                finish_failure(&self.ledger, job_id, DownloadError::Interrupted).await
            }
        }
    }

    /// `submit_download` that cancels its job when `interrupt` resolves first,
    /// then waits for the terminal record.
    pub async fn submit_until<F>(
        &self,
        url: &str,
        quality: &str,
        overrides: SubmitOverrides,
        interrupt: F,
    ) -> SubmitResult
    where
        F: Future<Output = ()>,
    {
        let submit = self.submit_download(url, quality, overrides);
        tokio::pin!(submit);
        tokio::pin!(interrupt);

        tokio::select! {
            result = &mut submit => return result,
            () = &mut interrupt => {}
        }

        if self.cancel_all() == 0 {
            // Nothing downloading yet: abandon the submission before it starts one
            info!("Interrupted before the download started");
            return SubmitResult::failed(None, &DownloadError::Cancelled);
        }
        submit.await
    }

    /// Ask a running job to stop. Returns false when no such job is downloading.
    pub fn cancel(&self, job_id: &str) -> bool {
        let sent = signal_cancel(&self.active, job_id);
        if sent {
            info!(job_id, "Cancel requested");
        }
        sent
    }

    /// Cancel every running job; returns how many were signalled
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<String> = {
            let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            active.keys().cloned().collect()
        };
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> Vec<JobRecord> {
        self.ledger.list(filter).await
    }

    pub async fn get_active_jobs(&self) -> Vec<JobRecord> {
        self.ledger.list_active().await
    }

    pub async fn get_job(&self, job_id: &str) -> Option<JobRecord> {
        self.ledger.get(job_id).await
    }

    pub async fn remove_job(&self, job_id: &str) -> Result<bool> {
        self.ledger.remove(job_id).await
    }

    /// Retention sweep; `None` uses the configured retention
    pub async fn prune_jobs(&self, days: Option<u32>) -> Result<usize> {
        self.ledger
            .prune_older_than(days.unwrap_or(self.config.retention_days))
            .await
    }
}

/// Apply progress ticks to the ledger until the sender side is dropped.
/// A failed tick is logged and skipped; it never fails the job.
async fn drain_progress(
    ledger: Arc<JobLedger>,
    job_id: String,
    mut rx: mpsc::UnboundedReceiver<f32>,
) {
    while let Some(percent) = rx.recv().await {
        if let Err(e) = ledger.update(&job_id, JobUpdate::progress(percent)).await {
            warn!(job_id = %job_id, "Progress update failed: {}", e);
        }
    }
}

async fn file_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Some(meta.len()),
        Err(e) => {
            warn!(path = %path.display(), "Cannot stat downloaded file: {}", e);
            None
        }
    }
}
