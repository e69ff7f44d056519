// Job ledger - file-backed JSON array of job records
//
// Every mutation is a whole-document read-modify-write, serialized by the
// ledger's own mutex. Writes land in `{path}.tmp` and are renamed into place.

use rand::Rng;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use time::{Duration, OffsetDateTime};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::errors::{DownloadError, Result};
use super::models::{JobRecord, JobStatus, JobUpdate, NewJob};

const ID_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `job_{unix_millis}_{9 base36 chars}`
pub fn generate_id() -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("job_{}_{}", millis, suffix)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Only(JobStatus),
}

impl FromStr for StatusFilter {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "all" => Ok(Self::All),
            other => other.parse().map(Self::Only),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    StartedAt,
    UpdatedAt,
    CompletedAt,
    Title,
    Platform,
    Status,
}

impl FromStr for SortField {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "started_at" | "created_at" | "startedat" | "createdat" => Ok(Self::StartedAt),
            "updated_at" | "updatedat" => Ok(Self::UpdatedAt),
            "completed_at" | "completedat" => Ok(Self::CompletedAt),
            "title" => Ok(Self::Title),
            "platform" | "platform_name" => Ok(Self::Platform),
            "status" => Ok(Self::Status),
            other => Err(DownloadError::validation(format!(
                "unknown sort field: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: StatusFilter,
    /// Exact platform name; `None` or `"all"` means any
    pub platform: Option<String>,
    pub sort: Option<(SortField, SortOrder)>,
    pub limit: Option<usize>,
}

impl JobFilter {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: StatusFilter::Only(status),
            ..Default::default()
        }
    }

    fn matches(&self, record: &JobRecord) -> bool {
        if let StatusFilter::Only(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        match self.platform.as_deref() {
            None | Some("all") => true,
            Some(platform) => record.platform_name == platform,
        }
    }
}

fn compare(a: &JobRecord, b: &JobRecord, field: SortField) -> Ordering {
    match field {
        SortField::StartedAt => a.started_at.cmp(&b.started_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::CompletedAt => a.completed_at.cmp(&b.completed_at),
        SortField::Title => a.title.cmp(&b.title),
        SortField::Platform => a.platform_name.cmp(&b.platform_name),
        SortField::Status => a.status.as_str().cmp(b.status.as_str()),
    }
}

/// Merge a patch into a record. Returns false when the patch was dropped.
fn apply_update(record: &mut JobRecord, update: JobUpdate) -> bool {
    let demotes = update.status.map_or(false, |s| !s.is_terminal());
    let progress_only = update.status.is_none() && update.progress_percent.is_some();
    if record.status.is_terminal() && (demotes || progress_only) {
        return false;
    }

    if let Some(status) = update.status {
        record.status = status;
    }
    if let Some(percent) = update.progress_percent {
        record.progress_percent = Some(percent);
    }
    if let Some(at) = update.completed_at {
        record.completed_at = Some(at);
    }
    if let Some(at) = update.failed_at {
        record.failed_at = Some(at);
    }
    if let Some(message) = update.error_message {
        record.error_message = Some(message);
    }
    if let Some(code) = update.error_code {
        record.error_code = Some(code);
    }
    if let Some(size) = update.file_size_bytes {
        record.file_size_bytes = Some(size);
    }
    if let Some(path) = update.output_path {
        record.output_path = path;
    }
    if let Some(title) = update.title {
        record.title = title;
    }
    record.updated_at = OffsetDateTime::now_utc();
    true
}

pub struct JobLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JobLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document. Absent file is an empty ledger.
    async fn load(&self) -> Result<Vec<JobRecord>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DownloadError::storage(format!(
                    "cannot read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|e| {
            DownloadError::storage(format!("cannot parse {}: {}", self.path.display(), e))
        })
    }

    async fn load_or_empty(&self) -> Vec<JobRecord> {
        match self.load().await {
            Ok(records) => records,
            Err(e) => {
                warn!("{}; treating ledger as empty", e);
                Vec::new()
            }
        }
    }

    /// Move an unreadable document to `{path}.corrupt` so a rewrite cannot lose it
    async fn quarantine(&self) -> Result<PathBuf> {
        let mut target = self.path.clone().into_os_string();
        target.push(".corrupt");
        let target = PathBuf::from(target);
        fs::rename(&self.path, &target).await.map_err(|e| {
            DownloadError::storage(format!("cannot move aside {}: {}", self.path.display(), e))
        })?;
        Ok(target)
    }

    async fn save(&self, records: &[JobRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    DownloadError::storage(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let payload = serde_json::to_vec_pretty(records)?;
        fs::write(&tmp, payload)
            .await
            .map_err(|e| DownloadError::storage(format!("cannot write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path).await.map_err(|e| {
            DownloadError::storage(format!("cannot replace {}: {}", self.path.display(), e))
        })
    }

    /// Record a new job; returns its id
    pub async fn create(&self, job: NewJob) -> Result<String> {
        let _guard = self.lock.lock().await;
        let mut records = match self.load().await {
            Ok(records) => records,
            Err(e) => {
                let moved = self.quarantine().await?;
                warn!(moved_to = %moved.display(), "{}; starting a new ledger", e);
                Vec::new()
            }
        };

        let mut id = generate_id();
        while records.iter().any(|r| r.id == id) {
            id = generate_id();
        }
        let now = OffsetDateTime::now_utc();
        records.push(JobRecord {
            id: id.clone(),
            source_url: job.source_url,
            title: job.title,
            platform_name: job.platform_name,
            output_path: job.output_path,
            quality: job.quality,
            status: job.status,
            progress_percent: None,
            started_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
            error_message: None,
            error_code: None,
            file_size_bytes: None,
            metadata: job.metadata,
        });
        self.save(&records).await?;
        debug!(job_id = %id, "Job recorded");
        Ok(id)
    }

    /// Merge `update` into the record with `id` and return the stored record
    pub async fn update(&self, id: &str, update: JobUpdate) -> Result<JobRecord> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| DownloadError::NotFound(id.to_string()))?;

        if !apply_update(record, update) {
            warn!(job_id = %id, status = %record.status, "Ignoring update to terminal job");
            return Ok(record.clone());
        }
        let updated = record.clone();
        self.save(&records).await?;
        Ok(updated)
    }

    /// Fail every `in_progress` record not listed in `running` with code
    /// `INTERRUPTED`; returns the ids it failed.
    pub async fn fail_interrupted(&self, running: &[String]) -> Result<Vec<String>> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let mut failed = Vec::new();
        for record in records
            .iter_mut()
            .filter(|r| r.status == JobStatus::InProgress && !running.contains(&r.id))
        {
            if apply_update(record, JobUpdate::failed(&DownloadError::Interrupted)) {
                failed.push(record.id.clone());
            }
        }
        if !failed.is_empty() {
            self.save(&records).await?;
            info!(count = failed.len(), "Marked interrupted jobs as failed");
        }
        Ok(failed)
    }

    pub async fn get(&self, id: &str) -> Option<JobRecord> {
        let _guard = self.lock.lock().await;
        self.load_or_empty().await.into_iter().find(|r| r.id == id)
    }

    pub async fn list(&self, filter: &JobFilter) -> Vec<JobRecord> {
        let _guard = self.lock.lock().await;
        let mut records: Vec<JobRecord> = self
            .load_or_empty()
            .await
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();

        if let Some((field, order)) = filter.sort {
            records.sort_by(|a, b| {
                let ord = compare(a, b, field);
                match order {
                    SortOrder::Ascending => ord,
                    SortOrder::Descending => ord.reverse(),
                }
            });
        }
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        records
    }

    /// Jobs currently `in_progress`
    pub async fn list_active(&self) -> Vec<JobRecord> {
        self.list(&JobFilter::status(JobStatus::InProgress)).await
    }

    /// Returns whether a record was removed
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Ok(false);
        }
        self.save(&records).await?;
        Ok(true)
    }

    /// Drop records started more than `days` days ago; returns how many went
    pub async fn prune_older_than(&self, days: u32) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut records = self.load_or_empty().await;
        let cutoff = OffsetDateTime::now_utc() - Duration::days(i64::from(days));
        let before = records.len();
        records.retain(|r| r.started_at >= cutoff);
        let pruned = before - records.len();
        if pruned > 0 {
            self.save(&records).await?;
            info!(pruned, days, "Pruned old jobs");
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::{Quality, VideoMetadata};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn new_job(title: &str, platform: &str) -> NewJob {
        let url = format!("https://example.com/{}", title);
        NewJob {
            source_url: url.clone(),
            title: title.to_string(),
            platform_name: platform.to_string(),
            output_path: PathBuf::from(format!("/tmp/{}.mp4", title)),
            quality: Quality::Best,
            status: JobStatus::InProgress,
            metadata: VideoMetadata::unknown(&url),
        }
    }

    fn ledger(dir: &TempDir) -> JobLedger {
        JobLedger::new(dir.path().join("jobs.json"))
    }

    #[test]
    fn test_generate_id_format() {
        let id = generate_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "job");
        assert!(parts[1].parse::<i128>().is_ok());
        assert_eq!(parts[2].len(), ID_SUFFIX_LEN);
        assert!(parts[2].bytes().all(|b| BASE36.contains(&b)));
    }

    #[test]
    fn test_status_filter_parse() {
        assert_eq!("all".parse::<StatusFilter>().unwrap(), StatusFilter::All);
        assert_eq!(
            "completed".parse::<StatusFilter>().unwrap(),
            StatusFilter::Only(JobStatus::Completed)
        );
        assert!("nope".parse::<StatusFilter>().is_err());
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);

        let id = ledger.create(new_job("a", "youtube")).await.unwrap();
        let all = ledger.list(&JobFilter::default()).await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);

        ledger
            .update(&id, JobUpdate::status(JobStatus::Completed))
            .await
            .unwrap();
        let done = ledger.list(&JobFilter::status(JobStatus::Completed)).await;
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, id);
        assert!(ledger.list_active().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_id() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        let err = ledger
            .update("job_0_missing00", JobUpdate::progress(5.0))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_terminal_status_is_sticky() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        let id = ledger.create(new_job("a", "youtube")).await.unwrap();
        ledger
            .update(&id, JobUpdate::status(JobStatus::Failed))
            .await
            .unwrap();

        let record = ledger
            .update(&id, JobUpdate::status(JobStatus::InProgress))
            .await
            .unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        let record = ledger.update(&id, JobUpdate::progress(50.0)).await.unwrap();
        assert_eq!(record.progress_percent, None);
    }

    #[tokio::test]
    async fn test_filter_sort_limit() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        ledger.create(new_job("beta", "youtube")).await.unwrap();
        ledger.create(new_job("alpha", "vimeo")).await.unwrap();
        ledger.create(new_job("gamma", "youtube")).await.unwrap();

        let filter = JobFilter {
            platform: Some("youtube".to_string()),
            sort: Some((SortField::Title, SortOrder::Descending)),
            ..Default::default()
        };
        let titles: Vec<String> = ledger
            .list(&filter)
            .await
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["gamma", "beta"]);

        let filter = JobFilter {
            platform: Some("all".to_string()),
            sort: Some((SortField::Title, SortOrder::Ascending)),
            limit: Some(1),
            ..Default::default()
        };
        let first = ledger.list(&filter).await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].title, "alpha");
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        let id = ledger.create(new_job("a", "youtube")).await.unwrap();
        assert!(ledger.remove(&id).await.unwrap());
        assert!(!ledger.remove(&id).await.unwrap());
        assert!(ledger.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_prune_older_than() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        let old = ledger.create(new_job("old", "youtube")).await.unwrap();
        let recent = ledger.create(new_job("recent", "youtube")).await.unwrap();

        // Backdate the records by editing the document directly
        let mut records: Vec<JobRecord> =
            serde_json::from_str(&std::fs::read_to_string(ledger.path()).unwrap()).unwrap();
        let now = OffsetDateTime::now_utc();
        for record in &mut records {
            let age = if record.id == old { 45 } else { 10 };
            record.started_at = now - Duration::days(age);
        }
        std::fs::write(ledger.path(), serde_json::to_vec(&records).unwrap()).unwrap();

        assert_eq!(ledger.prune_older_than(30).await.unwrap(), 1);
        let left = ledger.list(&JobFilter::default()).await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, recent);
    }

    #[tokio::test]
    async fn test_corrupt_file_degrades() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        std::fs::write(ledger.path(), b"{not json").unwrap();

        assert!(ledger.list(&JobFilter::default()).await.is_empty());
        let err = ledger
            .update("job_1_abc", JobUpdate::progress(1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Storage(_)));
        assert!(matches!(
            ledger.remove("job_1_abc").await,
            Err(DownloadError::Storage(_))
        ));

        // create moves the bad document aside and starts a fresh one
        let id = ledger.create(new_job("a", "youtube")).await.unwrap();
        assert!(ledger.get(&id).await.is_some());
        let moved = dir.path().join("jobs.json.corrupt");
        assert_eq!(std::fs::read(&moved).unwrap(), b"{not json");
        assert_eq!(ledger.list(&JobFilter::default()).await.len(), 1);
    }

    #[tokio::test]
    async fn test_fail_interrupted_only_touches_in_progress() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        let stale = ledger.create(new_job("stale", "youtube")).await.unwrap();
        let done = ledger.create(new_job("done", "youtube")).await.unwrap();
        ledger
            .update(&done, JobUpdate::status(JobStatus::Completed))
            .await
            .unwrap();

        let live = ledger.create(new_job("live", "youtube")).await.unwrap();

        let failed = ledger.fail_interrupted(&[live.clone()]).await.unwrap();
        assert_eq!(failed, vec![stale.clone()]);

        let record = ledger.get(&stale).await.unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.error_code.as_deref(), Some("INTERRUPTED"));
        assert!(record.failed_at.is_some());
        assert_eq!(ledger.get(&done).await.unwrap().status, JobStatus::Completed);
        assert_eq!(ledger.get(&live).await.unwrap().status, JobStatus::InProgress);
        assert!(ledger.fail_interrupted(&[live]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hand_edited_created_at_is_accepted() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        let doc = r#"[{
            "id": "job_1700000000000_abcdefghi",
            "source_url": "https://vimeo.com/1",
            "title": "Clip",
            "platform_name": "vimeo",
            "output_path": "/tmp/Clip.mp4",
            "status": "completed",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:05:00Z",
            "metadata": {
                "title": "Clip",
                "uploader": "Unknown Uploader",
                "duration_text": "Unknown Duration",
                "view_count": null,
                "upload_date": null,
                "source_url": "https://vimeo.com/1"
            }
        }]"#;
        std::fs::write(ledger.path(), doc).unwrap();

        let record = ledger.get("job_1700000000000_abcdefghi").await.unwrap();
        assert_eq!(record.quality, Quality::Best);
        assert_eq!(record.started_at.year(), 2024);
    }

    #[tokio::test]
    async fn test_concurrent_creates_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(ledger(&dir));

        let mut handles = Vec::new();
        for i in 0..20 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.create(new_job(&format!("t{}", i), "youtube")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(ledger.list(&JobFilter::default()).await.len(), 20);
    }
}
