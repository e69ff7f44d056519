// Common data models for the download pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use time::OffsetDateTime;

use super::errors::DownloadError;

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_UPLOADER: &str = "Unknown Uploader";
pub const UNKNOWN_DURATION: &str = "Unknown Duration";

/// Video information printed by yt-dlp in metadata mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub uploader: String,
    pub duration_text: String,
    pub view_count: Option<u64>,
    /// `YYYYMMDD` as reported by yt-dlp
    pub upload_date: Option<String>,
    pub source_url: String,
}

impl VideoMetadata {
    /// Placeholder record used whenever extraction fails
    pub fn unknown(source_url: &str) -> Self {
        Self {
            title: UNKNOWN_TITLE.to_string(),
            uploader: UNKNOWN_UPLOADER.to_string(),
            duration_text: UNKNOWN_DURATION.to_string(),
            view_count: None,
            upload_date: None,
            source_url: source_url.to_string(),
        }
    }

    /// Uploader name when one was actually extracted
    pub fn known_uploader(&self) -> Option<&str> {
        let uploader = self.uploader.trim();
        if uploader.is_empty() || uploader == UNKNOWN_UPLOADER {
            None
        } else {
            Some(uploader)
        }
    }
}

/// Requested download quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Best,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "360p")]
    P360,
    Audio,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Best => "best",
            Self::P1080 => "1080p",
            Self::P720 => "720p",
            Self::P480 => "480p",
            Self::P360 => "360p",
            Self::Audio => "audio",
        }
    }

    /// yt-dlp `-f` selector for this quality
    pub fn format_selector(&self) -> &'static str {
        match self {
            Self::Best => "bv*+ba/best",
            Self::P1080 => "bv*[height<=1080]+ba/best",
            Self::P720 => "bv*[height<=720]+ba/best",
            Self::P480 => "bv*[height<=480]+ba/best",
            Self::P360 => "bv*[height<=360]+ba/best",
            Self::Audio => "ba[ext=m4a]/ba/b",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "best" => Ok(Self::Best),
            "1080p" | "1080" => Ok(Self::P1080),
            "720p" | "720" => Ok(Self::P720),
            "480p" | "480" => Ok(Self::P480),
            "360p" | "360" => Ok(Self::P360),
            "audio" => Ok(Self::Audio),
            other => Err(DownloadError::validation(format!(
                "unsupported quality '{}'",
                other
            ))),
        }
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" | "in-progress" | "downloading" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(DownloadError::validation(format!(
                "unknown job status '{}'",
                other
            ))),
        }
    }
}

/// One tracked download attempt, as persisted in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub source_url: String,
    pub title: String,
    pub platform_name: String,
    pub output_path: PathBuf,
    #[serde(default)]
    pub quality: Quality,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f32>,
    #[serde(with = "time::serde::rfc3339", alias = "created_at")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub failed_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
    pub metadata: VideoMetadata,
}

/// Fields supplied when a job is first recorded; the ledger adds id and timestamps
#[derive(Debug, Clone)]
pub struct NewJob {
    pub source_url: String,
    pub title: String,
    pub platform_name: String,
    pub output_path: PathBuf,
    pub quality: Quality,
    pub status: JobStatus,
    pub metadata: VideoMetadata,
}

/// Partial update merged into an existing record. There is deliberately no id field.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress_percent: Option<f32>,
    pub completed_at: Option<OffsetDateTime>,
    pub failed_at: Option<OffsetDateTime>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub file_size_bytes: Option<u64>,
    pub output_path: Option<PathBuf>,
    pub title: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn progress(percent: f32) -> Self {
        Self {
            progress_percent: Some(percent),
            ..Default::default()
        }
    }

    pub fn completed(output_path: PathBuf, file_size_bytes: Option<u64>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress_percent: Some(100.0),
            completed_at: Some(OffsetDateTime::now_utc()),
            file_size_bytes,
            output_path: Some(output_path),
            ..Default::default()
        }
    }

    pub fn failed(error: &DownloadError) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            failed_at: Some(OffsetDateTime::now_utc()),
            error_message: Some(error.to_string()),
            error_code: Some(error.code().to_string()),
            ..Default::default()
        }
    }
}

/// Everything the process supervisor needs for one download
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub job_id: String,
    pub source_url: String,
    pub output_path: PathBuf,
    pub quality: Quality,
}

/// Caller overrides for a single submission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitOverrides {
    pub output_dir: Option<PathBuf>,
    pub filename: Option<String>,
    /// Pick a fresh `name (n).ext` instead of short-circuiting on an existing file
    #[serde(default)]
    pub force_new_file: bool,
}

/// Tagged outcome of `Orchestrator::submit_download`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitResult {
    Completed {
        job_id: String,
        output_path: PathBuf,
        file_size_bytes: Option<u64>,
        files_cleaned: usize,
    },
    AlreadyExists {
        output_path: PathBuf,
    },
    Failed {
        job_id: Option<String>,
        code: String,
        message: String,
    },
}

impl SubmitResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Completed { job_id, .. } => Some(job_id),
            Self::Failed { job_id, .. } => job_id.as_deref(),
            Self::AlreadyExists { .. } => None,
        }
    }

    pub(crate) fn failed(job_id: Option<String>, error: &DownloadError) -> Self {
        Self::Failed {
            job_id,
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}
