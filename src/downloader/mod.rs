// Downloader module - platform resolution, path building, yt-dlp supervision, job ledger

pub mod cleaner;
pub mod diagnostics;
pub mod errors;
pub mod ledger;
pub mod metadata;
pub mod models;
pub mod orchestrator;
pub mod paths;
pub mod platform;
pub mod progress;
pub mod supervisor;
pub mod tools;
pub mod traits;
pub mod utils;

#[cfg(all(test, unix))]
pub(crate) mod test_support;

pub use cleaner::CleanupReport;
pub use errors::DownloadError;
pub use ledger::{JobFilter, JobLedger, SortField, SortOrder, StatusFilter};
pub use models::{JobRecord, JobStatus, Quality, SubmitOverrides, SubmitResult, VideoMetadata};
pub use orchestrator::Orchestrator;
pub use platform::PlatformProfile;
pub use traits::{DownloadBackend, MetadataSource, ProgressSink};
