// Metadata fetcher - yt-dlp in print-only mode

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use super::models::{VideoMetadata, UNKNOWN_DURATION, UNKNOWN_TITLE, UNKNOWN_UPLOADER};
use super::traits::MetadataSource;
use super::utils::{run_output_with_timeout, tail_lines};

pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Fields requested from yt-dlp, one `--print` per line of output, in this order
const PRINT_FIELDS: [&str; 5] = [
    "title",
    "uploader",
    "duration_string",
    "view_count",
    "upload_date",
];

pub struct CliMetadataFetcher {
    ytdlp_path: String,
}

impl CliMetadataFetcher {
    pub fn new(ytdlp_path: impl Into<String>) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
        }
    }

    fn build_args(url: &str) -> Vec<String> {
        let mut args = vec!["--no-playlist".to_string(), "--no-warnings".to_string()];
        for field in PRINT_FIELDS {
            args.push("--print".to_string());
            args.push(field.to_string());
        }
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl MetadataSource for CliMetadataFetcher {
    fn name(&self) -> &'static str {
        "cli-yt-dlp"
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> VideoMetadata {
        let args = Self::build_args(url);
        debug!("[metadata] {} {}", self.ytdlp_path, args.join(" "));

        match run_output_with_timeout(&self.ytdlp_path, &args, timeout).await {
            Ok(out) if out.status.success() => {
                parse_print_output(&String::from_utf8_lossy(&out.stdout), url)
            }
            Ok(out) => {
                warn!(
                    url,
                    code = ?out.status.code(),
                    "Metadata fetch failed, using defaults: {}",
                    tail_lines(&String::from_utf8_lossy(&out.stderr), 2)
                );
                VideoMetadata::unknown(url)
            }
            Err(e) => {
                warn!(url, "Metadata fetch failed, using defaults: {}", e);
                VideoMetadata::unknown(url)
            }
        }
    }
}

/// Map `--print` output lines onto metadata fields by position
pub fn parse_print_output(stdout: &str, url: &str) -> VideoMetadata {
    let lines: Vec<&str> = stdout.lines().collect();
    let field = |idx: usize| -> Option<String> {
        lines
            .get(idx)
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && *l != "NA")
            .map(str::to_string)
    };

    VideoMetadata {
        title: field(0).unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        uploader: field(1).unwrap_or_else(|| UNKNOWN_UPLOADER.to_string()),
        duration_text: field(2).unwrap_or_else(|| UNKNOWN_DURATION.to_string()),
        view_count: field(3).and_then(|v| v.parse().ok()),
        upload_date: field(4),
        source_url: url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://youtube.com/watch?v=abc";

    #[test]
    fn test_parse_full_output() {
        let out = "My Clip\nSomeone\n3:25\n12345\n20240131\n";
        let meta = parse_print_output(out, URL);
        assert_eq!(meta.title, "My Clip");
        assert_eq!(meta.uploader, "Someone");
        assert_eq!(meta.duration_text, "3:25");
        assert_eq!(meta.view_count, Some(12345));
        assert_eq!(meta.upload_date.as_deref(), Some("20240131"));
        assert_eq!(meta.source_url, URL);
    }

    #[test]
    fn test_parse_missing_lines_use_defaults() {
        let meta = parse_print_output("Only Title\n", URL);
        assert_eq!(meta.title, "Only Title");
        assert_eq!(meta.uploader, UNKNOWN_UPLOADER);
        assert_eq!(meta.duration_text, UNKNOWN_DURATION);
        assert_eq!(meta.view_count, None);
        assert_eq!(meta.upload_date, None);
    }

    #[test]
    fn test_parse_na_values() {
        let meta = parse_print_output("Clip\nNA\n1:00\nNA\nNA\n", URL);
        assert_eq!(meta.uploader, UNKNOWN_UPLOADER);
        assert_eq!(meta.view_count, None);
        assert_eq!(meta.upload_date, None);
    }

    #[test]
    fn test_print_args_in_fixed_order() {
        let args = CliMetadataFetcher::build_args(URL);
        let printed: Vec<&str> = args
            .windows(2)
            .filter(|w| w[0] == "--print")
            .map(|w| w[1].as_str())
            .collect();
        assert_eq!(printed, PRINT_FIELDS);
        assert_eq!(args.last().map(String::as_str), Some(URL));
    }

    #[tokio::test]
    async fn test_missing_tool_yields_defaults() {
        let fetcher = CliMetadataFetcher::new("definitely-not-a-real-binary-1234");
        let meta = fetcher.fetch(URL, Duration::from_secs(1)).await;
        assert_eq!(meta, VideoMetadata::unknown(URL));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_with_stub_tool() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = crate::downloader::test_support::write_script(
            dir.path(),
            "printf 'Stub Title\\nStub Channel\\n0:42\\n7\\n20230101\\n'",
        );
        let fetcher = CliMetadataFetcher::new(script.to_string_lossy());
        let meta = fetcher.fetch(URL, Duration::from_secs(5)).await;
        assert_eq!(meta.title, "Stub Title");
        assert_eq!(meta.view_count, Some(7));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_yields_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = crate::downloader::test_support::write_script(
            dir.path(),
            "echo 'Partial Title'; echo 'ERROR: Unsupported URL' 1>&2; exit 1",
        );
        let fetcher = CliMetadataFetcher::new(script.to_string_lossy());
        let meta = fetcher.fetch(URL, Duration::from_secs(5)).await;
        assert_eq!(meta, VideoMetadata::unknown(URL));
    }
}
