// Artifact cleaner - removes fragment and partial files left next to a finished download

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub files_removed: usize,
    pub bytes_freed: u64,
}

/// Regex matching every artifact yt-dlp may leave for `file_name`:
///
/// - `NAME.part`, `NAME.ytdl`, `NAME.temp`
/// - `NAME.part-Frag12`, `NAME.part-Frag12.part`
/// - `STEM.f137.mp4`, `STEM.f137.mp4.part` (numeric format ids, before merge)
/// - `STEM.temp.mp4`
fn artifact_pattern(file_name: &str) -> Option<Regex> {
    let path = Path::new(file_name);
    let stem = path.file_stem()?.to_string_lossy();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();

    let name = regex::escape(file_name);
    let stem = regex::escape(&stem);
    let ext = regex::escape(&ext);
    let pattern = format!(
        r"^(?:{name}\.(?:part|ytdl|temp)|{name}\.part-Frag\d+(?:\.part)?|{stem}\.f\d+(?:-\d+)?\.\w+(?:\.part)?|{stem}\.temp\.{ext})$",
    );
    Regex::new(&pattern).ok()
}

/// Delete the download artifacts that belong to `output_path`.
///
/// Best effort: unreadable directories and per-file failures are logged and skipped.
pub async fn cleanup(output_path: &Path) -> CleanupReport {
    let mut report = CleanupReport::default();

    let (dir, file_name) = match (output_path.parent(), output_path.file_name()) {
        (Some(dir), Some(name)) => (dir, name.to_string_lossy().to_string()),
        _ => return report,
    };
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };

    let Some(pattern) = artifact_pattern(&file_name) else {
        return report;
    };

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), "Cleanup skipped, cannot read directory: {}", e);
            return report;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), "Cleanup stopped reading directory: {}", e);
                break;
            }
        };

        let name = entry.file_name().to_string_lossy().to_string();
        if name == file_name || !pattern.is_match(&name) {
            continue;
        }

        let size = match entry.metadata().await {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => continue,
            Err(e) => {
                warn!(file = %name, "Cleanup cannot stat artifact: {}", e);
                continue;
            }
        };

        match fs::remove_file(entry.path()).await {
            Ok(()) => {
                debug!(file = %name, bytes = size, "Removed download artifact");
                report.files_removed += 1;
                report.bytes_freed += size;
            }
            Err(e) => warn!(file = %name, "Failed to remove artifact: {}", e),
        }
    }

    if report.files_removed > 0 {
        info!(
            output = %output_path.display(),
            files = report.files_removed,
            bytes = report.bytes_freed,
            "Cleaned download artifacts"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pattern_matches_artifacts_only() {
        let re = artifact_pattern("My Clip (1).mp4").unwrap();
        for name in [
            "My Clip (1).mp4.part",
            "My Clip (1).mp4.ytdl",
            "My Clip (1).mp4.part-Frag3",
            "My Clip (1).mp4.part-Frag12.part",
            "My Clip (1).f137.mp4",
            "My Clip (1).f251.webm.part",
            "My Clip (1).f140-1.m4a",
            "My Clip (1).temp.mp4",
        ] {
            assert!(re.is_match(name), "should match {}", name);
        }
        for name in [
            "My Clip (1).mp4",
            "My Clip.mp4.part",
            "Other.mp4.part",
            "My Clip (1).mp4.part.bak",
            "My Clip (1).fr.vtt",
            "My Clip (1).final.mov",
            "My Clip (1).f1080p-edit.mp4",
        ] {
            assert!(!re.is_match(name), "should not match {}", name);
        }
    }

    #[tokio::test]
    async fn test_cleanup_removes_and_counts() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("clip.mp4");
        std::fs::write(&output, b"final video").unwrap();
        std::fs::write(dir.path().join("clip.mp4.part-Frag1"), b"12345").unwrap();
        std::fs::write(dir.path().join("clip.mp4.part-Frag2"), b"123").unwrap();
        std::fs::write(dir.path().join("clip.mp4.ytdl"), b"{}").unwrap();
        std::fs::write(dir.path().join("unrelated.mp4.part"), b"keep").unwrap();

        let report = cleanup(&output).await;
        assert_eq!(report.files_removed, 3);
        assert_eq!(report.bytes_freed, 10);
        assert!(output.exists());
        assert!(dir.path().join("unrelated.mp4.part").exists());
        assert!(!dir.path().join("clip.mp4.ytdl").exists());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_user_files_next_to_output() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("clip.mp4");
        std::fs::write(&output, b"final video").unwrap();
        std::fs::write(dir.path().join("clip.f137.mp4"), b"1234").unwrap();
        std::fs::write(dir.path().join("clip.fr.vtt"), b"subs").unwrap();
        std::fs::write(dir.path().join("clip.final.mov"), b"edit").unwrap();

        let report = cleanup(&output).await;
        assert_eq!(report.files_removed, 1);
        assert!(!dir.path().join("clip.f137.mp4").exists());
        assert!(dir.path().join("clip.fr.vtt").exists());
        assert!(dir.path().join("clip.final.mov").exists());
    }

    #[tokio::test]
    async fn test_cleanup_missing_directory() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("missing").join("clip.mp4");
        assert_eq!(cleanup(&output).await, CleanupReport::default());
    }
}
