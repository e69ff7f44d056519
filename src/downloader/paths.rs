// Output path derivation: sanitized, profile-aware filenames

use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::debug;

use super::errors::{DownloadError, Result};
use super::models::VideoMetadata;
use super::platform::{FilenamePattern, PlatformProfile};

pub const DEFAULT_EXTENSION: &str = "mp4";

/// Characters cap for a sanitized component, before the extension
const MAX_COMPONENT_CHARS: usize = 200;
/// Filesystem limit for a whole filename
const MAX_FILENAME_BYTES: usize = 255;
const MAX_UNIQUE_ATTEMPTS: u32 = 1000;
/// Title bytes kept before the uploader starts losing characters
const MIN_TITLE_BYTES: usize = 32;
/// Longest extension an override filename may carry
const MAX_EXTENSION_BYTES: usize = 16;
const UPLOADER_SEPARATOR: &str = " - ";

/// Make a string safe to use as (part of) a filename
pub fn sanitize_component(input: &str) -> String {
    let replaced: String = input
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '-',
            c if c.is_control() && !c.is_whitespace() => '-',
            c => c,
        })
        .collect();

    let mut out = String::with_capacity(replaced.len());
    let mut prev: Option<char> = None;
    for c in replaced.chars() {
        let c = if c.is_whitespace() { ' ' } else { c };
        if (c == ' ' || c == '-') && prev == Some(c) {
            continue;
        }
        out.push(c);
        prev = Some(c);
    }

    let trimmed = out.trim_matches(|c: char| c == '-' || c.is_whitespace());
    let capped: String = trimmed.chars().take(MAX_COMPONENT_CHARS).collect();
    let capped = capped.trim_end_matches(|c: char| c == '-' || c.is_whitespace());

    if capped.is_empty() {
        "untitled".to_string()
    } else {
        capped.to_string()
    }
}

/// Assemble the filename for `metadata` following the profile's pattern.
///
/// The result never exceeds 255 bytes. The title is shortened first, down to
/// a short floor, then the uploader; prefix and extension are always kept.
pub fn build_filename(metadata: &VideoMetadata, profile: &PlatformProfile) -> String {
    let title = sanitize_component(&metadata.title);
    let (prefix, uploader) = match profile.filename_pattern {
        FilenamePattern::TitleOnly => ("", None),
        FilenamePattern::PrefixTitle => (profile.filename_prefix, None),
        FilenamePattern::TitleUploader => ("", metadata.known_uploader()),
        FilenamePattern::PrefixTitleUploader => {
            (profile.filename_prefix, metadata.known_uploader())
        }
    };
    let extension = format!(".{}", DEFAULT_EXTENSION);
    let available = MAX_FILENAME_BYTES.saturating_sub(prefix.len() + extension.len());

    let suffix = match uploader.map(sanitize_component) {
        Some(uploader) => {
            let title_floor = title.len().min(MIN_TITLE_BYTES);
            let budget = available.saturating_sub(title_floor + UPLOADER_SEPARATOR.len());
            let uploader = truncate_to_bytes(&uploader, budget);
            if uploader.is_empty() {
                String::new()
            } else {
                format!("{}{}", UPLOADER_SEPARATOR, uploader)
            }
        }
        None => String::new(),
    };
    let title = truncate_to_bytes(&title, available.saturating_sub(suffix.len()));

    format!("{}{}{}{}", prefix, title, suffix, extension)
}

fn truncate_to_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].trim_end()
}

/// `{stem}{marker}{extension}`, with the stem cut so the whole name fits in 255 bytes
fn fit_filename(stem: &str, marker: &str, extension: &str) -> String {
    let budget = MAX_FILENAME_BYTES.saturating_sub(marker.len() + extension.len());
    format!("{}{}{}", truncate_to_bytes(stem, budget), marker, extension)
}

/// Resolve the full output path, creating its directory.
pub fn build_output_path(
    metadata: &VideoMetadata,
    profile: &PlatformProfile,
    base_dir: &Path,
    override_dir: Option<&Path>,
    override_filename: Option<&str>,
) -> Result<PathBuf> {
    let dir = match override_dir {
        Some(dir) => dir.to_path_buf(),
        None => base_dir.join(profile.directory_segment),
    };

    std::fs::create_dir_all(&dir).map_err(|source| DownloadError::DirectoryCreate {
        path: dir.clone(),
        source,
    })?;

    let filename = match override_filename {
        Some(name) => override_to_filename(name),
        None => build_filename(metadata, profile),
    };

    let path = dir.join(filename);
    debug!(path = %path.display(), platform = profile.name, "Built output path");
    Ok(path)
}

fn override_to_filename(name: &str) -> String {
    let sanitized = sanitize_component(name);
    let path = Path::new(&sanitized);
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .filter(|e| e.len() <= MAX_EXTENSION_BYTES);

    match (extension, path.file_stem()) {
        (Some(ext), Some(stem)) => fit_filename(&stem.to_string_lossy(), "", &format!(".{}", ext)),
        _ => fit_filename(&sanitized, "", &format!(".{}", DEFAULT_EXTENSION)),
    }
}

/// Return `path` if free, otherwise the first free `stem (n).ext`.
///
/// After 1000 taken candidates a millisecond timestamp is used instead, so
/// this always terminates.
pub fn generate_unique_filename(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "untitled".to_string());
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    for n in 1..=MAX_UNIQUE_ATTEMPTS {
        let candidate = dir.join(fit_filename(&stem, &format!(" ({})", n), &ext));
        if !candidate.exists() {
            return candidate;
        }
    }

    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    dir.join(fit_filename(&stem, &format!(" ({})", millis), &ext))
}
