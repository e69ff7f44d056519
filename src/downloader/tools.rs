// External tool discovery and version reporting

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tracing::debug;

use super::utils::run_output_with_timeout;

pub const YTDLP_BINARY: &str = "yt-dlp";

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInfo {
    pub name: String,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

/// Locate yt-dlp: common install paths first, then `PATH` via `which`.
///
/// Falls back to the bare binary name so spawning still consults `PATH`.
pub fn find_ytdlp() -> String {
    locate(YTDLP_BINARY).unwrap_or_else(|| YTDLP_BINARY.to_string())
}

fn locate(binary: &str) -> Option<String> {
    let common_paths = [
        format!("/opt/homebrew/bin/{}", binary), // Homebrew on Apple Silicon
        format!("/usr/local/bin/{}", binary),
        format!("/usr/bin/{}", binary),
    ];
    if let Some(path) = common_paths.into_iter().find(|p| Path::new(p).exists()) {
        return Some(path);
    }

    let output = Command::new("which").arg(binary).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!path.is_empty()).then_some(path)
}

/// Report whether the configured tool runs and which version it is
pub async fn tool_info(ytdlp_path: &str) -> ToolInfo {
    let args = vec!["--version".to_string()];
    let version = match run_output_with_timeout(ytdlp_path, &args, VERSION_TIMEOUT).await {
        Ok(out) if out.status.success() => {
            let v = String::from_utf8_lossy(&out.stdout).trim().to_string();
            (!v.is_empty()).then_some(v)
        }
        Ok(out) => {
            debug!("{} --version exited with {:?}", ytdlp_path, out.status.code());
            None
        }
        Err(e) => {
            debug!("{} --version failed: {}", ytdlp_path, e);
            None
        }
    };

    ToolInfo {
        name: YTDLP_BINARY.to_string(),
        is_available: version.is_some(),
        path: version.as_ref().map(|_| ytdlp_path.to_string()),
        version,
    }
}
