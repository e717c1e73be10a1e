// download_paths.rs
// Resolution of the directory inbound files are written to
//
// Received files land in one download directory: either the one the caller
// configured, or a cross-platform default under the user's home. Tilde paths
// are accepted so a config value can say "~/Downloads/...".

use std::path::{Path, PathBuf};
use tracing::debug;

/// Default download location when the caller configures nothing.
const DEFAULT_DOWNLOAD_DIR: &str = "~/Downloads/Transfer-Hub";

/// Expand tilde (~) in path to home directory.
///
/// Note: On Windows this still works for "~" / "~/" by resolving the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if path.starts_with("~/") || path == "~" {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs
                .home_dir()
                .join(path.strip_prefix("~/").unwrap_or(""));
        }
    }
    PathBuf::from(path)
}

/// Resolve the download directory from an optional override.
pub fn resolve_download_dir(configured: Option<&str>) -> PathBuf {
    match configured {
        Some(path) if !path.trim().is_empty() => expand_tilde(path),
        _ => expand_tilde(DEFAULT_DOWNLOAD_DIR),
    }
}

/// Strip anything path-like from a remote-supplied file name. A peer must
/// not be able to steer writes outside the download directory.
fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim();
    let cleaned: String = base.chars().filter(|c| *c != '\0').collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

/// Pick a path under `dir` that does not collide with an existing file,
/// appending " (1)", " (2)", ... before the extension as needed.
fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    let extension = Path::new(file_name).extension().and_then(|e| e.to_str());

    for n in 1u32.. {
        let name = match extension {
            Some(ext) => format!("{} ({}).{}", stem, n, ext),
            None => format!("{} ({})", stem, n),
        };
        let candidate = dir.join(name);
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("u32 range is never exhausted");
}

/// Write a received payload into the download directory, creating it if
/// needed. Returns the final path.
pub async fn write_received_file(
    dir: &Path,
    file_name: &str,
    payload: &[u8],
) -> Result<PathBuf, String> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| format!("Failed to create download directory {:?}: {}", dir, e))?;

    let safe_name = sanitize_file_name(file_name);
    let path = unique_path(dir, &safe_name);

    tokio::fs::write(&path, payload)
        .await
        .map_err(|e| format!("Failed to write received file {:?}: {}", path, e))?;

    debug!("Wrote {} bytes to {:?}", payload.len(), path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_download_dir_prefers_override() {
        let dir = resolve_download_dir(Some("/tmp/hub-downloads"));
        assert_eq!(dir, PathBuf::from("/tmp/hub-downloads"));

        // Blank overrides fall back to the default.
        let dir = resolve_download_dir(Some("   "));
        assert!(dir.ends_with("Transfer-Hub"));

        let dir = resolve_download_dir(None);
        assert!(dir.ends_with("Transfer-Hub"));
    }

    #[test]
    fn test_sanitize_file_name_strips_path_components() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("c:\\windows\\evil.exe"), "evil.exe");
        assert_eq!(sanitize_file_name(".."), "unnamed");
        assert_eq!(sanitize_file_name(""), "unnamed");
    }

    #[tokio::test]
    async fn test_write_received_file_creates_dir_and_dedupes() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("downloads");

        let first = write_received_file(&dir, "a.txt", b"one").await.unwrap();
        assert_eq!(tokio::fs::read(&first).await.unwrap(), b"one");

        let second = write_received_file(&dir, "a.txt", b"two").await.unwrap();
        assert_ne!(first, second);
        assert!(second.to_string_lossy().contains("a (1).txt"));
        assert_eq!(tokio::fs::read(&second).await.unwrap(), b"two");
    }
}
