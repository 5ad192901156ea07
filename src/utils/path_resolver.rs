use anyhow::Result;
use std::path::{Path, PathBuf};

const APP_FOLDER: &str = "violation-wizard";

/// Resolve the per-user data folder (absolute path)
pub fn resolve_data_folder() -> PathBuf {
    // Prefer the platform data dir; fall back to the executable folder, then the CWD.
    if let Some(dir) = dirs::data_local_dir() {
        return dir.join(APP_FOLDER);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(dir) = exe_path.parent() {
            return dir.join(APP_FOLDER);
        }
    }

    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(APP_FOLDER)
}

fn ensure_folder(path: PathBuf, what: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(&path)
        .map_err(|e| anyhow::anyhow!("Failed to create {} folder {:?}: {}", what, path, e))?;
    Ok(path)
}

/// Resolve log folder (absolute path), creating it if needed
pub fn resolve_log_folder(override_dir: Option<&Path>) -> Result<PathBuf> {
    let dir = match override_dir {
        Some(p) => p.to_path_buf(),
        None => resolve_data_folder().join("logs"),
    };
    ensure_folder(dir, "log")
}

/// Resolve draft folder (absolute path), creating it if needed
pub fn resolve_draft_folder(override_dir: Option<&Path>) -> Result<PathBuf> {
    let dir = match override_dir {
        Some(p) => p.to_path_buf(),
        None => resolve_data_folder().join("drafts"),
    };
    ensure_folder(dir, "draft")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_folders_are_created() {
        let tmp = tempfile::tempdir().unwrap();
        let logs = tmp.path().join("nested").join("logs");
        let resolved = resolve_log_folder(Some(&logs)).unwrap();
        assert_eq!(resolved, logs);
        assert!(logs.is_dir());

        let drafts = tmp.path().join("drafts");
        assert_eq!(resolve_draft_folder(Some(&drafts)).unwrap(), drafts);
        assert!(drafts.is_dir());
    }

    #[test]
    fn data_folder_is_app_scoped() {
        assert!(resolve_data_folder().ends_with(APP_FOLDER));
    }
}
