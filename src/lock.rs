//! Per-configuration process lock.

use std::path::{Path, PathBuf};

use anyhow::Context;
use fs4::fs_std::FileExt;

/// Reduce a configuration name to characters safe in a file name.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Exclusive advisory lock on `<dir>/<name>.lock`, held until dropped.
///
/// Keeps two instances from refreshing the same tokens or writing the same
/// tables at once.
#[derive(Debug)]
pub struct ConfigLock {
    path: PathBuf,
    _file: std::fs::File,
}

impl ConfigLock {
    pub async fn acquire(dir: &Path, config_name: &str) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;

        let path = dir.join(format!("{}.lock", sanitize_name(config_name)));
        let file = tokio::task::spawn_blocking({
            let path = path.clone();
            let config_name = config_name.to_string();
            move || {
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("Failed to create lock file: {}", path.display()))?;
                file.try_lock_exclusive().map_err(|_| {
                    anyhow::anyhow!(
                        "Another crm-sync instance is running for configuration '{}' (lock: {})",
                        config_name,
                        path.display()
                    )
                })?;
                Ok::<std::fs::File, anyhow::Error>(file)
            }
        })
        .await??;

        let lock = Self { path, _file: file };
        tracing::debug!("Acquired lock {}", lock.path().display());
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
