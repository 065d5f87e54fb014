// Path: crates/chainstore/src/file.rs
//! Filesystem chain publication, for single-host and test deployments.

use crate::ChainStore;
use async_trait::async_trait;
use quill_types::error::ChainError;
use std::path::PathBuf;

/// Writes chains under a base directory with world-readable permissions:
/// directories `0755`, files `0644`.
pub struct FileChainStore {
    base: PathBuf,
}

impl FileChainStore {
    /// A store rooted at `base`; parent directories are created on upload.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

#[async_trait]
impl ChainStore for FileChainStore {
    async fn upload(&self, name: &str, body: &[u8]) -> Result<(), ChainError> {
        let path = self.base.join(name);
        let dir = self.base.clone();
        let body = body.to_vec();
        tokio::task::spawn_blocking(move || write_chain(&dir, &path, &body))
            .await
            .map_err(|e| ChainError::Upload(format!("write task failed: {}", e)))?
    }
}

fn write_chain(
    dir: &std::path::Path,
    path: &std::path::Path,
    body: &[u8],
) -> Result<(), ChainError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| ChainError::Upload(format!("mkdir {}: {}", dir.display(), e)))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o755))
            .map_err(|e| ChainError::Upload(format!("chmod {}: {}", dir.display(), e)))?;
    }
    std::fs::write(path, body)
        .map_err(|e| ChainError::Upload(format!("write {}: {}", path.display(), e)))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))
            .map_err(|e| ChainError::Upload(format!("chmod {}: {}", path.display(), e)))?;
    }
    Ok(())
}
