//! Local destination of a clone
//!
//! Paths handed to the workspace are repository paths (`/`-separated,
//! relative to the root). They are checked before use so that nothing is
//! ever written outside the workspace directory.

#[cfg(unix)]
use crate::artifacts::objects::entry_mode::{MODE_SYMLINK, is_executable};
use crate::error::GitError;
use anyhow::Context;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone)]
pub struct Workspace {
    path: Box<Path>,
}

impl Workspace {
    pub fn new(path: Box<Path>) -> Self {
        Workspace { path }
    }

    /// Create the workspace directory if it does not exist yet
    pub async fn prepare(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.path)
            .await
            .with_context(|| format!("Failed to create workspace directory {:?}", self.path))
    }

    /// Write a file, creating its parent directories on demand
    ///
    /// Executable modes set the executable bits and symlink modes create a
    /// link pointing at `data` on Unix; everything else is a regular file.
    pub async fn write_file(&self, file_path: &str, data: &[u8], mode: u32) -> anyhow::Result<()> {
        let path = self.resolve(file_path)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory for {file_path:?}"))?;
        }

        #[cfg(unix)]
        if mode == MODE_SYMLINK {
            let target = String::from_utf8_lossy(data).into_owned();
            // a previous clone into the same directory may have left the link behind
            match tokio::fs::remove_file(&path).await {
                Err(err) if err.kind() != ErrorKind::NotFound => {
                    return Err(err)
                        .with_context(|| format!("Failed to replace {file_path:?}"));
                }
                _ => {}
            }
            return tokio::fs::symlink(&target, &path)
                .await
                .with_context(|| format!("Failed to create symlink {file_path:?} -> {target:?}"));
        }

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open file: {file_path:?}"))?;

        file.write_all(data)
            .await
            .with_context(|| format!("Failed to write to file: {file_path:?}"))?;
        file.flush().await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let bits = if is_executable(mode) { 0o755 } else { 0o644 };
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(bits))
                .await
                .with_context(|| format!("Failed to set permissions on {file_path:?}"))?;
        }
        #[cfg(not(unix))]
        let _ = mode;

        Ok(())
    }

    /// Map a repository path to a location inside the workspace
    fn resolve(&self, file_path: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(file_path);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));

        if file_path.is_empty() || escapes {
            return Err(GitError::InvalidPath {
                path: file_path.to_string(),
                reason: "not a relative path inside the workspace".to_string(),
            }
            .into());
        }

        Ok(self.path.join(relative))
    }
}
