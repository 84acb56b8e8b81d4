//! Raw-content snapshots for diagnosing surface changes.

use std::path::{Path, PathBuf};

/// Writes raw fetched content to disk when every parse strategy misses.
///
/// Disabled when no directory is configured. Write failures are logged and
/// otherwise ignored.
#[derive(Debug, Clone, Default)]
pub struct SnapshotWriter {
    dir: Option<PathBuf>,
}

impl SnapshotWriter {
    /// Create a writer rooted at `dir`, or a disabled one.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Directory snapshots are written to, if enabled.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Save `content` for `surface` and return the file written.
    pub async fn save(&self, surface: &str, keyword: &str, content: &str) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;

        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            tracing::warn!("Cannot create snapshot directory {}: {}", dir.display(), e);
            return None;
        }

        let name = format!(
            "{}-{}-{}.html",
            surface,
            chrono::Utc::now().format("%Y%m%dT%H%M%S"),
            uuid::Uuid::new_v4().simple()
        );
        let path = dir.join(name);

        match tokio::fs::write(&path, content).await {
            Ok(()) => {
                tracing::info!(
                    "Saved unparsed {} content for '{}' to {}",
                    surface,
                    keyword,
                    path.display()
                );
                Some(path)
            }
            Err(e) => {
                tracing::warn!("Failed to write snapshot {}: {}", path.display(), e);
                None
            }
        }
    }
}
