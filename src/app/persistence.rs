use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct FlagFile {
    #[serde(rename = "screen-sharing-active", default)]
    screen_sharing_active: bool,
}

/// Persisted "screen-sharing-active" flag
#[derive(Debug, Clone)]
pub struct SharingFlag {
    path: PathBuf,
}

impl SharingFlag {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last stored value; a missing file reads as `false`
    pub async fn load(&self) -> Result<bool> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let file: FlagFile = serde_json::from_str(&contents)?;
                Ok(file.screen_sharing_active)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn store(&self, active: bool) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let contents = serde_json::to_string_pretty(&FlagFile {
            screen_sharing_active: active,
        })?;

        // Write then rename so readers never see a partial file
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, contents).await?;
        fs::rename(&temp_path, &self.path).await?;

        debug!("Stored screen-sharing-active={} in {}", active, self.path.display());
        Ok(())
    }

    /// Store the flag, logging instead of failing
    pub async fn store_or_warn(&self, active: bool) {
        if let Err(e) = self.store(active).await {
            warn!(
                "Failed to persist sharing flag to {}: {}",
                self.path.display(),
                e
            );
        }
    }
}
