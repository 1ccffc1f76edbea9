use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::prefetch::PendingPolicy;
use crate::thumbnail::DEFAULT_THUMBNAIL_HEIGHT;

pub const APP_NAME: &str = "picv";

/// Images kept decoded on each side of the selection.
pub const DEFAULT_RADIUS: usize = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub radius: usize,
    /// Root for thumbnails and the last-opened marker. `None` means the
    /// per-user cache directory.
    pub cache_dir: Option<PathBuf>,
    pub thumbnail_height: u32,
    pub pending_policy: PendingPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            radius: DEFAULT_RADIUS,
            cache_dir: None,
            thumbnail_height: DEFAULT_THUMBNAIL_HEIGHT,
            pending_policy: PendingPolicy::Replace,
        }
    }
}

impl Config {
    /// `~/.cache/picv` on Linux, or the override.
    pub fn cache_root(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        let base = dirs_next::cache_dir()
            .or_else(dirs_next::home_dir)
            .ok_or(Error::NoCacheDir)?;
        Ok(base.join(APP_NAME))
    }

    pub fn thumbnail_dir(&self) -> Result<PathBuf> {
        Ok(self.cache_root()?.join("thumbnails"))
    }

    pub fn marker_path(&self) -> Result<PathBuf> {
        Ok(self.cache_root()?.join("last_opened"))
    }
}
