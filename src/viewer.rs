use std::collections::HashMap;
use std::path::{self, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::decode::{DecodedImage, Metadata};
use crate::error::{Error, Result};
use crate::files::list_images;
use crate::marker::LastOpened;
use crate::prefetch::PrefetchCache;
use crate::window::compute_window;

// ---------------------------------------------------------------------------
// Viewer state
// ---------------------------------------------------------------------------

/// What a UI does with the prefetch cache: list a directory, track the
/// selection, keep the window around it resident and ask for the selected
/// image.
pub struct Viewer {
    cache: PrefetchCache,
    radius: usize,
    marker: Option<LastOpened>,
    dir: Option<PathBuf>,
    files: Vec<String>,
    index: HashMap<String, usize>,
    selected: Option<String>,
}

impl Viewer {
    pub fn new(cache: PrefetchCache, radius: usize, marker: Option<LastOpened>) -> Self {
        Self {
            cache,
            radius,
            marker,
            dir: None,
            files: Vec::new(),
            index: HashMap::new(),
            selected: None,
        }
    }

    /// List `dir` and point the cache at it. Returns the number of images.
    pub fn open_dir(&mut self, dir: &Path) -> Result<usize> {
        let files = list_images(dir).map_err(|e| Error::io(dir, e))?;
        self.index = files
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        self.files = files;
        self.dir = Some(dir.to_path_buf());
        self.selected = None;
        self.cache.reset(dir);
        Ok(self.files.len())
    }

    /// Open the directory containing `file` and select it. `Ok(false)` if
    /// the file is not a listed image.
    pub fn open_file<F>(&mut self, file: &Path, on_ready: F) -> Result<bool>
    where
        F: FnOnce(Arc<DecodedImage>, Metadata) + 'static,
    {
        let dir = match file.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
            return Ok(false);
        };
        let name = name.to_string();
        self.open_dir(dir)?;
        Ok(self.select(&name, on_ready))
    }

    /// Make `filename` the selection: keep its window resident (plus the
    /// image just left) and ask for it to be displayed.
    pub fn select<F>(&mut self, filename: &str, on_ready: F) -> bool
    where
        F: FnOnce(Arc<DecodedImage>, Metadata) + 'static,
    {
        let Some(&idx) = self.index.get(filename) else {
            log::warn!("{} is not in the current listing", filename);
            return false;
        };

        let previous = self.selected.replace(filename.to_string());
        let extra = previous.as_deref().filter(|p| *p != filename);
        let window = compute_window(&self.files, idx, self.radius, extra);
        let enqueued = self.cache.reconcile(window.as_slice());
        log::debug!(
            "[select] {} ({}/{}), window {}, enqueued {}",
            filename,
            idx + 1,
            self.files.len(),
            window.len(),
            enqueued
        );
        self.cache.request_display(filename, on_ready);
        self.remember(filename);
        true
    }

    pub fn select_index<F>(&mut self, idx: usize, on_ready: F) -> bool
    where
        F: FnOnce(Arc<DecodedImage>, Metadata) + 'static,
    {
        match self.files.get(idx).cloned() {
            Some(name) => self.select(&name, on_ready),
            None => false,
        }
    }

    fn remember(&self, filename: &str) {
        let (Some(marker), Some(dir)) = (&self.marker, &self.dir) else {
            return;
        };
        let full = dir.join(filename);
        let full = path::absolute(&full).unwrap_or(full);
        if let Err(e) = marker.store(&full) {
            log::warn!("Failed to write {}: {}", marker.file().display(), e);
        }
    }

    pub fn poll(&mut self) -> usize {
        self.cache.poll()
    }

    pub fn poll_timeout(&mut self, timeout: Duration) -> usize {
        self.cache.poll_timeout(timeout)
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn index_of(&self, filename: &str) -> Option<usize> {
        self.index.get(filename).copied()
    }

    pub fn cache(&self) -> &PrefetchCache {
        &self.cache
    }
}
