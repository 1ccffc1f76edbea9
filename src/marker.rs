//! The "last opened file" marker: one path, stored as UTF-8 text.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct LastOpened {
    file: PathBuf,
}

impl LastOpened {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into() }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn store(&self, opened: &Path) -> io::Result<()> {
        if let Some(parent) = self.file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.file, opened.to_string_lossy().as_bytes())
    }

    pub fn load(&self) -> Option<PathBuf> {
        let text = fs::read_to_string(&self.file).ok()?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    }
}
