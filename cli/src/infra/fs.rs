//! Filesystem infrastructure — implements `LocalFs` with `std::fs`.

use std::path::Path;

use anyhow::{Context, Result};

/// Production filesystem implementation of `LocalFs`.
pub struct LocalFs;

impl crate::application::ports::LocalFs for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("creating directory {}", path.display()))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::remove_dir_all(path)
            .with_context(|| format!("removing directory {}", path.display()))
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(path).with_context(|| format!("removing file {}", path.display()))
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        std::fs::write(path, content).with_context(|| format!("writing file {}", path.display()))
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).with_context(|| format!("reading file {}", path.display()))
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        // `symlink_metadata` also sees dangling links, which `exists` misses.
        if let Ok(meta) = std::fs::symlink_metadata(link) {
            if meta.is_dir() {
                std::fs::remove_dir_all(link)
            } else {
                std::fs::remove_file(link)
            }
            .with_context(|| format!("replacing {}", link.display()))?;
        }
        std::os::unix::fs::symlink(target, link)
            .with_context(|| format!("linking {} -> {}", link.display(), target.display()))
    }
}
