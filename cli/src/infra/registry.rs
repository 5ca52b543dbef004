//! Infrastructure implementation of the `RegistryStore` port.
//!
//! `FileRegistryStore` keeps the allocation registry in a YAML file, holds an
//! exclusive advisory lock on a sibling `.lock` file for its whole lifetime,
//! and persists with an atomic write (temp file + rename).

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use deploy_common::AllocationEntry;
use fs4::fs_std::FileExt;

use crate::application::ports::RegistryStore;
use crate::domain::error::DeployError;
use crate::domain::registry::AllocationRegistry;
use crate::infra::config::data_dir;

/// Registry file under the data directory.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_registry_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("registry.yaml"))
}

/// Locked, file-backed allocation registry.
pub struct FileRegistryStore {
    path: PathBuf,
    registry: AllocationRegistry,
    // Released when the store is dropped.
    _lock: File,
}

impl FileRegistryStore {
    /// Lock and load the registry at `path`. Blocks while another process
    /// holds the lock. A missing or empty file yields the seeded defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken, the file cannot be read
    /// or parsed, or its entries violate port or UID uniqueness.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let lock_path = lock_path(path);
        let lock = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("opening registry lock {}", lock_path.display()))?;
        tracing::debug!(path = %lock_path.display(), "waiting for registry lock");
        lock.lock_exclusive()
            .with_context(|| format!("locking {}", lock_path.display()))?;

        let registry = load(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            registry,
            _lock: lock,
        })
    }

    /// Entries in registration order.
    #[must_use]
    pub fn list(&self) -> &[AllocationEntry] {
        &self.registry.allocated
    }

    fn persist(&self, registry: &AllocationRegistry) -> Result<()> {
        let content = serde_yaml::to_string(registry).context("serializing registry")?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temp file in {}", dir.display()))?;
        tmp.write_all(content.as_bytes())
            .context("writing registry temp file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))
                .context("setting registry permissions")?;
        }

        tmp.persist(&self.path)
            .with_context(|| format!("finalizing registry {}", self.path.display()))?;
        Ok(())
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

fn load(path: &Path) -> Result<AllocationRegistry> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no registry yet, using defaults");
        return Ok(AllocationRegistry::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading registry {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(AllocationRegistry::default());
    }
    let registry: AllocationRegistry = serde_yaml::from_str(&content)
        .map_err(|e| DeployError::Config(format!("registry is not valid YAML: {e}")))
        .with_context(|| format!("parsing registry {}", path.display()))?;
    registry
        .validate()
        .with_context(|| format!("corrupt registry {}", path.display()))?;
    Ok(registry)
}

impl RegistryStore for FileRegistryStore {
    fn registry(&self) -> &AllocationRegistry {
        &self.registry
    }

    fn register_allocation(&mut self, entry: AllocationEntry) -> Result<(), DeployError> {
        let mut next = self.registry.clone();
        next.register(entry.clone())?;
        self.persist(&next).map_err(|e| DeployError::registry(&e))?;
        self.registry = next;
        tracing::info!(
            agent = %entry.name,
            variant = entry.variant.tag(),
            port = entry.port,
            uid = ?entry.uid,
            "allocation registered"
        );
        Ok(())
    }
}
