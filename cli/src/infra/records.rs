//! Infrastructure implementation of the `DeploymentRecordStore` port.
//!
//! One pretty-printed JSON document per target under
//! `~/.agent-deploy/deployments/`, written atomically.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use deploy_common::{DeploymentRecord, Variant};

use crate::application::ports::DeploymentRecordStore;
use crate::domain::artifacts::record_file_name;

pub struct FileRecordStore {
    dir: PathBuf,
}

impl FileRecordStore {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Read a record back, if there is one.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be read or parsed.
    pub fn load(&self, variant: Variant, name: &str) -> Result<Option<DeploymentRecord>> {
        let path = self.dir.join(record_file_name(variant, name));
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading deployment record {}", path.display()))?;
        let record = serde_json::from_str(&content)
            .with_context(|| format!("parsing deployment record {}", path.display()))?;
        Ok(Some(record))
    }
}

impl DeploymentRecordStore for FileRecordStore {
    fn save_record(&self, record: &DeploymentRecord) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating directory {}", self.dir.display()))?;
        let path = self.dir.join(record_file_name(record.variant, &record.name));
        let content =
            serde_json::to_string_pretty(record).context("serializing deployment record")?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("creating temp file in {}", self.dir.display()))?;
        tmp.write_all(content.as_bytes())
            .context("writing deployment record")?;
        tmp.persist(&path)
            .with_context(|| format!("finalizing deployment record {}", path.display()))?;
        Ok(path)
    }

    fn remove_record(&self, variant: Variant, name: &str) -> Result<bool> {
        let path = self.dir.join(record_file_name(variant, name));
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("removing deployment record {}", path.display()))?;
        Ok(true)
    }
}
