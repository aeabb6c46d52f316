// src/store/output_store.rs

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::engine::StepName;
use crate::errors::{CalxError, Result};

/// Captured outputs keyed by step name.
pub type StepOutputs = BTreeMap<StepName, Vec<u8>>;

/// Write-once store of step outputs backed by a scratch directory.
///
/// - `put` writes `<scratch>/<name>` and syncs it before returning.
/// - A second `put` for the same name fails with `DuplicateWrite`.
/// - `teardown` removes the scratch directory and hands back the in-memory
///   copies for the final report.
#[derive(Debug)]
pub struct OutputStore {
    dir: Option<TempDir>,
    path: PathBuf,
    outputs: StepOutputs,
}

impl OutputStore {
    /// Create a fresh scratch directory (prefix `calx`) under `root`.
    pub fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("creating scratch root {:?}", root))?;

        let dir = tempfile::Builder::new()
            .prefix("calx")
            .tempdir_in(root)
            .with_context(|| format!("creating scratch directory in {:?}", root))?;
        let path = dir.path().to_path_buf();

        debug!(scratch = ?path, "output store created");

        Ok(Self {
            dir: Some(dir),
            path,
            outputs: BTreeMap::new(),
        })
    }

    /// Scratch directory of this run.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the output of `name` lives (or will live).
    pub fn entry_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Durably record the output of a completed step.
    pub fn put(&mut self, name: &str, output: Vec<u8>) -> Result<PathBuf> {
        if self.outputs.contains_key(name) {
            return Err(CalxError::DuplicateWrite(name.to_string()));
        }
        if Path::new(name).file_name().and_then(|n| n.to_str()) != Some(name) {
            return Err(CalxError::ConfigError(format!(
                "step name '{name}' cannot be used as a scratch file name"
            )));
        }

        let target = self.entry_path(name);
        let mut file = fs::File::create(&target)
            .with_context(|| format!("creating output file {:?}", target))?;
        file.write_all(&output)
            .with_context(|| format!("writing output file {:?}", target))?;
        file.sync_all()
            .with_context(|| format!("syncing output file {:?}", target))?;

        debug!(step = %name, bytes = output.len(), path = ?target, "stored step output");
        self.outputs.insert(name.to_string(), output);

        Ok(target)
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.outputs.get(name).map(|o| o.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.outputs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Stored step names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(|s| s.as_str())
    }

    /// Remove the scratch directory and everything in it.
    pub fn teardown(mut self) -> Result<StepOutputs> {
        if let Some(dir) = self.dir.take() {
            dir.close()
                .with_context(|| format!("removing scratch directory {:?}", self.path))?;
            info!(scratch = ?self.path, "scratch directory removed");
        }
        Ok(std::mem::take(&mut self.outputs))
    }
}
