//! Append-only local result files
//!
//! Every trial is written as one compact JSON object per line to
//! `<dir>/volume_<percent>_result.json`. Files are only ever appended to.

use crate::audio::analyzer::Metrics;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Default directory for result files, relative to the working directory
pub const DEFAULT_RESULTS_DIR: &str = "results";

/// Local JSON-lines store, one file per volume level
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    /// Create a store writing under `dir` (created on first write)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the result file for a volume level
    pub fn path_for(&self, volume_percent: u8) -> PathBuf {
        self.dir
            .join(format!("volume_{}_result.json", volume_percent))
    }

    /// Append one metrics record to its level file
    ///
    /// # Returns
    /// Path of the file that was written
    pub fn append(&self, metrics: &Metrics) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(metrics.volume_percent);

        let mut line = serde_json::to_string(metrics)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;

        tracing::info!(path = %path.display(), "Result saved to local file");
        Ok(path)
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new(DEFAULT_RESULTS_DIR)
    }
}
