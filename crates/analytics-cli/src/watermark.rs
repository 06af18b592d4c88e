//! Watermark persisted as a JSON file between job invocations.

use dhis_analytics_core::{Watermark, WatermarkError, WatermarkStore};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WatermarkStore for FileWatermarkStore {
    /// A missing file is the unset watermark.
    fn load(&self) -> Result<Watermark, WatermarkError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No watermark file, starting unset");
                return Ok(Watermark::unset());
            }
            Err(e) => return Err(io_error(&self.path, e)),
        };
        serde_json::from_str(&content).map_err(|e| {
            WatermarkError(format!("invalid watermark file {}: {e}", self.path.display()))
        })
    }

    /// Writes to a sibling temporary file first so a crash never leaves a torn file.
    fn store(&self, watermark: &Watermark) -> Result<(), WatermarkError> {
        let json = serde_json::to_string_pretty(watermark)
            .map_err(|e| WatermarkError(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| io_error(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| io_error(&self.path, e))
    }
}

fn io_error(path: &Path, err: std::io::Error) -> WatermarkError {
    WatermarkError(format!("{}: {err}", path.display()))
}
