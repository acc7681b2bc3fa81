use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStage {
    Temporary,
    Durable,
    Imported,
}

/// A downloaded media file as it moves from the temp folder to the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadedAsset {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub stage: AssetStage,
}

impl DownloadedAsset {
    pub fn temporary(path: PathBuf, size_bytes: u64) -> Self {
        Self {
            path,
            size_bytes,
            stage: AssetStage::Temporary,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn size_kb(&self) -> u64 {
        (self.size_bytes + 512) / 1024
    }

    /// Moves to the next stage. Stages only advance.
    pub fn advance(mut self, stage: AssetStage, path: PathBuf) -> Self {
        debug_assert!(stage as u8 > self.stage as u8);
        self.stage = stage;
        self.path = path;
        self
    }
}
