//! The host application's project model, reduced to what the import
//! pipeline touches.

use crate::error::{FalError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Substring some host temp-folder APIs produce instead of `TemporaryItems`.
pub const CORRUPTED_TEMP_SEGMENT: &str = "Temporaryltems";
pub const TEMP_SEGMENT: &str = "TemporaryItems";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootageItem {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_secs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerPlacement {
    pub name: String,
    pub start_time: f64,
    pub comment: String,
    pub scale_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub index: usize,
    pub composition: String,
    pub footage_id: String,
    #[serde(flatten)]
    pub placement: LayerPlacement,
}

pub trait HostProject {
    fn active_composition(&self) -> Result<Composition>;
    fn import_file(&mut self, path: &Path) -> Result<FootageItem>;
    fn add_layer(&mut self, footage: &FootageItem, placement: &LayerPlacement) -> Result<Layer>;
}

/// Returns the corrected path when `path` carries the corrupted temp segment.
pub fn correct_temp_path(path: &Path) -> Option<PathBuf> {
    let raw = path.to_string_lossy();
    if raw.contains(CORRUPTED_TEMP_SEGMENT) {
        Some(PathBuf::from(raw.replace(CORRUPTED_TEMP_SEGMENT, TEMP_SEGMENT)))
    } else {
        None
    }
}

/// Uniform scale in percent that fits the footage inside the composition,
/// or `None` when it already fits exactly or the footage size is unknown.
pub fn fit_scale_percent(comp: &Composition, footage: &FootageItem) -> Option<f64> {
    let (w, h) = (footage.width?, footage.height?);
    if w == 0 || h == 0 {
        return None;
    }
    let scale_x = comp.width as f64 / w as f64;
    let scale_y = comp.height as f64 / h as f64;
    let percent = scale_x.min(scale_y) * 100.0;
    if (percent - 100.0).abs() < f64::EPSILON {
        None
    } else {
        Some(percent)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectManifest {
    pub compositions: Vec<Composition>,
    pub active_composition: Option<String>,
    pub footage: Vec<FootageItem>,
    pub layers: Vec<Layer>,
}

/// A project kept as a JSON manifest on disk, for running the pipeline
/// outside the host application.
#[derive(Debug, Clone)]
pub struct ManifestHost {
    path: PathBuf,
    manifest: ProjectManifest,
    footage_size: Option<(u32, u32)>,
}

impl ManifestHost {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw = fs::read_to_string(&path)
            .map_err(|e| FalError::Host(format!("cannot open project {}: {}", path.display(), e)))?;
        let manifest: ProjectManifest = serde_json::from_str(&raw)
            .map_err(|e| FalError::Host(format!("invalid project {}: {}", path.display(), e)))?;
        Ok(Self {
            path,
            manifest,
            footage_size: None,
        })
    }

    /// Opens the manifest, creating it with one active composition when the
    /// file does not exist yet.
    pub fn open_or_create(path: impl Into<PathBuf>, composition: Composition) -> Result<Self> {
        let path = path.into();
        if path.is_file() {
            return Self::open(path);
        }
        let mut host = Self {
            path,
            manifest: ProjectManifest::default(),
            footage_size: None,
        };
        host.manifest.active_composition = Some(composition.name.clone());
        host.manifest.compositions.push(composition);
        host.save()?;
        Ok(host)
    }

    /// Size recorded for imported footage; the manifest host does not probe
    /// media files itself.
    pub fn with_footage_size(mut self, size: Option<(u32, u32)>) -> Self {
        self.footage_size = size;
        self
    }

    pub fn manifest(&self) -> &ProjectManifest {
        &self.manifest
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.manifest)?;
        fs::write(&self.path, json + "\n")?;
        Ok(())
    }
}

impl HostProject for ManifestHost {
    fn active_composition(&self) -> Result<Composition> {
        let name = self
            .manifest
            .active_composition
            .as_ref()
            .ok_or(FalError::NoActiveComposition)?;
        self.manifest
            .compositions
            .iter()
            .find(|c| &c.name == name)
            .cloned()
            .ok_or(FalError::NoActiveComposition)
    }

    fn import_file(&mut self, path: &Path) -> Result<FootageItem> {
        if !path.is_file() {
            return Err(FalError::ImportFailed {
                path: path.display().to_string(),
                message: "file does not exist".into(),
            });
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "footage".to_string());
        let item = FootageItem {
            id: Uuid::new_v4().to_string(),
            name,
            path: path.to_path_buf(),
            width: self.footage_size.map(|(w, _)| w),
            height: self.footage_size.map(|(_, h)| h),
            duration_secs: None,
        };
        self.manifest.footage.push(item.clone());
        self.save()?;
        Ok(item)
    }

    fn add_layer(&mut self, footage: &FootageItem, placement: &LayerPlacement) -> Result<Layer> {
        let comp = self.active_composition()?;
        if !self.manifest.footage.iter().any(|f| f.id == footage.id) {
            return Err(FalError::Host(format!("unknown footage {}", footage.id)));
        }
        let index = self
            .manifest
            .layers
            .iter()
            .filter(|l| l.composition == comp.name)
            .count()
            + 1;
        let layer = Layer {
            index,
            composition: comp.name,
            footage_id: footage.id.clone(),
            placement: placement.clone(),
        };
        self.manifest.layers.push(layer.clone());
        self.save()?;
        Ok(layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comp() -> Composition {
        Composition {
            name: "Main".into(),
            width: 1920,
            height: 1080,
            duration_secs: 10.0,
        }
    }

    #[test]
    fn test_correct_temp_path() {
        let bad = Path::new("/private/var/folders/x/Temporaryltems/FAL_Video.mp4");
        assert_eq!(
            correct_temp_path(bad).unwrap(),
            PathBuf::from("/private/var/folders/x/TemporaryItems/FAL_Video.mp4")
        );
        assert!(correct_temp_path(Path::new("/tmp/FAL_Video.mp4")).is_none());
    }

    #[test]
    fn test_fit_scale() {
        let footage = FootageItem {
            id: "f".into(),
            name: "v.mp4".into(),
            path: PathBuf::from("v.mp4"),
            width: Some(1280),
            height: Some(720),
            duration_secs: None,
        };
        assert_eq!(fit_scale_percent(&comp(), &footage), Some(150.0));

        let same = FootageItem {
            width: Some(1920),
            height: Some(1080),
            ..footage.clone()
        };
        assert_eq!(fit_scale_percent(&comp(), &same), None);

        let unknown = FootageItem {
            width: None,
            ..footage
        };
        assert_eq!(fit_scale_percent(&comp(), &unknown), None);
    }

    #[test]
    fn test_manifest_roundtrip_and_layers() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("project.json");
        let media = dir.path().join("clip.mp4");
        fs::write(&media, b"data").unwrap();

        let mut host = ManifestHost::open_or_create(&project, comp())
            .unwrap()
            .with_footage_size(Some((1280, 720)));
        let footage = host.import_file(&media).unwrap();
        assert_eq!(footage.width, Some(1280));

        let placement = LayerPlacement {
            name: "Clip".into(),
            start_time: 0.0,
            comment: "c".into(),
            scale_percent: Some(150.0),
        };
        let layer = host.add_layer(&footage, &placement).unwrap();
        assert_eq!(layer.index, 1);

        let reopened = ManifestHost::open(&project).unwrap();
        assert_eq!(reopened.manifest().layers.len(), 1);
        assert_eq!(reopened.manifest().footage[0].name, "clip.mp4");
    }

    #[test]
    fn test_no_active_composition() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("empty.json");
        fs::write(&project, "{\"compositions\":[],\"active_composition\":null,\"footage\":[],\"layers\":[]}").unwrap();
        let host = ManifestHost::open(&project).unwrap();
        assert_eq!(host.active_composition().unwrap_err(), FalError::NoActiveComposition);
    }
}
