use crate::{
    curl::CurlRequest,
    error::{FalError, Result},
    host::{correct_temp_path, fit_scale_percent, Composition, FootageItem, HostProject, Layer, LayerPlacement},
    logger::Logger,
    models::{AssetStage, DownloadedAsset},
};
use chrono::Utc;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const LAYER_NAME: &str = "FAL Generated Video";

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub composition: Composition,
    pub asset: DownloadedAsset,
    pub footage: FootageItem,
    pub layer: Layer,
}

/// Download → durable copy → host import → layer. Each step aborts the run on
/// failure and removes what it created.
#[derive(Clone)]
pub struct DownloadPipeline {
    curl: CurlRequest,
    output_dir: PathBuf,
    logger: Logger,
}

impl DownloadPipeline {
    pub fn new(curl: CurlRequest, output_dir: impl Into<PathBuf>, logger: Logger) -> Self {
        Self {
            curl,
            output_dir: output_dir.into(),
            logger,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn download(&self, url: &str) -> Result<DownloadedAsset> {
        let temp_dir = &self.curl.config().temp_dir;
        let mut target = temp_dir.join(format!("FAL_Video_{}.mp4", Uuid::new_v4().simple()));
        if let Some(corrected) = correct_temp_path(&target) {
            target = corrected;
        }

        self.logger.info(
            "pipeline.download",
            "Starting video download",
            json!({ "url": url, "target": target.display().to_string() }),
        );

        match self.curl.download(url, &target) {
            Ok(size) => {
                self.logger.info(
                    "pipeline.download",
                    "Video downloaded",
                    json!({ "path": target.display().to_string(), "bytes": size }),
                );
                Ok(DownloadedAsset::temporary(target, size))
            }
            Err(e) => {
                remove_best_effort(&target, &self.logger);
                self.logger.error(
                    "pipeline.download",
                    "Video download failed",
                    json!({ "url": url, "error": e.to_string() }),
                );
                Err(e)
            }
        }
    }

    /// Copies the temporary file next to the project. The temporary copy is
    /// only removed once the durable one is confirmed on disk.
    pub fn make_durable(&self, asset: DownloadedAsset) -> Result<DownloadedAsset> {
        let durable = self.output_dir.join(format!(
            "FAL_Generated_Video_{}_{}.mp4",
            Utc::now().format("%Y%m%d_%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8]
        ));

        let copied = fs::create_dir_all(&self.output_dir)
            .and_then(|_| fs::copy(asset.path(), &durable))
            .map_err(|e| FalError::DurableCopy(e.to_string()));

        let size = match copied {
            Ok(_) => fs::metadata(&durable).map(|m| m.len()).unwrap_or(0),
            Err(e) => {
                remove_best_effort(&durable, &self.logger);
                remove_best_effort(asset.path(), &self.logger);
                return Err(e);
            }
        };
        if size != asset.size_bytes || size == 0 {
            remove_best_effort(&durable, &self.logger);
            remove_best_effort(asset.path(), &self.logger);
            return Err(FalError::DurableCopy(format!(
                "copied {} of {} bytes",
                size, asset.size_bytes
            )));
        }

        remove_best_effort(asset.path(), &self.logger);
        self.logger.info(
            "pipeline.durable",
            "Durable video file created",
            json!({ "path": durable.display().to_string(), "kb": (size + 512) / 1024 }),
        );
        Ok(asset.advance(AssetStage::Durable, durable))
    }

    /// Imports into the host, retrying once with the corrected temp-folder
    /// path when the host handed back a corrupted one.
    pub fn import<H: HostProject + ?Sized>(
        &self,
        host: &mut H,
        asset: DownloadedAsset,
    ) -> Result<(DownloadedAsset, FootageItem)> {
        match host.import_file(asset.path()) {
            Ok(footage) => Ok((asset.advance(AssetStage::Imported, footage.path.clone()), footage)),
            Err(first) => {
                let Some(corrected) = correct_temp_path(asset.path()).filter(|p| p.is_file()) else {
                    self.logger.error(
                        "pipeline.import",
                        "Failed to import video",
                        json!({ "path": asset.path().display().to_string(), "error": first.to_string() }),
                    );
                    return Err(first);
                };
                self.logger.warn(
                    "pipeline.import",
                    "Retrying import with corrected path",
                    json!({ "original": asset.path().display().to_string(), "corrected": corrected.display().to_string() }),
                );
                let footage = host.import_file(&corrected)?;
                Ok((asset.advance(AssetStage::Imported, corrected), footage))
            }
        }
    }

    pub fn run<H: HostProject + ?Sized>(
        &self,
        url: &str,
        prompt: &str,
        host: &mut H,
    ) -> Result<ImportOutcome> {
        let composition = host.active_composition()?;

        let temporary = self.download(url)?;
        let durable = self.make_durable(temporary)?;
        let durable_path = durable.path().to_path_buf();
        let local_file = durable_path.display().to_string();
        let (asset, footage) = self.import(host, durable).map_err(|e| {
            self.logger.warn(
                "pipeline.import",
                "Durable file kept after failed import",
                json!({ "path": durable_path.display().to_string() }),
            );
            e
        })?;

        let placement = LayerPlacement {
            name: LAYER_NAME.to_string(),
            start_time: 0.0,
            comment: layer_comment(prompt, url, &local_file),
            scale_percent: fit_scale_percent(&composition, &footage),
        };
        let layer = host.add_layer(&footage, &placement)?;

        self.logger.info(
            "pipeline.complete",
            "Video layer created",
            json!({
                "layer": layer.placement.name,
                "index": layer.index,
                "composition": composition.name,
                "scale_percent": placement.scale_percent,
            }),
        );

        Ok(ImportOutcome {
            composition,
            asset,
            footage,
            layer,
        })
    }
}

fn layer_comment(prompt: &str, url: &str, local_file: &str) -> String {
    format!(
        "Generated by fal.ai Veo3\nPrompt: {}\nOriginal URL: {}\nGenerated: {}\nLocal file: {}",
        prompt,
        url,
        Utc::now().to_rfc2822(),
        local_file
    )
}

fn remove_best_effort(path: &Path, logger: &Logger) {
    if !path.exists() {
        return;
    }
    if let Err(e) = fs::remove_file(path) {
        logger.warn(
            "pipeline.cleanup",
            "Could not remove file",
            json!({ "path": path.display().to_string(), "error": e.to_string() }),
        );
    }
}
