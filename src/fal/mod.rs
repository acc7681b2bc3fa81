pub mod pipeline;
pub mod video_client;

use crate::{
    config::Config,
    curl::CurlRequest,
    error::Result,
    host::HostProject,
    logger::Logger,
    models::{GenerationOptions, VideoGenerationResponse},
    process::{default_runner, SharedCommandRunner},
};
use serde_json::json;

pub use pipeline::{DownloadPipeline, ImportOutcome, LAYER_NAME};
pub use video_client::{extract_video_url, UrlStrategy, VideoClient, MAX_PROMPT_CHARS, URL_STRATEGIES};

/// Generation plus the import pipeline, sharing one curl transport and one
/// logging context.
#[derive(Clone)]
pub struct FalClient {
    video_client: VideoClient,
    pipeline: DownloadPipeline,
    logger: Logger,
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub generation: VideoGenerationResponse,
    pub import: ImportOutcome,
}

impl FalClient {
    pub fn new(config: Config, logger: Logger) -> Self {
        Self::with_runner(config, default_runner(), logger)
    }

    pub fn with_runner(config: Config, runner: SharedCommandRunner, logger: Logger) -> Self {
        let curl = CurlRequest::with_runner(config.curl, runner, logger.clone())
            .with_user_agent(config.fal.user_agent.clone());
        let pipeline = DownloadPipeline::new(curl.clone(), config.fal.output_dir.clone(), logger.clone());
        Self {
            video_client: VideoClient::new(curl, config.fal, logger.clone()),
            pipeline,
            logger,
        }
    }

    pub fn video(&self) -> &VideoClient {
        &self.video_client
    }

    pub fn pipeline(&self) -> &DownloadPipeline {
        &self.pipeline
    }

    /// Checks for an active composition before spending a generation, then
    /// generates and imports the result as a new layer.
    pub fn generate_into_project<H: HostProject + ?Sized>(
        &self,
        prompt: &str,
        options: &GenerationOptions,
        host: &mut H,
    ) -> Result<GenerationOutcome> {
        let composition = host.active_composition()?;
        self.logger.info(
            "fal.start",
            "Starting generation for composition",
            json!({ "composition": composition.name, "width": composition.width, "height": composition.height }),
        );

        let generation = self.video_client.generate(prompt, options)?;
        let import = self.pipeline.run(&generation.video_url, prompt.trim(), host)?;
        Ok(GenerationOutcome { generation, import })
    }
}
