use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_ASPECT_RATIO: &str = "16:9";
pub const DEFAULT_DURATION: &str = "8s";
pub const DEFAULT_RESOLUTION: &str = "720p";

pub const ASPECT_RATIOS: &[&str] = &["16:9", "9:16", "1:1"];
pub const DURATIONS: &[&str] = &["4s", "6s", "8s"];

/// Caller-supplied knobs. Anything left `None` takes the documented default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub aspect_ratio: Option<String>,
    pub duration: Option<String>,
    pub resolution: Option<String>,
    pub enhance_prompt: Option<bool>,
    pub generate_audio: Option<bool>,
    pub negative_prompt: Option<String>,
    pub seed: Option<u64>,
    pub auto_fix: Option<bool>,
}

impl GenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_aspect_ratio(mut self, value: impl Into<String>) -> Self {
        self.aspect_ratio = Some(value.into());
        self
    }

    pub fn with_duration(mut self, value: impl Into<String>) -> Self {
        self.duration = Some(value.into());
        self
    }

    pub fn with_resolution(mut self, value: impl Into<String>) -> Self {
        self.resolution = Some(value.into());
        self
    }

    pub fn with_negative_prompt(mut self, value: impl Into<String>) -> Self {
        self.negative_prompt = Some(value.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// The body actually posted to the generation endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRequest {
    pub prompt: String,
    pub aspect_ratio: String,
    pub duration: String,
    pub resolution: String,
    pub enhance_prompt: bool,
    pub generate_audio: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_fix: Option<bool>,
}

impl VideoRequest {
    pub fn from_options(prompt: &str, options: &GenerationOptions) -> Self {
        Self {
            prompt: prompt.to_string(),
            aspect_ratio: non_empty(&options.aspect_ratio, DEFAULT_ASPECT_RATIO),
            duration: non_empty(&options.duration, DEFAULT_DURATION),
            resolution: non_empty(&options.resolution, DEFAULT_RESOLUTION),
            enhance_prompt: options.enhance_prompt.unwrap_or(true),
            generate_audio: options.generate_audio.unwrap_or(true),
            negative_prompt: options
                .negative_prompt
                .clone()
                .filter(|p| !p.trim().is_empty()),
            seed: options.seed,
            auto_fix: options.auto_fix,
        }
    }
}

fn non_empty(value: &Option<String>, default: &str) -> String {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Pixel size of a rendered clip, when the resolution and aspect ratio are
/// ones the service documents.
pub fn frame_size(resolution: &str, aspect_ratio: &str) -> Option<(u32, u32)> {
    let short = match resolution {
        "720p" => 720,
        "1080p" => 1080,
        _ => return None,
    };
    let long = short * 16 / 9;
    match aspect_ratio {
        "16:9" => Some((long, short)),
        "9:16" => Some((short, long)),
        "1:1" => Some((short, short)),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoGenerationResponse {
    pub video_url: String,
    /// Name of the extraction rule that found the URL.
    pub strategy: &'static str,
    pub request_id: String,
    pub logs: Vec<Value>,
    pub raw: Value,
    pub duration_ms: u64,
}
