use crate::{
    config::FalConfig,
    curl::CurlRequest,
    error::{FalError, Result},
    logger::Logger,
    models::{GenerationOptions, RequestDescriptor, VideoGenerationResponse, VideoRequest},
};
use serde_json::{json, Value};

pub const MAX_PROMPT_CHARS: usize = 5000;

/// One place a result URL may live in the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlStrategy {
    pub name: &'static str,
    pub pointer: &'static str,
}

/// Tried in order. The service documents `video.url`; `output.video.url` is
/// still accepted because older responses used that shape.
pub const URL_STRATEGIES: &[UrlStrategy] = &[
    UrlStrategy {
        name: "video.url",
        pointer: "/video/url",
    },
    UrlStrategy {
        name: "output.video.url",
        pointer: "/output/video/url",
    },
];

pub fn extract_video_url(body: &Value) -> Option<(&'static str, String)> {
    URL_STRATEGIES.iter().find_map(|strategy| {
        body.pointer(strategy.pointer)
            .and_then(Value::as_str)
            .filter(|url| !url.trim().is_empty())
            .map(|url| (strategy.name, url.to_string()))
    })
}

#[derive(Clone)]
pub struct VideoClient {
    curl: CurlRequest,
    config: FalConfig,
    logger: Logger,
}

impl VideoClient {
    pub fn new(curl: CurlRequest, config: FalConfig, logger: Logger) -> Self {
        Self {
            curl,
            config,
            logger,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Validates the prompt and credential, then merges the options over
    /// their defaults. Nothing is sent.
    pub fn build_request(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<RequestDescriptor> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(FalError::EmptyPrompt);
        }
        let length = prompt.chars().count();
        if length > MAX_PROMPT_CHARS {
            return Err(FalError::PromptTooLong {
                length,
                max: MAX_PROMPT_CHARS,
            });
        }
        let api_key = self
            .config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(FalError::MissingCredential)?;

        let body = VideoRequest::from_options(prompt, options);
        Ok(
            RequestDescriptor::new(self.config.endpoint.as_str(), serde_json::to_value(&body)?)
                .with_header("Authorization", format!("Key {}", api_key))
                .with_header("Content-Type", "application/json"),
        )
    }

    pub fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<VideoGenerationResponse> {
        let request = match self.build_request(prompt, options) {
            Ok(request) => request,
            Err(e) => {
                self.logger.error(
                    "fal.validation",
                    "Request rejected before sending",
                    json!({ "error": e.to_string() }),
                );
                return Err(e);
            }
        };
        let _timer = self.logger.timer("fal.generate");

        self.logger.http(
            "fal.request",
            "Sending video generation request",
            json!({ "endpoint": request.url, "body": request.payload }),
        );

        let envelope = self.curl.post(&request);
        let duration_ms = envelope.duration_ms;
        let request_id_fallback = envelope.request_id.clone();
        let body = envelope.into_result()?;

        let Some((strategy, video_url)) = extract_video_url(&body) else {
            let keys: Vec<&String> = body
                .as_object()
                .map(|o| o.keys().collect())
                .unwrap_or_default();
            self.logger.error(
                "fal.no_url",
                "No video URL found in successful response",
                json!({ "response_keys": keys }),
            );
            return Err(FalError::NoVideoUrl);
        };

        let request_id = ["request_id", "id"]
            .iter()
            .find_map(|k| body.get(*k).and_then(Value::as_str))
            .map(String::from)
            .unwrap_or_else(|| "unknown".to_string());
        let logs = body
            .get("logs")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        self.logger.info(
            "fal.success",
            "Video generation successful",
            json!({
                "video_url": video_url,
                "strategy": strategy,
                "request_id": request_id,
                "curl_request_id": request_id_fallback,
            }),
        );

        Ok(VideoGenerationResponse {
            video_url,
            strategy,
            request_id,
            logs,
            raw: body,
            duration_ms,
        })
    }
}
