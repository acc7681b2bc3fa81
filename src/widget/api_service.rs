use crate::error::{FalError, Result};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Method};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const EDIT_ENDPOINT: &str = "/edit";

/// Response body, interpreted by the response's `content-type`.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiPayload {
    Json(Value),
    Text(String),
}

impl ApiPayload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ApiPayload::Json(value) => Some(value),
            ApiPayload::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ApiPayload::Text(text) => Some(text),
            ApiPayload::Json(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub headers: BTreeMap<String, String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: None,
            headers: BTreeMap::new(),
        }
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Thin wrapper over an HTTP client: a base URL, default headers, and
/// non-2xx responses turned into errors.
#[derive(Debug, Clone)]
pub struct ApiService {
    client: Client,
    base_url: String,
    default_headers: BTreeMap<String, String>,
}

impl ApiService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let mut default_headers = BTreeMap::new();
        default_headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            client,
            base_url: base_url.into(),
            default_headers,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        merge_header(&mut self.default_headers, name.into(), value.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Default headers overlaid with the per-call ones, names compared
    /// case-insensitively.
    pub fn effective_headers(&self, overrides: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut headers = self.default_headers.clone();
        for (name, value) in overrides {
            merge_header(&mut headers, name.clone(), value.clone());
        }
        headers
    }

    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> Result<ApiPayload> {
        let url = format!("{}{}", self.base_url, endpoint);
        let headers = self.effective_headers(&options.headers);

        let mut builder = self.client.request(options.method.clone(), &url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &options.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        log::debug!("{} {}", options.method, url);
        let response = builder.send().await.map_err(|e| {
            log::error!("API request failed: {}", e);
            FalError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = format!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default()
            )
            .trim_end()
            .to_string();
            log::error!("API request failed: HTTP Error: {}", detail);
            return Err(FalError::HttpStatus {
                status: status.as_u16(),
                detail,
            });
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false);

        if is_json {
            let value: Value = response
                .json()
                .await
                .map_err(|e| FalError::JsonParse(e.to_string()))?;
            Ok(ApiPayload::Json(value))
        } else {
            Ok(ApiPayload::Text(response.text().await?))
        }
    }

    pub async fn get(&self, endpoint: &str) -> Result<ApiPayload> {
        self.request(endpoint, RequestOptions::new(Method::GET)).await
    }

    pub async fn post(&self, endpoint: &str, data: Value) -> Result<ApiPayload> {
        self.request(endpoint, RequestOptions::new(Method::POST).with_body(data))
            .await
    }

    pub async fn put(&self, endpoint: &str, data: Value) -> Result<ApiPayload> {
        self.request(endpoint, RequestOptions::new(Method::PUT).with_body(data))
            .await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<ApiPayload> {
        self.request(endpoint, RequestOptions::new(Method::DELETE)).await
    }
}

fn merge_header(headers: &mut BTreeMap<String, String>, name: String, value: String) {
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
    headers.insert(name, value);
}

/// Where the text editor sends its edits.
#[async_trait]
pub trait EditBackend: Send + Sync {
    async fn submit_edit(&self, text: &str, timestamp_ms: i64) -> Result<ApiPayload>;
}

#[async_trait]
impl EditBackend for ApiService {
    async fn submit_edit(&self, text: &str, timestamp_ms: i64) -> Result<ApiPayload> {
        self.post(EDIT_ENDPOINT, json!({ "text": text, "timestamp": timestamp_ms }))
            .await
    }
}
