use crate::error::{FalError, Result};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_ENDPOINT: &str = "https://fal.run/fal-ai/veo3/fast";
pub const API_KEY_VAR: &str = "FAL_KEY";
pub const ENDPOINT_VAR: &str = "FAL_ENDPOINT";

#[derive(Debug, Clone)]
pub struct CurlConfig {
    pub binary: String,
    pub connect_timeout_secs: u64,
    pub max_time_secs: u64,
    pub download_max_time_secs: u64,
    pub download_retries: u32,
    pub download_retry_delay_secs: u64,
    pub temp_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct FalConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub user_agent: String,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub curl: CurlConfig,
    pub fal: FalConfig,
}

impl Default for CurlConfig {
    fn default() -> Self {
        CurlConfig {
            binary: "curl".to_string(),
            connect_timeout_secs: 30,
            max_time_secs: 120,
            download_max_time_secs: 300,
            download_retries: 3,
            download_retry_delay_secs: 2,
            temp_dir: env::temp_dir(),
        }
    }
}

impl CurlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(binary) = env::var("FALGEN_CURL") {
            if !binary.trim().is_empty() {
                config.binary = binary;
            }
        }
        if let Ok(dir) = env::var("FALGEN_TEMP_DIR") {
            config.temp_dir = PathBuf::from(dir);
        }
        config
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn with_timeouts(mut self, connect_secs: u64, max_secs: u64) -> Self {
        self.connect_timeout_secs = connect_secs;
        self.max_time_secs = max_secs;
        self
    }
}

impl Default for FalConfig {
    fn default() -> Self {
        FalConfig {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: format!("falgen/{}", env!("CARGO_PKG_VERSION")),
            output_dir: PathBuf::from("."),
        }
    }
}

impl FalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `FAL_KEY`, `FAL_ENDPOINT` and `FALGEN_OUTPUT_DIR` from the process
    /// environment. Blank values count as unset.
    pub fn from_env() -> Self {
        let vars: HashMap<String, String> = [API_KEY_VAR, ENDPOINT_VAR, "FALGEN_OUTPUT_DIR"]
            .iter()
            .filter_map(|name| env::var(name).ok().map(|v| (name.to_string(), v)))
            .collect();
        Self::default().merge_vars(&vars)
    }

    /// Layers the key file over the process environment: values in the file
    /// win, anything missing there falls back to `from_env`.
    pub fn from_env_file(path: &Path) -> Result<Self> {
        let vars = load_env_file(path)?;
        let base = Self::from_env();
        Ok(base.merge_vars(&vars))
    }

    fn merge_vars(mut self, vars: &HashMap<String, String>) -> Self {
        if let Some(key) = non_blank(vars.get(API_KEY_VAR)) {
            self.api_key = Some(key);
        }
        if let Some(endpoint) = non_blank(vars.get(ENDPOINT_VAR)) {
            self.endpoint = endpoint;
        }
        if let Some(dir) = non_blank(vars.get("FALGEN_OUTPUT_DIR")) {
            self.output_dir = PathBuf::from(dir);
        }
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn has_credential(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            curl: CurlConfig::default(),
            fal: FalConfig::default(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        Config {
            curl: CurlConfig::from_env(),
            fal: FalConfig::from_env(),
        }
    }

    pub fn with_curl(mut self, config: CurlConfig) -> Self {
        self.curl = config;
        self
    }

    pub fn with_fal(mut self, config: FalConfig) -> Self {
        self.fal = config;
        self
    }
}

/// Parses a `KEY=value` file. Comment lines and lines the parser rejects are
/// skipped; a missing file is a configuration error.
pub fn load_env_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.is_file() {
        return Err(FalError::Config(format!(
            "env file not found at: {}",
            path.display()
        )));
    }
    let iter = dotenv::from_path_iter(path)
        .map_err(|e| FalError::Config(format!("failed to load env file: {}", e)))?;
    Ok(iter.filter_map(|item| item.ok()).collect())
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(String::from)
}
