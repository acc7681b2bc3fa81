pub mod config;
pub mod curl;
pub mod error;
pub mod fal;
pub mod host;
pub mod logger;
pub mod models;
pub mod process;
pub mod widget;

pub use config::{Config, CurlConfig, FalConfig};
pub use curl::CurlRequest;
pub use error::{ErrorKind, FalError, Result};
pub use fal::{DownloadPipeline, FalClient, GenerationOutcome, ImportOutcome, VideoClient};
pub use host::{Composition, FootageItem, HostProject, Layer, LayerPlacement, ManifestHost};
pub use logger::{AlertPolicy, LogLevel, Logger, LoggerConfig};
pub use models::*;
pub use process::{CommandRunner, CommandSpec, StdCommandRunner};
pub use widget::{ApiPayload, ApiService, TextEditor};
