use thiserror::Error;

/// Failure category a caller can branch on without looking at messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Transport,
    Integrity,
    HostIntegration,
    Configuration,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Transport => "transport",
            ErrorKind::Integrity => "integrity",
            ErrorKind::HostIntegration => "host integration",
            ErrorKind::Configuration => "configuration",
        }
    }

    /// Short hint shown to the user next to the failure.
    pub fn hint(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "Check the prompt and the FAL_KEY credential.",
            ErrorKind::Transport => "This suggests a network or curl problem.",
            ErrorKind::Integrity => "This suggests an issue with the API response format.",
            ErrorKind::HostIntegration => "Open a project and select a composition first.",
            ErrorKind::Configuration => "Check the env file and command line options.",
        }
    }
}

/// Cloneable so it can travel inside a `ResponseEnvelope`; io errors are
/// carried as their rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FalError {
    #[error("Prompt is required")]
    EmptyPrompt,
    #[error("Prompt is too long ({length} characters, maximum {max})")]
    PromptTooLong { length: usize, max: usize },
    #[error("API key is required (set FAL_KEY)")]
    MissingCredential,
    #[error("Please enter some text to edit")]
    EmptyText,
    #[error("A request is already in flight")]
    Busy,

    #[error("Failed to launch {program}: {message}")]
    ProcessSpawn { program: String, message: String },
    #[error("curl exited with code {exit_code}: {stderr}")]
    ProcessFailed { exit_code: i32, stderr: String },
    #[error("Request timed out")]
    Timeout,
    #[error("HTTP error {status}: {detail}")]
    HttpStatus { status: u16, detail: String },
    #[error("HTTP client error: {0}")]
    Http(String),
    #[error("Scratch file {path} failed: {message}")]
    ScratchFile { path: String, message: String },

    #[error("Response file was not created")]
    MissingOutput,
    #[error("Empty response body")]
    EmptyBody,
    #[error("Received HTML error page instead of JSON")]
    HtmlBody,
    #[error("JSON parse failed: {0}")]
    JsonParse(String),
    #[error("No video URL found in response")]
    NoVideoUrl,
    #[error("Downloaded file is empty or missing: {0}")]
    EmptyDownload(String),
    #[error("Failed to copy video to durable location: {0}")]
    DurableCopy(String),

    #[error("No active composition found. Create or select a composition first.")]
    NoActiveComposition,
    #[error("Failed to import {path}: {message}")]
    ImportFailed { path: String, message: String },
    #[error("Host project error: {0}")]
    Host(String),

    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl FalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FalError::EmptyPrompt
            | FalError::PromptTooLong { .. }
            | FalError::MissingCredential
            | FalError::EmptyText
            | FalError::Busy => ErrorKind::Validation,
            FalError::ProcessSpawn { .. }
            | FalError::ProcessFailed { .. }
            | FalError::Timeout
            | FalError::HttpStatus { .. }
            | FalError::Http(_)
            | FalError::ScratchFile { .. } => ErrorKind::Transport,
            FalError::MissingOutput
            | FalError::EmptyBody
            | FalError::HtmlBody
            | FalError::JsonParse(_)
            | FalError::NoVideoUrl
            | FalError::EmptyDownload(_)
            | FalError::DurableCopy(_) => ErrorKind::Integrity,
            FalError::NoActiveComposition
            | FalError::ImportFailed { .. }
            | FalError::Host(_) => ErrorKind::HostIntegration,
            FalError::Config(_) | FalError::Io(_) | FalError::Serialization(_) => {
                ErrorKind::Configuration
            }
        }
    }
}

impl From<std::io::Error> for FalError {
    fn from(e: std::io::Error) -> Self {
        FalError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for FalError {
    fn from(e: serde_json::Error) -> Self {
        FalError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for FalError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FalError::Timeout
        } else {
            FalError::Http(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, FalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(FalError::EmptyPrompt.kind(), ErrorKind::Validation);
        assert_eq!(FalError::MissingCredential.kind(), ErrorKind::Validation);
        assert_eq!(FalError::Timeout.kind(), ErrorKind::Transport);
        assert_eq!(FalError::HtmlBody.kind(), ErrorKind::Integrity);
        assert_eq!(
            FalError::JsonParse("eof".into()).kind(),
            ErrorKind::Integrity
        );
        assert_eq!(
            FalError::NoActiveComposition.kind(),
            ErrorKind::HostIntegration
        );
    }

    #[test]
    fn test_io_error_becomes_message() {
        let err: FalError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err, FalError::Io("gone".into()));
    }
}
