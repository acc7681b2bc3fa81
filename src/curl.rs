//! HTTP over an external `curl` process.
//!
//! Each call writes the request body to a scratch file, runs curl with that
//! file as `--data-binary`, and reads the response body and header dump back
//! from two more scratch files. The files are named with a per-call UUID and
//! removed when the call returns, whatever the outcome.

use crate::config::CurlConfig;
use crate::error::{FalError, Result};
use crate::logger::{LogEntry, LogLevel, Logger};
use crate::models::{RequestDescriptor, ResponseEnvelope};
use crate::process::{default_runner, CommandOutput, CommandSpec, SharedCommandRunner};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

/// curl's exit code for "operation timed out".
const CURL_TIMEOUT_EXIT: i32 = 28;

#[derive(Clone)]
pub struct CurlRequest {
    config: CurlConfig,
    user_agent: String,
    runner: SharedCommandRunner,
    logger: Logger,
}

/// Response as curl left it on disk, before any interpretation.
#[derive(Debug, Clone)]
struct RawExchange {
    status: Option<u16>,
    bytes: Vec<u8>,
    /// Lossy rendering of `bytes`, for logs and dumps only.
    body: String,
    headers: BTreeMap<String, String>,
}

struct ScratchFiles {
    request: PathBuf,
    response: PathBuf,
    headers: PathBuf,
}

impl ScratchFiles {
    fn new(dir: &Path, id: &str) -> Self {
        Self {
            request: dir.join(format!("fal_request_{}.json", id)),
            response: dir.join(format!("fal_response_{}.txt", id)),
            headers: dir.join(format!("fal_headers_{}.txt", id)),
        }
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in [&self.request, &self.response, &self.headers] {
            let _ = fs::remove_file(path);
        }
    }
}

impl CurlRequest {
    pub fn new(config: CurlConfig, logger: Logger) -> Self {
        Self::with_runner(config, default_runner(), logger)
    }

    pub fn with_runner(config: CurlConfig, runner: SharedCommandRunner, logger: Logger) -> Self {
        Self {
            config,
            user_agent: format!("falgen/{}", env!("CARGO_PKG_VERSION")),
            runner,
            logger,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn config(&self) -> &CurlConfig {
        &self.config
    }

    /// POSTs `request.payload` as JSON. Never returns early with an error:
    /// every failure is folded into a failed envelope.
    pub fn post(&self, request: &RequestDescriptor) -> ResponseEnvelope {
        let started = Instant::now();
        let id = Uuid::new_v4().simple().to_string();
        let request_id = format!("curl_req_{}", id);

        self.logger.http(
            "curl.post",
            "Starting POST request",
            json!({ "url": request.url, "request_id": request_id }),
        );

        let exchange = match self.perform_post(request, &id) {
            Ok(exchange) => exchange,
            Err(error) => return self.fail(request_id, 0, error, started),
        };

        self.logger.log_raw_response(&exchange.body);
        let status = exchange.status.unwrap_or(200);
        let parsed = parse_json_bytes(&exchange.bytes);

        if !(200..300).contains(&status) {
            let detail = match &parsed {
                Ok(value) => error_detail(value),
                Err(_) => preview(&exchange.body, 200),
            };
            return self.fail(request_id, status, FalError::HttpStatus { status, detail }, started);
        }

        match parsed {
            Ok(body) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                let keys: Vec<&String> = body
                    .as_object()
                    .map(|o| o.keys().collect())
                    .unwrap_or_default();
                self.logger.log(
                    LogEntry::new(LogLevel::Http, "curl.complete", "Response parsed")
                        .with_fields(json!({
                            "status": status,
                            "response_keys": keys,
                            "request_id": request_id,
                        }))
                        .with_duration(started.elapsed()),
                );
                ResponseEnvelope::succeeded(request_id, status, body, exchange.headers, duration_ms)
            }
            Err(error) => {
                self.logger.error(
                    "curl.parse",
                    "Response body rejected",
                    json!({ "error": error.to_string(), "preview": preview(&exchange.body, 500) }),
                );
                self.fail(request_id, status, error, started)
            }
        }
    }

    /// GETs `url` into `dest`, following redirects and letting curl retry.
    /// Returns the size of the written file.
    pub fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let spec = self.build_download_command(url, dest);
        self.logger.info(
            "curl.download",
            "Download command prepared",
            json!({ "command": spec.display_redacted(), "target": dest.display().to_string() }),
        );

        let started = Instant::now();
        let output = self.runner.run(&spec)?;
        self.logger.log(
            LogEntry::new(LogLevel::Info, "curl.download", "Download process finished")
                .with_fields(json!({ "exit_code": output.status_code }))
                .with_duration(started.elapsed()),
        );
        if !output.success() {
            return Err(exit_error(&output));
        }

        let size = fs::metadata(dest).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(FalError::EmptyDownload(dest.display().to_string()));
        }
        Ok(size)
    }

    fn post_command(&self, request: &RequestDescriptor, files: &ScratchFiles) -> CommandSpec {
        let mut spec = CommandSpec::new(self.config.binary.as_str())
            .flag_value("-X", "POST")
            .arg(request.url.as_str());
        for (name, value) in self.merged_headers(&request.headers) {
            spec = spec.flag_value("-H", format!("{}: {}", name, value));
        }
        spec.flag_value("--data-binary", format!("@{}", files.request.display()))
            .flag_value("--output", files.response.display().to_string())
            .flag_value("--dump-header", files.headers.display().to_string())
            .flag_value("--connect-timeout", self.config.connect_timeout_secs.to_string())
            .flag_value("--max-time", self.config.max_time_secs.to_string())
            .arg("--silent")
            .arg("--show-error")
            .flag_value("--write-out", "%{http_code}")
    }

    pub fn build_download_command(&self, url: &str, dest: &Path) -> CommandSpec {
        CommandSpec::new(self.config.binary.as_str())
            .arg("--location")
            .arg(url)
            .flag_value("--output", dest.display().to_string())
            .flag_value("--connect-timeout", self.config.connect_timeout_secs.to_string())
            .flag_value("--max-time", self.config.download_max_time_secs.to_string())
            .flag_value("--retry", self.config.download_retries.to_string())
            .flag_value("--retry-delay", self.config.download_retry_delay_secs.to_string())
            .arg("--fail")
            .arg("--silent")
            .arg("--show-error")
    }

    /// Defaults first, then the caller's headers; a caller header replaces a
    /// default of the same name regardless of case.
    fn merged_headers(&self, headers: &BTreeMap<String, String>) -> Vec<(String, String)> {
        let mut merged: Vec<(String, String)> = vec![
            ("Content-Type".into(), "application/json".into()),
            ("Accept".into(), "application/json".into()),
            ("User-Agent".into(), self.user_agent.clone()),
        ];
        for (name, value) in headers {
            merged.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
            merged.push((name.clone(), value.clone()));
        }
        merged
    }

    fn perform_post(&self, request: &RequestDescriptor, id: &str) -> Result<RawExchange> {
        let files = ScratchFiles::new(&self.config.temp_dir, id);
        let body = serde_json::to_vec(&request.payload)?;
        fs::write(&files.request, &body).map_err(|e| scratch_error(&files.request, e))?;

        self.logger.debug(
            "curl.request_body",
            "Request body written",
            json!({
                "bytes": body.len(),
                "preview": preview(&String::from_utf8_lossy(&body), 200),
                "request_file": files.request.display().to_string(),
            }),
        );

        let spec = self.post_command(request, &files);
        self.logger.debug(
            "curl.command",
            "Curl command prepared",
            json!({ "command": spec.display_redacted() }),
        );

        let output = self.runner.run(&spec)?;
        self.logger.info(
            "curl.exit",
            "curl finished",
            json!({ "exit_code": output.status_code, "write_out": output.stdout.trim() }),
        );
        if !output.success() {
            return Err(exit_error(&output));
        }

        if !files.response.is_file() {
            return Err(FalError::MissingOutput);
        }
        let bytes = fs::read(&files.response).map_err(|e| scratch_error(&files.response, e))?;
        let body = String::from_utf8_lossy(&bytes).to_string();
        let (dumped_status, headers) = match fs::read_to_string(&files.headers) {
            Ok(raw) => parse_header_dump(&raw),
            Err(_) => (None, BTreeMap::new()),
        };

        Ok(RawExchange {
            status: parse_write_out_status(&output.stdout).or(dumped_status),
            bytes,
            body,
            headers,
        })
    }

    fn fail(&self, request_id: String, status: u16, error: FalError, started: Instant) -> ResponseEnvelope {
        let duration_ms = started.elapsed().as_millis() as u64;
        self.logger.error(
            "curl.failed",
            "Curl request failed",
            json!({
                "error": error.to_string(),
                "kind": error.kind().as_str(),
                "status": status,
                "duration_ms": duration_ms,
            }),
        );
        ResponseEnvelope::failed(request_id, status, error, duration_ms)
    }
}

fn scratch_error(path: &Path, error: std::io::Error) -> FalError {
    FalError::ScratchFile {
        path: path.display().to_string(),
        message: error.to_string(),
    }
}

fn exit_error(output: &CommandOutput) -> FalError {
    if output.status_code == CURL_TIMEOUT_EXIT {
        FalError::Timeout
    } else {
        FalError::ProcessFailed {
            exit_code: output.status_code,
            stderr: output.stderr.trim().to_string(),
        }
    }
}

/// True when the body is an HTML page rather than an API payload.
pub fn looks_like_html(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("<html") || lower.contains("<!doctype")
}

/// Strict JSON interpretation of a response body. Emptiness and HTML are
/// rejected before the parser runs.
pub fn parse_json_body(body: &str) -> Result<Value> {
    if body.trim().is_empty() {
        return Err(FalError::EmptyBody);
    }
    if looks_like_html(body) {
        return Err(FalError::HtmlBody);
    }
    serde_json::from_str(body).map_err(|e| FalError::JsonParse(e.to_string()))
}

/// `parse_json_body` over raw response bytes. Bytes that are not UTF-8 are a
/// parse failure, never replaced.
pub fn parse_json_bytes(bytes: &[u8]) -> Result<Value> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| FalError::JsonParse(format!("response body is not valid UTF-8: {}", e)))?;
    parse_json_body(text)
}

fn parse_write_out_status(stdout: &str) -> Option<u16> {
    stdout.trim().parse::<u16>().ok().filter(|s| *s != 0)
}

/// Reads a `--dump-header` file. When redirects or `100 Continue` produced
/// several blocks, the last one describes the final response.
pub fn parse_header_dump(raw: &str) -> (Option<u16>, BTreeMap<String, String>) {
    let mut status = None;
    let mut headers = BTreeMap::new();
    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with("HTTP/") {
            status = line.split_whitespace().nth(1).and_then(|s| s.parse().ok());
            headers.clear();
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    (status, headers)
}

fn error_detail(body: &Value) -> String {
    for key in ["detail", "error", "message"] {
        match body.get(key) {
            Some(Value::String(s)) => return s.clone(),
            Some(other) if !other.is_null() => return other.to_string(),
            _ => {}
        }
    }
    preview(&body.to_string(), 200)
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandRunner;
    use std::sync::{Arc, Mutex};

    /// Plays curl: writes a canned body and header dump to the paths named in
    /// the command line and reports a chosen exit code.
    struct FakeCurl {
        exit_code: i32,
        body: Option<&'static [u8]>,
        header_dump: &'static str,
        write_out: &'static str,
        seen: Mutex<Vec<CommandSpec>>,
    }

    impl FakeCurl {
        fn answering(body: &'static str) -> Self {
            Self {
                exit_code: 0,
                body: Some(body.as_bytes()),
                header_dump: "HTTP/2 200\r\ncontent-type: application/json\r\n\r\n",
                write_out: "200",
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl CommandRunner for FakeCurl {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            self.seen.lock().unwrap().push(spec.clone());
            if let (Some(body), Some(out)) = (self.body, spec.value_of("--output")) {
                fs::write(out, body).unwrap();
            }
            if let Some(dump) = spec.value_of("--dump-header") {
                fs::write(dump, self.header_dump).unwrap();
            }
            Ok(CommandOutput {
                status_code: self.exit_code,
                stdout: self.write_out.to_string(),
                stderr: if self.exit_code == 0 { String::new() } else { "curl: (6) Could not resolve host".into() },
            })
        }
    }

    fn client(dir: &Path, fake: Arc<FakeCurl>) -> CurlRequest {
        CurlRequest::with_runner(
            CurlConfig::default().with_temp_dir(dir),
            fake,
            Logger::quiet(),
        )
    }

    fn descriptor() -> RequestDescriptor {
        RequestDescriptor::new("https://fal.test/run", json!({"prompt": "x"}))
            .with_header("Authorization", "Key secret")
    }

    #[test]
    fn test_successful_post() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeCurl::answering(r#"{"video":{"url":"https://x/y.mp4"}}"#));
        let envelope = client(dir.path(), fake.clone()).post(&descriptor());

        assert!(envelope.success);
        assert_eq!(envelope.status, 200);
        assert_eq!(envelope.body.unwrap()["video"]["url"], "https://x/y.mp4");
        assert_eq!(
            envelope.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );

        let seen = fake.seen.lock().unwrap();
        let spec = &seen[0];
        assert_eq!(spec.value_of("-X"), Some("POST"));
        assert!(spec.args.contains(&"Authorization: Key secret".to_string()));
        assert!(spec.has_flag("--silent") && spec.has_flag("--show-error"));
        assert_eq!(spec.value_of("--connect-timeout"), Some("30"));
        assert_eq!(spec.value_of("--max-time"), Some("120"));
    }

    #[test]
    fn test_scratch_files_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeCurl::answering(r#"{"ok":true}"#));
        client(dir.path(), fake).post(&descriptor());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_request_file_holds_payload() {
        struct Capture(Mutex<Option<String>>);
        impl CommandRunner for Capture {
            fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
                let path = spec.value_of("--data-binary").unwrap().trim_start_matches('@');
                *self.0.lock().unwrap() = Some(fs::read_to_string(path).unwrap());
                fs::write(spec.value_of("--output").unwrap(), "{}").unwrap();
                Ok(CommandOutput { status_code: 0, stdout: "200".into(), stderr: String::new() })
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let capture = Arc::new(Capture(Mutex::new(None)));
        let curl = CurlRequest::with_runner(
            CurlConfig::default().with_temp_dir(dir.path()),
            capture.clone(),
            Logger::quiet(),
        );
        assert!(curl.post(&descriptor()).success);
        let sent: Value = serde_json::from_str(capture.0.lock().unwrap().as_deref().unwrap()).unwrap();
        assert_eq!(sent, json!({"prompt": "x"}));
    }

    #[test]
    fn test_nonzero_exit_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeCurl {
            exit_code: 6,
            body: None,
            header_dump: "",
            write_out: "000",
            seen: Mutex::new(Vec::new()),
        });
        let envelope = client(dir.path(), fake).post(&descriptor());
        assert!(!envelope.success);
        assert!(matches!(
            envelope.error,
            Some(FalError::ProcessFailed { exit_code: 6, .. })
        ));
    }

    #[test]
    fn test_timeout_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeCurl {
            exit_code: CURL_TIMEOUT_EXIT,
            body: None,
            header_dump: "",
            write_out: "000",
            seen: Mutex::new(Vec::new()),
        });
        let envelope = client(dir.path(), fake).post(&descriptor());
        assert_eq!(envelope.error, Some(FalError::Timeout));
    }

    #[test]
    fn test_missing_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeCurl {
            exit_code: 0,
            body: None,
            header_dump: "",
            write_out: "",
            seen: Mutex::new(Vec::new()),
        });
        let envelope = client(dir.path(), fake).post(&descriptor());
        assert_eq!(envelope.error, Some(FalError::MissingOutput));
    }

    #[test]
    fn test_empty_and_html_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let empty = client(dir.path(), Arc::new(FakeCurl::answering("  \n"))).post(&descriptor());
        assert_eq!(empty.error, Some(FalError::EmptyBody));

        let html = client(
            dir.path(),
            Arc::new(FakeCurl::answering("<!DOCTYPE html><html><body>502</body></html>")),
        )
        .post(&descriptor());
        assert_eq!(html.error, Some(FalError::HtmlBody));
    }

    #[test]
    fn test_http_error_status_uses_detail() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeCurl {
            exit_code: 0,
            body: Some(br#"{"detail":"Invalid key"}"#),
            header_dump: "HTTP/2 401\r\n\r\n",
            write_out: "401",
            seen: Mutex::new(Vec::new()),
        });
        let envelope = client(dir.path(), fake).post(&descriptor());
        assert_eq!(envelope.status, 401);
        assert_eq!(
            envelope.error,
            Some(FalError::HttpStatus { status: 401, detail: "Invalid key".into() })
        );
    }

    #[test]
    fn test_invalid_utf8_body_is_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeCurl {
            body: Some(b"{\"video\":{\"url\":\"https://x/\xff.mp4\"}}"),
            ..FakeCurl::answering("")
        });
        let envelope = client(dir.path(), fake).post(&descriptor());
        assert!(!envelope.success);
        assert!(envelope.body.is_none());
        assert!(matches!(envelope.error, Some(FalError::JsonParse(_))));
    }

    #[test]
    fn test_unwritable_temp_dir_is_transport_failure() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeCurl::answering("{}"));
        let envelope = client(&dir.path().join("missing"), fake.clone()).post(&descriptor());
        let error = envelope.error.unwrap();
        assert!(matches!(error, FalError::ScratchFile { .. }));
        assert_eq!(error.kind(), crate::error::ErrorKind::Transport);
        assert!(fake.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_html_checked_before_json() {
        assert_eq!(
            parse_json_body("{\"page\": \"<html>\"}").unwrap_err(),
            FalError::HtmlBody
        );
        assert!(matches!(
            parse_json_body("{video: 1}").unwrap_err(),
            FalError::JsonParse(_)
        ));
    }

    #[test]
    fn test_header_dump_last_block_wins() {
        let raw = "HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 201 Created\r\nX-Request-Id: abc\r\n\r\n";
        let (status, headers) = parse_header_dump(raw);
        assert_eq!(status, Some(201));
        assert_eq!(headers.get("x-request-id").map(String::as_str), Some("abc"));
    }

    #[test]
    fn test_caller_header_overrides_default() {
        let curl = CurlRequest::new(CurlConfig::default(), Logger::quiet());
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "text/plain".to_string());
        let merged = curl.merged_headers(&headers);
        let content_types: Vec<_> = merged
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("content-type"))
            .collect();
        assert_eq!(content_types.len(), 1);
        assert_eq!(content_types[0].1, "text/plain");
    }

    #[test]
    fn test_download_command_flags() {
        let curl = CurlRequest::new(CurlConfig::default(), Logger::quiet());
        let spec = curl.build_download_command("https://x/y.mp4", Path::new("/tmp/v.mp4"));
        assert!(spec.has_flag("--location"));
        assert!(spec.has_flag("--fail"));
        assert_eq!(spec.value_of("--retry"), Some("3"));
        assert_eq!(spec.value_of("--retry-delay"), Some("2"));
        assert_eq!(spec.value_of("--max-time"), Some("300"));
        assert_eq!(spec.value_of("--output"), Some("/tmp/v.mp4"));
    }

    #[test]
    fn test_download_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeCurl::answering(""));
        let curl = client(dir.path(), fake);
        let dest = dir.path().join("v.mp4");
        let err = curl.download("https://x/y.mp4", &dest).unwrap_err();
        assert!(matches!(err, FalError::EmptyDownload(_)));
    }
}
