use crate::error::{FalError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// What a single POST through the request shim needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub url: String,
    pub payload: Value,
    pub headers: BTreeMap<String, String>,
}

impl RequestDescriptor {
    pub fn new(url: impl Into<String>, payload: Value) -> Self {
        Self {
            url: url.into(),
            payload,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Uniform result of every request-performing operation.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    pub status: u16,
    pub body: Option<Value>,
    #[serde(skip)]
    pub error: Option<FalError>,
    pub raw_error: Option<String>,
    pub duration_ms: u64,
    pub request_id: String,
    pub headers: BTreeMap<String, String>,
}

impl ResponseEnvelope {
    pub fn succeeded(
        request_id: String,
        status: u16,
        body: Value,
        headers: BTreeMap<String, String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            success: true,
            status,
            body: Some(body),
            error: None,
            raw_error: None,
            duration_ms,
            request_id,
            headers,
        }
    }

    pub fn failed(request_id: String, status: u16, error: FalError, duration_ms: u64) -> Self {
        Self {
            success: false,
            status,
            body: None,
            raw_error: Some(error.to_string()),
            error: Some(error),
            duration_ms,
            request_id,
            headers: BTreeMap::new(),
        }
    }

    pub fn into_result(self) -> Result<Value> {
        match (self.success, self.body, self.error) {
            (true, Some(body), _) => Ok(body),
            (_, _, Some(error)) => Err(error),
            _ => Err(FalError::EmptyBody),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failed_envelope_carries_kind_and_message() {
        let envelope = ResponseEnvelope::failed("req".into(), 0, FalError::HtmlBody, 12);
        assert!(!envelope.success);
        assert_eq!(
            envelope.raw_error.as_deref(),
            Some("Received HTML error page instead of JSON")
        );
        assert_eq!(envelope.into_result().unwrap_err(), FalError::HtmlBody);
    }

    #[test]
    fn test_succeeded_envelope_yields_body() {
        let envelope = ResponseEnvelope::succeeded(
            "req".into(),
            200,
            json!({"ok": true}),
            BTreeMap::new(),
            5,
        );
        assert_eq!(envelope.into_result().unwrap(), json!({"ok": true}));
    }
}
