use std::time::Duration;

use quill_types::QuillError;

// ---------------------------------------------------------------------------
// HttpSettings
// ---------------------------------------------------------------------------

/// Transport settings shared by every HTTP collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    /// Verify server certificates. Disabling this is an explicit opt-out.
    pub verify_tls: bool,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            verify_tls: true,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl HttpSettings {
    pub fn insecure() -> Self {
        Self {
            verify_tls: false,
            ..Self::default()
        }
    }

    pub fn build_client(&self) -> Result<reqwest::Client, QuillError> {
        let mut builder = reqwest::Client::builder().timeout(self.request_timeout);
        if !self.verify_tls {
            tracing::warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        builder
            .build()
            .map_err(|e| QuillError::Config(format!("failed to build HTTP client: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

pub(crate) fn map_error(
    service: &str,
    status: reqwest::StatusCode,
    retry_after_header: Option<&str>,
    body: &str,
) -> QuillError {
    let status_u16 = status.as_u16();
    match status_u16 {
        429 => {
            let retry_ms = retry_after_header
                .and_then(|v| v.trim().parse::<f64>().ok())
                .or_else(|| {
                    serde_json::from_str::<serde_json::Value>(body)
                        .ok()
                        .and_then(|v| v["error"]["retry_after"].as_f64())
                })
                .map(|s| (s * 1000.0) as u64);
            QuillError::RateLimited {
                service: service.into(),
                retry_after_ms: retry_ms,
            }
        }
        401 | 403 => QuillError::AuthError {
            service: service.into(),
        },
        500..=599 => QuillError::ServiceError {
            service: service.into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: true,
        },
        _ => QuillError::ServiceError {
            service: service.into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: false,
        },
    }
}

/// Transport failures carry no status and are always worth another attempt.
pub(crate) fn transport_error(service: &str, err: reqwest::Error) -> QuillError {
    QuillError::ServiceError {
        service: service.into(),
        status: 0,
        message: err.to_string(),
        retryable: true,
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v["error"]["message"]
                .as_str()
                .or_else(|| v["error"].as_str())
                .or_else(|| v["status_txt"].as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

/// Read a response, map non-success statuses, and decode the JSON body.
pub(crate) async fn read_json(
    service: &str,
    resp: reqwest::Response,
) -> Result<serde_json::Value, QuillError> {
    let body = read_checked(service, resp).await?;
    serde_json::from_str(&body).map_err(|e| QuillError::MalformedResponse {
        service: service.into(),
        message: format!("failed to parse response JSON: {e}"),
    })
}

async fn read_checked(service: &str, resp: reqwest::Response) -> Result<String, QuillError> {
    let status = resp.status();
    let retry_after = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let body = resp.text().await.map_err(|e| transport_error(service, e))?;
    if !status.is_success() {
        return Err(map_error(service, status, retry_after.as_deref(), &body));
    }
    Ok(body)
}

/// Like [`read_json`] for endpoints that return raw bytes.
pub(crate) async fn read_bytes(
    service: &str,
    resp: reqwest::Response,
) -> Result<Vec<u8>, QuillError> {
    if !resp.status().is_success() {
        // read_checked always errors on a non-success status
        read_checked(service, resp).await?;
        return Err(QuillError::Other(format!("{service} returned an error status")));
    }
    let bytes = resp.bytes().await.map_err(|e| transport_error(service, e))?;
    Ok(bytes.to_vec())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
