//! Shared HTTP plumbing for the REST-transported adapters

use std::time::Duration;

use core_kernel::PortError;

/// Maps a reqwest transport failure to the port error taxonomy
pub(crate) fn map_transport_error(
    operation: &str,
    timeout: Duration,
    error: reqwest::Error,
) -> PortError {
    if error.is_timeout() {
        PortError::Timeout {
            operation: operation.to_string(),
            duration_ms: timeout.as_millis() as u64,
        }
    } else if error.is_connect() {
        PortError::connection(error.to_string())
    } else {
        PortError::internal(error.to_string())
    }
}

/// Maps a non-success HTTP status to the port error taxonomy
pub(crate) fn map_status_error(status: reqwest::StatusCode, body: &str) -> PortError {
    let message = if body.is_empty() {
        status.to_string()
    } else {
        // Bodies can be large; keep the first line for the error.
        body.lines().next().unwrap_or_default().chars().take(200).collect()
    };

    match status.as_u16() {
        401 | 403 => PortError::Unauthorized { message },
        429 => PortError::RateLimited { retry_after_secs: 1 },
        status => PortError::Upstream { status, message },
    }
}

/// Stable fault code for a port error, used on integration responses
pub(crate) fn fault_code(error: &PortError) -> &'static str {
    match error {
        PortError::Timeout { .. } => "TIMEOUT",
        PortError::Connection { .. } => "NETWORK_ERROR",
        PortError::RateLimited { .. } => "RATE_LIMITED",
        PortError::Unauthorized { .. } => "UNAUTHORIZED",
        PortError::Upstream { .. } => "UPSTREAM_ERROR",
        PortError::Validation { .. } => "VALIDATION",
        PortError::Transformation { .. } => "TRANSFORMATION",
        PortError::NotFound { .. } => "NOT_FOUND",
        PortError::Conflict { .. } => "CONFLICT",
        PortError::Internal { .. } => "INTERNAL",
    }
}

/// Builds a reqwest client with the integration's timeout
pub(crate) fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}
