use std::time::Duration;

use thiserror::Error;

/// Typed failure modes of a usage fetch. Sources never retry internally;
/// the owning session retries on its next scheduled tick.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no usable credentials: {0}")]
    AuthNotFound(String),
    #[error("unexpected HTTP status {0}")]
    BadResponse(u16),
    #[error("malformed response body: {0}")]
    InvalidBody(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("invalid endpoint: {0}")]
    Config(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidBody(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Validate that a resolved endpoint URL uses HTTPS.
///
/// All providers that allow endpoint overrides must call this before sending
/// credentials, to prevent exfiltration over plain HTTP or other schemes.
pub fn validate_endpoint(url: &str, provider_name: &str) -> Result<(), FetchError> {
    if !url.starts_with("https://") {
        return Err(FetchError::Config(format!(
            "{}: endpoint must use HTTPS, got: {}",
            provider_name, url
        )));
    }
    Ok(())
}

/// HTTP client shared by all sources: short timeout, rustls.
pub fn http_client() -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|e| FetchError::Network(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_endpoint_accepts_https() {
        assert!(validate_endpoint("https://api.example.com/v1", "Test").is_ok());
    }

    #[test]
    fn validate_endpoint_rejects_http() {
        let err = validate_endpoint("http://evil.com", "Test").unwrap_err();
        assert!(matches!(err, FetchError::Config(_)));
        assert!(err.to_string().contains("must use HTTPS"));
    }

    #[test]
    fn validate_endpoint_rejects_empty_and_schemeless() {
        assert!(validate_endpoint("", "Test").is_err());
        assert!(validate_endpoint("api.example.com/v1", "Test").is_err());
        assert!(validate_endpoint("file:///etc/passwd", "Test").is_err());
    }

    #[test]
    fn error_display_is_descriptive() {
        assert_eq!(
            FetchError::BadResponse(503).to_string(),
            "unexpected HTTP status 503"
        );
        assert!(FetchError::AuthNotFound("no cookie".into())
            .to_string()
            .contains("no cookie"));
    }
}
