use thiserror::Error;

pub type Result<T> = std::result::Result<T, DataForSeoError>;

#[derive(Debug, Error)]
pub enum DataForSeoError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Application-level status inside a 200 response (anything but 20000).
    #[error("Task error (code {code}): {message}")]
    Status { code: u32, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl DataForSeoError {
    /// Timeouts, connection failures, 429 and 5xx are worth retrying.
    /// Everything else will fail the same way on the next attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            DataForSeoError::Network(_) | DataForSeoError::Timeout(_) => true,
            DataForSeoError::Api { status, .. } => *status == 429 || (500..600).contains(status),
            DataForSeoError::Status { .. } | DataForSeoError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for DataForSeoError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DataForSeoError::Timeout(err.to_string())
        } else if err.is_decode() {
            DataForSeoError::Parse(err.to_string())
        } else {
            DataForSeoError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DataForSeoError {
    fn from(err: serde_json::Error) -> Self {
        DataForSeoError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_server_errors_are_transient() {
        for status in [429, 500, 502, 503, 504] {
            let err = DataForSeoError::Api {
                status,
                message: String::new(),
            };
            assert!(err.is_transient(), "status {status} should be transient");
        }
    }

    #[test]
    fn client_errors_and_bad_payloads_are_permanent() {
        let unauthorized = DataForSeoError::Api {
            status: 401,
            message: "bad credentials".into(),
        };
        assert!(!unauthorized.is_transient());
        assert!(!DataForSeoError::Parse("eof".into()).is_transient());
        assert!(!DataForSeoError::Status {
            code: 40501,
            message: "Invalid Field".into()
        }
        .is_transient());
    }

    #[test]
    fn network_failures_are_transient() {
        assert!(DataForSeoError::Network("connection reset".into()).is_transient());
        assert!(DataForSeoError::Timeout("30s".into()).is_transient());
    }
}
