use std::fmt;
use thiserror::Error;

/// Which external backend a client error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    TableStore,
    Gateway,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::TableStore => f.write_str("table store"),
            Service::Gateway => f.write_str("messaging gateway"),
        }
    }
}

/// Unified error type for both external API clients.
///
/// Callers match on the variant (and [`ClientError::is_transient`]) rather than inspecting the
/// rendered message.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request never produced a response (connect, DNS, TLS, timeout)
    #[error("{service} request failed: {source}")]
    Transport {
        service: Service,
        #[source]
        source: reqwest::Error,
    },

    /// The backend answered with a non-success status
    #[error("{service} returned HTTP {status}: {body}")]
    Status { service: Service, status: u16, body: String },

    /// The response body did not have the expected shape
    #[error("failed to decode {service} response: {message}")]
    Decode { service: Service, message: String },

    /// A request URL could not be built from the configured parts
    #[error("invalid {service} URL: {message}")]
    InvalidUrl { service: Service, message: String },
}

impl ClientError {
    pub fn service(&self) -> Service {
        match self {
            ClientError::Transport { service, .. }
            | ClientError::Status { service, .. }
            | ClientError::Decode { service, .. }
            | ClientError::InvalidUrl { service, .. } => *service,
        }
    }

    /// Transport failures, 5xx and 429 responses may succeed if the same call is made later.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Transport { .. } => true,
            ClientError::Status { status, .. } => *status >= 500 || *status == 429,
            ClientError::Decode { .. } | ClientError::InvalidUrl { .. } => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Status { status: 404, .. })
    }

    pub(crate) fn decode(service: Service, err: impl fmt::Display) -> Self {
        ClientError::Decode {
            service,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ClientError {
        ClientError::Status {
            service: Service::Gateway,
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(400).is_transient());
        assert!(!status(401).is_transient());
        assert!(!ClientError::decode(Service::TableStore, "bad").is_transient());
    }

    #[test]
    fn test_not_found_and_service() {
        assert!(status(404).is_not_found());
        assert!(!status(410).is_not_found());
        assert_eq!(status(404).service(), Service::Gateway);

        let err = ClientError::InvalidUrl {
            service: Service::TableStore,
            message: "relative URL without a base".into(),
        };
        assert_eq!(err.service(), Service::TableStore);
        assert_eq!(err.to_string(), "invalid table store URL: relative URL without a base");
    }
}
