use crate::clients::{ClientError, Service};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Required settings are missing (gateway credentials, table ids, default instance)
    #[error("Not configured: {what}")]
    NotConfigured { what: String },

    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// One of the external backends failed
    #[error(transparent)]
    Upstream(#[from] ClientError),

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn not_configured(what: impl Into<String>) -> Self {
        Error::NotConfigured { what: what.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest { message: message.into() }
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotConfigured { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::NotConfigured { what } => format!("Not configured: {what}"),
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::Upstream(client_err) => {
                let service = client_err.service();
                match client_err {
                    ClientError::Transport { .. } => format!("The {service} could not be reached. Please try again later."),
                    ClientError::Status { status: 401 | 403, .. } => match service {
                        Service::Gateway => "The messaging gateway rejected the configured API key".to_string(),
                        Service::TableStore => "The table store rejected the configured token".to_string(),
                    },
                    ClientError::Status { status: 404, .. } => format!("The {service} does not know the requested resource"),
                    err if err.is_transient() => format!("The {service} is temporarily unavailable. Please try again later."),
                    ClientError::Status { .. } => format!("The {service} rejected the request"),
                    ClientError::Decode { .. } => format!("The {service} returned an unexpected response"),
                    ClientError::InvalidUrl { .. } => format!("The {service} URL is invalid"),
                }
            }
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
        }
    }

    /// A machine-readable code front ends can switch on instead of parsing messages.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotConfigured { .. } => "not_configured",
            Error::BadRequest { .. } => "bad_request",
            Error::NotFound { .. } => "not_found",
            Error::Upstream(err) if err.is_transient() => "upstream_unavailable",
            Error::Upstream(_) => "upstream_rejected",
            Error::Internal { .. } | Error::Other(_) => "internal",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Upstream(_) => {
                tracing::warn!("Upstream error: {}", self);
            }
            Error::NotConfigured { .. } => {
                tracing::info!("Configuration missing: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let body = json!({
            "code": self.code(),
            "message": self.user_message(),
        });
        (status, axum::response::Json(body)).into_response()
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::not_configured("gateway").status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(Error::bad_request("nope").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::not_found("Instance", "3").status_code(), StatusCode::NOT_FOUND);
        let upstream = Error::Upstream(ClientError::Status {
            service: Service::Gateway,
            status: 500,
            body: "boom".into(),
        });
        assert_eq!(upstream.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(upstream.code(), "upstream_unavailable");
    }

    #[test]
    fn test_upstream_messages_do_not_leak_bodies() {
        let err = Error::Upstream(ClientError::Status {
            service: Service::Gateway,
            status: 401,
            body: "internal token dump".into(),
        });
        let message = err.user_message();
        assert_eq!(message, "The messaging gateway rejected the configured API key");
        assert!(!message.contains("token dump"));
        assert_eq!(err.code(), "upstream_rejected");

        let err = Error::Upstream(ClientError::Decode {
            service: Service::TableStore,
            message: "missing field `id`".into(),
        });
        assert_eq!(err.user_message(), "The table store returned an unexpected response");
    }
}
