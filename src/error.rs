use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request context is missing the namespace or the caller identity
    #[error("{0}")]
    BadRequest(String),

    /// The authorizer did not allow the request
    #[error("{resource} \"{name}\" is forbidden: {reason}")]
    Forbidden {
        resource: String,
        name: String,
        reason: String,
    },

    #[error("{resource} \"{name}\" not found")]
    NotFound { resource: String, name: String },

    /// No decision could be made; this is not a denial
    #[error("internal error: {0}")]
    Internal(String),

    /// Any other backing store failure
    #[error("backing store error: {0}")]
    Upstream(#[source] kube::Error),

    #[error("request cancelled")]
    Cancelled,
}

impl Error {
    pub fn forbidden(resource: &str, name: &str, reason: impl Into<String>) -> Self {
        Error::Forbidden {
            resource: resource.to_owned(),
            name: name.to_owned(),
            reason: reason.into(),
        }
    }

    pub fn not_found(resource: &str, name: &str) -> Self {
        Error::NotFound {
            resource: resource.to_owned(),
            name: name.to_owned(),
        }
    }

    /// HTTP status code, `Status.reason` and the message exposed to callers.
    pub fn status_parts(&self) -> (StatusCode, String, String) {
        match self {
            Error::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest".into(), self.to_string()),
            Error::Forbidden { .. } => (StatusCode::FORBIDDEN, "Forbidden".into(), self.to_string()),
            Error::NotFound { .. } => (StatusCode::NOT_FOUND, "NotFound".into(), self.to_string()),
            Error::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalError".into(),
                "Internal error occurred: unable to complete the request".into(),
            ),
            Error::Upstream(kube::Error::Api(resp)) => (
                StatusCode::from_u16(resp.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                resp.reason.clone(),
                resp.message.clone(),
            ),
            Error::Upstream(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalError".into(),
                "Internal error occurred: backing store unavailable".into(),
            ),
            Error::Cancelled => (StatusCode::GATEWAY_TIMEOUT, "Timeout".into(), self.to_string()),
        }
    }

    fn details(&self) -> serde_json::Value {
        match self {
            Error::Forbidden { resource, name, .. } | Error::NotFound { resource, name } => {
                serde_json::json!({ "name": name, "kind": resource })
            }
            _ => serde_json::Value::Null,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, reason, message) = self.status_parts();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let mut body = serde_json::json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": message,
            "reason": reason,
            "code": status.as_u16()
        });
        let details = self.details();
        if !details.is_null() {
            body["details"] = details;
        }

        (status, axum::Json(body)).into_response()
    }
}
