use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::error::CallError;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct TextRequest {
    pub(crate) text: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct StyleRequest {
    pub(crate) text: String,
    pub(crate) style: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

#[derive(Debug)]
pub(crate) struct ServerError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ServerError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        let status = match err.downcast_ref::<CallError>() {
            Some(CallError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Some(CallError::Unavailable { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            Some(CallError::Rejected { .. }) | Some(CallError::Parse(_)) => {
                StatusCode::BAD_GATEWAY
            }
            None => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: format!("{:#}", err),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_errors_map_to_gateway_statuses() {
        let cases = [
            (CallError::Timeout { attempts: 3 }, StatusCode::GATEWAY_TIMEOUT),
            (
                CallError::Unavailable {
                    attempts: 3,
                    message: "overloaded".to_string(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (CallError::parse("no tool call"), StatusCode::BAD_GATEWAY),
            (
                CallError::Rejected {
                    status: 403,
                    message: "key".to_string(),
                },
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, expected) in cases {
            let err = anyhow::Error::new(err).context("slang lookup");
            assert_eq!(ServerError::from(err).status, expected);
        }
    }

    #[test]
    fn other_errors_are_internal() {
        let err = ServerError::from(anyhow::anyhow!("disk on fire"));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "disk on fire");
    }
}
