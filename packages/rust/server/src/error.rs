use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use sitechat_shared::SiteChatError;

/// A [`SiteChatError`] rendered as `{error, kind}` with a matching status.
#[derive(Debug)]
pub(crate) struct ApiError(pub SiteChatError);

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            SiteChatError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            SiteChatError::Provider(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SiteChatError> for ApiError {
    fn from(error: SiteChatError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.0.kind(), error = %self.0, "request failed");
        } else {
            tracing::debug!(kind = self.0.kind(), error = %self.0, "request rejected");
        }

        let body = ErrorBody {
            error: self.0.to_string(),
            kind: self.0.kind(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(
            ApiError(SiteChatError::invalid_input("x")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(SiteChatError::Provider("x".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError(SiteChatError::HarvesterUnavailable("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
