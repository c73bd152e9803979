use crate::error::AppError;
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

/// Structured error body returned by every failing HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub status: u16,
    pub code: String,
}

// Map domain errors to HTTP responses
pub fn map_error(err: &AppError) -> (StatusCode, ErrorBody) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let error = match status {
        StatusCode::BAD_REQUEST => "Bad Request",
        StatusCode::UNAUTHORIZED => "Unauthorized",
        StatusCode::FORBIDDEN => "Forbidden",
        StatusCode::NOT_FOUND => "Not Found",
        StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
        _ => "Error",
    };

    let body = ErrorBody {
        error: error.to_string(),
        message: err.to_string(),
        status: status.as_u16(),
        code: err.code().to_string(),
    };

    (status, body)
}

pub fn into_response(err: AppError) -> impl IntoResponse {
    let (status, body) = map_error(&err);
    (status, Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_statuses() {
        assert_eq!(map_error(&AppError::Unauthenticated).0, StatusCode::UNAUTHORIZED);
        assert_eq!(map_error(&AppError::Forbidden).0, StatusCode::FORBIDDEN);
        assert_eq!(map_error(&AppError::NotFound).0, StatusCode::NOT_FOUND);
        assert_eq!(
            map_error(&AppError::StorageUnavailable("down".into())).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn body_carries_machine_code() {
        let (_, body) = map_error(&AppError::Forbidden);
        assert_eq!(body.code, "FORBIDDEN");
        assert_eq!(body.status, 403);
    }
}
