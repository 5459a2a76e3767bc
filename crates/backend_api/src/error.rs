use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Product not found")]
    ProductNotFound,

    #[error("A product with code {code} and identification code {identification_code} already exists")]
    DuplicateProduct {
        code: String,
        identification_code: String,
    },

    #[error("{0}")]
    NoValidRows(String),

    #[error("User not found")]
    UserNotFound,

    #[error("A user with email {0} already exists")]
    UserExists(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Admin role required")]
    Forbidden,

    #[error("Email must use the {0} domain")]
    InvalidEmailDomain(&'static str),

    #[error("Password is too weak: {0}")]
    WeakPassword(String),

    #[error("Image is too large ({size} bytes, maximum {max})")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Unsupported image type: {0}")]
    InvalidImageType(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::ProductNotFound | ApiError::UserNotFound => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            ApiError::DuplicateProduct { .. } | ApiError::UserExists(_) => {
                (StatusCode::CONFLICT, self.to_string())
            }
            ApiError::NoValidRows(_)
            | ApiError::InvalidEmailDomain(_)
            | ApiError::WeakPassword(_)
            | ApiError::ImageTooLarge { .. }
            | ApiError::InvalidImageType(_)
            | ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::IoError(_) | ApiError::JsonError(_) | ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<importer::ImportError> for ApiError {
    fn from(err: importer::ImportError) -> Self {
        match err {
            importer::ImportError::NoValidRows => ApiError::NoValidRows(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}
