use std::collections::BTreeMap;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

#[derive(Serialize)]
struct ErrorResponse {
    reason: &'static str,
    code: u32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<BTreeMap<String, Vec<String>>>,
}

/// Errors surfaced by HTTP handlers
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("Validation failed")]
    Validation(BTreeMap<String, Vec<String>>),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Access denied")]
    Forbidden,

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(what: &str, id: i64) -> Self {
        Self::NotFound(format!("{what} {id} not found."))
    }

    fn reason(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) | Self::Validation(_) => "ERR_INVALID_ARGUMENT",
            Self::InvalidState(_) => "ERR_INVALID_STATE",
            Self::NotFound(_) => "ERR_NOT_FOUND",
            Self::Unauthorized(_) => "ERR_UNAUTHORIZED",
            Self::Database(_) => "ERR_EXTERNAL",
            Self::Internal(_) => "ERR_INTERNAL",
            Self::Forbidden => "ERR_FORBIDDEN",
            Self::Conflict(_) => "ERR_CONFLICT",
        }
    }

    fn code(&self) -> u32 {
        match self {
            Self::InvalidArgument(_) | Self::Validation(_) => 1,
            Self::InvalidState(_) => 2,
            Self::NotFound(_) => 3,
            Self::Unauthorized(_) => 4,
            Self::Database(_) => 5,
            Self::Internal(_) => 6,
            Self::Forbidden => 7,
            Self::Conflict(_) => 8,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) | Self::Validation(_) | Self::InvalidState(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            Self::Database(e) => {
                log::error!("Database error: {e}");
                "A database error occurred".to_string()
            }
            Self::Internal(msg) => {
                log::error!("Internal error: {msg}");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let fields = match self {
            Self::Validation(fields) => Some(fields.clone()),
            _ => None,
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            reason: self.reason(),
            code: self.code(),
            message,
            fields,
        })
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let messages = errs
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();
        Self::Validation(fields)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        Self::Internal(format!("{error:#}"))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
