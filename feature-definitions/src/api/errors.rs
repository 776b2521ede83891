use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

use crate::encryption::CryptoError;
use crate::features::feature_operations::FeatureOperationError;
use crate::store::StoreError;

/// Body returned for every failed request
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum FlagError {
    #[error("Missing API key in request")]
    MissingApiKey,
    #[error("Invalid API key")]
    InvalidApiKey,
    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),
    #[error("Missing organization in request")]
    MissingOrganization,
    #[error("failed to parse request: {0}")]
    RequestParsingError(#[from] serde_json::Error),
    #[error(transparent)]
    Operation(#[from] FeatureOperationError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("SDK connection has no encryption key")]
    MissingEncryptionKey,
    #[error(transparent)]
    Encryption(#[from] CryptoError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlagError {
    fn error_metadata(&self) -> (&'static str, u16) {
        match self {
            FlagError::MissingApiKey => ("missing_api_key", 400),
            FlagError::InvalidApiKey => ("invalid_api_key", 401),
            FlagError::UnknownEnvironment(_) => ("unknown_environment", 400),
            FlagError::MissingOrganization => ("missing_organization", 400),
            FlagError::RequestParsingError(_) => ("request_parsing_error", 400),

            FlagError::Operation(err) => match err {
                FeatureOperationError::Validation(_) => ("validation_error", 400),
                FeatureOperationError::FeatureNotFound(_) => ("feature_not_found", 404),
                FeatureOperationError::OrganizationNotFound(_) => ("organization_not_found", 404),
                FeatureOperationError::DraftConflict => ("draft_conflict", 409),
                FeatureOperationError::Store(_) => ("store_unavailable", 503),
            },

            FlagError::Store(_) => ("store_unavailable", 503),

            FlagError::MissingEncryptionKey | FlagError::Encryption(_) => {
                ("encryption_error", 500)
            }
            FlagError::Internal(_) => ("internal_error", 500),
        }
    }

    /// Returns a short error code for logs and metrics.
    pub fn error_code(&self) -> &'static str {
        self.error_metadata().0
    }

    pub fn status_code(&self) -> u16 {
        self.error_metadata().1
    }

    pub fn is_5xx(&self) -> bool {
        self.status_code() >= 500
    }
}

impl IntoResponse for FlagError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = if self.is_5xx() {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
            match self {
                FlagError::Store(_) | FlagError::Operation(FeatureOperationError::Store(_)) => {
                    "Service is currently unavailable. Please try again later.".to_string()
                }
                _ => "An internal server error occurred. Please try again later.".to_string(),
            }
        } else {
            tracing::debug!(error = %self, code = self.error_code(), "request rejected");
            self.to_string()
        };

        (
            status,
            Json(ErrorResponse {
                status: status.as_u16(),
                message,
            }),
        )
            .into_response()
    }
}
