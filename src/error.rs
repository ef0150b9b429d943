use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

/// Every failure the token lifecycle can report.
///
/// The first group are expected outcomes of the authorization flow and are
/// returned as values; callers map them to user-facing messages with
/// [`AuthError::reason`]. The infrastructure variants are fatal for the
/// enclosing operation.
#[derive(Debug, ThisError)]
pub enum AuthError {
    #[error("invalid OAuth state")]
    InvalidState,

    #[error("OAuth state expired")]
    ExpiredState,

    #[error("authorization code exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("userinfo lookup failed: {0}")]
    UserInfoFailed(String),

    #[error("Google account already linked to another user")]
    IdentityAlreadyLinked,

    #[error("user is not an active admin")]
    NotAuthorized,

    #[error("no Google credential stored for user")]
    NoCredential,

    #[error("Google authorization must be repeated")]
    ReauthorizationRequired,

    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl AuthError {
    /// Human readable reason shown to the admin.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::InvalidState => "Invalid authorization request. Please start again.",
            AuthError::ExpiredState => "Authorization request expired. Please start again.",
            AuthError::ExchangeFailed(_) => {
                "Google did not accept the authorization code. Please try again."
            }
            AuthError::UserInfoFailed(_) => {
                "Failed to get user information from Google. Please try again."
            }
            AuthError::IdentityAlreadyLinked => {
                "This Google account is already connected to another user. Each user must use their own Google account."
            }
            AuthError::NotAuthorized => "Only administrators can connect Google Drive.",
            AuthError::NoCredential => "Google Drive is not connected for this user.",
            AuthError::ReauthorizationRequired => {
                "Google Drive access has expired. Please connect your Google account again."
            }
            AuthError::Transient(_) => "Google is temporarily unavailable. Please try again.",
            AuthError::Database(_) | AuthError::Json(_) | AuthError::UrlParse(_) => {
                "An internal server error occurred."
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidState => "INVALID_STATE",
            AuthError::ExpiredState => "EXPIRED_STATE",
            AuthError::ExchangeFailed(_) => "EXCHANGE_FAILED",
            AuthError::UserInfoFailed(_) => "USERINFO_FAILED",
            AuthError::IdentityAlreadyLinked => "IDENTITY_ALREADY_LINKED",
            AuthError::NotAuthorized => "NOT_AUTHORIZED",
            AuthError::NoCredential => "NO_CREDENTIAL",
            AuthError::ReauthorizationRequired => "REAUTHORIZATION_REQUIRED",
            AuthError::Transient(_) => "BAD_GATEWAY",
            AuthError::Database(_) | AuthError::Json(_) | AuthError::UrlParse(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidState | AuthError::ExpiredState => StatusCode::BAD_REQUEST,
            AuthError::ExchangeFailed(_)
            | AuthError::UserInfoFailed(_)
            | AuthError::ReauthorizationRequired => StatusCode::UNAUTHORIZED,
            AuthError::NotAuthorized => StatusCode::FORBIDDEN,
            AuthError::NoCredential => StatusCode::NOT_FOUND,
            AuthError::IdentityAlreadyLinked => StatusCode::CONFLICT,
            AuthError::Transient(_) => StatusCode::BAD_GATEWAY,
            AuthError::Database(_) | AuthError::Json(_) | AuthError::UrlParse(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Infrastructure failures that must abort a whole batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AuthError::Database(_))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        let body = ApiErrorBody {
            code: self.code().to_string(),
            message: self.reason().to_string(),
        };
        (self.status(), Json(ApiErrorResponse { error: body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}
