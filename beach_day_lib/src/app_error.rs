use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::{beach_day_error::BeachDayError, scripts::ScriptError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] BeachDayError),

    #[error("Problem running script.")]
    Script(#[from] ScriptError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Domain(error) => match error {
                BeachDayError::InvalidRequest => StatusCode::BAD_REQUEST,
                BeachDayError::InvalidToken | BeachDayError::IncorrectPassword => {
                    StatusCode::UNAUTHORIZED
                }
                BeachDayError::UserDoesntOwnNotification | BeachDayError::UserDoesntOwnEvent => {
                    StatusCode::FORBIDDEN
                }
                BeachDayError::UserNotFound
                | BeachDayError::BeachNotFound
                | BeachDayError::BeachNotPresent
                | BeachDayError::ZeroNotifications
                | BeachDayError::ZeroEvents => StatusCode::NOT_FOUND,
                BeachDayError::UserAlreadyExists
                | BeachDayError::EmailAlreadyInUse
                | BeachDayError::BeachAlreadyFavorited => StatusCode::CONFLICT,
                BeachDayError::ProblemWithDb => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Script(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        let domain = BeachDayError::from_anyhow(&error);
        if domain == BeachDayError::ProblemWithDb {
            tracing::error!("storage failure: {error:#}");
        }
        AppError::Domain(domain)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("rejected body: {rejection}");
        AppError::Domain(BeachDayError::InvalidRequest)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Script(error) = &self {
            tracing::error!("{error}");
        }
        (self.status(), Json(json!({ "message": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        let cases = [
            (BeachDayError::InvalidRequest, StatusCode::BAD_REQUEST),
            (BeachDayError::InvalidToken, StatusCode::UNAUTHORIZED),
            (BeachDayError::UserDoesntOwnEvent, StatusCode::FORBIDDEN),
            (BeachDayError::ZeroEvents, StatusCode::NOT_FOUND),
            (BeachDayError::UserAlreadyExists, StatusCode::CONFLICT),
            (BeachDayError::EmailAlreadyInUse, StatusCode::CONFLICT),
            (BeachDayError::ProblemWithDb, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(AppError::from(error).status(), status);
        }
    }

    #[test]
    fn unexpected_errors_become_database_problems() {
        let error = AppError::from(anyhow::anyhow!("connection refused"));
        assert!(matches!(error, AppError::Domain(BeachDayError::ProblemWithDb)));
        assert_eq!(error.to_string(), "Trouble accessing database.");
    }
}
