//! `POST /api/login`: credential exchange over HTTP.
//!
//! | outcome              | status | body                               |
//! |----------------------|--------|------------------------------------|
//! | credentials match    | 200    | `{"token": "<jwt>"}`               |
//! | no match             | 401    | `{"error": "Invalid credentials"}` |
//! | unreadable body      | 401    | `{"error": "Invalid credentials"}` |
//! | store/signing failed | 500    | `{"error": "Server error"}`        |

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tether_auth::{ExchangeError, exchange};
use tether_core::Identity;
use tracing::{debug, error, info, instrument};

use crate::metrics::LOGIN_TOTAL;
use crate::server::AppState;

/// Login request body. Absent fields are treated as empty and never match.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    /// Account email (the identity).
    pub email: String,
    /// Plaintext secret.
    pub password: String,
}

/// Successful login body.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Signed session token.
    pub token: String,
}

/// Error body for 401 and 500.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Generic message; never says which part of the credentials failed.
    pub error: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_owned(),
        }),
    )
        .into_response()
}

/// POST /api/login
#[instrument(skip_all)]
pub async fn login_handler(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    // A body that is not JSON carries no credentials, so it fails like one
    // with empty fields.
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!(error = %rejection, "login body rejected");
            metrics::counter!(LOGIN_TOTAL, "result" => "invalid").increment(1);
            return error_response(StatusCode::UNAUTHORIZED, "Invalid credentials");
        }
    };
    let identity = Identity::new(request.email);
    let result = exchange(
        state.gateway.store().as_ref(),
        state.gateway.issuer().as_ref(),
        &identity,
        &request.password,
    )
    .await;

    match result {
        Ok(issued) => {
            info!(identity = %identity, expires_at = %issued.expires_at, "login succeeded");
            metrics::counter!(LOGIN_TOTAL, "result" => "ok").increment(1);
            (StatusCode::OK, Json(LoginResponse { token: issued.token })).into_response()
        }
        Err(ExchangeError::InvalidCredentials) => {
            info!(identity = %identity, "login rejected");
            metrics::counter!(LOGIN_TOTAL, "result" => "invalid").increment(1);
            error_response(StatusCode::UNAUTHORIZED, "Invalid credentials")
        }
        Err(e) => {
            error!(error = %e, "login failed");
            metrics::counter!(LOGIN_TOTAL, "result" => "error").increment(1);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
        }
    }
}
