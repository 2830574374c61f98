//! Authentication route handlers.
//!
//! Accounts are created by operators (`florist user create`); the API only
//! logs existing users in and out.

use axum::{Router, extract::State, routing::{get, post}};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use florist_core::access::Identity;

use crate::error::{clear_sentry_user, set_sentry_user};
use crate::middleware::{CurrentIdentity, auth_rate_limiter, clear_current_user, set_current_user};
use crate::models::{CurrentUser, User};
use crate::routes::{ApiJson, ApiResponse, ApiResult};
use crate::services::auth::AuthService;
use crate::state::AppState;

/// Build the auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login).layer(auth_rate_limiter()))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

/// Login request body.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response to `/me`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub authenticated: bool,
    pub identity: Identity,
}

/// Acknowledgement for logout.
#[derive(Debug, Serialize)]
pub struct LoggedOut {
    pub logged_out: bool,
}

/// POST /api/auth/login
#[instrument(skip(state, session, body), fields(email = %body.email))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    ApiJson(body): ApiJson<LoginRequest>,
) -> ApiResult<User> {
    let user = AuthService::new(state.pool())
        .login_with_password(&body.email, &body.password)
        .await
        .inspect_err(|_| tracing::info!("Login rejected"))?;

    set_current_user(&session, &CurrentUser::from(&user)).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    tracing::info!(user_id = %user.id, account = %user.account_type, "User logged in");

    Ok(ApiResponse::ok(user))
}

/// POST /api/auth/logout
#[instrument(skip(session))]
pub async fn logout(session: Session) -> ApiResult<LoggedOut> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(ApiResponse::ok(LoggedOut { logged_out: true }))
}

/// GET /api/auth/me
pub async fn me(CurrentIdentity(identity): CurrentIdentity) -> ApiResult<MeResponse> {
    Ok(ApiResponse::ok(MeResponse {
        authenticated: !matches!(identity, Identity::Anonymous),
        identity,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{body::Body, http::Request, http::StatusCode};

    use crate::routes::test_support::{json_body, send};

    #[tokio::test]
    async fn test_me_is_anonymous_without_login() {
        let response = send(Request::get("/api/auth/me").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["authenticated"], false);
        assert_eq!(body["data"]["identity"]["role"], "anonymous");
    }

    #[tokio::test]
    async fn test_logout_without_session_succeeds() {
        let response = send(
            Request::post("/api/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["data"]["logged_out"], true);
    }
}
