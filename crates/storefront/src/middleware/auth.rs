//! Authentication extractors.
//!
//! The session holds a [`CurrentUser`]; these extractors turn it into the
//! closed [`Identity`] union that the access rules match on.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use florist_core::UserId;
use florist_core::access::Identity;

use crate::error::AppError;
use crate::models::{CurrentUser, keys};

/// The identity behind a request; [`Identity::Anonymous`] without a login.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(CurrentIdentity(identity): CurrentIdentity) -> impl IntoResponse {
///     identity.require_authenticated()?;
///     // ...
/// }
/// ```
pub struct CurrentIdentity(pub Identity);

impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = match parts.extensions.get::<Session>() {
            Some(session) => session
                .get::<CurrentUser>(keys::CURRENT_USER)
                .await
                .ok()
                .flatten(),
            None => None,
        };

        Ok(Self(user.map_or(Identity::Anonymous, |u| u.identity())))
    }
}

/// Extractor that requires an administrator.
///
/// Rejects with 401 `AUTH_REQUIRED` when anonymous and 403
/// `UNAUTHORIZED_ACCESS` for any other role.
pub struct RequireAdmin(pub UserId);

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(CurrentIdentity(identity)) = CurrentIdentity::from_request_parts(parts, state).await;
        let user_id = identity.require_admin()?;
        Ok(Self(user_id))
    }
}

/// Extractor that requires a corporate account.
pub struct RequireCorporate(pub UserId);

impl<S> FromRequestParts<S> for RequireCorporate
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(CurrentIdentity(identity)) = CurrentIdentity::from_request_parts(parts, state).await;
        let user_id = identity.require_corporate()?;
        Ok(Self(user_id))
    }
}

/// Helper to set the current user in the session.
///
/// Cycles the session id first so a pre-login id cannot be reused.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(keys::CURRENT_USER, user).await
}

/// Helper to clear the current user from the session (logout).
///
/// The cart goes with it.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{Router, body::Body, http::Request, http::StatusCode, routing::get};
    use tower::ServiceExt;
    use tower_sessions::{MemoryStore, SessionManagerLayer};

    use super::*;

    async fn whoami(CurrentIdentity(identity): CurrentIdentity) -> String {
        match identity {
            Identity::Anonymous => "anonymous".to_owned(),
            other => other.user_id().map(|id| id.to_string()).unwrap_or_default(),
        }
    }

    async fn admin_only(RequireAdmin(id): RequireAdmin) -> String {
        id.to_string()
    }

    fn app() -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .route("/admin", get(admin_only))
            .layer(SessionManagerLayer::new(MemoryStore::default()))
    }

    #[tokio::test]
    async fn test_anonymous_without_session_cookie() {
        let response = app()
            .oneshot(Request::get("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"anonymous");
    }

    #[tokio::test]
    async fn test_require_admin_rejects_anonymous() {
        let response = app()
            .oneshot(Request::get("/admin").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_session_layer_is_anonymous() {
        let app = Router::new().route("/whoami", get(whoami));
        let response = app
            .oneshot(Request::get("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
