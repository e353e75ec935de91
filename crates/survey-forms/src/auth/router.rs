use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::header::AUTHORIZATION,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};

use super::{AdminUser, AuthError, AuthService, LoginRequest};

/// `/api/admin/auth` endpoints. Login is open; `me` requires a bearer token.
pub fn auth_router(auth: AuthService) -> Router {
    let protected = Router::new()
        .route("/api/admin/auth/me", get(me_handler))
        .route_layer(middleware::from_fn_with_state(auth.clone(), require_admin));

    Router::new()
        .route("/api/admin/auth/login", post(login_handler))
        .with_state(auth)
        .merge(protected)
}

/// Rejects requests without a valid bearer token and exposes the admin to
/// handlers as an `Extension<AdminUser>`.
pub async fn require_admin(
    State(auth): State<AuthService>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    let Some(token) = token else {
        return AuthError::MissingToken.into_response();
    };

    match auth.authenticate(token) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn login_handler(
    State(auth): State<AuthService>,
    request: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return AuthError::from(rejection).into_response(),
    };
    match auth.login(&request) {
        Ok(login) => Json(login).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn me_handler(Extension(user): Extension<AdminUser>) -> Json<AdminUser> {
    Json(user)
}
