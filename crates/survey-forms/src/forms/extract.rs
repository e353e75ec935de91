//! Request extractors that report malformed input as `VALIDATION_ERROR`.

use axum::async_trait;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use axum::Json;

use super::error::FormError;

/// JSON body whose rejection renders as a [`FormError::Validation`].
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

/// Query string counterpart of [`ApiJson`].
#[derive(Debug)]
pub struct ApiQuery<T>(pub T);

/// Path parameter counterpart of [`ApiJson`].
#[derive(Debug)]
pub struct ApiPath<T>(pub T);

impl From<JsonRejection> for FormError {
    fn from(rejection: JsonRejection) -> Self {
        FormError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for FormError {
    fn from(rejection: QueryRejection) -> Self {
        FormError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for FormError {
    fn from(rejection: PathRejection) -> Self {
        FormError::Validation(rejection.body_text())
    }
}

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = FormError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(request, state).await?;
        Ok(Self(value))
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = FormError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    S: Send + Sync,
{
    type Rejection = FormError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}
