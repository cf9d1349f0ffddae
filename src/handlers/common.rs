use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::errors::ServiceError;

/// JSON body that is deserialized strictly and validated before the
/// handler runs. Malformed bodies, unknown fields and unknown enum values
/// are validation errors (400) rather than axum's plain-text rejections.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ServiceError::ValidationError(rejection.body_text()))?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// Like [`ValidatedJson`] but an empty body yields `T::default()`, for
/// commands whose every field is optional.
#[derive(Debug, Clone, Default)]
pub struct OptionalJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned + Validate + Default,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| ServiceError::ValidationError(rejection.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(OptionalJson(T::default()));
        }
        let value: T = serde_json::from_slice(&bytes)
            .map_err(|e| ServiceError::ValidationError(format!("invalid JSON body: {}", e)))?;
        value.validate()?;
        Ok(OptionalJson(value))
    }
}

/// Query string counterpart of [`ValidatedJson`], without a `Validate` bound.
#[derive(Debug, Clone, Default)]
pub struct StrictQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for StrictQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ServiceError::ValidationError(rejection.body_text()))?;
        Ok(StrictQuery(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::lineage::{CompleteLotRequest, ListLotsQuery};
    use assert_matches::assert_matches;
    use axum::{body::Body, http::Request as HttpRequest};

    fn json_request(body: &'static str) -> Request {
        HttpRequest::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_fields_are_validation_errors() {
        let result =
            ValidatedJson::<CompleteLotRequest>::from_request(json_request(r#"{"why":"x"}"#), &())
                .await;
        assert_matches!(result, Err(ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn validator_rules_run_after_deserialization() {
        let long = Box::leak(format!(r#"{{"reason":"{}"}}"#, "x".repeat(501)).into_boxed_str());
        let result =
            ValidatedJson::<CompleteLotRequest>::from_request(json_request(long), &()).await;
        assert_matches!(result, Err(ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn empty_optional_body_defaults() {
        let OptionalJson(request) =
            OptionalJson::<CompleteLotRequest>::from_request(json_request(""), &())
                .await
                .unwrap();
        assert!(request.reason.is_none());

        let result =
            OptionalJson::<CompleteLotRequest>::from_request(json_request(r#"{"x":1}"#), &()).await;
        assert_matches!(result, Err(ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn bad_query_values_are_validation_errors() {
        let (mut parts, _) = HttpRequest::builder()
            .uri("/lots?phase=BOILING")
            .body(())
            .unwrap()
            .into_parts();
        let result = StrictQuery::<ListLotsQuery>::from_request_parts(&mut parts, &()).await;
        assert_matches!(result, Err(ServiceError::ValidationError(_)));
    }
}
