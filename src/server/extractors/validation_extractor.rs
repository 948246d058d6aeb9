use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use tracing::debug;
use validator::{Validate, ValidationErrors};

use crate::server::error::Error;

/// query string deserialized and run through its `validator` rules
pub struct ValidatedQuery<T>(pub T);

fn first_message(errors: &ValidationErrors) -> String {
    errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "Invalid request parameters".to_string())
}

impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                debug!("Query rejected: {}", rejection.body_text());
                Error::Validation(rejection.body_text())
            })?;

        value
            .validate()
            .map_err(|errors| Error::Validation(first_message(&errors)))?;

        Ok(ValidatedQuery(value))
    }
}
