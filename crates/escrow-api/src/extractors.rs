//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs and helpers that map
//! extractor rejections to [`AppError::BadRequest`] so every failure uses
//! the JSON error body.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::Json;

use crate::error::AppError;

/// Trait for request types that can validate their business rules
/// beyond what serde deserialization checks.
pub trait Validate {
    /// Validate business rules. Returns an error message on failure.
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

/// Extract query parameters, mapping parse errors to [`AppError::BadRequest`].
pub fn extract_query<T>(result: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    result
        .map(|Query(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Amount(i64);

    impl Validate for Amount {
        fn validate(&self) -> Result<(), String> {
            if self.0 < 0 {
                return Err("amount must not be negative".into());
            }
            Ok(())
        }
    }

    #[test]
    fn validated_json_passes_valid_body() {
        let value = extract_validated_json(Ok(Json(Amount(5)))).unwrap();
        assert_eq!(value.0, 5);
    }

    #[test]
    fn validated_json_reports_rule_violation() {
        let err = extract_validated_json(Ok(Json(Amount(-1)))).err().unwrap();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("negative")));
    }
}
