use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::Serialize;
use std::collections::BTreeMap;

/// Caller-facing failures. Everything here is an input or authorization
/// problem and is surfaced directly as a response status; nothing is retried.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Bad, missing or duplicate input. Carries field-level messages.
    Validation(BTreeMap<String, Vec<String>>),
    /// Authenticated but not authorized.
    Forbidden(String),
    /// The referenced id does not resolve, or resolves outside the caller's
    /// visible set.
    NotFound(String),
}

impl ApiError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field.to_string(), vec![message.into()]);
        ApiError::Validation(errors)
    }

    pub fn invalid_choice(field: &str, choices_display: String) -> Self {
        Self::field(
            field,
            format!("Invalid value. Valid choices are: {}", choices_display),
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn into_response(self) -> Result<Response<Body>, Error> {
        let status = self.status();
        let body = match self {
            ApiError::Validation(fields) => serde_json::json!({
                "error": "ValidationError",
                "fields": fields,
            }),
            ApiError::Forbidden(message) => serde_json::json!({
                "error": "PermissionDenied",
                "message": message,
            }),
            ApiError::NotFound(message) => serde_json::json!({
                "error": "NotFound",
                "message": message,
            }),
        };
        json_response(status, &body)
    }
}

/// Merge field errors from several validations into one 400 payload.
pub fn merge_field_errors(errors: Vec<ApiError>) -> Option<ApiError> {
    let mut merged: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for error in errors {
        if let ApiError::Validation(fields) = error {
            for (field, mut messages) in fields {
                merged.entry(field).or_default().append(&mut messages);
            }
        }
    }
    if merged.is_empty() {
        None
    } else {
        Some(ApiError::Validation(merged))
    }
}

pub fn json_response<T: Serialize>(
    status: StatusCode,
    body: &T,
) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(body)?.into())
        .map_err(Box::new)?)
}

pub fn no_content() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .body(Body::Empty)
        .map_err(Box::new)?)
}

pub fn bad_request(message: impl Into<String>) -> Result<Response<Body>, Error> {
    json_response(
        StatusCode::BAD_REQUEST,
        &serde_json::json!({"error": "InvalidRequest", "message": message.into()}),
    )
}

pub fn not_found(message: impl Into<String>) -> Result<Response<Body>, Error> {
    ApiError::NotFound(message.into()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_400_with_fields() {
        let error = ApiError::field("email", "A user with this email address already exists.");
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        let response = error.into_response().unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = match response.body() {
            Body::Text(text) => serde_json::from_str(text).unwrap(),
            other => panic!("unexpected body: {:?}", other),
        };
        assert_eq!(body["error"], "ValidationError");
        assert_eq!(
            body["fields"]["email"][0],
            "A user with this email address already exists."
        );
    }

    #[test]
    fn permission_and_not_found_statuses() {
        assert_eq!(
            ApiError::Forbidden("no".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("gone".into()).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn invalid_choice_names_the_valid_set() {
        let error = ApiError::invalid_choice("type", "BE (Back-end), FE (Front-end)".to_string());
        match error {
            ApiError::Validation(fields) => {
                assert!(fields["type"][0].contains("BE (Back-end)"));
                assert!(fields["type"][0].starts_with("Invalid value"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn merge_collects_messages_per_field() {
        let merged = merge_field_errors(vec![
            ApiError::field("tag", "bad tag"),
            ApiError::field("priority", "bad priority"),
            ApiError::field("tag", "still bad"),
        ])
        .unwrap();
        match merged {
            ApiError::Validation(fields) => {
                assert_eq!(fields["tag"].len(), 2);
                assert_eq!(fields["priority"].len(), 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(merge_field_errors(vec![]).is_none());
    }
}
