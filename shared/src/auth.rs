use aws_sdk_cognitoidentityprovider::types::{AttributeType, AuthFlowType};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::types::{Put, TransactWriteItem};
use aws_sdk_dynamodb::Client as DynamoClient;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::Deserialize;
use sha2::Sha256;

use crate::ddb;
use crate::error::{self, ApiError};
use crate::types::RegisterRequest;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
    pub email: String,
}

type HmacSha256 = Hmac<Sha256>;

/// SECRET_HASH required by Cognito app clients with a client secret.
fn compute_secret_hash(username: &str, client_id: &str, client_secret: &str) -> String {
    let message = format!("{}{}", username, client_id);
    let mut mac = HmacSha256::new_from_slice(client_secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Field-level checks on a registration payload.
pub fn validate_registration(req: &RegisterRequest) -> Result<(), ApiError> {
    let mut errors = Vec::new();
    if !req.email.contains('@') {
        errors.push(ApiError::field("email", "Enter a valid email address."));
    }
    if req.password != req.password_confirmation {
        errors.push(ApiError::field(
            "password_confirmation",
            "The two password fields do not match.",
        ));
    }
    match error::merge_field_errors(errors) {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Register a new user: sign up in Cognito, then write the profile and the
/// email uniqueness guard in one transaction. Returns the created user id.
pub async fn register(
    cognito_client: &CognitoClient,
    dynamo_client: &DynamoClient,
    table_name: &str,
    client_id: &str,
    client_secret: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: RegisterRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!("Failed to parse registration body: {}", e);
            return error::bad_request(format!("Invalid request body: {}", e));
        }
    };

    if let Err(validation) = validate_registration(&req) {
        return validation.into_response();
    }

    tracing::info!("Registering user: {}", req.email);

    let secret_hash = compute_secret_hash(&req.email, client_id, client_secret);

    let signup_result = cognito_client
        .sign_up()
        .client_id(client_id)
        .username(&req.email)
        .password(&req.password)
        .secret_hash(&secret_hash)
        .user_attributes(
            AttributeType::builder()
                .name("email")
                .value(&req.email)
                .build()?,
        )
        .user_attributes(
            AttributeType::builder()
                .name("given_name")
                .value(&req.first_name)
                .build()?,
        )
        .user_attributes(
            AttributeType::builder()
                .name("family_name")
                .value(&req.last_name)
                .build()?,
        )
        .send()
        .await;

    let user_id = match signup_result {
        Ok(response) => response.user_sub().to_string(),
        Err(e) => {
            let service = e.into_service_error();
            tracing::error!("Cognito signup error: {:?}", service);
            if service.is_username_exists_exception() {
                return ApiError::field(
                    "email",
                    "A user with this email address already exists.",
                )
                .into_response();
            }
            if service.is_invalid_password_exception() {
                return ApiError::field(
                    "password",
                    "Password does not meet the security requirements.",
                )
                .into_response();
            }
            if service.is_invalid_parameter_exception() {
                return error::bad_request("Invalid email or password format");
            }
            return Err(service.into());
        }
    };

    let now = chrono::Utc::now().to_rfc3339();
    let user_pk = format!("USER#{}", user_id);
    let email_pk = format!("EMAIL#{}", req.email);

    let profile_put = Put::builder()
        .table_name(table_name)
        .item("PK", ddb::s(user_pk.clone()))
        .item("SK", ddb::s(user_pk))
        .item("email", ddb::s(req.email.clone()))
        .item("first_name", ddb::s(req.first_name.clone()))
        .item("last_name", ddb::s(req.last_name.clone()))
        .item("created_at", ddb::s(now))
        .build()?;

    // Conditional put on the guard item closes the duplicate-email race at
    // the storage layer.
    let guard_put = Put::builder()
        .table_name(table_name)
        .item("PK", ddb::s(email_pk.clone()))
        .item("SK", ddb::s(email_pk))
        .item("user_id", ddb::s(user_id.clone()))
        .condition_expression("attribute_not_exists(PK)")
        .build()?;

    if let Err(e) = dynamo_client
        .transact_write_items()
        .transact_items(TransactWriteItem::builder().put(profile_put).build())
        .transact_items(TransactWriteItem::builder().put(guard_put).build())
        .send()
        .await
    {
        let service = e.into_service_error();
        if service.is_transaction_canceled_exception() {
            rollback_signup(cognito_client, &req.email, &user_id).await;
            return ApiError::field("email", "A user with this email address already exists.")
                .into_response();
        }
        tracing::error!("Failed to write user profile: {:?}", service);
        rollback_signup(cognito_client, &req.email, &user_id).await;
        return Err(service.into());
    }

    // Auto-confirm so the account is usable straight away. Best effort: the
    // user can still confirm via email if this fails.
    if let Ok(user_pool_id) = std::env::var("COGNITO_USER_POOL_ID") {
        if let Err(e) = cognito_client
            .admin_confirm_sign_up()
            .user_pool_id(&user_pool_id)
            .username(&req.email)
            .send()
            .await
        {
            tracing::error!("Failed to auto-confirm user: {:?}", e);
        }
    } else {
        tracing::warn!("COGNITO_USER_POOL_ID not set; skipping auto-confirm");
    }

    tracing::info!("User registered: {}", user_id);

    error::json_response(
        StatusCode::CREATED,
        &serde_json::json!({ "user_id": user_id }),
    )
}

/// Best-effort removal of a Cognito account whose profile write failed, so
/// the registration can be retried with the same email. Failures leave an
/// orphaned account; the sub is logged so it can be cleaned up by hand.
async fn rollback_signup(cognito_client: &CognitoClient, email: &str, user_id: &str) {
    let Ok(user_pool_id) = std::env::var("COGNITO_USER_POOL_ID") else {
        tracing::error!(
            "Orphaned Cognito account {} ({}): profile write failed and COGNITO_USER_POOL_ID is not set",
            user_id,
            email
        );
        return;
    };

    if let Err(e) = cognito_client
        .admin_delete_user()
        .user_pool_id(&user_pool_id)
        .username(email)
        .send()
        .await
    {
        tracing::error!(
            "Orphaned Cognito account {} ({}): cleanup failed: {:?}",
            user_id,
            email,
            e
        );
    } else {
        tracing::info!("Rolled back Cognito signup for {}", email);
    }
}

/// Authenticate a user and return Cognito tokens.
pub async fn login(
    cognito_client: &CognitoClient,
    client_id: &str,
    client_secret: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: LoginRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!("Failed to parse login body: {}", e);
            return error::bad_request(format!("Invalid request body: {}", e));
        }
    };

    tracing::info!("Authenticating user: {}", req.email);

    let secret_hash = compute_secret_hash(&req.email, client_id, client_secret);

    let auth_result = cognito_client
        .initiate_auth()
        .auth_flow(AuthFlowType::UserPasswordAuth)
        .client_id(client_id)
        .auth_parameters("USERNAME", &req.email)
        .auth_parameters("PASSWORD", &req.password)
        .auth_parameters("SECRET_HASH", &secret_hash)
        .send()
        .await;

    match auth_result {
        Ok(response) => match response.authentication_result() {
            Some(tokens) => error::json_response(
                StatusCode::OK,
                &serde_json::json!({
                    "id_token": tokens.id_token().unwrap_or_default(),
                    "access_token": tokens.access_token().unwrap_or_default(),
                    "refresh_token": tokens.refresh_token().unwrap_or_default(),
                    "expires_in": tokens.expires_in(),
                }),
            ),
            None => unauthorized("No authentication result returned"),
        },
        Err(e) => {
            let service = e.into_service_error();
            tracing::error!("Cognito authentication error: {:?}", service);
            let message = if service.is_not_authorized_exception() {
                "Incorrect email or password"
            } else if service.is_user_not_confirmed_exception() {
                "Please verify your email before logging in"
            } else if service.is_user_not_found_exception() {
                "No account found with this email"
            } else if service.is_too_many_requests_exception() {
                "Too many login attempts. Please try again later"
            } else {
                "Login failed. Please check your credentials"
            };
            unauthorized(message)
        }
    }
}

/// Exchange a refresh token for fresh id/access tokens.
pub async fn refresh_token(
    cognito_client: &CognitoClient,
    client_id: &str,
    client_secret: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: RefreshRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!("Failed to parse refresh body: {}", e);
            return error::bad_request(format!("Invalid request body: {}", e));
        }
    };

    let secret_hash = compute_secret_hash(&req.email, client_id, client_secret);

    let auth_result = cognito_client
        .initiate_auth()
        .auth_flow(AuthFlowType::RefreshTokenAuth)
        .client_id(client_id)
        .auth_parameters("REFRESH_TOKEN", &req.refresh_token)
        .auth_parameters("SECRET_HASH", &secret_hash)
        .send()
        .await;

    match auth_result {
        Ok(response) => match response.authentication_result() {
            Some(tokens) => error::json_response(
                StatusCode::OK,
                &serde_json::json!({
                    "id_token": tokens.id_token().unwrap_or_default(),
                    "access_token": tokens.access_token().unwrap_or_default(),
                    "expires_in": tokens.expires_in(),
                }),
            ),
            None => unauthorized("No authentication result returned"),
        },
        Err(e) => {
            tracing::error!("Cognito refresh error: {:?}", e.into_service_error());
            unauthorized("Session expired. Please log in again")
        }
    }
}

fn unauthorized(message: &str) -> Result<Response<Body>, Error> {
    error::json_response(
        StatusCode::UNAUTHORIZED,
        &serde_json::json!({"error": "AuthenticationFailed", "message": message}),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, password: &str, confirmation: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            password_confirmation: confirmation.to_string(),
            first_name: "Ann".to_string(),
            last_name: "Smith".to_string(),
        }
    }

    #[test]
    fn mismatched_passwords_are_a_field_error() {
        let result = validate_registration(&request("ann@example.com", "secret1", "secret2"));
        match result {
            Err(ApiError::Validation(fields)) => {
                assert!(fields.contains_key("password_confirmation"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn malformed_email_is_a_field_error() {
        let result = validate_registration(&request("not-an-email", "secret", "secret"));
        match result {
            Err(ApiError::Validation(fields)) => assert!(fields.contains_key("email")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn valid_registration_passes_and_errors_accumulate() {
        assert!(validate_registration(&request("ann@example.com", "secret", "secret")).is_ok());
        match validate_registration(&request("bad", "a", "b")) {
            Err(ApiError::Validation(fields)) => assert_eq!(fields.len(), 2),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn secret_hash_is_deterministic() {
        let a = compute_secret_hash("ann@example.com", "client", "secret");
        let b = compute_secret_hash("ann@example.com", "client", "secret");
        assert_eq!(a, b);
        assert_ne!(a, compute_secret_hash("bob@example.com", "client", "secret"));
    }
}
