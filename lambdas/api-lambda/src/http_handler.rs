use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use std::env;
use std::sync::Arc;
use taskforge_shared::permissions::{self, Action, RouteScope};
use taskforge_shared::{auth, comments, contributors, error, issues, projects, AppState};

/// Main Lambda handler - dispatches requests to the resource services after
/// applying the route's membership policies.
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method().clone();
    let path = event.uri().path().to_string();
    let body = event.body();
    tracing::info!("Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == Method::OPTIONS {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET,POST,PUT,DELETE,OPTIONS")
            .header(
                "Access-Control-Allow-Headers",
                "Content-Type,Authorization,X-User-Id",
            )
            .body(Body::Empty)
            .map_err(Box::new)?);
    }

    let table_name = env::var("TABLE_NAME").unwrap_or_else(|_| "taskforge".to_string());
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    // Unauthenticated routes: registration and sessions
    match (&method, parts.as_slice()) {
        (&Method::POST, ["users"]) => {
            let (client_id, client_secret) = cognito_credentials()?;
            return auth::register(
                &state.cognito_client,
                &state.dynamo_client,
                &table_name,
                &client_id,
                &client_secret,
                body,
            )
            .await;
        }
        (&Method::POST, ["login"]) => {
            let (client_id, client_secret) = cognito_credentials()?;
            return auth::login(&state.cognito_client, &client_id, &client_secret, body).await;
        }
        (&Method::POST, ["refresh"]) => {
            let (client_id, client_secret) = cognito_credentials()?;
            return auth::refresh_token(&state.cognito_client, &client_id, &client_secret, body)
                .await;
        }
        _ => {}
    }

    // Everything else requires an authenticated actor
    let user_id = match actor_id(&event) {
        Some(user_id) => user_id,
        None => {
            return error::json_response(
                StatusCode::UNAUTHORIZED,
                &serde_json::json!({
                    "error": "AuthenticationFailed",
                    "message": "Missing actor identity",
                }),
            );
        }
    };

    let client = &state.dynamo_client;
    let action = Action::from_method(&method);

    match (&method, parts.as_slice()) {
        // --- PROJECTS ---
        (&Method::POST, ["projects"]) => {
            projects::create_project(client, &table_name, &user_id, body).await
        }
        (&Method::GET, ["projects"]) => projects::list_projects(client, &table_name, &user_id).await,
        (&Method::GET, ["projects", project_id]) => {
            projects::get_project(client, &table_name, &user_id, project_id).await
        }
        (&Method::PUT, ["projects", project_id]) => {
            projects::update_project(client, &table_name, &user_id, project_id, body).await
        }
        (&Method::DELETE, ["projects", project_id]) => {
            projects::delete_project(client, &table_name, &user_id, project_id).await
        }

        // --- CONTRIBUTORS ---
        (&Method::GET, ["projects", project_id, "contributors"]) => {
            if let Some(response) =
                deny(client, &table_name, RouteScope::Contributors, project_id, &user_id, action)
                    .await?
            {
                return Ok(response);
            }
            contributors::list_contributors(client, &table_name, project_id).await
        }
        (&Method::POST, ["projects", project_id, "contributors"]) => {
            if let Some(response) =
                deny(client, &table_name, RouteScope::Contributors, project_id, &user_id, action)
                    .await?
            {
                return Ok(response);
            }
            contributors::create_contributor(client, &table_name, project_id, body).await
        }
        (&Method::DELETE, ["projects", project_id, "contributors", contributor_id]) => {
            if let Some(response) =
                deny(client, &table_name, RouteScope::Contributors, project_id, &user_id, action)
                    .await?
            {
                return Ok(response);
            }
            contributors::delete_contributor(client, &table_name, project_id, contributor_id).await
        }

        // --- ISSUES ---
        (&Method::GET, ["projects", project_id, "issues"]) => {
            if let Some(response) =
                deny(client, &table_name, RouteScope::Issues, project_id, &user_id, action).await?
            {
                return Ok(response);
            }
            issues::list_issues(client, &table_name, project_id).await
        }
        (&Method::POST, ["projects", project_id, "issues"]) => {
            if let Some(response) =
                deny(client, &table_name, RouteScope::Issues, project_id, &user_id, action).await?
            {
                return Ok(response);
            }
            issues::create_issue(client, &table_name, &user_id, project_id, body).await
        }
        (&Method::GET, ["projects", project_id, "issues", issue_id]) => {
            if let Some(response) =
                deny(client, &table_name, RouteScope::Issues, project_id, &user_id, action).await?
            {
                return Ok(response);
            }
            issues::get_issue(client, &table_name, project_id, issue_id).await
        }
        (&Method::PUT, ["projects", project_id, "issues", issue_id]) => {
            if let Some(response) =
                deny(client, &table_name, RouteScope::Issues, project_id, &user_id, action).await?
            {
                return Ok(response);
            }
            issues::update_issue(client, &table_name, &user_id, project_id, issue_id, body).await
        }
        (&Method::DELETE, ["projects", project_id, "issues", issue_id]) => {
            if let Some(response) =
                deny(client, &table_name, RouteScope::Issues, project_id, &user_id, action).await?
            {
                return Ok(response);
            }
            issues::delete_issue(client, &table_name, &user_id, project_id, issue_id).await
        }

        // --- COMMENTS ---
        (&Method::GET, ["projects", project_id, "issues", issue_id, "comments"]) => {
            if let Some(response) =
                deny(client, &table_name, RouteScope::Comments, project_id, &user_id, action)
                    .await?
            {
                return Ok(response);
            }
            comments::list_comments(client, &table_name, project_id, issue_id).await
        }
        (&Method::POST, ["projects", project_id, "issues", issue_id, "comments"]) => {
            if let Some(response) =
                deny(client, &table_name, RouteScope::Comments, project_id, &user_id, action)
                    .await?
            {
                return Ok(response);
            }
            comments::create_comment(client, &table_name, &user_id, project_id, issue_id, body)
                .await
        }
        (&Method::GET, ["projects", project_id, "issues", issue_id, "comments", comment_id]) => {
            if let Some(response) =
                deny(client, &table_name, RouteScope::Comments, project_id, &user_id, action)
                    .await?
            {
                return Ok(response);
            }
            comments::get_comment(client, &table_name, project_id, issue_id, comment_id).await
        }
        (&Method::PUT, ["projects", project_id, "issues", issue_id, "comments", comment_id]) => {
            if let Some(response) =
                deny(client, &table_name, RouteScope::Comments, project_id, &user_id, action)
                    .await?
            {
                return Ok(response);
            }
            comments::update_comment(
                client,
                &table_name,
                &user_id,
                project_id,
                issue_id,
                comment_id,
                body,
            )
            .await
        }
        (
            &Method::DELETE,
            ["projects", project_id, "issues", issue_id, "comments", comment_id],
        ) => {
            if let Some(response) =
                deny(client, &table_name, RouteScope::Comments, project_id, &user_id, action)
                    .await?
            {
                return Ok(response);
            }
            comments::delete_comment(
                client,
                &table_name,
                &user_id,
                project_id,
                issue_id,
                comment_id,
            )
            .await
        }

        _ => {
            tracing::warn!("No route matched - Method: {} Path: {}", method, path);
            error::not_found("Not found")
        }
    }
}

/// Evaluate the route's membership policies; `Some(response)` is a denial.
async fn deny(
    client: &aws_sdk_dynamodb::Client,
    table_name: &str,
    scope: RouteScope,
    project_id: &str,
    user_id: &str,
    action: Action,
) -> Result<Option<Response<Body>>, Error> {
    match permissions::authorize(client, table_name, scope, project_id, user_id, action).await? {
        permissions::Decision::Allow => Ok(None),
        permissions::Decision::Deny(reason) => Ok(Some(
            error::ApiError::Forbidden(reason.to_string()).into_response()?,
        )),
    }
}

/// Resolve the actor from the API Gateway JWT authorizer claims, with an
/// X-User-Id header override for local development.
fn actor_id(event: &Request) -> Option<String> {
    event
        .headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .or_else(|| {
            event
                .request_context()
                .authorizer()
                .and_then(|auth| auth.jwt.as_ref())
                .and_then(|jwt| jwt.claims.get("sub"))
                .map(|s| s.to_string())
        })
}

fn cognito_credentials() -> Result<(String, String), Error> {
    let client_id = env::var("COGNITO_CLIENT_ID").map_err(|_| "COGNITO_CLIENT_ID must be set")?;
    let client_secret =
        env::var("COGNITO_CLIENT_SECRET").map_err(|_| "COGNITO_CLIENT_SECRET must be set")?;
    Ok((client_id, client_secret))
}
