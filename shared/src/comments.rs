use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};

use crate::ddb::{self, Item};
use crate::error::{self, ApiError};
use crate::issues;
use crate::permissions::{self, Action};
use crate::responses::{CommentDetailView, CommentListView};
use crate::types::{Comment, CreateCommentRequest, UpdateCommentRequest};
use crate::users;

fn comment_from_item(issue_id: &str, comment_id: &str, item: &Item) -> Comment {
    Comment {
        comment_id: comment_id.to_string(),
        issue_id: issue_id.to_string(),
        description: ddb::field(item, "description"),
        author_user_id: ddb::field(item, "author_user_id"),
        author_name: ddb::field(item, "author_name"),
        created_at: ddb::field(item, "created_at"),
    }
}

async fn fetch_comment(
    client: &DynamoClient,
    table_name: &str,
    issue_id: &str,
    comment_id: &str,
) -> Result<Option<Comment>, Error> {
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", ddb::s(format!("ISSUE#{}", issue_id)))
        .key("SK", ddb::s(format!("COMMENT#{}", comment_id)))
        .send()
        .await?;

    Ok(result
        .item()
        .map(|item| comment_from_item(issue_id, comment_id, item)))
}

/// The comment routes are nested under a project and an issue; reject the
/// request when the issue does not belong to that project.
async fn require_issue(
    client: &DynamoClient,
    table_name: &str,
    project_id: &str,
    issue_id: &str,
) -> Result<bool, Error> {
    Ok(issues::fetch_issue(client, table_name, project_id, issue_id)
        .await?
        .is_some())
}

/// List the comments on an issue.
pub async fn list_comments(
    client: &DynamoClient,
    table_name: &str,
    project_id: &str,
    issue_id: &str,
) -> Result<Response<Body>, Error> {
    if !require_issue(client, table_name, project_id, issue_id).await? {
        return error::not_found("Issue not found");
    }

    let pk = format!("ISSUE#{}", issue_id);

    let result = client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
        .expression_attribute_values(":pk", ddb::s(pk))
        .expression_attribute_values(":sk_prefix", ddb::s("COMMENT#"))
        .send()
        .await?;

    let mut views: Vec<CommentListView> = Vec::new();
    for item in result.items() {
        if let Some(sk) = item.get("SK").and_then(|v| v.as_s().ok()) {
            if let Some(comment_id) = sk.strip_prefix("COMMENT#") {
                views.push(CommentListView::of(&comment_from_item(
                    issue_id, comment_id, item,
                )));
            }
        }
    }

    error::json_response(StatusCode::OK, &views)
}

/// Comment on an issue. The author is the requester and the timestamp is
/// server-set.
pub async fn create_comment(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    project_id: &str,
    issue_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: CreateCommentRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!("Failed to parse comment body: {}", e);
            return error::bad_request(format!("Invalid request body: {}", e));
        }
    };

    if !require_issue(client, table_name, project_id, issue_id).await? {
        return error::not_found("Issue not found");
    }

    let author_name = users::display_name(client, table_name, user_id).await?;
    let comment_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    client
        .put_item()
        .table_name(table_name)
        .item("PK", ddb::s(format!("ISSUE#{}", issue_id)))
        .item("SK", ddb::s(format!("COMMENT#{}", comment_id)))
        .item("description", ddb::s(req.description.clone()))
        .item("author_user_id", ddb::s(user_id))
        .item("author_name", ddb::s(author_name.clone()))
        .item("created_at", ddb::s(now.clone()))
        .send()
        .await?;

    tracing::info!("Comment created: {} on issue {}", comment_id, issue_id);

    let comment = Comment {
        comment_id,
        issue_id: issue_id.to_string(),
        description: req.description,
        author_user_id: user_id.to_string(),
        author_name,
        created_at: now,
    };

    error::json_response(StatusCode::CREATED, &CommentDetailView::of(&comment))
}

/// Get a single comment.
pub async fn get_comment(
    client: &DynamoClient,
    table_name: &str,
    project_id: &str,
    issue_id: &str,
    comment_id: &str,
) -> Result<Response<Body>, Error> {
    if !require_issue(client, table_name, project_id, issue_id).await? {
        return error::not_found("Issue not found");
    }

    match fetch_comment(client, table_name, issue_id, comment_id).await? {
        Some(comment) => error::json_response(StatusCode::OK, &CommentDetailView::of(&comment)),
        None => error::not_found("Comment not found"),
    }
}

/// Update a comment. Only the author may write; the description is the only
/// mutable field.
pub async fn update_comment(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    project_id: &str,
    issue_id: &str,
    comment_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: UpdateCommentRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => return error::bad_request(format!("Invalid request body: {}", e)),
    };

    if !require_issue(client, table_name, project_id, issue_id).await? {
        return error::not_found("Issue not found");
    }

    let comment = match fetch_comment(client, table_name, issue_id, comment_id).await? {
        Some(comment) => comment,
        None => return error::not_found("Comment not found"),
    };

    if let permissions::Decision::Deny(reason) =
        permissions::owner_or_read_only(Action::Write, &comment.author_user_id, user_id)
    {
        return ApiError::Forbidden(reason.to_string()).into_response();
    }

    if let Some(description) = req.description {
        client
            .update_item()
            .table_name(table_name)
            .key("PK", ddb::s(format!("ISSUE#{}", issue_id)))
            .key("SK", ddb::s(format!("COMMENT#{}", comment_id)))
            .update_expression("SET description = :description")
            .expression_attribute_values(":description", ddb::s(description))
            .send()
            .await?;
        tracing::info!("Comment updated: {}", comment_id);
    }

    match fetch_comment(client, table_name, issue_id, comment_id).await? {
        Some(comment) => error::json_response(StatusCode::OK, &CommentDetailView::of(&comment)),
        None => error::not_found("Comment not found"),
    }
}

/// Delete a comment. Only the author may delete it.
pub async fn delete_comment(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    project_id: &str,
    issue_id: &str,
    comment_id: &str,
) -> Result<Response<Body>, Error> {
    if !require_issue(client, table_name, project_id, issue_id).await? {
        return error::not_found("Issue not found");
    }

    let comment = match fetch_comment(client, table_name, issue_id, comment_id).await? {
        Some(comment) => comment,
        None => return error::not_found("Comment not found"),
    };

    if let permissions::Decision::Deny(reason) =
        permissions::owner_or_read_only(Action::Write, &comment.author_user_id, user_id)
    {
        return ApiError::Forbidden(reason.to_string()).into_response();
    }

    client
        .delete_item()
        .table_name(table_name)
        .key("PK", ddb::s(format!("ISSUE#{}", issue_id)))
        .key("SK", ddb::s(format!("COMMENT#{}", comment_id)))
        .send()
        .await?;

    tracing::info!("Comment deleted: {}", comment_id);

    error::no_content()
}
