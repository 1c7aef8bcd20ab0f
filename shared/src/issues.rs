use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};
use std::collections::HashMap;

use crate::ddb::{self, Item};
use crate::error::{self, ApiError};
use crate::permissions::{self, Action};
use crate::responses::{IssueDetailView, IssueListView};
use crate::types::{
    CreateIssueRequest, Issue, IssuePriority, IssueStatus, IssueTag, UpdateIssueRequest,
};
use crate::users;

fn issue_from_item(project_id: &str, issue_id: &str, item: &Item) -> Issue {
    Issue {
        issue_id: issue_id.to_string(),
        project_id: project_id.to_string(),
        title: ddb::field(item, "title"),
        description: ddb::field(item, "description"),
        tag: ddb::field(item, "tag"),
        priority: ddb::field(item, "priority"),
        status: ddb::field(item, "status"),
        author_user_id: ddb::field(item, "author_user_id"),
        author_name: ddb::field(item, "author_name"),
        assigned_user_id: ddb::field(item, "assigned_user_id"),
        assigned_name: ddb::field(item, "assigned_name"),
        created_at: ddb::field(item, "created_at"),
    }
}

pub async fn fetch_issue(
    client: &DynamoClient,
    table_name: &str,
    project_id: &str,
    issue_id: &str,
) -> Result<Option<Issue>, Error> {
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", ddb::s(format!("PROJECT#{}", project_id)))
        .key("SK", ddb::s(format!("ISSUE#{}", issue_id)))
        .send()
        .await?;

    Ok(result
        .item()
        .map(|item| issue_from_item(project_id, issue_id, item)))
}

/// Validate the enum-valued fields of a create payload, reporting every
/// offending field with its full choice set.
pub fn validate_issue_choices(req: &CreateIssueRequest) -> Result<(), ApiError> {
    let mut errors = Vec::new();
    if IssueTag::parse(&req.tag).is_none() {
        errors.push(ApiError::invalid_choice(
            IssueTag::FIELD,
            IssueTag::choices_display(),
        ));
    }
    if IssuePriority::parse(&req.priority).is_none() {
        errors.push(ApiError::invalid_choice(
            IssuePriority::FIELD,
            IssuePriority::choices_display(),
        ));
    }
    if IssueStatus::parse(&req.status).is_none() {
        errors.push(ApiError::invalid_choice(
            IssueStatus::FIELD,
            IssueStatus::choices_display(),
        ));
    }
    match error::merge_field_errors(errors) {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Same validation for an update payload, only over the fields present.
pub fn validate_issue_update_choices(req: &UpdateIssueRequest) -> Result<(), ApiError> {
    let mut errors = Vec::new();
    if let Some(tag) = &req.tag {
        if IssueTag::parse(tag).is_none() {
            errors.push(ApiError::invalid_choice(
                IssueTag::FIELD,
                IssueTag::choices_display(),
            ));
        }
    }
    if let Some(priority) = &req.priority {
        if IssuePriority::parse(priority).is_none() {
            errors.push(ApiError::invalid_choice(
                IssuePriority::FIELD,
                IssuePriority::choices_display(),
            ));
        }
    }
    if let Some(status) = &req.status {
        if IssueStatus::parse(status).is_none() {
            errors.push(ApiError::invalid_choice(
                IssueStatus::FIELD,
                IssueStatus::choices_display(),
            ));
        }
    }
    match error::merge_field_errors(errors) {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// List the issues of a project.
pub async fn list_issues(
    client: &DynamoClient,
    table_name: &str,
    project_id: &str,
) -> Result<Response<Body>, Error> {
    let pk = format!("PROJECT#{}", project_id);

    let result = client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
        .expression_attribute_values(":pk", ddb::s(pk))
        .expression_attribute_values(":sk_prefix", ddb::s("ISSUE#"))
        .send()
        .await?;

    let mut views: Vec<IssueListView> = Vec::new();
    for item in result.items() {
        if let Some(sk) = item.get("SK").and_then(|v| v.as_s().ok()) {
            if let Some(issue_id) = sk.strip_prefix("ISSUE#") {
                views.push(IssueListView::of(&issue_from_item(
                    project_id, issue_id, item,
                )));
            }
        }
    }

    error::json_response(StatusCode::OK, &views)
}

/// Create an issue against a project. The author is the requester; the
/// assignee defaults to the author when not supplied; the creation timestamp
/// is server-set.
pub async fn create_issue(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    project_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: CreateIssueRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!("Failed to parse issue body: {}", e);
            return error::bad_request(format!("Invalid request body: {}", e));
        }
    };

    if let Err(validation) = validate_issue_choices(&req) {
        return validation.into_response();
    }

    let author_name = users::display_name(client, table_name, user_id).await?;

    let (assigned_user_id, assigned_name) = match req.assigned_user_id {
        Some(assigned) if assigned != user_id => {
            match users::fetch_profile(client, table_name, &assigned).await? {
                Some(profile) => {
                    let name =
                        crate::responses::full_name(&profile.first_name, &profile.last_name);
                    (assigned, name)
                }
                None => {
                    return ApiError::field("assigned_user_id", "User does not exist.")
                        .into_response();
                }
            }
        }
        _ => (user_id.to_string(), author_name.clone()),
    };

    let issue_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    client
        .put_item()
        .table_name(table_name)
        .item("PK", ddb::s(format!("PROJECT#{}", project_id)))
        .item("SK", ddb::s(format!("ISSUE#{}", issue_id)))
        .item("title", ddb::s(req.title.clone()))
        .item("description", ddb::s(req.description.clone()))
        .item("tag", ddb::s(req.tag.clone()))
        .item("priority", ddb::s(req.priority.clone()))
        .item("status", ddb::s(req.status.clone()))
        .item("author_user_id", ddb::s(user_id))
        .item("author_name", ddb::s(author_name.clone()))
        .item("assigned_user_id", ddb::s(assigned_user_id.clone()))
        .item("assigned_name", ddb::s(assigned_name.clone()))
        .item("created_at", ddb::s(now.clone()))
        .send()
        .await?;

    tracing::info!("Issue created: {} on project {}", issue_id, project_id);

    let issue = Issue {
        issue_id,
        project_id: project_id.to_string(),
        title: req.title,
        description: req.description,
        tag: req.tag,
        priority: req.priority,
        status: req.status,
        author_user_id: user_id.to_string(),
        author_name,
        assigned_user_id,
        assigned_name,
        created_at: now,
    };

    error::json_response(StatusCode::CREATED, &IssueDetailView::of(&issue))
}

/// Get a single issue.
pub async fn get_issue(
    client: &DynamoClient,
    table_name: &str,
    project_id: &str,
    issue_id: &str,
) -> Result<Response<Body>, Error> {
    match fetch_issue(client, table_name, project_id, issue_id).await? {
        Some(issue) => error::json_response(StatusCode::OK, &IssueDetailView::of(&issue)),
        None => error::not_found("Issue not found"),
    }
}

/// Update an issue. Only the author may write. Author, project linkage and
/// creation time are immutable; the update payload cannot carry them.
pub async fn update_issue(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    project_id: &str,
    issue_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: UpdateIssueRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => return error::bad_request(format!("Invalid request body: {}", e)),
    };

    let issue = match fetch_issue(client, table_name, project_id, issue_id).await? {
        Some(issue) => issue,
        None => return error::not_found("Issue not found"),
    };

    if let permissions::Decision::Deny(reason) =
        permissions::owner_or_read_only(Action::Write, &issue.author_user_id, user_id)
    {
        return ApiError::Forbidden(reason.to_string()).into_response();
    }

    if let Err(validation) = validate_issue_update_choices(&req) {
        return validation.into_response();
    }

    let mut update_expr = vec![];
    let mut expr_names = HashMap::new();
    let mut expr_values = HashMap::new();

    if let Some(title) = req.title {
        update_expr.push("#title = :title");
        expr_names.insert("#title".to_string(), "title".to_string());
        expr_values.insert(":title".to_string(), ddb::s(title));
    }

    if let Some(description) = req.description {
        update_expr.push("description = :description");
        expr_values.insert(":description".to_string(), ddb::s(description));
    }

    if let Some(tag) = req.tag {
        update_expr.push("tag = :tag");
        expr_values.insert(":tag".to_string(), ddb::s(tag));
    }

    if let Some(priority) = req.priority {
        update_expr.push("priority = :priority");
        expr_values.insert(":priority".to_string(), ddb::s(priority));
    }

    if let Some(status) = req.status {
        update_expr.push("#status = :status");
        expr_names.insert("#status".to_string(), "status".to_string());
        expr_values.insert(":status".to_string(), ddb::s(status));
    }

    if let Some(assigned_user_id) = req.assigned_user_id {
        let assigned_name = match users::fetch_profile(client, table_name, &assigned_user_id)
            .await?
        {
            Some(profile) => crate::responses::full_name(&profile.first_name, &profile.last_name),
            None => {
                return ApiError::field("assigned_user_id", "User does not exist.")
                    .into_response();
            }
        };
        update_expr.push("assigned_user_id = :assigned_user_id");
        expr_values.insert(":assigned_user_id".to_string(), ddb::s(assigned_user_id));
        update_expr.push("assigned_name = :assigned_name");
        expr_values.insert(":assigned_name".to_string(), ddb::s(assigned_name));
    }

    if !update_expr.is_empty() {
        let mut builder = client
            .update_item()
            .table_name(table_name)
            .key("PK", ddb::s(format!("PROJECT#{}", project_id)))
            .key("SK", ddb::s(format!("ISSUE#{}", issue_id)))
            .update_expression(format!("SET {}", update_expr.join(", ")));

        for (k, v) in expr_names {
            builder = builder.expression_attribute_names(k, v);
        }

        for (k, v) in expr_values {
            builder = builder.expression_attribute_values(k, v);
        }

        builder.send().await?;
        tracing::info!("Issue updated: {}", issue_id);
    }

    match fetch_issue(client, table_name, project_id, issue_id).await? {
        Some(issue) => error::json_response(StatusCode::OK, &IssueDetailView::of(&issue)),
        None => error::not_found("Issue not found"),
    }
}

/// Delete an issue and cascade to its comments.
pub async fn delete_issue(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    project_id: &str,
    issue_id: &str,
) -> Result<Response<Body>, Error> {
    let issue = match fetch_issue(client, table_name, project_id, issue_id).await? {
        Some(issue) => issue,
        None => return error::not_found("Issue not found"),
    };

    if let permissions::Decision::Deny(reason) =
        permissions::owner_or_read_only(Action::Write, &issue.author_user_id, user_id)
    {
        return ApiError::Forbidden(reason.to_string()).into_response();
    }

    let issue_pk = format!("ISSUE#{}", issue_id);
    let mut delete_keys = Vec::new();

    let comments_result = client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
        .expression_attribute_values(":pk", ddb::s(issue_pk.clone()))
        .expression_attribute_values(":sk_prefix", ddb::s("COMMENT#"))
        .send()
        .await?;

    for item in comments_result.items() {
        if let Some(sk) = item.get("SK").and_then(|v| v.as_s().ok()) {
            let mut key = HashMap::new();
            key.insert("PK".to_string(), ddb::s(issue_pk.clone()));
            key.insert("SK".to_string(), ddb::s(sk.to_string()));
            delete_keys.push(key);
        }
    }

    let mut issue_key = HashMap::new();
    issue_key.insert("PK".to_string(), ddb::s(format!("PROJECT#{}", project_id)));
    issue_key.insert("SK".to_string(), ddb::s(issue_pk));
    delete_keys.push(issue_key);

    tracing::info!(
        "Cascade delete of issue {}: {} records",
        issue_id,
        delete_keys.len()
    );

    crate::projects::batch_delete(client, table_name, delete_keys).await?;

    error::no_content()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_request(tag: &str, priority: &str, status: &str) -> CreateIssueRequest {
        CreateIssueRequest {
            title: "Bug1".to_string(),
            description: "crash on save".to_string(),
            tag: tag.to_string(),
            priority: priority.to_string(),
            status: status.to_string(),
            assigned_user_id: None,
        }
    }

    #[test]
    fn valid_choice_codes_pass() {
        assert!(validate_issue_choices(&create_request("BG", "LO", "TD")).is_ok());
        assert!(validate_issue_choices(&create_request("TA", "HI", "DN")).is_ok());
    }

    #[test]
    fn every_bad_field_is_reported_with_its_choices() {
        let result = validate_issue_choices(&create_request("XX", "YY", "ZZ"));
        match result {
            Err(ApiError::Validation(fields)) => {
                assert_eq!(fields.len(), 3);
                assert!(fields["tag"][0].contains("BG (Bug)"));
                assert!(fields["priority"][0].contains("LO (Low)"));
                assert!(fields["status"][0].contains("TD (To do)"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn update_validation_only_checks_supplied_fields() {
        let req = UpdateIssueRequest {
            title: Some("new title".to_string()),
            description: None,
            tag: None,
            priority: Some("XX".to_string()),
            status: None,
            assigned_user_id: None,
        };
        match validate_issue_update_choices(&req) {
            Err(ApiError::Validation(fields)) => {
                assert_eq!(fields.len(), 1);
                assert!(fields.contains_key("priority"));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let empty = UpdateIssueRequest {
            title: None,
            description: None,
            tag: None,
            priority: None,
            status: None,
            assigned_user_id: None,
        };
        assert!(validate_issue_update_choices(&empty).is_ok());
    }
}
