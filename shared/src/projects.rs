use aws_sdk_dynamodb::types::{
    AttributeValue, DeleteRequest, KeysAndAttributes, PutRequest, WriteRequest,
};
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};
use std::collections::HashMap;

use crate::ddb::{self, Item};
use crate::error::{self, ApiError};
use crate::permissions::{self, Action, Role};
use crate::responses::{ProjectDetailView, ProjectListView};
use crate::types::{CreateProjectRequest, Project, ProjectType, UpdateProjectRequest};
use crate::users;

fn project_from_item(project_id: &str, item: &Item) -> Project {
    Project {
        project_id: project_id.to_string(),
        title: ddb::field(item, "title"),
        description: ddb::field(item, "description"),
        project_type: ddb::field(item, "project_type"),
        author_user_id: ddb::field(item, "author_user_id"),
        author_name: ddb::field(item, "author_name"),
        created_at: ddb::field(item, "created_at"),
    }
}

pub async fn fetch_project(
    client: &DynamoClient,
    table_name: &str,
    project_id: &str,
) -> Result<Option<Project>, Error> {
    let pk = format!("PROJECT#{}", project_id);

    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", ddb::s(pk.clone()))
        .key("SK", ddb::s(pk))
        .send()
        .await?;

    Ok(result
        .item()
        .map(|item| project_from_item(project_id, item)))
}

/// Create a project. The requester becomes the author and is enrolled as the
/// creator contributor in the same batch write: the project item plus both
/// membership link items.
pub async fn create_project(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: CreateProjectRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!("Failed to parse project body: {}", e);
            return error::bad_request(format!("Invalid request body: {}", e));
        }
    };

    if ProjectType::parse(&req.project_type).is_none() {
        return ApiError::invalid_choice(ProjectType::FIELD, ProjectType::choices_display())
            .into_response();
    }

    let project = Project {
        project_id: uuid::Uuid::new_v4().to_string(),
        title: req.title,
        description: req.description,
        project_type: req.project_type,
        author_user_id: user_id.to_string(),
        author_name: users::display_name(client, table_name, user_id).await?,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    let contributor_id = uuid::Uuid::new_v4().to_string();

    let requests = creator_bootstrap_items(&project, &contributor_id)
        .into_iter()
        .map(|item| {
            Ok(WriteRequest::builder()
                .put_request(PutRequest::builder().set_item(Some(item)).build()?)
                .build())
        })
        .collect::<Result<Vec<_>, Error>>()?;

    // All three records must land; a partially accepted batch would leave the
    // project invisible to its own creator.
    batch_write(client, table_name, requests).await?;

    tracing::info!("Project created: {} by {}", project.project_id, user_id);

    error::json_response(StatusCode::CREATED, &ProjectDetailView::of(&project))
}

/// The three records written when a project is created: the project itself
/// plus both membership links enrolling the author as the creator.
fn creator_bootstrap_items(project: &Project, contributor_id: &str) -> Vec<Item> {
    let project_pk = format!("PROJECT#{}", project.project_id);
    let user_pk = format!("USER#{}", project.author_user_id);
    let member_sk = format!("MEMBER#{}", project.author_user_id);

    let mut project_item = HashMap::new();
    project_item.insert("PK".to_string(), ddb::s(project_pk.clone()));
    project_item.insert("SK".to_string(), ddb::s(project_pk.clone()));
    project_item.insert("title".to_string(), ddb::s(project.title.clone()));
    project_item.insert("description".to_string(), ddb::s(project.description.clone()));
    project_item.insert("project_type".to_string(), ddb::s(project.project_type.clone()));
    project_item.insert("author_user_id".to_string(), ddb::s(project.author_user_id.clone()));
    project_item.insert("author_name".to_string(), ddb::s(project.author_name.clone()));
    project_item.insert("created_at".to_string(), ddb::s(project.created_at.clone()));

    // USER -> PROJECT link (drives the membership-filtered project list)
    let mut user_to_project = HashMap::new();
    user_to_project.insert("PK".to_string(), ddb::s(user_pk));
    user_to_project.insert("SK".to_string(), ddb::s(project_pk.clone()));
    user_to_project.insert("role".to_string(), ddb::s(Role::Creator.code()));
    user_to_project.insert("joined_at".to_string(), ddb::s(project.created_at.clone()));

    // PROJECT -> MEMBER link (drives membership checks and the contributor list)
    let mut project_to_member = HashMap::new();
    project_to_member.insert("PK".to_string(), ddb::s(project_pk));
    project_to_member.insert("SK".to_string(), ddb::s(member_sk));
    project_to_member.insert("contributor_id".to_string(), ddb::s(contributor_id));
    project_to_member.insert("role".to_string(), ddb::s(Role::Creator.code()));
    project_to_member.insert("user_name".to_string(), ddb::s(project.author_name.clone()));
    project_to_member.insert("joined_at".to_string(), ddb::s(project.created_at.clone()));

    vec![project_item, user_to_project, project_to_member]
}

/// List the projects the requester contributes to. This is the mandatory
/// membership pre-filter: projects the actor has no membership link for are
/// invisible.
pub async fn list_projects(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Response<Body>, Error> {
    let pk = format!("USER#{}", user_id);

    let result = client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
        .expression_attribute_values(":pk", ddb::s(pk))
        .expression_attribute_values(":sk_prefix", ddb::s("PROJECT#"))
        .send()
        .await?;

    let mut project_ids = Vec::new();
    for item in result.items() {
        if let Some(sk) = item.get("SK").and_then(|v| v.as_s().ok()) {
            if let Some(project_id) = sk.strip_prefix("PROJECT#") {
                project_ids.push(project_id.to_string());
            }
        }
    }

    let mut views: Vec<ProjectListView> = Vec::new();

    // Batch fetch the project records (DynamoDB caps batch gets at 100)
    for chunk in project_ids.chunks(100) {
        let mut keys = Vec::new();
        for project_id in chunk {
            let pk = format!("PROJECT#{}", project_id);
            let mut key = HashMap::new();
            key.insert("PK".to_string(), ddb::s(pk.clone()));
            key.insert("SK".to_string(), ddb::s(pk));
            keys.push(key);
        }

        let batch_result = client
            .batch_get_item()
            .request_items(
                table_name,
                KeysAndAttributes::builder().set_keys(Some(keys)).build()?,
            )
            .send()
            .await?;

        if let Some(items) = batch_result.responses().and_then(|r| r.get(table_name)) {
            for item in items {
                if let Some(project_id) = item
                    .get("PK")
                    .and_then(|v| v.as_s().ok())
                    .and_then(|pk| pk.strip_prefix("PROJECT#"))
                {
                    views.push(ProjectListView::of(&project_from_item(project_id, item)));
                }
            }
        }
    }

    error::json_response(StatusCode::OK, &views)
}

/// Get a project. Visibility requires membership; non-members get a 404, not
/// a 403, since the project is outside their visible set.
pub async fn get_project(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    project_id: &str,
) -> Result<Response<Body>, Error> {
    if permissions::fetch_role(client, table_name, project_id, user_id)
        .await?
        .is_none()
    {
        return error::not_found("Project not found");
    }

    match fetch_project(client, table_name, project_id).await? {
        Some(project) => error::json_response(StatusCode::OK, &ProjectDetailView::of(&project)),
        None => error::not_found("Project not found"),
    }
}

/// Update a project. Only the author may write; title, description and type
/// are the mutable fields.
pub async fn update_project(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    project_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: UpdateProjectRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => return error::bad_request(format!("Invalid request body: {}", e)),
    };

    if permissions::fetch_role(client, table_name, project_id, user_id)
        .await?
        .is_none()
    {
        return error::not_found("Project not found");
    }

    let project = match fetch_project(client, table_name, project_id).await? {
        Some(project) => project,
        None => return error::not_found("Project not found"),
    };

    if let permissions::Decision::Deny(reason) =
        permissions::owner_or_read_only(Action::Write, &project.author_user_id, user_id)
    {
        return ApiError::Forbidden(reason.to_string()).into_response();
    }

    if let Some(project_type) = &req.project_type {
        if ProjectType::parse(project_type).is_none() {
            return ApiError::invalid_choice(ProjectType::FIELD, ProjectType::choices_display())
                .into_response();
        }
    }

    let pk = format!("PROJECT#{}", project_id);
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

    if let Some(project_type) = req.project_type {
        update_expr.push("project_type = :project_type");
        expr_values.insert(":project_type".to_string(), ddb::s(project_type));
    }

    if !update_expr.is_empty() {
        let mut builder = client
            .update_item()
            .table_name(table_name)
            .key("PK", ddb::s(pk.clone()))
            .key("SK", ddb::s(pk))
            .update_expression(format!("SET {}", update_expr.join(", ")));

        for (k, v) in expr_names {
            builder = builder.expression_attribute_names(k, v);
        }

        for (k, v) in expr_values {
            builder = builder.expression_attribute_values(k, v);
        }

        builder.send().await?;
        tracing::info!("Project updated: {}", project_id);
    }

    match fetch_project(client, table_name, project_id).await? {
        Some(project) => error::json_response(StatusCode::OK, &ProjectDetailView::of(&project)),
        None => error::not_found("Project not found"),
    }
}

/// Delete a project and cascade to its contributors, issues and comments.
pub async fn delete_project(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    project_id: &str,
) -> Result<Response<Body>, Error> {
    if permissions::fetch_role(client, table_name, project_id, user_id)
        .await?
        .is_none()
    {
        return error::not_found("Project not found");
    }

    let project = match fetch_project(client, table_name, project_id).await? {
        Some(project) => project,
        None => return error::not_found("Project not found"),
    };

    if let permissions::Decision::Deny(reason) =
        permissions::owner_or_read_only(Action::Write, &project.author_user_id, user_id)
    {
        return ApiError::Forbidden(reason.to_string()).into_response();
    }

    let pk = format!("PROJECT#{}", project_id);
    let mut all_delete_keys: Vec<HashMap<String, AttributeValue>> = Vec::new();

    // Issues under the project, and each issue's comments
    let issues_result = client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
        .expression_attribute_values(":pk", ddb::s(pk.clone()))
        .expression_attribute_values(":sk_prefix", ddb::s("ISSUE#"))
        .send()
        .await?;

    for item in issues_result.items() {
        let Some(sk) = item.get("SK").and_then(|v| v.as_s().ok()) else {
            continue;
        };
        let Some(issue_id) = sk.strip_prefix("ISSUE#") else {
            continue;
        };

        let issue_pk = format!("ISSUE#{}", issue_id);
        let comments_result = client
            .query()
            .table_name(table_name)
            .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
            .expression_attribute_values(":pk", ddb::s(issue_pk.clone()))
            .expression_attribute_values(":sk_prefix", ddb::s("COMMENT#"))
            .send()
            .await?;

        for comment_item in comments_result.items() {
            if let Some(comment_sk) = comment_item.get("SK").and_then(|v| v.as_s().ok()) {
                let mut key = HashMap::new();
                key.insert("PK".to_string(), ddb::s(issue_pk.clone()));
                key.insert("SK".to_string(), ddb::s(comment_sk.to_string()));
                all_delete_keys.push(key);
            }
        }

        let mut key = HashMap::new();
        key.insert("PK".to_string(), ddb::s(pk.clone()));
        key.insert("SK".to_string(), ddb::s(sk.to_string()));
        all_delete_keys.push(key);
    }

    // Membership links, both directions
    let members_result = client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
        .expression_attribute_values(":pk", ddb::s(pk.clone()))
        .expression_attribute_values(":sk_prefix", ddb::s("MEMBER#"))
        .send()
        .await?;

    for item in members_result.items() {
        let Some(sk) = item.get("SK").and_then(|v| v.as_s().ok()) else {
            continue;
        };
        let mut member_key = HashMap::new();
        member_key.insert("PK".to_string(), ddb::s(pk.clone()));
        member_key.insert("SK".to_string(), ddb::s(sk.to_string()));
        all_delete_keys.push(member_key);

        if let Some(member_user_id) = sk.strip_prefix("MEMBER#") {
            let mut link_key = HashMap::new();
            link_key.insert("PK".to_string(), ddb::s(format!("USER#{}", member_user_id)));
            link_key.insert("SK".to_string(), ddb::s(pk.clone()));
            all_delete_keys.push(link_key);
        }
    }

    // The project record itself
    let mut project_key = HashMap::new();
    project_key.insert("PK".to_string(), ddb::s(pk.clone()));
    project_key.insert("SK".to_string(), ddb::s(pk));
    all_delete_keys.push(project_key);

    tracing::info!(
        "Cascade delete of project {}: {} records",
        project_id,
        all_delete_keys.len()
    );

    batch_delete(client, table_name, all_delete_keys).await?;

    error::no_content()
}

/// Chunked batch delete (DynamoDB caps batch writes at 25).
pub async fn batch_delete(
    client: &DynamoClient,
    table_name: &str,
    keys: Vec<HashMap<String, AttributeValue>>,
) -> Result<(), Error> {
    let requests = keys
        .into_iter()
        .map(|key| {
            Ok(WriteRequest::builder()
                .delete_request(DeleteRequest::builder().set_key(Some(key)).build()?)
                .build())
        })
        .collect::<Result<Vec<_>, Error>>()?;

    batch_write(client, table_name, requests).await
}

/// Chunked batch write with retry on unprocessed items. Under throttling
/// DynamoDB can accept part of a batch and hand the rest back in
/// `unprocessed_items`; those are resubmitted with backoff.
pub async fn batch_write(
    client: &DynamoClient,
    table_name: &str,
    requests: Vec<WriteRequest>,
) -> Result<(), Error> {
    for chunk in requests.chunks(25) {
        let mut attempts = 0;
        let mut unprocessed = Some(chunk.to_vec());

        while let Some(requests) = unprocessed {
            attempts += 1;
            if attempts > 5 {
                tracing::warn!(
                    "Max retry attempts reached, {} writes may not be applied",
                    requests.len()
                );
                break;
            }

            let result = client
                .batch_write_item()
                .request_items(table_name, requests)
                .send()
                .await?;

            unprocessed = result
                .unprocessed_items()
                .and_then(|items| items.get(table_name))
                .filter(|items| !items.is_empty())
                .cloned();

            if unprocessed.is_some() {
                tokio::time::sleep(tokio::time::Duration::from_millis(100 * attempts as u64))
                    .await;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> Project {
        Project {
            project_id: "p1".to_string(),
            title: "Tracker".to_string(),
            description: "Internal tracker".to_string(),
            project_type: "BE".to_string(),
            author_user_id: "u1".to_string(),
            author_name: "Ann Smith".to_string(),
            created_at: "2024-03-05T14:30:00+00:00".to_string(),
        }
    }

    #[test]
    fn creating_a_project_enrolls_the_author_as_creator() {
        let items = creator_bootstrap_items(&project(), "c1");
        assert_eq!(items.len(), 3);

        let project_item = &items[0];
        assert_eq!(ddb::field(project_item, "PK"), "PROJECT#p1");
        assert_eq!(ddb::field(project_item, "SK"), "PROJECT#p1");
        assert_eq!(ddb::field(project_item, "author_user_id"), "u1");

        let user_link = &items[1];
        assert_eq!(ddb::field(user_link, "PK"), "USER#u1");
        assert_eq!(ddb::field(user_link, "SK"), "PROJECT#p1");
        assert_eq!(Role::parse(&ddb::field(user_link, "role")), Some(Role::Creator));

        let member_link = &items[2];
        assert_eq!(ddb::field(member_link, "PK"), "PROJECT#p1");
        assert_eq!(ddb::field(member_link, "SK"), "MEMBER#u1");
        assert_eq!(Role::parse(&ddb::field(member_link, "role")), Some(Role::Creator));
        assert_eq!(ddb::field(member_link, "contributor_id"), "c1");
        assert_eq!(ddb::field(member_link, "user_name"), "Ann Smith");
    }

    #[test]
    fn bootstrap_links_carry_the_creation_timestamp() {
        let items = creator_bootstrap_items(&project(), "c1");
        for link in &items[1..] {
            assert_eq!(ddb::field(link, "joined_at"), "2024-03-05T14:30:00+00:00");
        }
    }
}
