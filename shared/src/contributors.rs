use aws_sdk_dynamodb::types::{Put, TransactWriteItem};
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};
use std::collections::HashMap;

use crate::ddb::{self, Item};
use crate::error::{self, ApiError};
use crate::permissions::Role;
use crate::responses::ContributorView;
use crate::types::{Contributor, CreateContributorRequest};
use crate::users;

fn contributor_from_item(project_id: &str, user_id: &str, item: &Item) -> Contributor {
    Contributor {
        contributor_id: ddb::field(item, "contributor_id"),
        project_id: project_id.to_string(),
        user_id: user_id.to_string(),
        user_name: ddb::field(item, "user_name"),
        role: ddb::field(item, "role"),
        joined_at: ddb::field(item, "joined_at"),
    }
}

async fn fetch_contributors(
    client: &DynamoClient,
    table_name: &str,
    project_id: &str,
) -> Result<Vec<Contributor>, Error> {
    let pk = format!("PROJECT#{}", project_id);

    let result = client
        .query()
        .table_name(table_name)
        .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
        .expression_attribute_values(":pk", ddb::s(pk))
        .expression_attribute_values(":sk_prefix", ddb::s("MEMBER#"))
        .send()
        .await?;

    let mut contributors = Vec::new();
    for item in result.items() {
        if let Some(sk) = item.get("SK").and_then(|v| v.as_s().ok()) {
            if let Some(user_id) = sk.strip_prefix("MEMBER#") {
                contributors.push(contributor_from_item(project_id, user_id, item));
            }
        }
    }
    Ok(contributors)
}

/// List the contributors of a project.
pub async fn list_contributors(
    client: &DynamoClient,
    table_name: &str,
    project_id: &str,
) -> Result<Response<Body>, Error> {
    let contributors = fetch_contributors(client, table_name, project_id).await?;
    let views: Vec<ContributorView> = contributors.iter().map(ContributorView::of).collect();
    error::json_response(StatusCode::OK, &views)
}

/// Add a contributor to a project. Explicitly invited users always get the
/// `contributor` role; `creator` exists only through the project-creation
/// bootstrap. The membership pair is unique: both link items are written in
/// one transaction conditioned on the member item not existing, so two
/// concurrent invites for the same user cannot both commit.
pub async fn create_contributor(
    client: &DynamoClient,
    table_name: &str,
    project_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: CreateContributorRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!("Failed to parse contributor body: {}", e);
            return error::bad_request(format!("Invalid request body: {}", e));
        }
    };

    let profile = match users::fetch_profile(client, table_name, &req.user_id).await? {
        Some(profile) => profile,
        None => {
            return ApiError::field("user_id", "User does not exist.").into_response();
        }
    };

    let user_name = crate::responses::full_name(&profile.first_name, &profile.last_name);
    let contributor_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    let project_pk = format!("PROJECT#{}", project_id);
    let member_sk = format!("MEMBER#{}", req.user_id);
    let user_pk = format!("USER#{}", req.user_id);

    let member_put = Put::builder()
        .table_name(table_name)
        .item("PK", ddb::s(project_pk.clone()))
        .item("SK", ddb::s(member_sk))
        .item("contributor_id", ddb::s(contributor_id.clone()))
        .item("role", ddb::s(Role::Contributor.code()))
        .item("user_name", ddb::s(user_name.clone()))
        .item("joined_at", ddb::s(now.clone()))
        .condition_expression("attribute_not_exists(PK)")
        .build()?;

    let link_put = Put::builder()
        .table_name(table_name)
        .item("PK", ddb::s(user_pk))
        .item("SK", ddb::s(project_pk))
        .item("role", ddb::s(Role::Contributor.code()))
        .item("joined_at", ddb::s(now.clone()))
        .build()?;

    if let Err(e) = client
        .transact_write_items()
        .transact_items(TransactWriteItem::builder().put(member_put).build())
        .transact_items(TransactWriteItem::builder().put(link_put).build())
        .send()
        .await
    {
        let service = e.into_service_error();
        if service.is_transaction_canceled_exception() {
            return duplicate_member_error().into_response();
        }
        tracing::error!("Failed to add contributor: {:?}", service);
        return Err(service.into());
    }

    tracing::info!(
        "Contributor added: user {} on project {}",
        req.user_id,
        project_id
    );

    let contributor = Contributor {
        contributor_id,
        project_id: project_id.to_string(),
        user_id: req.user_id,
        user_name,
        role: Role::Contributor.code().to_string(),
        joined_at: now,
    };

    error::json_response(StatusCode::CREATED, &ContributorView::of(&contributor))
}

/// Remove a contributor. The creator membership is protected for the lifetime
/// of the project; attempting to remove it is a validation error, not a
/// permission error.
pub async fn delete_contributor(
    client: &DynamoClient,
    table_name: &str,
    project_id: &str,
    contributor_id: &str,
) -> Result<Response<Body>, Error> {
    let contributors = fetch_contributors(client, table_name, project_id).await?;
    let target = match contributors
        .into_iter()
        .find(|c| c.contributor_id == contributor_id)
    {
        Some(target) => target,
        None => return error::not_found("Contributor not found"),
    };

    if let Some(error) = removal_error(&target.role) {
        return error.into_response();
    }

    let project_pk = format!("PROJECT#{}", project_id);
    let mut member_key = HashMap::new();
    member_key.insert("PK".to_string(), ddb::s(project_pk.clone()));
    member_key.insert("SK".to_string(), ddb::s(format!("MEMBER#{}", target.user_id)));

    let mut link_key = HashMap::new();
    link_key.insert("PK".to_string(), ddb::s(format!("USER#{}", target.user_id)));
    link_key.insert("SK".to_string(), ddb::s(project_pk));

    crate::projects::batch_delete(client, table_name, vec![member_key, link_key]).await?;

    tracing::info!(
        "Contributor removed: user {} from project {}",
        target.user_id,
        project_id
    );

    error::no_content()
}

/// The creator membership is protected for the lifetime of the project;
/// removing it is a validation error, not a permission error.
fn removal_error(role: &str) -> Option<ApiError> {
    if Role::parse(role) == Some(Role::Creator) {
        Some(ApiError::field("role", "The project creator cannot be removed."))
    } else {
        None
    }
}

/// A second membership for the same (project, user) pair cancels the insert
/// transaction; surfaced as a field error on the invited user.
fn duplicate_member_error() -> ApiError {
    ApiError::field("user_id", "User is already a contributor on this project.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removing_the_creator_is_a_validation_error() {
        let error = match removal_error(Role::Creator.code()) {
            Some(error) => error,
            None => panic!("creator removal was not rejected"),
        };
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        match error {
            ApiError::Validation(fields) => {
                assert_eq!(fields["role"][0], "The project creator cannot be removed.");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn plain_contributors_can_be_removed() {
        assert!(removal_error(Role::Contributor.code()).is_none());
        // Unrecognized role codes are not mistaken for the creator
        assert!(removal_error("XX").is_none());
    }

    #[test]
    fn duplicate_membership_maps_to_a_field_error() {
        let error = duplicate_member_error();
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        match error {
            ApiError::Validation(fields) => {
                assert_eq!(
                    fields["user_id"][0],
                    "User is already a contributor on this project."
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
