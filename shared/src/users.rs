use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::Error;

use crate::ddb;
use crate::types::UserProfile;

/// Fetch a user profile by id.
pub async fn fetch_profile(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Option<UserProfile>, Error> {
    let pk = format!("USER#{}", user_id);

    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", ddb::s(pk.clone()))
        .key("SK", ddb::s(pk))
        .send()
        .await?;

    Ok(result.item().map(|item| UserProfile {
        user_id: user_id.to_string(),
        email: ddb::field(item, "email"),
        first_name: ddb::field(item, "first_name"),
        last_name: ddb::field(item, "last_name"),
        created_at: ddb::field(item, "created_at"),
    }))
}

/// Display name for a user id, empty when the profile is missing.
pub async fn display_name(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<String, Error> {
    Ok(fetch_profile(client, table_name, user_id)
        .await?
        .map(|profile| crate::responses::full_name(&profile.first_name, &profile.last_name))
        .unwrap_or_default())
}
