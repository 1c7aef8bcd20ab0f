pub mod auth;
pub mod comments;
pub mod contributors;
pub mod ddb;
pub mod error;
pub mod issues;
pub mod permissions;
pub mod projects;
pub mod responses;
pub mod types;
pub mod users;

use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub cognito_client: CognitoClient,
    pub dynamo_client: DynamoClient,
}

impl AppState {
    pub fn new(cognito_client: CognitoClient, dynamo_client: DynamoClient) -> Arc<Self> {
        Arc::new(Self {
            cognito_client,
            dynamo_client,
        })
    }
}
