use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::Method, Error};

use crate::ddb;

/// Verb class for policy decisions. Safe methods are read-class, everything
/// else is write-class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
}

impl Action {
    pub fn from_method(method: &Method) -> Self {
        match *method {
            Method::GET | Method::HEAD | Method::OPTIONS => Action::Read,
            _ => Action::Write,
        }
    }
}

/// Contributor role on a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Creator,
    Contributor,
}

impl Role {
    pub fn code(self) -> &'static str {
        match self {
            Role::Creator => "CR",
            Role::Contributor => "CO",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Creator => "Creator",
            Role::Contributor => "Contributor",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "CR" => Some(Role::Creator),
            "CO" => Some(Role::Contributor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(&'static str),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Membership-level policies. Each is a pure predicate over the actor's
/// membership record (if any) and the verb class; a route requires all of its
/// policies to allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Any contributor may read; only the project creator may write.
    ProjectOwnerOrContributor,
    /// Any contributor passes, regardless of verb.
    ProjectContributorRequired,
}

/// Resource scopes nested under a project, as matched by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteScope {
    Contributors,
    Issues,
    Comments,
}

/// Named route -> policy table. Object-level authorship checks
/// (`owner_or_read_only`) are applied by the services after the object is
/// fetched, so a missing object stays a 404 rather than a 403.
pub const fn route_policies(scope: RouteScope) -> &'static [Policy] {
    match scope {
        RouteScope::Contributors => &[Policy::ProjectOwnerOrContributor],
        RouteScope::Issues | RouteScope::Comments => &[Policy::ProjectContributorRequired],
    }
}

pub fn project_owner_or_contributor(role: Option<Role>, action: Action) -> Decision {
    match role {
        None => Decision::Deny("You are not a contributor on this project"),
        Some(_) if action == Action::Read => Decision::Allow,
        Some(Role::Creator) => Decision::Allow,
        Some(Role::Contributor) => {
            Decision::Deny("Only the project creator can manage contributors")
        }
    }
}

pub fn project_contributor_required(role: Option<Role>, _action: Action) -> Decision {
    match role {
        Some(_) => Decision::Allow,
        None => Decision::Deny("You are not a contributor on this project"),
    }
}

/// Object-level check: reads always pass, writes only for the object's author.
pub fn owner_or_read_only(action: Action, author_user_id: &str, actor_id: &str) -> Decision {
    if action == Action::Read || author_user_id == actor_id {
        Decision::Allow
    } else {
        Decision::Deny("Only the author can modify this resource")
    }
}

pub fn evaluate(policies: &[Policy], role: Option<Role>, action: Action) -> Decision {
    for policy in policies {
        let decision = match policy {
            Policy::ProjectOwnerOrContributor => project_owner_or_contributor(role, action),
            Policy::ProjectContributorRequired => project_contributor_required(role, action),
        };
        if let Decision::Deny(reason) = decision {
            return Decision::Deny(reason);
        }
    }
    Decision::Allow
}

/// Look up the actor's membership record for a project.
pub async fn fetch_role(
    client: &DynamoClient,
    table_name: &str,
    project_id: &str,
    user_id: &str,
) -> Result<Option<Role>, Error> {
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", ddb::s(format!("PROJECT#{}", project_id)))
        .key("SK", ddb::s(format!("MEMBER#{}", user_id)))
        .send()
        .await?;

    Ok(result
        .item()
        .and_then(|item| Role::parse(&ddb::field(item, "role"))))
}

/// Apply a route's membership policies for the given actor and verb.
pub async fn authorize(
    client: &DynamoClient,
    table_name: &str,
    scope: RouteScope,
    project_id: &str,
    user_id: &str,
    action: Action,
) -> Result<Decision, Error> {
    let role = fetch_role(client, table_name, project_id, user_id).await?;
    Ok(evaluate(route_policies(scope), role, action))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_methods_are_read_class() {
        assert_eq!(Action::from_method(&Method::GET), Action::Read);
        assert_eq!(Action::from_method(&Method::HEAD), Action::Read);
        assert_eq!(Action::from_method(&Method::OPTIONS), Action::Read);
        assert_eq!(Action::from_method(&Method::POST), Action::Write);
        assert_eq!(Action::from_method(&Method::PUT), Action::Write);
        assert_eq!(Action::from_method(&Method::DELETE), Action::Write);
    }

    #[test]
    fn owner_or_contributor_gates_writes_to_the_creator() {
        let cases = [
            (None, Action::Read, false),
            (None, Action::Write, false),
            (Some(Role::Contributor), Action::Read, true),
            (Some(Role::Contributor), Action::Write, false),
            (Some(Role::Creator), Action::Read, true),
            (Some(Role::Creator), Action::Write, true),
        ];
        for (role, action, allowed) in cases {
            assert_eq!(
                project_owner_or_contributor(role, action).is_allowed(),
                allowed,
                "role {:?} action {:?}",
                role,
                action
            );
        }
    }

    #[test]
    fn contributor_required_ignores_the_verb() {
        for action in [Action::Read, Action::Write] {
            assert!(project_contributor_required(Some(Role::Contributor), action).is_allowed());
            assert!(project_contributor_required(Some(Role::Creator), action).is_allowed());
            assert!(!project_contributor_required(None, action).is_allowed());
        }
    }

    #[test]
    fn owner_or_read_only_checks_authorship_on_writes() {
        assert!(owner_or_read_only(Action::Read, "author", "someone-else").is_allowed());
        assert!(owner_or_read_only(Action::Write, "author", "author").is_allowed());
        assert!(!owner_or_read_only(Action::Write, "author", "someone-else").is_allowed());
    }

    #[test]
    fn route_table_stacks_policies_as_expected() {
        assert_eq!(
            route_policies(RouteScope::Contributors),
            &[Policy::ProjectOwnerOrContributor][..]
        );
        assert_eq!(
            route_policies(RouteScope::Issues),
            &[Policy::ProjectContributorRequired][..]
        );
        assert_eq!(
            route_policies(RouteScope::Comments),
            &[Policy::ProjectContributorRequired][..]
        );
    }

    #[test]
    fn evaluate_is_a_logical_and() {
        let policies = route_policies(RouteScope::Contributors);
        assert!(evaluate(policies, Some(Role::Creator), Action::Write).is_allowed());
        assert!(!evaluate(policies, Some(Role::Contributor), Action::Write).is_allowed());
        assert!(!evaluate(policies, None, Action::Read).is_allowed());
        assert!(evaluate(&[], None, Action::Write).is_allowed());
    }

    #[test]
    fn role_codes_round_trip() {
        assert_eq!(Role::parse("CR"), Some(Role::Creator));
        assert_eq!(Role::parse("CO"), Some(Role::Contributor));
        assert_eq!(Role::parse("XX"), None);
        assert_eq!(Role::Creator.label(), "Creator");
    }
}
