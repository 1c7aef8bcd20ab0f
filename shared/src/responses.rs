use serde::Serialize;

use crate::permissions::Role;
use crate::types::{
    Comment, Contributor, Issue, IssuePriority, IssueStatus, IssueTag, Project, ProjectType,
};

/// Render a stored RFC 3339 timestamp as `DD/MM/YYYY HH:MM`.
pub fn display_time(rfc3339: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(rfc3339)
        .map(|t| t.format("%d/%m/%Y %H:%M").to_string())
        .unwrap_or_else(|_| rfc3339.to_string())
}

/// "First Last", collapsing missing parts.
pub fn full_name(first_name: &str, last_name: &str) -> String {
    [first_name.trim(), last_name.trim()]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

fn type_label(code: &str) -> String {
    ProjectType::parse(code)
        .map(|c| c.label().to_string())
        .unwrap_or_default()
}

fn tag_label(code: &str) -> String {
    IssueTag::parse(code)
        .map(|c| c.label().to_string())
        .unwrap_or_default()
}

fn priority_label(code: &str) -> String {
    IssuePriority::parse(code)
        .map(|c| c.label().to_string())
        .unwrap_or_default()
}

fn status_label(code: &str) -> String {
    IssueStatus::parse(code)
        .map(|c| c.label().to_string())
        .unwrap_or_default()
}

// Two explicit shapes per entity: the list shape omits description and other
// long fields, the detail shape carries everything. Services pick the shape
// per operation.

#[derive(Debug, Serialize)]
pub struct ProjectListView {
    pub project_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub project_type: String,
    pub type_label: String,
    pub author_user_id: String,
    pub author_name: String,
}

impl ProjectListView {
    pub fn of(project: &Project) -> Self {
        Self {
            project_id: project.project_id.clone(),
            title: project.title.clone(),
            project_type: project.project_type.clone(),
            type_label: type_label(&project.project_type),
            author_user_id: project.author_user_id.clone(),
            author_name: project.author_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectDetailView {
    pub project_id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub project_type: String,
    pub type_label: String,
    pub author_user_id: String,
    pub author_name: String,
}

impl ProjectDetailView {
    pub fn of(project: &Project) -> Self {
        Self {
            project_id: project.project_id.clone(),
            title: project.title.clone(),
            description: project.description.clone(),
            project_type: project.project_type.clone(),
            type_label: type_label(&project.project_type),
            author_user_id: project.author_user_id.clone(),
            author_name: project.author_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ContributorView {
    pub contributor_id: String,
    pub user_id: String,
    pub user_name: String,
    pub role: String,
    pub role_label: String,
}

impl ContributorView {
    pub fn of(contributor: &Contributor) -> Self {
        Self {
            contributor_id: contributor.contributor_id.clone(),
            user_id: contributor.user_id.clone(),
            user_name: contributor.user_name.clone(),
            role: contributor.role.clone(),
            role_label: Role::parse(&contributor.role)
                .map(|r| r.label().to_string())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IssueListView {
    pub issue_id: String,
    pub title: String,
    pub tag: String,
    pub tag_label: String,
    pub priority: String,
    pub priority_label: String,
    pub status: String,
    pub status_label: String,
    pub created_time: String,
}

impl IssueListView {
    pub fn of(issue: &Issue) -> Self {
        Self {
            issue_id: issue.issue_id.clone(),
            title: issue.title.clone(),
            tag: issue.tag.clone(),
            tag_label: tag_label(&issue.tag),
            priority: issue.priority.clone(),
            priority_label: priority_label(&issue.priority),
            status: issue.status.clone(),
            status_label: status_label(&issue.status),
            created_time: display_time(&issue.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IssueDetailView {
    pub issue_id: String,
    pub project_id: String,
    pub title: String,
    pub description: String,
    pub tag: String,
    pub tag_label: String,
    pub priority: String,
    pub priority_label: String,
    pub status: String,
    pub status_label: String,
    pub author_user_id: String,
    pub author_name: String,
    pub assigned_user_id: String,
    pub assigned_name: String,
    pub created_time: String,
}

impl IssueDetailView {
    pub fn of(issue: &Issue) -> Self {
        Self {
            issue_id: issue.issue_id.clone(),
            project_id: issue.project_id.clone(),
            title: issue.title.clone(),
            description: issue.description.clone(),
            tag: issue.tag.clone(),
            tag_label: tag_label(&issue.tag),
            priority: issue.priority.clone(),
            priority_label: priority_label(&issue.priority),
            status: issue.status.clone(),
            status_label: status_label(&issue.status),
            author_user_id: issue.author_user_id.clone(),
            author_name: issue.author_name.clone(),
            assigned_user_id: issue.assigned_user_id.clone(),
            assigned_name: issue.assigned_name.clone(),
            created_time: display_time(&issue.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommentListView {
    pub comment_id: String,
    pub issue_id: String,
    pub description: String,
    pub author_user_id: String,
    pub author_name: String,
}

impl CommentListView {
    pub fn of(comment: &Comment) -> Self {
        Self {
            comment_id: comment.comment_id.clone(),
            issue_id: comment.issue_id.clone(),
            description: comment.description.clone(),
            author_user_id: comment.author_user_id.clone(),
            author_name: comment.author_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommentDetailView {
    pub comment_id: String,
    pub issue_id: String,
    pub description: String,
    pub author_user_id: String,
    pub author_name: String,
    pub created_time: String,
}

impl CommentDetailView {
    pub fn of(comment: &Comment) -> Self {
        Self {
            comment_id: comment.comment_id.clone(),
            issue_id: comment.issue_id.clone(),
            description: comment.description.clone(),
            author_user_id: comment.author_user_id.clone(),
            author_name: comment.author_name.clone(),
            created_time: display_time(&comment.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_issue() -> Issue {
        Issue {
            issue_id: "i-1".into(),
            project_id: "p-1".into(),
            title: "Bug1".into(),
            description: "crash on save".into(),
            tag: "BG".into(),
            priority: "LO".into(),
            status: "TD".into(),
            author_user_id: "u-b".into(),
            author_name: "Bob Builder".into(),
            assigned_user_id: "u-b".into(),
            assigned_name: "Bob Builder".into(),
            created_at: "2024-03-05T14:30:00+00:00".into(),
        }
    }

    #[test]
    fn display_time_uses_day_month_year() {
        assert_eq!(display_time("2024-03-05T14:30:00+00:00"), "05/03/2024 14:30");
        // Unparseable input falls through untouched.
        assert_eq!(display_time("not-a-date"), "not-a-date");
    }

    #[test]
    fn full_name_skips_empty_parts() {
        assert_eq!(full_name("Ada", "Lovelace"), "Ada Lovelace");
        assert_eq!(full_name("Ada", ""), "Ada");
        assert_eq!(full_name("", ""), "");
    }

    #[test]
    fn issue_list_shape_omits_long_fields() {
        let issue = sample_issue();
        let list = serde_json::to_value(IssueListView::of(&issue)).unwrap();
        assert!(list.get("description").is_none());
        assert!(list.get("author_name").is_none());
        assert_eq!(list["tag_label"], "Bug");
        assert_eq!(list["created_time"], "05/03/2024 14:30");

        let detail = serde_json::to_value(IssueDetailView::of(&issue)).unwrap();
        assert_eq!(detail["description"], "crash on save");
        assert_eq!(detail["project_id"], "p-1");
        assert_eq!(detail["assigned_name"], "Bob Builder");
        assert_eq!(detail["status_label"], "To do");
    }

    #[test]
    fn project_shapes_differ_on_description() {
        let project = Project {
            project_id: "p-1".into(),
            title: "Alpha".into(),
            description: "backend rewrite".into(),
            project_type: "BE".into(),
            author_user_id: "u-a".into(),
            author_name: "Ann Smith".into(),
            created_at: "2024-01-01T00:00:00+00:00".into(),
        };
        let list = serde_json::to_value(ProjectListView::of(&project)).unwrap();
        assert!(list.get("description").is_none());
        assert_eq!(list["type"], "BE");
        assert_eq!(list["type_label"], "Back-end");

        let detail = serde_json::to_value(ProjectDetailView::of(&project)).unwrap();
        assert_eq!(detail["description"], "backend rewrite");
    }

    #[test]
    fn contributor_view_carries_the_role_label() {
        let contributor = Contributor {
            contributor_id: "c-1".into(),
            project_id: "p-1".into(),
            user_id: "u-a".into(),
            user_name: "Ann Smith".into(),
            role: "CR".into(),
            joined_at: "2024-01-01T00:00:00+00:00".into(),
        };
        let view = serde_json::to_value(ContributorView::of(&contributor)).unwrap();
        assert_eq!(view["role"], "CR");
        assert_eq!(view["role_label"], "Creator");
    }

    #[test]
    fn comment_detail_adds_created_time() {
        let comment = Comment {
            comment_id: "c-1".into(),
            issue_id: "i-1".into(),
            description: "same here".into(),
            author_user_id: "u-b".into(),
            author_name: "Bob Builder".into(),
            created_at: "2024-03-05T14:30:00+00:00".into(),
        };
        let list = serde_json::to_value(CommentListView::of(&comment)).unwrap();
        assert!(list.get("created_time").is_none());
        let detail = serde_json::to_value(CommentDetailView::of(&comment)).unwrap();
        assert_eq!(detail["created_time"], "05/03/2024 14:30");
    }
}
