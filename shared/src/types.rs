use serde::{Deserialize, Serialize};

// ========== CHOICE FIELDS ==========
// Enum-valued attributes travel on the wire as two-letter codes. Each enum
// exposes its code, a human-readable label, and the full choice set for
// validation error messages.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectType {
    BackEnd,
    FrontEnd,
    Ios,
    Android,
}

impl ProjectType {
    pub const FIELD: &'static str = "type";
    pub const CHOICES: [ProjectType; 4] = [
        ProjectType::BackEnd,
        ProjectType::FrontEnd,
        ProjectType::Ios,
        ProjectType::Android,
    ];

    pub fn code(self) -> &'static str {
        match self {
            ProjectType::BackEnd => "BE",
            ProjectType::FrontEnd => "FE",
            ProjectType::Ios => "IO",
            ProjectType::Android => "AD",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProjectType::BackEnd => "Back-end",
            ProjectType::FrontEnd => "Front-end",
            ProjectType::Ios => "iOS",
            ProjectType::Android => "Android",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::CHOICES.into_iter().find(|c| c.code() == code)
    }

    pub fn choices_display() -> String {
        choices_display(&Self::CHOICES.map(|c| (c.code(), c.label())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueTag {
    Bug,
    Improvement,
    Task,
}

impl IssueTag {
    pub const FIELD: &'static str = "tag";
    pub const CHOICES: [IssueTag; 3] = [IssueTag::Bug, IssueTag::Improvement, IssueTag::Task];

    pub fn code(self) -> &'static str {
        match self {
            IssueTag::Bug => "BG",
            IssueTag::Improvement => "IM",
            IssueTag::Task => "TA",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IssueTag::Bug => "Bug",
            IssueTag::Improvement => "Improvement",
            IssueTag::Task => "Task",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::CHOICES.into_iter().find(|c| c.code() == code)
    }

    pub fn choices_display() -> String {
        choices_display(&Self::CHOICES.map(|c| (c.code(), c.label())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuePriority {
    Low,
    Medium,
    High,
}

impl IssuePriority {
    pub const FIELD: &'static str = "priority";
    pub const CHOICES: [IssuePriority; 3] = [
        IssuePriority::Low,
        IssuePriority::Medium,
        IssuePriority::High,
    ];

    pub fn code(self) -> &'static str {
        match self {
            IssuePriority::Low => "LO",
            IssuePriority::Medium => "ME",
            IssuePriority::High => "HI",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IssuePriority::Low => "Low",
            IssuePriority::Medium => "Medium",
            IssuePriority::High => "High",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::CHOICES.into_iter().find(|c| c.code() == code)
    }

    pub fn choices_display() -> String {
        choices_display(&Self::CHOICES.map(|c| (c.code(), c.label())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueStatus {
    Todo,
    InProgress,
    Done,
}

impl IssueStatus {
    pub const FIELD: &'static str = "status";
    pub const CHOICES: [IssueStatus; 3] = [
        IssueStatus::Todo,
        IssueStatus::InProgress,
        IssueStatus::Done,
    ];

    pub fn code(self) -> &'static str {
        match self {
            IssueStatus::Todo => "TD",
            IssueStatus::InProgress => "IP",
            IssueStatus::Done => "DN",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IssueStatus::Todo => "To do",
            IssueStatus::InProgress => "In progress",
            IssueStatus::Done => "Done",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::CHOICES.into_iter().find(|c| c.code() == code)
    }

    pub fn choices_display() -> String {
        choices_display(&Self::CHOICES.map(|c| (c.code(), c.label())))
    }
}

fn choices_display(choices: &[(&str, &str)]) -> String {
    choices
        .iter()
        .map(|(code, label)| format!("{} ({})", code, label))
        .collect::<Vec<_>>()
        .join(", ")
}

// ========== USER ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserProfile {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    pub first_name: String,
    pub last_name: String,
}

// ========== PROJECT ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Project {
    pub project_id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub project_type: String, // BE | FE | IO | AD
    pub author_user_id: String,
    pub author_name: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub project_type: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub project_type: Option<String>,
}

// ========== CONTRIBUTOR ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Contributor {
    pub contributor_id: String,
    pub project_id: String,
    pub user_id: String,
    pub user_name: String,
    pub role: String, // CR | CO
    pub joined_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateContributorRequest {
    pub user_id: String,
}

// ========== ISSUE ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Issue {
    pub issue_id: String,
    pub project_id: String,
    pub title: String,
    pub description: String,
    pub tag: String,      // BG | IM | TA
    pub priority: String, // LO | ME | HI
    pub status: String,   // TD | IP | DN
    pub author_user_id: String,
    pub author_name: String,
    pub assigned_user_id: String,
    pub assigned_name: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateIssueRequest {
    pub title: String,
    pub description: String,
    pub tag: String,
    pub priority: String,
    pub status: String,
    pub assigned_user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateIssueRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tag: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub assigned_user_id: Option<String>,
}

// ========== COMMENT ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Comment {
    pub comment_id: String,
    pub issue_id: String,
    pub description: String,
    pub author_user_id: String,
    pub author_name: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommentRequest {
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_type_codes_round_trip() {
        for choice in ProjectType::CHOICES {
            assert_eq!(ProjectType::parse(choice.code()), Some(choice));
        }
        assert_eq!(ProjectType::parse("XX"), None);
        assert_eq!(ProjectType::parse("be"), None);
    }

    #[test]
    fn issue_enums_reject_unknown_codes() {
        assert_eq!(IssueTag::parse("ZZ"), None);
        assert_eq!(IssuePriority::parse(""), None);
        assert_eq!(IssueStatus::parse("TODO"), None);
    }

    #[test]
    fn labels_match_codes() {
        assert_eq!(ProjectType::parse("IO").map(|c| c.label()), Some("iOS"));
        assert_eq!(IssueTag::parse("IM").map(|c| c.label()), Some("Improvement"));
        assert_eq!(IssuePriority::parse("HI").map(|c| c.label()), Some("High"));
        assert_eq!(
            IssueStatus::parse("IP").map(|c| c.label()),
            Some("In progress")
        );
    }

    #[test]
    fn choices_display_names_the_full_set() {
        let display = ProjectType::choices_display();
        assert_eq!(
            display,
            "BE (Back-end), FE (Front-end), IO (iOS), AD (Android)"
        );
        assert!(IssueStatus::choices_display().contains("TD (To do)"));
    }
}
