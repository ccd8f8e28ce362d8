use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{
    Challenge, ChallengeKind, ChallengeRecord, Concept, ConceptRecord, ExampleData,
    RecordedSession, RecordedSessionRecord, Workshop, WorkshopRecord,
};

pub const NOTIFICATION_DISMISS_MS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
}

/// Banner shown after an admin action; the client hides it after
/// `dismiss_after_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    pub kind: NotificationKind,
    pub dismiss_after_ms: u64,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: NotificationKind::Success,
            dismiss_after_ms: NOTIFICATION_DISMISS_MS,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: NotificationKind::Error,
            dismiss_after_ms: NOTIFICATION_DISMISS_MS,
        }
    }
}

/// Comma separated prerequisites as typed by an admin.
pub fn parse_prerequisites(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

pub fn join_prerequisites(prerequisites: &[String]) -> String {
    prerequisites.join(", ")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct WorkshopForm {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub hosts: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prerequisites_text: String,
    #[serde(default)]
    pub materials: Vec<String>,
}

impl From<&Workshop> for WorkshopForm {
    fn from(workshop: &Workshop) -> Self {
        Self {
            title: workshop.title.clone(),
            date: workshop.date.clone(),
            hosts: workshop.hosts.clone(),
            description: workshop.description.clone(),
            prerequisites_text: join_prerequisites(&workshop.prerequisites),
            materials: workshop.materials.clone(),
        }
    }
}

impl WorkshopForm {
    pub fn to_record(&self) -> WorkshopRecord {
        WorkshopRecord {
            title: self.title.trim().to_string(),
            date: self.date.clone(),
            hosts: self.hosts.clone(),
            description: self.description.clone(),
            prerequisites: parse_prerequisites(&self.prerequisites_text),
            materials: self.materials.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct SessionForm {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub description: String,
    #[validate(length(min = 1, message = "YouTube video id is required"))]
    pub youtube_video_id: String,
}

impl From<&RecordedSession> for SessionForm {
    fn from(session: &RecordedSession) -> Self {
        Self {
            title: session.title.clone(),
            date: session.date.clone(),
            description: session.description.clone().unwrap_or_default(),
            youtube_video_id: session.youtube_video_id.clone(),
        }
    }
}

impl SessionForm {
    pub fn to_record(&self) -> RecordedSessionRecord {
        let description = self.description.trim();
        RecordedSessionRecord {
            title: self.title.trim().to_string(),
            date: self.date.clone(),
            description: (!description.is_empty()).then(|| self.description.clone()),
            youtube_video_id: self.youtube_video_id.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ChallengeForm {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[serde(default)]
    pub kind: ChallengeKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub problem_statement: String,
    #[serde(default)]
    pub example_code: ExampleData,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub starter_code: String,
    #[serde(default)]
    pub validation_script: String,
    #[serde(default)]
    pub test_runner_script: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl From<&Challenge> for ChallengeForm {
    fn from(challenge: &Challenge) -> Self {
        Self {
            title: challenge.title.clone(),
            kind: challenge.kind,
            description: challenge.description.clone(),
            problem_statement: challenge.problem_statement.clone(),
            example_code: challenge.example_code.clone(),
            constraints: challenge.constraints.clone(),
            starter_code: challenge.starter_code.clone(),
            validation_script: challenge.validation_script.clone(),
            test_runner_script: challenge.test_runner_script.clone(),
            is_active: challenge.is_active,
        }
    }
}

impl ChallengeForm {
    pub fn to_record(&self) -> ChallengeRecord {
        ChallengeRecord {
            title: self.title.trim().to_string(),
            kind: self.kind,
            description: self.description.clone(),
            problem_statement: self.problem_statement.clone(),
            example_code: self.example_code.clone(),
            constraints: self.constraints.clone(),
            starter_code: self.starter_code.clone(),
            validation_script: self.validation_script.clone(),
            test_runner_script: self.test_runner_script.clone(),
            is_active: self.is_active,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ConceptForm {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[validate(url(message = "Article URL must be a valid URL"))]
    pub article_url: String,
    #[serde(default)]
    pub is_active: bool,
}

impl From<&Concept> for ConceptForm {
    fn from(concept: &Concept) -> Self {
        Self {
            title: concept.title.clone(),
            description: concept.description.clone(),
            article_url: concept.article_url.clone(),
            is_active: concept.is_active,
        }
    }
}

impl ConceptForm {
    pub fn to_record(&self) -> ConceptRecord {
        ConceptRecord {
            title: self.title.trim().to_string(),
            description: self.description.clone(),
            article_url: self.article_url.trim().to_string(),
            is_active: self.is_active,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct InviteForm {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "First name is required"))]
    pub fname: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub lname: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleForm {
    /// "Admin" or "Trainee", as offered by the role picker.
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AcceptInviteForm {
    #[validate(length(min = 1, message = "Invite token is required"))]
    pub token: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}
