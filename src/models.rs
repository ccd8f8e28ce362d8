use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

fn to_utc(dt: Option<NaiveDateTime>) -> DateTime<Utc> {
    dt.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now)
}

fn json_list(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Workshop {
    pub id: i64,
    pub title: String,
    pub date: String,
    pub hosts: String,
    pub description: String,
    pub prerequisites: Vec<String>,
    pub materials: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbWorkshop {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub date: Option<String>,
    pub hosts: Option<String>,
    pub description: Option<String>,
    pub prerequisites: Option<String>,
    pub materials: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbWorkshop> for Workshop {
    fn from(db: DbWorkshop) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            title: db.title.unwrap_or_default(),
            date: db.date.unwrap_or_default(),
            hosts: db.hosts.unwrap_or_default(),
            description: db.description.unwrap_or_default(),
            prerequisites: json_list(db.prerequisites),
            materials: json_list(db.materials),
            created_at: to_utc(db.created_at),
        }
    }
}

/// Stored reference to an uploaded file. The view and download URLs are
/// filled in on read from `file_path`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Material {
    pub id: i64,
    pub name: String,
    pub file_path: String,
    pub view_url: String,
    pub download_url: String,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbMaterial {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub file_path: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecordedSession {
    pub id: i64,
    pub title: String,
    pub date: String,
    pub description: Option<String>,
    pub youtube_video_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbRecordedSession {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    pub youtube_video_id: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbRecordedSession> for RecordedSession {
    fn from(db: DbRecordedSession) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            title: db.title.unwrap_or_default(),
            date: db.date.unwrap_or_default(),
            description: db.description,
            youtube_video_id: db.youtube_video_id.unwrap_or_default(),
            created_at: to_utc(db.created_at),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Exam {
    pub name: String,
    pub max_score: f64,
    pub exam_date: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExamResult {
    pub score: f64,
    pub paper_url: Option<String>,
    pub feedback: Option<String>,
    pub exam: Exam,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbExamResult {
    pub score: Option<f64>,
    pub paper_url: Option<String>,
    pub feedback: Option<String>,
    pub exam_name: Option<String>,
    pub max_score: Option<f64>,
    pub exam_date: Option<String>,
}

impl From<DbExamResult> for ExamResult {
    fn from(db: DbExamResult) -> Self {
        Self {
            score: db.score.unwrap_or_default(),
            paper_url: db.paper_url,
            feedback: db.feedback,
            exam: Exam {
                name: db.exam_name.unwrap_or_default(),
                max_score: db.max_score.unwrap_or_default(),
                exam_date: db.exam_date,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Concept {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub article_url: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbConcept {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub article_url: Option<String>,
    pub is_active: Option<bool>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbConcept> for Concept {
    fn from(db: DbConcept) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            title: db.title.unwrap_or_default(),
            description: db.description.unwrap_or_default(),
            article_url: db.article_url.unwrap_or_default(),
            is_active: db.is_active.unwrap_or_default(),
            created_at: to_utc(db.created_at),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeKind {
    #[default]
    Coding,
    Data,
}

impl ChallengeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeKind::Coding => "coding",
            ChallengeKind::Data => "data",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "data" => ChallengeKind::Data,
            _ => ChallengeKind::Coding,
        }
    }
}

/// Tabular example shown next to a challenge.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TableData {
    pub columns: Vec<String>,
    pub data: Vec<serde_json::Map<String, Value>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ExampleData {
    pub input: TableData,
    pub output: TableData,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Challenge {
    pub id: i64,
    pub title: String,
    pub kind: ChallengeKind,
    pub description: String,
    pub problem_statement: String,
    pub example_code: ExampleData,
    /// Set when the stored example tables could not be decoded.
    #[serde(skip)]
    pub example_error: Option<String>,
    pub constraints: Vec<String>,
    pub starter_code: String,
    pub validation_script: String,
    pub test_runner_script: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbChallenge {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub kind: Option<String>,
    pub description: Option<String>,
    pub problem_statement: Option<String>,
    pub example_code: Option<String>,
    pub constraints: Option<String>,
    pub starter_code: Option<String>,
    pub validation_script: Option<String>,
    pub test_runner_script: Option<String>,
    pub is_active: Option<bool>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbChallenge> for Challenge {
    fn from(db: DbChallenge) -> Self {
        let (example_code, example_error) = match db.example_code.as_deref() {
            None | Some("") => (ExampleData::default(), None),
            Some(raw) => match serde_json::from_str(raw) {
                Ok(example) => (example, None),
                Err(e) => {
                    warn!(challenge_id = ?db.id, error = %e, "Stored example data is unreadable");
                    (ExampleData::default(), Some(e.to_string()))
                }
            },
        };

        Self {
            id: db.id.unwrap_or_default(),
            title: db.title.unwrap_or_default(),
            kind: ChallengeKind::parse(&db.kind.unwrap_or_default()),
            description: db.description.unwrap_or_default(),
            problem_statement: db.problem_statement.unwrap_or_default(),
            example_code,
            example_error,
            constraints: json_list(db.constraints),
            starter_code: db.starter_code.unwrap_or_default(),
            validation_script: db.validation_script.unwrap_or_default(),
            test_runner_script: db.test_runner_script.unwrap_or_default(),
            is_active: db.is_active.unwrap_or_default(),
            created_at: to_utc(db.created_at),
        }
    }
}

/// Listing shape used by the home page and the archive.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChallengeSummary {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub kind: ChallengeKind,
    pub created_at: DateTime<Utc>,
}

impl From<Challenge> for ChallengeSummary {
    fn from(challenge: Challenge) -> Self {
        Self {
            id: challenge.id,
            title: challenge.title,
            description: challenge.description,
            kind: challenge.kind,
            created_at: challenge.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceCategory {
    Books,
    Courses,
    Articles,
    Papers,
    Sheets,
}

impl ResourceCategory {
    /// Display order on the references page.
    pub const ORDER: [ResourceCategory; 5] = [
        ResourceCategory::Books,
        ResourceCategory::Courses,
        ResourceCategory::Articles,
        ResourceCategory::Papers,
        ResourceCategory::Sheets,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Books" => Some(ResourceCategory::Books),
            "Courses" => Some(ResourceCategory::Courses),
            "Articles" => Some(ResourceCategory::Articles),
            "Papers" => Some(ResourceCategory::Papers),
            "Sheets" => Some(ResourceCategory::Sheets),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: i64,
    pub category: String,
    pub title: String,
    pub author: String,
    pub image_url: String,
    pub tags: Vec<String>,
    pub annotation: String,
    pub url: String,
    pub action_text: String,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbResource {
    pub id: Option<i64>,
    pub category: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub image_url: Option<String>,
    pub tags: Option<String>,
    pub annotation: Option<String>,
    pub url: Option<String>,
    pub action_text: Option<String>,
}

impl From<DbResource> for Resource {
    fn from(db: DbResource) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            category: db.category.unwrap_or_default(),
            title: db.title.unwrap_or_default(),
            author: db.author.unwrap_or_default(),
            image_url: db.image_url.unwrap_or_default(),
            tags: json_list(db.tags),
            annotation: db.annotation.unwrap_or_default(),
            url: db.url.unwrap_or_default(),
            action_text: db.action_text.unwrap_or_default(),
        }
    }
}

/// Column values for inserting or updating a workshop.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkshopRecord {
    pub title: String,
    pub date: String,
    pub hosts: String,
    pub description: String,
    pub prerequisites: Vec<String>,
    pub materials: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSessionRecord {
    pub title: String,
    pub date: String,
    pub description: Option<String>,
    pub youtube_video_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeRecord {
    pub title: String,
    pub kind: ChallengeKind,
    pub description: String,
    pub problem_statement: String,
    pub example_code: ExampleData,
    pub constraints: Vec<String>,
    pub starter_code: String,
    pub validation_script: String,
    pub test_runner_script: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConceptRecord {
    pub title: String,
    pub description: String,
    pub article_url: String,
    pub is_active: bool,
}
