use std::future::Future;

use rocket::http::Status;
use rocket::response::{Redirect, Responder};
use rocket::serde::json::Json;
use rocket::{Request, State};
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use tracing::{error, instrument};

use crate::auth::{admin_guard, trainee_guard, GuardDecision, IdentityState, Shell, User};
use crate::db::{
    get_all_users, get_active_concept, get_challenge, get_workshop, get_workshop_materials,
    list_active_challenges, list_archived_challenges, list_archived_concepts, list_challenges,
    list_exam_results, list_recorded_sessions, list_resources, list_workshops,
};
use crate::error::AppError;
use crate::models::{
    ChallengeSummary, Concept, DbMaterial, ExamResult, ExampleData, Material, RecordedSession,
    Resource, ResourceCategory, Workshop,
};
use crate::storage::{file_name, ObjectStore};

/// What a page route hands to the client: which shell to draw, the page
/// title, and either the page data or an error placeholder.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub shell: Shell,
    pub title: String,
    pub data: Option<T>,
    pub error: Option<String>,
}

#[derive(Debug)]
pub enum PageOutcome<T> {
    Render(Page<T>),
    Redirect(&'static str),
    Loading,
}

impl<'r, T: Serialize> Responder<'r, 'static> for PageOutcome<T> {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'static> {
        match self {
            PageOutcome::Render(page) => Json(page).respond_to(req),
            PageOutcome::Redirect(to) => Redirect::to(to).respond_to(req),
            PageOutcome::Loading => Status::ServiceUnavailable.respond_to(req),
        }
    }
}

/// Applies the guard decision, then loads the page data. A failed load
/// becomes the page's error text unless `fallback` supplies a default.
async fn render<T, F>(
    decision: GuardDecision,
    path: &str,
    title: &str,
    error_message: Option<&str>,
    fallback: impl FnOnce() -> Option<T>,
    load: F,
) -> PageOutcome<T>
where
    F: Future<Output = Result<T, AppError>>,
{
    match decision {
        GuardDecision::Loading => PageOutcome::Loading,
        GuardDecision::Redirect(to) => PageOutcome::Redirect(to),
        GuardDecision::Render => {
            let (data, error) = match load.await {
                Ok(data) => (Some(data), None),
                Err(e) => {
                    e.log_and_record(&format!("Loading page {}", path));
                    match fallback() {
                        Some(data) => (Some(data), None),
                        None => (
                            None,
                            Some(error_message.unwrap_or("Something went wrong.").to_string()),
                        ),
                    }
                }
            };

            PageOutcome::Render(Page {
                shell: Shell::for_path(path),
                title: title.to_string(),
                data,
                error,
            })
        }
    }
}

pub fn material_with_urls(row: DbMaterial, store: &ObjectStore) -> Material {
    let file_path = row.file_path.unwrap_or_default();
    Material {
        id: row.id.unwrap_or_default(),
        name: row
            .name
            .unwrap_or_else(|| file_name(&file_path).to_string()),
        view_url: store.public_url(&file_path, false),
        download_url: store.public_url(&file_path, true),
        file_path,
    }
}

#[derive(Debug, Serialize)]
pub struct LoginData {
    pub providers: Vec<&'static str>,
}

#[get("/login")]
pub fn login_page() -> Json<Page<LoginData>> {
    Json(Page {
        shell: Shell::Login,
        title: "Sign in".to_string(),
        data: Some(LoginData {
            providers: vec!["google", "github"],
        }),
        error: None,
    })
}

#[derive(Debug, Serialize)]
pub struct HomeData {
    pub greeting: String,
    pub concept: Option<Concept>,
    pub challenges: Vec<ChallengeSummary>,
    pub coding_challenge: Option<ChallengeSummary>,
    pub data_challenge: Option<ChallengeSummary>,
}

fn greeting(user: Option<&User>) -> String {
    let name = user
        .map(|u| u.fname.as_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("Guest");
    format!("Welcome Back, {}!", name)
}

async fn load_home(db: &Pool<Sqlite>, user: Option<&User>) -> Result<HomeData, AppError> {
    let concept = get_active_concept(db).await?;
    let challenges: Vec<ChallengeSummary> = list_active_challenges(db)
        .await?
        .into_iter()
        .map(ChallengeSummary::from)
        .collect();

    let first_of = |kind| challenges.iter().find(|c| c.kind == kind).cloned();

    Ok(HomeData {
        greeting: greeting(user),
        concept,
        coding_challenge: first_of(crate::models::ChallengeKind::Coding),
        data_challenge: first_of(crate::models::ChallengeKind::Data),
        challenges,
    })
}

#[get("/")]
#[instrument(skip_all)]
pub async fn home(identity: IdentityState, db: &State<Pool<Sqlite>>) -> PageOutcome<HomeData> {
    let user = identity.user.as_ref();
    render(
        trainee_guard(&identity),
        "/",
        "Home",
        None,
        || {
            Some(HomeData {
                greeting: greeting(user),
                concept: None,
                challenges: Vec::new(),
                coding_challenge: None,
                data_challenge: None,
            })
        },
        load_home(db, user),
    )
    .await
}

#[get("/home")]
pub async fn home_alias(identity: IdentityState, db: &State<Pool<Sqlite>>) -> PageOutcome<HomeData> {
    home(identity, db).await
}

#[get("/workshops")]
#[instrument(skip_all)]
pub async fn workshops_page(
    identity: IdentityState,
    db: &State<Pool<Sqlite>>,
) -> PageOutcome<Vec<Workshop>> {
    render(
        trainee_guard(&identity),
        "/workshops",
        "Workshops",
        None,
        || Some(Vec::new()),
        list_workshops(db),
    )
    .await
}

#[derive(Debug, Serialize)]
pub struct WorkshopDetail {
    pub workshop: Workshop,
    pub materials: Vec<Material>,
}

async fn load_workshop_detail(
    db: &Pool<Sqlite>,
    store: &ObjectStore,
    id: i64,
) -> Result<WorkshopDetail, AppError> {
    let workshop = get_workshop(db, id).await?;
    let materials = get_workshop_materials(db, id)
        .await?
        .into_iter()
        .map(|row| material_with_urls(row, store))
        .collect();

    Ok(WorkshopDetail {
        workshop,
        materials,
    })
}

#[get("/workshops/<id>")]
#[instrument(skip(identity, db, store))]
pub async fn workshop_detail_page(
    id: i64,
    identity: IdentityState,
    db: &State<Pool<Sqlite>>,
    store: &State<ObjectStore>,
) -> PageOutcome<WorkshopDetail> {
    render(
        trainee_guard(&identity),
        &format!("/workshops/{}", id),
        "Workshop",
        Some("Workshop not found."),
        || None,
        load_workshop_detail(db, store, id),
    )
    .await
}

#[get("/sessions")]
#[instrument(skip_all)]
pub async fn sessions_page(
    identity: IdentityState,
    db: &State<Pool<Sqlite>>,
) -> PageOutcome<Vec<RecordedSession>> {
    render(
        trainee_guard(&identity),
        "/sessions",
        "Recorded Sessions",
        Some("Could not fetch recorded sessions."),
        || None,
        list_recorded_sessions(db),
    )
    .await
}

#[get("/results")]
#[instrument(skip_all)]
pub async fn results_page(
    identity: IdentityState,
    db: &State<Pool<Sqlite>>,
) -> PageOutcome<Vec<ExamResult>> {
    let user_id = identity.user.as_ref().map(|u| u.id).unwrap_or_default();
    render(
        trainee_guard(&identity),
        "/results",
        "Exam Results",
        Some("Could not fetch exam results."),
        || None,
        list_exam_results(db, user_id),
    )
    .await
}

#[derive(Debug, Serialize)]
pub struct ResourceGroup {
    pub category: ResourceCategory,
    pub resources: Vec<Resource>,
}

/// Buckets resources into the fixed category order, dropping empty
/// categories and rows with an unknown category.
pub fn group_resources(resources: Vec<Resource>) -> Vec<ResourceGroup> {
    let mut groups: Vec<ResourceGroup> = ResourceCategory::ORDER
        .iter()
        .map(|category| ResourceGroup {
            category: *category,
            resources: Vec::new(),
        })
        .collect();

    for resource in resources {
        match ResourceCategory::parse(&resource.category) {
            Some(category) => {
                if let Some(group) = groups.iter_mut().find(|g| g.category == category) {
                    group.resources.push(resource);
                }
            }
            None => error!(category = %resource.category, "Resource has an unknown category"),
        }
    }

    groups.retain(|g| !g.resources.is_empty());
    groups
}

#[get("/references")]
#[instrument(skip_all)]
pub async fn references_page(
    identity: IdentityState,
    db: &State<Pool<Sqlite>>,
) -> PageOutcome<Vec<ResourceGroup>> {
    render(
        trainee_guard(&identity),
        "/references",
        "References",
        Some("Could not fetch resources."),
        || None,
        async { Ok(group_resources(list_resources(db).await?)) },
    )
    .await
}

#[derive(Debug, Serialize)]
pub struct ArchiveData {
    pub concepts: Vec<Concept>,
    pub challenges: Vec<ChallengeSummary>,
}

#[get("/archive")]
#[instrument(skip_all)]
pub async fn archive_page(
    identity: IdentityState,
    db: &State<Pool<Sqlite>>,
) -> PageOutcome<ArchiveData> {
    render(
        trainee_guard(&identity),
        "/archive",
        "Archive",
        None,
        || {
            Some(ArchiveData {
                concepts: Vec::new(),
                challenges: Vec::new(),
            })
        },
        async {
            Ok(ArchiveData {
                concepts: list_archived_concepts(db).await?,
                challenges: list_archived_challenges(db)
                    .await?
                    .into_iter()
                    .map(ChallengeSummary::from)
                    .collect(),
            })
        },
    )
    .await
}

/// Challenge statement plus the code the editor opens with. Grading scripts
/// stay on the server.
#[derive(Debug, Serialize)]
pub struct ChallengeView {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub problem_statement: String,
    pub example_code: ExampleData,
    pub constraints: Vec<String>,
    pub editor_seed: String,
}

#[get("/challenge/<id>")]
#[instrument(skip(identity, db))]
pub async fn challenge_page(
    id: i64,
    identity: IdentityState,
    db: &State<Pool<Sqlite>>,
) -> PageOutcome<ChallengeView> {
    render(
        trainee_guard(&identity),
        &format!("/challenge/{}", id),
        "Challenge",
        Some("Could not find the requested challenge."),
        || None,
        async {
            let challenge = get_challenge(db, id).await?;
            Ok(ChallengeView {
                id: challenge.id,
                title: challenge.title,
                description: challenge.description,
                problem_statement: challenge.problem_statement,
                example_code: challenge.example_code,
                constraints: challenge.constraints,
                editor_seed: challenge.starter_code,
            })
        },
    )
    .await
}

#[get("/admin")]
#[instrument(skip_all)]
pub async fn admin_page(
    identity: IdentityState,
    db: &State<Pool<Sqlite>>,
) -> PageOutcome<Vec<Workshop>> {
    render(
        admin_guard(&identity),
        "/admin",
        "Manage Workshops",
        None,
        || Some(Vec::new()),
        list_workshops(db),
    )
    .await
}

#[derive(Debug, Serialize)]
pub struct UserRow {
    pub id: i64,
    pub fname: String,
    pub lname: String,
    pub email: String,
    pub role: &'static str,
}

impl From<User> for UserRow {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: if user.confirmed {
                user.email
            } else {
                "Pending".to_string()
            },
            role: user.role.label(),
            fname: user.fname,
            lname: user.lname,
        }
    }
}

#[get("/admin/users")]
#[instrument(skip_all)]
pub async fn admin_users_page(
    identity: IdentityState,
    db: &State<Pool<Sqlite>>,
) -> PageOutcome<Vec<UserRow>> {
    render(
        admin_guard(&identity),
        "/admin/users",
        "Manage Users",
        Some("Failed to fetch users."),
        || None,
        async {
            Ok(get_all_users(db)
                .await?
                .into_iter()
                .map(UserRow::from)
                .collect())
        },
    )
    .await
}

#[derive(Debug, Serialize)]
pub struct ContentData {
    pub workshops: Vec<Workshop>,
    pub sessions: Vec<RecordedSession>,
    pub challenges: Vec<ChallengeSummary>,
}

#[get("/admin/content")]
#[instrument(skip_all)]
pub async fn admin_content_page(
    identity: IdentityState,
    db: &State<Pool<Sqlite>>,
) -> PageOutcome<ContentData> {
    render(
        admin_guard(&identity),
        "/admin/content",
        "Manage Content",
        None,
        || {
            Some(ContentData {
                workshops: Vec::new(),
                sessions: Vec::new(),
                challenges: Vec::new(),
            })
        },
        async {
            Ok(ContentData {
                workshops: list_workshops(db).await?,
                sessions: list_recorded_sessions(db).await?,
                challenges: list_challenges(db)
                    .await?
                    .into_iter()
                    .map(ChallengeSummary::from)
                    .collect(),
            })
        },
    )
    .await
}
