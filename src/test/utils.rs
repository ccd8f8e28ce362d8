#[cfg(test)]
pub mod test_db {
    use crate::auth::Role;
    use crate::db::{create_challenge, create_concept, create_user, create_workshop};
    use crate::error::AppError;
    use crate::models::{
        ChallengeKind, ChallengeRecord, ConceptRecord, ExampleData, TableData, WorkshopRecord,
    };
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::Once;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        workshops: Vec<WorkshopRecord>,
        challenges: Vec<ChallengeRecord>,
        concepts: Vec<ConceptRecord>,
        grades: Vec<TestGrade>,
        resources: Vec<(String, String)>,
    }

    pub struct TestUser {
        pub email: String,
        pub fname: String,
        pub role: Role,
    }

    pub struct TestGrade {
        pub email: String,
        pub exam_name: String,
        pub score: f64,
    }

    /// One row in and one row out, used by the grading tests.
    pub fn sample_example() -> ExampleData {
        let row = |value: i64| {
            json!({ "id": 1, "value": value })
                .as_object()
                .cloned()
                .unwrap_or_default()
        };

        ExampleData {
            input: TableData {
                columns: vec!["id".to_string(), "value".to_string()],
                data: vec![row(2)],
            },
            output: TableData {
                columns: vec!["id".to_string(), "value".to_string()],
                data: vec![row(4)],
            },
        }
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn trainee(mut self, email: &str, fname: &str) -> Self {
            self.users.push(TestUser {
                email: email.to_string(),
                fname: fname.to_string(),
                role: Role::Trainee,
            });
            self
        }

        pub fn admin(mut self, email: &str, fname: &str) -> Self {
            self.users.push(TestUser {
                email: email.to_string(),
                fname: fname.to_string(),
                role: Role::Admin,
            });
            self
        }

        pub fn workshop(mut self, title: &str, prerequisites: &[&str]) -> Self {
            self.workshops.push(WorkshopRecord {
                title: title.to_string(),
                date: "2025-03-01".to_string(),
                hosts: "Data Team".to_string(),
                description: format!("{} description", title),
                prerequisites: prerequisites.iter().map(|p| p.to_string()).collect(),
                materials: Vec::new(),
            });
            self
        }

        pub fn challenge(mut self, title: &str, kind: ChallengeKind, is_active: bool) -> Self {
            self.challenges.push(ChallengeRecord {
                title: title.to_string(),
                kind,
                description: format!("{} description", title),
                problem_statement: "Double every value.".to_string(),
                example_code: sample_example(),
                constraints: vec!["Use pandas".to_string()],
                starter_code: "def solve(df):\n    pass\n".to_string(),
                validation_script: "check(${challenge_input_data}, ${challenge_output_data})"
                    .to_string(),
                test_runner_script: "run_tests()".to_string(),
                is_active,
            });
            self
        }

        pub fn concept(mut self, title: &str, is_active: bool) -> Self {
            self.concepts.push(ConceptRecord {
                title: title.to_string(),
                description: format!("{} explained", title),
                article_url: "https://example.org/article".to_string(),
                is_active,
            });
            self
        }

        pub fn grade(mut self, email: &str, exam_name: &str, score: f64) -> Self {
            self.grades.push(TestGrade {
                email: email.to_string(),
                exam_name: exam_name.to_string(),
                score,
            });
            self
        }

        pub fn resource(mut self, category: &str, title: &str) -> Self {
            self.resources
                .push((category.to_string(), title.to_string()));
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .parse_filters("debug")
                    .is_test(true)
                    .try_init();
            });

            // A single connection that never expires keeps the in-memory
            // database alive for the whole test.
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            let mut user_id_map = HashMap::new();
            let mut workshop_id_map = HashMap::new();
            let mut challenge_id_map = HashMap::new();
            let mut concept_id_map = HashMap::new();

            for user in &self.users {
                let id = create_user(
                    &pool,
                    &user.email,
                    STANDARD_PASSWORD,
                    user.role,
                    &user.fname,
                    "Tester",
                )
                .await?;
                user_id_map.insert(user.email.clone(), id);
            }

            for workshop in &self.workshops {
                let id = create_workshop(&pool, workshop).await?;
                workshop_id_map.insert(workshop.title.clone(), id);
            }

            for challenge in &self.challenges {
                let id = create_challenge(&pool, challenge).await?;
                challenge_id_map.insert(challenge.title.clone(), id);
            }

            for concept in &self.concepts {
                let id = create_concept(&pool, concept).await?;
                concept_id_map.insert(concept.title.clone(), id);
            }

            for grade in &self.grades {
                let Some(user_id) = user_id_map.get(&grade.email).copied() else {
                    continue;
                };

                let exam_id = sqlx::query("INSERT INTO exams (name, max_score) VALUES (?, 100)")
                    .bind(&grade.exam_name)
                    .execute(&pool)
                    .await?
                    .last_insert_rowid();

                sqlx::query("INSERT INTO grades (user_id, exam_id, score) VALUES (?, ?, ?)")
                    .bind(user_id)
                    .bind(exam_id)
                    .bind(grade.score)
                    .execute(&pool)
                    .await?;
            }

            for (category, title) in &self.resources {
                sqlx::query("INSERT INTO resources (category, title) VALUES (?, ?)")
                    .bind(category)
                    .bind(title)
                    .execute(&pool)
                    .await?;
            }

            Ok(TestDb {
                pool,
                user_id_map,
                workshop_id_map,
                challenge_id_map,
                concept_id_map,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_id_map: HashMap<String, i64>,
        pub workshop_id_map: HashMap<String, i64>,
        pub challenge_id_map: HashMap<String, i64>,
        pub concept_id_map: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, email: &str) -> Option<i64> {
            self.user_id_map.get(email).copied()
        }

        pub fn workshop_id(&self, title: &str) -> Option<i64> {
            self.workshop_id_map.get(title).copied()
        }

        pub fn challenge_id(&self, title: &str) -> Option<i64> {
            self.challenge_id_map.get(title).copied()
        }

        pub fn concept_id(&self, title: &str) -> Option<i64> {
            self.concept_id_map.get(title).copied()
        }
    }
}

#[cfg(test)]
pub mod test_utils {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;

    use crate::api::auth::LoginResponse;
    use crate::config::PortalConfig;
    use crate::init_rocket;
    use crate::models::ChallengeKind;
    use crate::runtime::{Execution, Interpreter, Program, RuntimeError};

    pub use super::test_db::{STANDARD_PASSWORD, TestDb, TestDbBuilder};

    pub const ADMIN_EMAIL: &str = "admin@example.com";
    pub const TRAINEE_EMAIL: &str = "trainee@example.com";
    pub const OTHER_TRAINEE_EMAIL: &str = "other@example.com";

    type Responder = dyn Fn(&Program) -> Result<Execution, RuntimeError> + Send + Sync;

    /// Interpreter stand-in that records what it was asked to run.
    pub struct FakeInterpreter {
        probes: AtomicUsize,
        probe_error: Option<String>,
        respond: Box<Responder>,
        programs: Mutex<Vec<Program>>,
    }

    impl FakeInterpreter {
        pub fn ok() -> Self {
            Self::responding(|_| Ok(Execution::default()))
        }

        pub fn unavailable(message: &str) -> Self {
            Self {
                probe_error: Some(message.to_string()),
                ..Self::ok()
            }
        }

        pub fn responding(
            respond: impl Fn(&Program) -> Result<Execution, RuntimeError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                probes: AtomicUsize::new(0),
                probe_error: None,
                respond: Box::new(respond),
                programs: Mutex::new(Vec::new()),
            }
        }

        pub fn probe_count(&self) -> usize {
            self.probes.load(Ordering::SeqCst)
        }

        pub fn programs(&self) -> Vec<Program> {
            self.programs.lock().unwrap().clone()
        }
    }

    #[rocket::async_trait]
    impl Interpreter for FakeInterpreter {
        async fn probe(&self) -> Result<String, RuntimeError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            // Long enough for concurrent callers to pile up on one attempt.
            rocket::tokio::time::sleep(Duration::from_millis(20)).await;

            match &self.probe_error {
                Some(message) => Err(RuntimeError::Unavailable(message.clone())),
                None => Ok("Python 3.12.0".to_string()),
            }
        }

        async fn load_packages(&self, _packages: &[String]) -> Result<(), RuntimeError> {
            Ok(())
        }

        async fn execute(&self, program: Program) -> Result<Execution, RuntimeError> {
            self.programs.lock().unwrap().push(program.clone());
            (self.respond)(&program)
        }
    }

    pub fn test_config() -> PortalConfig {
        PortalConfig {
            storage_root: std::env::temp_dir().join(format!("portal-test-{}", uuid::Uuid::new_v4())),
            ..PortalConfig::default()
        }
    }

    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .admin(ADMIN_EMAIL, "Ada")
            .trainee(TRAINEE_EMAIL, "Tom")
            .trainee(OTHER_TRAINEE_EMAIL, "Olive")
            .workshop("Intro to Pandas", &["Python"])
            .challenge("Double values", ChallengeKind::Data, true)
            .challenge("FizzBuzz", ChallengeKind::Coding, true)
            .challenge("Old puzzle", ChallengeKind::Coding, false)
            .concept("Old concept", false)
            .concept("Bias and variance", true)
            .grade(TRAINEE_EMAIL, "Midterm", 87.5)
            .grade(OTHER_TRAINEE_EMAIL, "Midterm", 42.0)
            .resource("Books", "Python for Data Analysis")
            .resource("Papers", "Attention Is All You Need")
            .resource("Courses", "Statistical Learning")
            .build()
            .await
            .expect("Failed to build test database")
    }

    pub async fn setup_test_client_with(
        test_db: TestDb,
        interpreter: Arc<FakeInterpreter>,
    ) -> (Client, TestDb) {
        let rocket = init_rocket(test_db.pool.clone(), test_config(), interpreter)
            .expect("Failed to build rocket");

        let client = Client::tracked(rocket)
            .await
            .expect("Failed to create test client");

        (client, test_db)
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        setup_test_client_with(test_db, Arc::new(FakeInterpreter::ok())).await
    }

    /// Signs in through the API. The tracked client keeps the session cookie
    /// for the requests that follow.
    pub async fn login_test_user(client: &Client, email: &str, password: &str) -> LoginResponse {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "email": email, "password": password }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.expect("Empty login response");
        serde_json::from_str(&body).expect("Invalid login response")
    }
}
