#[cfg(test)]
pub mod test_utils {
    use crate::auth::{SignUp, sign_up};
    use crate::backend::{AuthSettings, Backend};
    use crate::error::AppError;
    use crate::init_rocket;
    use crate::registry::link;
    use crate::store::{DocumentStore, SqliteStore};
    use rocket::http::{ContentType, Cookie, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::collections::HashMap;
    use std::sync::{Arc, Once};

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    pub const COACH_EMAIL: &str = "koc@example.com";
    pub const STUDENT_EMAIL: &str = "ogrenci@example.com";
    pub const OTHER_STUDENT_EMAIL: &str = "ikinci@example.com";

    pub fn init_test_logging() {
        INIT.call_once(|| {
            let _ = env_logger::builder()
                .parse_filters("warn")
                .is_test(true)
                .try_init();
            let _ = tracing_subscriber::fmt()
                .with_env_filter("debug")
                .with_test_writer()
                .try_init();
        });
    }

    /// One shared connection, so the in-memory database lives as long as
    /// the pool does.
    pub async fn memory_pool() -> SqlitePool {
        init_test_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        pool
    }

    pub async fn memory_store() -> Arc<dyn DocumentStore> {
        Arc::new(SqliteStore::new(memory_pool().await))
    }

    pub fn test_settings() -> AuthSettings {
        AuthSettings {
            bcrypt_cost: 4,
            ..AuthSettings::default()
        }
    }

    pub async fn test_backend() -> Backend {
        Backend::new(memory_pool().await, test_settings())
    }

    pub struct TestUser {
        pub email: String,
        pub display_name: Option<String>,
        pub account_type: Option<String>,
        pub password: String,
    }

    #[derive(Default)]
    pub struct TestBackendBuilder {
        users: Vec<TestUser>,
        links: Vec<(String, String)>,
    }

    impl TestBackendBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn student(self, email: &str, display_name: Option<&str>) -> Self {
            self.user(email, display_name, Some("Öğrenci"))
        }

        pub fn teacher(self, email: &str, display_name: Option<&str>) -> Self {
            self.user(email, display_name, Some("Öğretmen"))
        }

        pub fn user(mut self, email: &str, display_name: Option<&str>, account_type: Option<&str>) -> Self {
            self.users.push(TestUser {
                email: email.to_string(),
                display_name: display_name.map(String::from),
                account_type: account_type.map(String::from),
                password: STANDARD_PASSWORD.to_string(),
            });
            self
        }

        pub fn link(mut self, teacher_email: &str, student_email: &str) -> Self {
            self.links
                .push((teacher_email.to_string(), student_email.to_string()));
            self
        }

        pub async fn build(self) -> Result<TestBackend, AppError> {
            let backend = test_backend().await;
            let mut uids = HashMap::new();

            for user in self.users {
                let signed_in = sign_up(
                    &backend,
                    SignUp {
                        email: user.email.clone(),
                        password: user.password,
                        display_name: user.display_name,
                        account_type: user.account_type,
                    },
                )
                .await?;
                uids.insert(user.email, signed_in.user.uid);
            }

            for (teacher, student) in &self.links {
                let (Some(teacher_uid), Some(student_uid)) = (uids.get(teacher), uids.get(student)) else {
                    return Err(AppError::NotFound(format!("{} or {}", teacher, student)));
                };
                link(backend.store().as_ref(), teacher_uid, student_uid).await?;
            }

            Ok(TestBackend { backend, uids })
        }
    }

    pub struct TestBackend {
        pub backend: Backend,
        pub uids: HashMap<String, String>,
    }

    impl TestBackend {
        pub fn uid(&self, email: &str) -> String {
            self.uids
                .get(email)
                .cloned()
                .unwrap_or_else(|| panic!("No test user {}", email))
        }

        pub fn store(&self) -> Arc<dyn DocumentStore> {
            self.backend.store()
        }
    }

    /// A coach with one linked student and one unlinked student.
    pub async fn create_standard_backend() -> TestBackend {
        TestBackendBuilder::new()
            .teacher(COACH_EMAIL, Some("Ayşe Koç"))
            .student(STUDENT_EMAIL, Some("Ali Yılmaz"))
            .student(OTHER_STUDENT_EMAIL, Some("Zeynep Kaya"))
            .link(COACH_EMAIL, STUDENT_EMAIL)
            .build()
            .await
            .expect("Failed to build test backend")
    }

    pub async fn setup_test_client(test: TestBackend) -> (Client, HashMap<String, String>) {
        let rocket = init_rocket(test.backend);
        let client = Client::untracked(rocket)
            .await
            .expect("Failed to create test client");
        (client, test.uids)
    }

    pub async fn login_test_user(client: &Client, email: &str, password: &str) -> Vec<Cookie<'static>> {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "email": email, "password": password }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok, "Login failed for {}", email);
        response.cookies().iter().cloned().collect()
    }
}
