#[cfg(test)]
pub mod test_db {
    use crate::db::{create_book, create_habit, create_user};
    use crate::error::AppError;
    use crate::tracker::{parse_date, OPEN_ENDED};
    use chrono::NaiveDate;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::Once;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        habits: Vec<TestHabit>,
        completions: Vec<TestCompletion>,
        books: Vec<TestBook>,
    }

    pub struct TestUser {
        pub username: String,
        pub email: String,
        pub password: String,
    }

    pub struct TestHabit {
        pub owner: String,
        pub label: String,
        pub start_date: NaiveDate,
        pub end_date: NaiveDate,
    }

    pub struct TestCompletion {
        pub habit_label: String,
        pub date: NaiveDate,
    }

    pub struct TestBook {
        pub owner: String,
        pub title: String,
        pub author: Option<String>,
        pub date: NaiveDate,
    }

    pub fn date(s: &str) -> NaiveDate {
        parse_date(s).expect("test dates are well formed")
    }

    pub async fn memory_pool() -> Result<Pool<Sqlite>, AppError> {
        // One long-lived connection, so every query sees the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(pool)
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn user(mut self, username: &str) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                password: STANDARD_PASSWORD.to_string(),
            });
            self
        }

        pub fn user_with_password(mut self, username: &str, password: &str) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                password: password.to_string(),
            });
            self
        }

        pub fn habit(mut self, owner: &str, label: &str, start: &str, end: Option<&str>) -> Self {
            self.habits.push(TestHabit {
                owner: owner.to_string(),
                label: label.to_string(),
                start_date: date(start),
                end_date: end.map(date).unwrap_or(*OPEN_ENDED),
            });
            self
        }

        pub fn completed(mut self, habit_label: &str, on: &str) -> Self {
            self.completions.push(TestCompletion {
                habit_label: habit_label.to_string(),
                date: date(on),
            });
            self
        }

        pub fn book(mut self, owner: &str, title: &str, author: Option<&str>, on: &str) -> Self {
            self.books.push(TestBook {
                owner: owner.to_string(),
                title: title.to_string(),
                author: author.map(String::from),
                date: date(on),
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter("debug")
                    .with_test_writer()
                    .try_init();
            });

            let pool = memory_pool().await?;

            let mut user_id_map: HashMap<String, i64> = HashMap::new();
            let mut habit_id_map: HashMap<String, i64> = HashMap::new();

            for user in &self.users {
                let user_id =
                    create_user(&pool, &user.username, &user.email, &user.password).await?;
                user_id_map.insert(user.username.clone(), user_id);
            }

            for habit in &self.habits {
                let user_id = user_id_map.get(&habit.owner).copied().ok_or_else(|| {
                    AppError::NotFound(format!("Test user {} was not declared", habit.owner))
                })?;

                let habit_id = create_habit(
                    &pool,
                    user_id,
                    &habit.label,
                    habit.start_date,
                    habit.end_date,
                )
                .await?;
                habit_id_map.insert(habit.label.clone(), habit_id);
            }

            for completion in &self.completions {
                let habit_id = habit_id_map
                    .get(&completion.habit_label)
                    .copied()
                    .ok_or_else(|| {
                        AppError::NotFound(format!(
                            "Test habit {} was not declared",
                            completion.habit_label
                        ))
                    })?;

                sqlx::query("INSERT INTO completions (habit_id, date) VALUES (?, ?)")
                    .bind(habit_id)
                    .bind(completion.date)
                    .execute(&pool)
                    .await?;
            }

            for book in &self.books {
                let user_id = user_id_map.get(&book.owner).copied().ok_or_else(|| {
                    AppError::NotFound(format!("Test user {} was not declared", book.owner))
                })?;

                create_book(&pool, user_id, &book.title, book.author.as_deref(), book.date)
                    .await?;
            }

            Ok(TestDb {
                pool,
                user_id_map,
                habit_id_map,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_id_map: HashMap<String, i64>,
        pub habit_id_map: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, username: &str) -> Option<i64> {
            self.user_id_map.get(username).copied()
        }

        pub fn habit_id(&self, label: &str) -> Option<i64> {
            self.habit_id_map.get(label).copied()
        }

        pub async fn completion_count(&self, habit_label: &str) -> Result<i64, sqlx::Error> {
            let habit_id = self
                .habit_id(habit_label)
                .ok_or(sqlx::Error::RowNotFound)?;

            sqlx::query_scalar("SELECT COUNT(*) FROM completions WHERE habit_id = ?")
                .bind(habit_id)
                .fetch_one(&self.pool)
                .await
        }
    }
}

#[cfg(test)]
pub mod test_utils {
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;

    use crate::api::LoginResponse;
    use crate::env::AppConfig;
    use crate::init_rocket;

    pub use super::test_db::{date, TestDb, TestDbBuilder, STANDARD_PASSWORD};

    /// Two users; alice has an open-ended and a finished habit, bob has one
    /// habit of his own.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .user("alice")
            .user("bob")
            .habit("alice", "Meditate", "2024-01-01", None)
            .habit("alice", "Run", "2024-01-01", Some("2024-06-01"))
            .habit("bob", "Read", "2024-01-01", None)
            .completed("Meditate", "2024-06-15")
            .build()
            .await
            .expect("Failed to build test DB")
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let rocket = init_rocket(test_db.pool.clone(), AppConfig::default());
        let client = Client::tracked(rocket)
            .await
            .expect("Failed to build rocket client");
        (client, test_db)
    }

    /// Logs in on a tracked client; the session cookie is kept for later requests.
    pub async fn login_test_user(client: &Client, username: &str, password: &str) {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": username,
                    "password": password
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.expect("Login body missing");
        let login: LoginResponse = serde_json::from_str(&body).expect("Invalid login response");
        assert!(login.success, "Login failed for {}", username);
    }
}
