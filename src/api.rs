use std::collections::BTreeSet;

use chrono::{NaiveDate, Utc};
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::response::status::Custom;
use rocket::serde::{json::Json, Deserialize, Serialize};
use rocket::State;
use sqlx::{Pool, Sqlite};
use tracing::info;
use validator::Validate;

use crate::auth::{User, UserSession, SESSION_COOKIE};
use crate::db::{
    apply_reconciliation, authenticate_user, completed_habit_ids_on, completion_dates_for_user,
    create_book, create_habit, create_user, create_user_session, find_user_by_email,
    find_user_by_username, get_books_for_user, get_habit, get_habits_for_user, invalidate_session,
    update_habit,
};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::models::{Book, Habit};
use crate::tracker::{
    completion_stats, eligible_habits, parse_date, reconcile, validate_label, validate_range,
    OPEN_ENDED,
};
use crate::validation::{
    ApiResult, AppErrorExt, JsonValidateExt, ToValidationResponse, ValidationResponse,
};

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Parses an optional date field, falling back to `default` when absent.
fn date_or(value: Option<&str>, default: NaiveDate) -> ApiResult<NaiveDate> {
    match value {
        Some(s) => parse_date(s).validate_custom(),
        None => Ok(default),
    }
}

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    password: String,
    #[serde(default)]
    remember_me: bool,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<UserData>,
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserData {
    pub id: i64,
    pub username: String,
    pub email: String,
}

impl From<User> for UserData {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> ApiResult<Json<LoginResponse>> {
    let validated = login.validate_custom()?;

    match authenticate_user(db, &validated.username, &validated.password)
        .await
        .validate_custom()?
    {
        Some(user) => {
            let token = UserSession::generate_token();
            let lifetime = config.session_lifetime(validated.remember_me);
            let expires_at = Utc::now() + lifetime;

            create_user_session(db, user.id, &token, expires_at.naive_utc())
                .await
                .validate_custom()?;

            let max_age = rocket::time::Duration::seconds(lifetime.num_seconds());
            cookies.add_private(
                Cookie::build((SESSION_COOKIE, token))
                    .same_site(SameSite::Lax)
                    .http_only(true)
                    .max_age(max_age),
            );

            info!(
                username = %user.username,
                remember_me = validated.remember_me,
                "Login succeeded"
            );

            Ok(Json(LoginResponse {
                success: true,
                user: Some(UserData::from(user)),
                error: None,
            }))
        }
        None => Ok(Json(LoginResponse {
            success: false,
            user: None,
            error: Some("Invalid username or password".to_string()),
        })),
    }
}

#[post("/logout")]
pub async fn api_logout(cookies: &CookieJar<'_>, db: &State<Pool<Sqlite>>) -> Status {
    let token = cookies
        .get_private(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        if let Err(err) = invalidate_session(db, &token).await {
            err.log_and_record("Logout");
        }
    }

    cookies.remove_private(Cookie::from(SESSION_COOKIE));

    Status::Ok
}

#[derive(Deserialize, Validate, Clone)]
pub struct UserRegistrationRequest {
    #[validate(length(min = 1, max = 64, message = "Username must be 1-64 characters"))]
    username: String,
    #[validate(email(message = "A valid email address is required"))]
    email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    password: String,
    #[validate(must_match(other = "password", message = "Passwords must match"))]
    password2: String,
}

#[post("/register", data = "<registration>")]
pub async fn api_register_user(
    registration: Json<UserRegistrationRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Status> {
    let validated = registration.validate_custom()?;

    if find_user_by_username(db, &validated.username)
        .await
        .validate_custom()?
        .is_some()
    {
        return Err(Custom(
            Status::Conflict,
            Json(ValidationResponse::with_error(
                "username",
                "Please use a different username",
            )),
        ));
    }

    if find_user_by_email(db, &validated.email)
        .await
        .validate_custom()?
        .is_some()
    {
        return Err(Custom(
            Status::Conflict,
            Json(ValidationResponse::with_error(
                "email",
                "Please use a different email address",
            )),
        ));
    }

    create_user(db, &validated.username, &validated.email, &validated.password)
        .await
        .validate_custom()?;

    Ok(Status::Created)
}

#[get("/me")]
pub async fn api_me(user: User) -> Json<UserData> {
    Json(UserData::from(user))
}

#[derive(Deserialize)]
pub struct CreateHabitRequest {
    habit: String,
    start_date: Option<String>,
    end_date: Option<String>,
}

#[post("/habits", data = "<request>")]
pub async fn api_create_habit(
    request: Json<CreateHabitRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Custom<Json<Habit>>> {
    let label = validate_label(&request.habit).validate_custom()?;
    let start_date = date_or(request.start_date.as_deref(), today())?;
    let end_date = date_or(request.end_date.as_deref(), *OPEN_ENDED)?;
    validate_range(start_date, end_date).validate_custom()?;

    let id = create_habit(db, user.id, label, start_date, end_date)
        .await
        .validate_custom()?;

    let habit = get_habit(db, id).await.validate_custom()?;
    Ok(Custom(Status::Created, Json(habit)))
}

#[get("/habits")]
pub async fn api_get_habits(user: User, db: &State<Pool<Sqlite>>) -> ApiResult<Json<Vec<Habit>>> {
    let habits = get_habits_for_user(db, user.id).await.validate_custom()?;
    Ok(Json(habits))
}

async fn owned_habit(db: &Pool<Sqlite>, user: &User, id: i64) -> ApiResult<Habit> {
    let habit = get_habit(db, id).await.validate_custom()?;
    user.require_owner(&habit).validate_custom()?;
    Ok(habit)
}

#[get("/habits/<id>")]
pub async fn api_get_habit(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Json<Habit>> {
    let habit = owned_habit(db, &user, id).await?;
    Ok(Json(habit))
}

#[derive(Deserialize)]
pub struct UpdateHabitRequest {
    habit: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

#[put("/habits/<id>", data = "<request>")]
pub async fn api_update_habit(
    id: i64,
    request: Json<UpdateHabitRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Json<Habit>> {
    let existing = owned_habit(db, &user, id).await?;

    let label = match request.habit.as_deref() {
        Some(label) => validate_label(label).validate_custom()?.to_string(),
        None => existing.habit.clone(),
    };
    let start_date = date_or(request.start_date.as_deref(), existing.start_date)?;
    let end_date = date_or(request.end_date.as_deref(), existing.end_date)?;
    validate_range(start_date, end_date).validate_custom()?;

    update_habit(db, id, &label, start_date, end_date)
        .await
        .validate_custom()?;

    let habit = get_habit(db, id).await.validate_custom()?;
    Ok(Json(habit))
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DayHabit {
    pub id: i64,
    pub habit: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub completed: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DayResponse {
    pub date: NaiveDate,
    pub today: NaiveDate,
    pub habits: Vec<DayHabit>,
}

#[get("/day?<date>")]
pub async fn api_get_day(
    date: Option<String>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Json<DayResponse>> {
    let day = date_or(date.as_deref(), today())?;

    let habits = get_habits_for_user(db, user.id).await.validate_custom()?;
    let completed = completed_habit_ids_on(db, user.id, day)
        .await
        .validate_custom()?;

    let day_habits = eligible_habits(&habits, day)
        .into_iter()
        .map(|h| DayHabit {
            id: h.id,
            habit: h.habit.clone(),
            start_date: h.start_date,
            end_date: h.end_date,
            completed: completed.contains(&h.id),
        })
        .collect();

    Ok(Json(DayResponse {
        date: day,
        today: today(),
        habits: day_habits,
    }))
}

#[derive(Deserialize)]
pub struct CompletionsRequest {
    habit_ids: Vec<i64>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CompletionsResponse {
    pub date: NaiveDate,
    pub inserted: Vec<i64>,
    pub deleted: Vec<i64>,
}

#[put("/day/<date>/completions", data = "<request>")]
pub async fn api_update_completions(
    date: &str,
    request: Json<CompletionsRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Json<CompletionsResponse>> {
    let day = parse_date(date).validate_custom()?;

    let habits = get_habits_for_user(db, user.id).await.validate_custom()?;
    let eligible: BTreeSet<i64> = eligible_habits(&habits, day)
        .into_iter()
        .map(|h| h.id)
        .collect();

    let submitted: BTreeSet<i64> = request.habit_ids.iter().copied().collect();
    for id in &submitted {
        if !habits.iter().any(|h| h.id == *id) {
            return Err(AppError::Authorization(format!(
                "Habit {} does not belong to the current user",
                id
            ))
            .to_validation_response());
        }
        if !eligible.contains(id) {
            return Err(Custom(
                Status::BadRequest,
                Json(ValidationResponse::with_error(
                    "habit_ids",
                    &format!("Habit {} is not active on {}", id, day),
                )),
            ));
        }
    }

    let previous: BTreeSet<i64> = completed_habit_ids_on(db, user.id, day)
        .await
        .validate_custom()?
        .intersection(&eligible)
        .copied()
        .collect();

    let reconciliation = reconcile(&submitted, &previous);
    if !reconciliation.is_empty() {
        apply_reconciliation(db, day, &reconciliation)
            .await
            .validate_custom()?;
    }

    Ok(Json(CompletionsResponse {
        date: day,
        inserted: reconciliation.to_insert.into_iter().collect(),
        deleted: reconciliation.to_delete.into_iter().collect(),
    }))
}

#[derive(Serialize, Deserialize, Debug)]
pub struct StatsRow {
    pub habit_id: i64,
    pub habit: String,
    pub total_days: i64,
    pub completed_days: i64,
    pub percent: i64,
}

#[get("/stats")]
pub async fn api_get_stats(user: User, db: &State<Pool<Sqlite>>) -> ApiResult<Json<Vec<StatsRow>>> {
    let today = today();
    let habits = get_habits_for_user(db, user.id).await.validate_custom()?;
    let completions = completion_dates_for_user(db, user.id)
        .await
        .validate_custom()?;

    let rows = habits
        .into_iter()
        .map(|habit| {
            let dates = completions
                .get(&habit.id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let stats = completion_stats(&habit, dates, today);
            StatsRow {
                habit_id: habit.id,
                habit: habit.habit,
                total_days: stats.total_days,
                completed_days: stats.completed_days,
                percent: stats.percent,
            }
        })
        .collect();

    Ok(Json(rows))
}

#[derive(Deserialize, Validate)]
pub struct BookRequest {
    #[validate(length(min = 1, message = "Title is required"))]
    title: String,
    author: Option<String>,
    date: Option<String>,
}

#[post("/books", data = "<request>")]
pub async fn api_create_book(
    request: Json<BookRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Custom<Json<Book>>> {
    let validated = request.validate_custom()?;

    let title = validated.title.trim();
    if title.is_empty() {
        return Err(Custom(
            Status::UnprocessableEntity,
            Json(ValidationResponse::with_error("title", "Title is required")),
        ));
    }

    let date = date_or(validated.date.as_deref(), today())?;
    let author = validated
        .author
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty());

    let id = create_book(db, user.id, title, author, date)
        .await
        .validate_custom()?;

    Ok(Custom(
        Status::Created,
        Json(Book {
            id,
            user_id: user.id,
            title: title.to_string(),
            author: author.map(String::from),
            date,
        }),
    ))
}

#[get("/books")]
pub async fn api_get_books(user: User, db: &State<Pool<Sqlite>>) -> ApiResult<Json<Vec<Book>>> {
    let books = get_books_for_user(db, user.id).await.validate_custom()?;
    Ok(Json(books))
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}
