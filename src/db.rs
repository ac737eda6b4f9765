use std::collections::{BTreeSet, HashMap};

use crate::{
    auth::{DbUser, DbUserSession, User, UserSession},
    error::AppError,
    tracker::Reconciliation,
};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::models::{Book, DbBook, DbCompletion, DbHabit, Habit};

#[instrument]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>("SELECT id, username, email FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(user) => Ok(User::from(user)),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument]
pub async fn find_user_by_username(
    pool: &Pool<Sqlite>,
    username: &str,
) -> Result<Option<User>, AppError> {
    info!("Finding user by username");
    let row =
        sqlx::query_as::<_, DbUser>("SELECT id, username, email FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(User::from))
}

#[instrument]
pub async fn find_user_by_email(
    pool: &Pool<Sqlite>,
    email: &str,
) -> Result<Option<User>, AppError> {
    info!("Finding user by email");
    let row = sqlx::query_as::<_, DbUser>("SELECT id, username, email FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(User::from))
}

#[instrument(skip_all, fields(username, email))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    username: &str,
    email: &str,
    password: &str,
) -> Result<i64, AppError> {
    info!("Creating new user");

    if find_user_by_username(pool, username).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "Username '{}' already exists",
            username
        )));
    }

    if find_user_by_email(pool, email).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "Email '{}' is already registered",
            email
        )));
    }

    let hashed_password = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

    let res = sqlx::query("INSERT INTO users (username, email, password_hash) VALUES (?, ?, ?)")
        .bind(username)
        .bind(email)
        .bind(hashed_password)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip_all, fields(username))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");

    #[derive(sqlx::FromRow)]
    struct Credentials {
        id: i64,
        username: String,
        email: String,
        password_hash: String,
    }

    let row = sqlx::query_as::<_, Credentials>(
        "SELECT id, username, email, password_hash FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(creds) => match bcrypt::verify(password, &creds.password_hash) {
            Ok(true) => Ok(Some(User {
                id: creds.id,
                username: creds.username,
                email: creds.email,
            })),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let res = sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<UserSession, AppError> {
    info!("Getting session by token");

    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::Authentication(
            "Invalid session token".to_string(),
        )),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

#[instrument]
pub async fn create_habit(
    pool: &Pool<Sqlite>,
    user_id: i64,
    label: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<i64, AppError> {
    info!("Creating habit");
    let res = sqlx::query(
        "INSERT INTO habits (user_id, habit, start_date, end_date)
         VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(label)
    .bind(start_date)
    .bind(end_date)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn update_habit(
    pool: &Pool<Sqlite>,
    habit_id: i64,
    label: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<(), AppError> {
    info!("Updating habit");
    sqlx::query(
        "UPDATE habits
         SET habit = ?, start_date = ?, end_date = ?
         WHERE id = ?",
    )
    .bind(label)
    .bind(start_date)
    .bind(end_date)
    .bind(habit_id)
    .execute(pool)
    .await?;

    Ok(())
}

#[instrument]
pub async fn get_habit(pool: &Pool<Sqlite>, habit_id: i64) -> Result<Habit, AppError> {
    info!("Getting habit");
    let row = sqlx::query_as::<_, DbHabit>(
        "SELECT id, user_id, habit, start_date, end_date FROM habits WHERE id = ?",
    )
    .bind(habit_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(habit) => Ok(Habit::from(habit)),
        _ => Err(AppError::NotFound(format!(
            "Habit with id {} not found in database",
            habit_id
        ))),
    }
}

#[instrument]
pub async fn get_habits_for_user(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Vec<Habit>, AppError> {
    info!("Getting habits for user");
    let rows = sqlx::query_as::<_, DbHabit>(
        "SELECT id, user_id, habit, start_date, end_date
         FROM habits
         WHERE user_id = ?
         ORDER BY id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Habit::from).collect())
}

/// Ids of the user's habits with a completion recorded on `date`.
#[instrument]
pub async fn completed_habit_ids_on(
    pool: &Pool<Sqlite>,
    user_id: i64,
    date: NaiveDate,
) -> Result<BTreeSet<i64>, AppError> {
    info!("Getting completed habits for date");
    let rows = sqlx::query_as::<_, DbCompletion>(
        "SELECT c.habit_id, c.date FROM completions c
         JOIN habits h ON h.id = c.habit_id
         WHERE h.user_id = ? AND c.date = ?",
    )
    .bind(user_id)
    .bind(date)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|row| row.habit_id).collect())
}

/// Writes a reconciliation for one day in a single transaction. Deleting a
/// completion that is already gone is not an error.
#[instrument(skip(pool))]
pub async fn apply_reconciliation(
    pool: &Pool<Sqlite>,
    date: NaiveDate,
    reconciliation: &Reconciliation,
) -> Result<(), AppError> {
    info!(
        inserts = reconciliation.to_insert.len(),
        deletes = reconciliation.to_delete.len(),
        "Applying completion changes"
    );

    let mut tx = pool.begin().await?;

    for habit_id in &reconciliation.to_insert {
        sqlx::query(
            "INSERT INTO completions (habit_id, date) VALUES (?, ?)
             ON CONFLICT (habit_id, date) DO NOTHING",
        )
        .bind(habit_id)
        .bind(date)
        .execute(&mut *tx)
        .await?;
    }

    for habit_id in &reconciliation.to_delete {
        sqlx::query("DELETE FROM completions WHERE habit_id = ? AND date = ?")
            .bind(habit_id)
            .bind(date)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(())
}

/// Completion dates of every habit the user owns, keyed by habit id.
#[instrument]
pub async fn completion_dates_for_user(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<HashMap<i64, Vec<NaiveDate>>, AppError> {
    info!("Getting completion dates for user");
    let rows = sqlx::query_as::<_, DbCompletion>(
        "SELECT c.habit_id, c.date FROM completions c
         JOIN habits h ON h.id = c.habit_id
         WHERE h.user_id = ?
         ORDER BY c.date",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut by_habit: HashMap<i64, Vec<NaiveDate>> = HashMap::new();
    for row in rows {
        by_habit.entry(row.habit_id).or_default().push(row.date);
    }

    Ok(by_habit)
}

#[instrument]
pub async fn create_book(
    pool: &Pool<Sqlite>,
    user_id: i64,
    title: &str,
    author: Option<&str>,
    date: NaiveDate,
) -> Result<i64, AppError> {
    info!("Logging finished book");
    let res = sqlx::query("INSERT INTO books (user_id, title, author, date) VALUES (?, ?, ?, ?)")
        .bind(user_id)
        .bind(title)
        .bind(author)
        .bind(date)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn get_books_for_user(pool: &Pool<Sqlite>, user_id: i64) -> Result<Vec<Book>, AppError> {
    info!("Getting books for user");
    let rows = sqlx::query_as::<_, DbBook>(
        "SELECT id, user_id, title, author, date
         FROM books
         WHERE user_id = ?
         ORDER BY date DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Book::from).collect())
}
