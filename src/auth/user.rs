use serde::Serialize;
use tracing::warn;

use crate::error::AppError;
use crate::models::Habit;

#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: Option<i64>,
    pub username: Option<String>,
    pub email: Option<String>,
}

impl From<DbUser> for User {
    fn from(user: DbUser) -> Self {
        Self {
            id: user.id.unwrap_or_default(),
            username: user.username.unwrap_or_default(),
            email: user.email.unwrap_or_default(),
        }
    }
}

impl User {
    pub fn owns(&self, habit: &Habit) -> bool {
        habit.user_id == self.id
    }

    pub fn require_owner(&self, habit: &Habit) -> Result<(), AppError> {
        if self.owns(habit) {
            Ok(())
        } else {
            warn!(
                username = %self.username,
                habit_id = habit.id,
                "Habit belongs to another user"
            );
            Err(AppError::Authorization(format!(
                "Habit {} does not belong to the current user",
                habit.id
            )))
        }
    }
}
