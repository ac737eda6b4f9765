use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::tracker::OPEN_ENDED;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Habit {
    pub id: i64,
    pub user_id: i64,
    pub habit: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Habit {
    pub fn is_eligible_on(&self, day: NaiveDate) -> bool {
        self.start_date <= day && day <= self.end_date
    }
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbHabit {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub habit: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl From<DbHabit> for Habit {
    fn from(habit: DbHabit) -> Self {
        Self {
            id: habit.id.unwrap_or_default(),
            user_id: habit.user_id.unwrap_or_default(),
            habit: habit.habit.unwrap_or_default(),
            start_date: habit.start_date.unwrap_or_default(),
            end_date: habit.end_date.unwrap_or(*OPEN_ENDED),
        }
    }
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbCompletion {
    pub habit_id: i64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Book {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub author: Option<String>,
    pub date: NaiveDate,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbBook {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub date: Option<NaiveDate>,
}

impl From<DbBook> for Book {
    fn from(book: DbBook) -> Self {
        Self {
            id: book.id.unwrap_or_default(),
            user_id: book.user_id.unwrap_or_default(),
            title: book.title.unwrap_or_default(),
            // Blank authors are stored as NULL
            author: book.author.filter(|a| !a.is_empty()),
            date: book.date.unwrap_or_default(),
        }
    }
}
