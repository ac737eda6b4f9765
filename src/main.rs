#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod db;
mod env;
mod error;
mod models;
mod telemetry;
#[cfg(test)]
mod test;
mod tracker;
mod validation;

use api::{
    api_create_book, api_create_habit, api_get_books, api_get_day, api_get_habit, api_get_habits,
    api_get_stats, api_login, api_logout, api_me, api_register_user, api_update_completions,
    api_update_habit, health,
};
use auth::{not_found_api, unauthorized_api, unprocessable_api};
use db::clean_expired_sessions;
use env::{load_environment, log_env_files, AppConfig};
use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use telemetry::{init_tracing, TelemetryFairing};
use tracing::{error, info};

#[launch]
async fn rocket() -> _ {
    // Env files may carry RUST_LOG and the OTLP settings, so they load first
    let env_files = load_environment();

    init_tracing();

    match env_files {
        Ok(files) => log_env_files(&files),
        Err(e) => error!("Failed to load environment files: {}", e),
    }

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            panic!("Invalid configuration: {:#}", e);
        }
    };

    let pool = match SqlitePool::connect(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to SQLite database: {}", e);
            panic!("Failed to connect to SQLite database: {}", e);
        }
    };

    info!("Running database migrations...");
    match sqlx::migrate!("./migrations").run(&pool).await {
        Ok(_) => info!("Migrations completed successfully"),
        Err(e) => {
            error!("Failed to run migrations: {}", e);
            panic!("Database migration failed: {}", e);
        }
    }

    spawn_session_cleanup(pool.clone(), config.session_cleanup_interval_secs);

    init_rocket(pool, config)
}

fn spawn_session_cleanup(pool: SqlitePool, interval_secs: u64) {
    tokio::spawn(async move {
        let period = tokio::time::Duration::from_secs(interval_secs.max(1));
        let mut interval = tokio::time::interval(period);

        loop {
            interval.tick().await;

            match clean_expired_sessions(&pool).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }
        }
    });
}

pub fn init_rocket(pool: SqlitePool, config: AppConfig) -> Rocket<Build> {
    info!("Starting habit tracker");

    rocket::build()
        .manage(pool)
        .manage(config)
        .mount(
            "/api",
            routes![
                api_login,
                api_logout,
                api_register_user,
                api_me,
                api_get_habits,
                api_create_habit,
                api_get_habit,
                api_update_habit,
                api_get_day,
                api_update_completions,
                api_get_stats,
                api_get_books,
                api_create_book,
                health,
            ],
        )
        .register(
            "/api",
            catchers![unauthorized_api, unprocessable_api, not_found_api],
        )
        .attach(TelemetryFairing)
}
