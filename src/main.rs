#[macro_use]
extern crate rocket;

mod api;
mod assignments;
mod auth;
mod backend;
mod daily;
mod dates;
mod db;
mod draft;
mod env;
mod error;
mod models;
mod program;
mod registry;
mod role;
mod store;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use api::{
    api_create_assignment, api_daily_day_stream, api_daily_stream, api_get_all_daily,
    api_get_assignments, api_get_coaches, api_get_daily, api_get_students, api_link_student,
    api_login, api_logout, api_me, api_me_unauthorized, api_overview, api_password_reset,
    api_password_reset_confirm, api_patch_program_day, api_role_stream, api_save_daily,
    api_save_program, api_set_assignment_status, api_signup, api_student_assignments,
    api_student_overview, api_student_program, api_students_stream, api_teacher_program,
    api_weeks, health,
};
use auth::{forbidden_api, unauthorized_api};
use backend::{Backend, BackendShutdown};
use db::clean_expired_sessions;
use env::{Config, ConfigError, load_environment};
use error::AppError;
use rocket::{Build, Rocket, tokio};
use sqlx::SqlitePool;
use telemetry::{TelemetryFairing, init_tracing};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Environment file error: {0}")]
    Env(#[from] dotenvy::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Application error: {0}")]
    App(#[from] AppError),
    #[error("Launch error: {0}")]
    Launch(#[from] rocket::Error),
}

fn spawn_session_cleanup(pool: SqlitePool) {
    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            if pool.is_closed() {
                break;
            }

            match clean_expired_sessions(&pool).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions and reset tokens", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    load_environment()?;
    let config = Config::from_env()?;
    let telemetry = init_tracing(&config);

    let backend = Backend::connect(&config).await?;
    spawn_session_cleanup(backend.pool().clone());

    init_rocket(backend).launch().await?;

    info!("Server stopped");
    drop(telemetry);
    Ok(())
}

pub fn init_rocket(backend: Backend) -> Rocket<Build> {
    info!("Starting study coach");

    rocket::build()
        .manage(backend)
        .mount(
            "/api",
            routes![
                api_signup,
                api_login,
                api_logout,
                api_password_reset,
                api_password_reset_confirm,
                api_me,
                api_me_unauthorized,
                api_role_stream,
                api_save_daily,
                api_get_daily,
                api_daily_day_stream,
                api_get_all_daily,
                api_daily_stream,
                api_overview,
                api_weeks,
                api_get_students,
                api_students_stream,
                api_link_student,
                api_teacher_program,
                api_save_program,
                api_student_overview,
                api_student_assignments,
                api_create_assignment,
                api_student_program,
                api_patch_program_day,
                api_get_coaches,
                api_get_assignments,
                api_set_assignment_status,
            ],
        )
        .register("/api", catchers![unauthorized_api, forbidden_api])
        .mount("/api", routes![health])
        .attach(TelemetryFairing)
        .attach(BackendShutdown)
}
