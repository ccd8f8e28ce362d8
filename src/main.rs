#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod config;
mod db;
mod env;
mod error;
mod forms;
mod models;
mod pages;
mod realtime;
mod runtime;
mod storage;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use std::sync::Arc;

use api::admin::{
    challenge_form, concept_form, create_challenge_admin, create_concept_admin,
    create_session_admin, create_workshop_admin, delete_challenge_admin, delete_concept_admin,
    delete_session_admin, delete_user_admin, delete_workshop_admin, invite_user_admin,
    list_challenges_admin, list_concepts_admin, list_sessions_admin, list_users_admin,
    list_workshops_admin, session_form, update_challenge_admin, update_concept_admin,
    update_role_admin, update_session_admin, update_workshop_admin, workshop_form,
};
use api::auth::{
    api_accept_invite, api_login, api_logout, api_me, api_refresh, oauth_callback, oauth_start,
};
use api::challenges::{run_challenge, runtime_status, submit_challenge};
use api::realtime::{auth_events, table_changes};
use api::storage::{serve_material, upload_material};
use api::{forbidden_api, health, internal_error_api, unauthorized_api};
use auth::oauth::OAuthClient;
use auth::IdentityService;
use config::PortalConfig;
use db::clean_expired_sessions;
use error::AppError;
use pages::{
    admin_content_page, admin_page, admin_users_page, archive_page, challenge_page, home,
    home_alias, login_page, references_page, results_page, sessions_page, workshop_detail_page,
    workshops_page,
};
use realtime::ChangeFeed;
use rocket::fairing::AdHoc;
use rocket::{tokio, Build, Rocket};
use runtime::{Interpreter, PythonInterpreter, RuntimeBridge};
use sqlx::SqlitePool;
use storage::{ObjectStore, UploadTracker};
use telemetry::{init_tracing, TelemetryFairing};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Figment(rocket::figment::Error),
    #[error("{0}")]
    Rocket(Box<rocket::Error>),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

impl From<rocket::figment::Error> for Error {
    fn from(value: rocket::figment::Error) -> Self {
        Error::Figment(value)
    }
}

impl From<rocket::Error> for Error {
    fn from(value: rocket::Error) -> Self {
        Error::Rocket(Box::new(value))
    }
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    if let Err(e) = env::load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }

    init_tracing();

    let config = PortalConfig::from_figment(&rocket::Config::figment());
    let database_url = env::database_url();

    let pool = SqlitePool::connect(&database_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to {}: {}", database_url, e))?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(AppError::from)?;
    info!("Migrations completed successfully");

    let pool_clone = pool.clone();

    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool_clone).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    let interpreter: Arc<dyn Interpreter> = Arc::new(PythonInterpreter::new(
        config.python.clone(),
        config.execution_timeout(),
    ));

    let _rocket = init_rocket(pool, config, interpreter)?
        .attach(AdHoc::on_liftoff("Runtime warm-up", |rocket| {
            Box::pin(async move {
                if let Some(bridge) = rocket.state::<RuntimeBridge>() {
                    let bridge = bridge.clone();
                    tokio::spawn(async move {
                        if let Err(e) = bridge.ensure_ready().await {
                            warn!("Challenge runtime unavailable: {}", e);
                        }
                    });
                }
            })
        }))
        .launch()
        .await?;

    Ok(())
}

pub fn init_rocket(
    pool: SqlitePool,
    config: PortalConfig,
    interpreter: Arc<dyn Interpreter>,
) -> Result<Rocket<Build>, AppError> {
    info!("Starting research portal");

    let identity = IdentityService::new(pool.clone(), config.session_lifetime());
    let store = ObjectStore::new(config.storage_root.clone(), &config.public_base_url);
    let bridge = RuntimeBridge::new(interpreter, config.python_packages.clone());
    let oauth = OAuthClient::new(config.oauth.clone())?;

    Ok(rocket::build()
        .manage(pool)
        .manage(identity)
        .manage(store)
        .manage(bridge)
        .manage(oauth)
        .manage(ChangeFeed::default())
        .manage(UploadTracker::default())
        .manage(config)
        .mount(
            "/",
            routes![
                login_page,
                home,
                home_alias,
                workshops_page,
                workshop_detail_page,
                sessions_page,
                results_page,
                references_page,
                archive_page,
                challenge_page,
                admin_page,
                admin_users_page,
                admin_content_page,
            ],
        )
        .mount(
            "/api",
            routes![
                health,
                api_login,
                api_logout,
                api_refresh,
                api_me,
                oauth_start,
                oauth_callback,
                api_accept_invite,
                auth_events,
                runtime_status,
                run_challenge,
                submit_challenge,
                table_changes,
                upload_material,
                list_workshops_admin,
                workshop_form,
                create_workshop_admin,
                update_workshop_admin,
                delete_workshop_admin,
                list_sessions_admin,
                session_form,
                create_session_admin,
                update_session_admin,
                delete_session_admin,
                list_challenges_admin,
                challenge_form,
                create_challenge_admin,
                update_challenge_admin,
                delete_challenge_admin,
                list_concepts_admin,
                concept_form,
                create_concept_admin,
                update_concept_admin,
                delete_concept_admin,
                list_users_admin,
                invite_user_admin,
                update_role_admin,
                delete_user_admin,
            ],
        )
        .mount("/storage", routes![serve_material])
        .register(
            "/api",
            catchers![unauthorized_api, forbidden_api, internal_error_api],
        )
        .attach(TelemetryFairing))
}
