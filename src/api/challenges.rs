use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::State;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};

use crate::auth::{Permission, User};
use crate::db::get_challenge;
use crate::error::AppError;
use crate::runtime::{run_code, submit_code, RuntimeBridge, RuntimeStatus};
use crate::validation::{AppErrorExt, PermissionCheckExt, ValidationResponse};

#[derive(Serialize, Deserialize, Debug)]
pub struct CodeRequest {
    pub code: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RunResponse {
    pub output: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SubmitResponse {
    pub result: String,
}

#[get("/runtime/status")]
pub fn runtime_status(bridge: &State<RuntimeBridge>) -> Json<RuntimeStatus> {
    Json(bridge.status())
}

#[post("/challenges/<id>/run", data = "<request>")]
pub async fn run_challenge(
    id: i64,
    request: Json<CodeRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
    bridge: &State<RuntimeBridge>,
) -> Result<Json<RunResponse>, Custom<Json<ValidationResponse>>> {
    user.require_permission(Permission::RunChallenges)
        .validate_custom()?;

    // Only confirms the challenge exists; the run itself uses the editor code.
    get_challenge(db, id).await.validate_custom()?;

    let output = run_code(bridge, &request.code)
        .await
        .map_err(AppError::from)
        .validate_custom()?;

    Ok(Json(RunResponse { output }))
}

#[post("/challenges/<id>/submit", data = "<request>")]
pub async fn submit_challenge(
    id: i64,
    request: Json<CodeRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
    bridge: &State<RuntimeBridge>,
) -> Result<Json<SubmitResponse>, Custom<Json<ValidationResponse>>> {
    user.require_permission(Permission::RunChallenges)
        .validate_custom()?;

    let challenge = get_challenge(db, id).await.validate_custom()?;

    let result = submit_code(bridge, &challenge, &request.code)
        .await
        .map_err(AppError::from)
        .validate_custom()?;

    Ok(Json(SubmitResponse { result }))
}
