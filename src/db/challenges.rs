use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{Challenge, ChallengeRecord, DbChallenge};

const CHALLENGE_COLUMNS: &str = "id, title, kind, description, problem_statement, example_code, \
     constraints, starter_code, validation_script, test_runner_script, is_active, created_at";

#[instrument]
pub async fn get_challenge(pool: &Pool<Sqlite>, id: i64) -> Result<Challenge, AppError> {
    info!("Getting challenge");
    let row = sqlx::query_as::<_, DbChallenge>(&format!(
        "SELECT {CHALLENGE_COLUMNS} FROM challenges WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(Challenge::from)
        .ok_or_else(|| AppError::NotFound(format!("Challenge with id {} not found", id)))
}

#[instrument]
pub async fn list_challenges(pool: &Pool<Sqlite>) -> Result<Vec<Challenge>, AppError> {
    info!("Listing challenges");
    select_challenges(pool, "").await
}

#[instrument]
pub async fn list_active_challenges(pool: &Pool<Sqlite>) -> Result<Vec<Challenge>, AppError> {
    info!("Listing active challenges");
    select_challenges(pool, "WHERE is_active = TRUE").await
}

#[instrument]
pub async fn list_archived_challenges(pool: &Pool<Sqlite>) -> Result<Vec<Challenge>, AppError> {
    info!("Listing archived challenges");
    select_challenges(pool, "WHERE is_active = FALSE").await
}

async fn select_challenges(pool: &Pool<Sqlite>, filter: &str) -> Result<Vec<Challenge>, AppError> {
    let rows = sqlx::query_as::<_, DbChallenge>(&format!(
        "SELECT {CHALLENGE_COLUMNS} FROM challenges {filter} ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Challenge::from).collect())
}

#[instrument(skip(record), fields(title = %record.title))]
pub async fn create_challenge(pool: &Pool<Sqlite>, record: &ChallengeRecord) -> Result<i64, AppError> {
    info!("Creating challenge");
    let example_code = serde_json::to_string(&record.example_code)?;
    let constraints = serde_json::to_string(&record.constraints)?;

    let res = sqlx::query(
        "INSERT INTO challenges (title, kind, description, problem_statement, example_code,
             constraints, starter_code, validation_script, test_runner_script, is_active)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.title)
    .bind(record.kind.as_str())
    .bind(&record.description)
    .bind(&record.problem_statement)
    .bind(example_code)
    .bind(constraints)
    .bind(&record.starter_code)
    .bind(&record.validation_script)
    .bind(&record.test_runner_script)
    .bind(record.is_active)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(record), fields(title = %record.title))]
pub async fn update_challenge(
    pool: &Pool<Sqlite>,
    id: i64,
    record: &ChallengeRecord,
) -> Result<(), AppError> {
    info!("Updating challenge");
    let example_code = serde_json::to_string(&record.example_code)?;
    let constraints = serde_json::to_string(&record.constraints)?;

    let res = sqlx::query(
        "UPDATE challenges
         SET title = ?, kind = ?, description = ?, problem_statement = ?, example_code = ?,
             constraints = ?, starter_code = ?, validation_script = ?, test_runner_script = ?,
             is_active = ?
         WHERE id = ?",
    )
    .bind(&record.title)
    .bind(record.kind.as_str())
    .bind(&record.description)
    .bind(&record.problem_statement)
    .bind(example_code)
    .bind(constraints)
    .bind(&record.starter_code)
    .bind(&record.validation_script)
    .bind(&record.test_runner_script)
    .bind(record.is_active)
    .bind(id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Challenge with id {} not found", id)));
    }

    Ok(())
}

#[instrument]
pub async fn delete_challenge(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting challenge");
    let res = sqlx::query("DELETE FROM challenges WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Challenge with id {} not found", id)));
    }

    Ok(())
}
