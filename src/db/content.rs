use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{
    Concept, ConceptRecord, DbConcept, DbExamResult, DbRecordedSession, DbResource, ExamResult,
    RecordedSession, RecordedSessionRecord, Resource,
};

const SESSION_COLUMNS: &str = "id, title, date, description, youtube_video_id, created_at";
const CONCEPT_COLUMNS: &str = "id, title, description, article_url, is_active, created_at";

#[instrument]
pub async fn list_recorded_sessions(pool: &Pool<Sqlite>) -> Result<Vec<RecordedSession>, AppError> {
    info!("Listing recorded sessions");
    let rows = sqlx::query_as::<_, DbRecordedSession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM recorded_sessions ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(RecordedSession::from).collect())
}

#[instrument]
pub async fn get_recorded_session(pool: &Pool<Sqlite>, id: i64) -> Result<RecordedSession, AppError> {
    info!("Getting recorded session");
    let row = sqlx::query_as::<_, DbRecordedSession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM recorded_sessions WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(RecordedSession::from)
        .ok_or_else(|| AppError::NotFound(format!("Session with id {} not found", id)))
}

#[instrument(skip(record), fields(title = %record.title))]
pub async fn create_recorded_session(
    pool: &Pool<Sqlite>,
    record: &RecordedSessionRecord,
) -> Result<i64, AppError> {
    info!("Creating recorded session");
    let res = sqlx::query(
        "INSERT INTO recorded_sessions (title, date, description, youtube_video_id)
         VALUES (?, ?, ?, ?)",
    )
    .bind(&record.title)
    .bind(&record.date)
    .bind(&record.description)
    .bind(&record.youtube_video_id)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(record), fields(title = %record.title))]
pub async fn update_recorded_session(
    pool: &Pool<Sqlite>,
    id: i64,
    record: &RecordedSessionRecord,
) -> Result<(), AppError> {
    info!("Updating recorded session");
    let res = sqlx::query(
        "UPDATE recorded_sessions
         SET title = ?, date = ?, description = ?, youtube_video_id = ?
         WHERE id = ?",
    )
    .bind(&record.title)
    .bind(&record.date)
    .bind(&record.description)
    .bind(&record.youtube_video_id)
    .bind(id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Session with id {} not found", id)));
    }

    Ok(())
}

#[instrument]
pub async fn delete_recorded_session(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting recorded session");
    let res = sqlx::query("DELETE FROM recorded_sessions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Session with id {} not found", id)));
    }

    Ok(())
}

/// The concept currently featured on the home page, if any.
#[instrument]
pub async fn get_active_concept(pool: &Pool<Sqlite>) -> Result<Option<Concept>, AppError> {
    info!("Getting active concept");
    let row = sqlx::query_as::<_, DbConcept>(&format!(
        "SELECT {CONCEPT_COLUMNS} FROM concepts WHERE is_active = TRUE
         ORDER BY created_at DESC, id DESC LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Concept::from))
}

#[instrument]
pub async fn get_concept(pool: &Pool<Sqlite>, id: i64) -> Result<Concept, AppError> {
    info!("Getting concept");
    let row = sqlx::query_as::<_, DbConcept>(&format!(
        "SELECT {CONCEPT_COLUMNS} FROM concepts WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(Concept::from)
        .ok_or_else(|| AppError::NotFound(format!("Concept with id {} not found", id)))
}

#[instrument]
pub async fn list_archived_concepts(pool: &Pool<Sqlite>) -> Result<Vec<Concept>, AppError> {
    info!("Listing archived concepts");
    let rows = sqlx::query_as::<_, DbConcept>(&format!(
        "SELECT {CONCEPT_COLUMNS} FROM concepts WHERE is_active = FALSE
         ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Concept::from).collect())
}

#[instrument]
pub async fn list_concepts(pool: &Pool<Sqlite>) -> Result<Vec<Concept>, AppError> {
    info!("Listing concepts");
    let rows = sqlx::query_as::<_, DbConcept>(&format!(
        "SELECT {CONCEPT_COLUMNS} FROM concepts ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Concept::from).collect())
}

/// Inserts a concept. Activating it archives every other concept in the same
/// transaction so at most one is featured.
#[instrument(skip(record), fields(title = %record.title))]
pub async fn create_concept(pool: &Pool<Sqlite>, record: &ConceptRecord) -> Result<i64, AppError> {
    info!("Creating concept");
    let mut tx = pool.begin().await?;

    if record.is_active {
        sqlx::query("UPDATE concepts SET is_active = FALSE WHERE is_active = TRUE")
            .execute(&mut *tx)
            .await?;
    }

    let res = sqlx::query(
        "INSERT INTO concepts (title, description, article_url, is_active) VALUES (?, ?, ?, ?)",
    )
    .bind(&record.title)
    .bind(&record.description)
    .bind(&record.article_url)
    .bind(record.is_active)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(res.last_insert_rowid())
}

#[instrument(skip(record), fields(title = %record.title))]
pub async fn update_concept(
    pool: &Pool<Sqlite>,
    id: i64,
    record: &ConceptRecord,
) -> Result<(), AppError> {
    info!("Updating concept");
    let mut tx = pool.begin().await?;

    if record.is_active {
        sqlx::query("UPDATE concepts SET is_active = FALSE WHERE is_active = TRUE AND id != ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    let res = sqlx::query(
        "UPDATE concepts SET title = ?, description = ?, article_url = ?, is_active = ? WHERE id = ?",
    )
    .bind(&record.title)
    .bind(&record.description)
    .bind(&record.article_url)
    .bind(record.is_active)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Concept with id {} not found", id)));
    }

    tx.commit().await?;
    Ok(())
}

#[instrument]
pub async fn delete_concept(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting concept");
    let res = sqlx::query("DELETE FROM concepts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Concept with id {} not found", id)));
    }

    Ok(())
}

#[instrument]
pub async fn list_resources(pool: &Pool<Sqlite>) -> Result<Vec<Resource>, AppError> {
    info!("Listing resources");
    let rows = sqlx::query_as::<_, DbResource>(
        "SELECT id, category, title, author, image_url, tags, annotation, url, action_text
         FROM resources ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Resource::from).collect())
}

/// Grades for one trainee joined with their exam, newest grade first.
#[instrument]
pub async fn list_exam_results(pool: &Pool<Sqlite>, user_id: i64) -> Result<Vec<ExamResult>, AppError> {
    info!("Listing exam results");
    let rows = sqlx::query_as::<_, DbExamResult>(
        "SELECT g.score, g.paper_url, g.feedback,
                e.name AS exam_name, e.max_score, e.exam_date
         FROM grades g
         JOIN exams e ON e.id = g.exam_id
         WHERE g.user_id = ?
         ORDER BY g.created_at DESC, g.id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ExamResult::from).collect())
}
