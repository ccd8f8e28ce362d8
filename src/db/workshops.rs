use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{DbMaterial, DbWorkshop, Workshop, WorkshopRecord};

const WORKSHOP_COLUMNS: &str =
    "id, title, date, hosts, description, prerequisites, materials, created_at";

#[instrument]
pub async fn list_workshops(pool: &Pool<Sqlite>) -> Result<Vec<Workshop>, AppError> {
    info!("Listing workshops");
    let rows = sqlx::query_as::<_, DbWorkshop>(&format!(
        "SELECT {WORKSHOP_COLUMNS} FROM workshops ORDER BY date DESC, id DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Workshop::from).collect())
}

#[instrument]
pub async fn get_workshop(pool: &Pool<Sqlite>, id: i64) -> Result<Workshop, AppError> {
    info!("Getting workshop");
    let row = sqlx::query_as::<_, DbWorkshop>(&format!(
        "SELECT {WORKSHOP_COLUMNS} FROM workshops WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(Workshop::from)
        .ok_or_else(|| AppError::NotFound(format!("Workshop with id {} not found", id)))
}

/// Materials linked to a workshop through `workshop_materials`, as
/// `(id, name, file_path)` rows.
#[instrument]
pub async fn get_workshop_materials(
    pool: &Pool<Sqlite>,
    workshop_id: i64,
) -> Result<Vec<DbMaterial>, AppError> {
    info!("Getting workshop materials");
    let rows = sqlx::query_as::<_, DbMaterial>(
        "SELECT m.id, m.name, m.file_path
         FROM workshop_materials wm
         JOIN materials m ON m.id = wm.material_id
         WHERE wm.workshop_id = ?
         ORDER BY m.id",
    )
    .bind(workshop_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[instrument(skip(record), fields(title = %record.title))]
pub async fn create_workshop(pool: &Pool<Sqlite>, record: &WorkshopRecord) -> Result<i64, AppError> {
    info!("Creating workshop");
    let prerequisites = serde_json::to_string(&record.prerequisites)?;
    let materials = serde_json::to_string(&record.materials)?;

    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "INSERT INTO workshops (title, date, hosts, description, prerequisites, materials)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.title)
    .bind(&record.date)
    .bind(&record.hosts)
    .bind(&record.description)
    .bind(prerequisites)
    .bind(materials)
    .execute(&mut *tx)
    .await?;

    let workshop_id = res.last_insert_rowid();
    link_materials(&mut tx, workshop_id, &record.materials).await?;

    tx.commit().await?;
    Ok(workshop_id)
}

#[instrument(skip(record), fields(title = %record.title))]
pub async fn update_workshop(
    pool: &Pool<Sqlite>,
    id: i64,
    record: &WorkshopRecord,
) -> Result<(), AppError> {
    info!("Updating workshop");
    let prerequisites = serde_json::to_string(&record.prerequisites)?;
    let materials = serde_json::to_string(&record.materials)?;

    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "UPDATE workshops
         SET title = ?, date = ?, hosts = ?, description = ?, prerequisites = ?, materials = ?
         WHERE id = ?",
    )
    .bind(&record.title)
    .bind(&record.date)
    .bind(&record.hosts)
    .bind(&record.description)
    .bind(prerequisites)
    .bind(materials)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Workshop with id {} not found", id)));
    }

    sqlx::query("DELETE FROM workshop_materials WHERE workshop_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    link_materials(&mut tx, id, &record.materials).await?;
    remove_orphaned_materials(&mut tx).await?;

    tx.commit().await?;
    Ok(())
}

#[instrument]
pub async fn delete_workshop(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting workshop");
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM workshop_materials WHERE workshop_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let res = sqlx::query("DELETE FROM workshops WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Workshop with id {} not found", id)));
    }

    remove_orphaned_materials(&mut tx).await?;

    tx.commit().await?;
    Ok(())
}

/// Drops material rows no workshop refers to any more.
async fn remove_orphaned_materials(conn: &mut SqliteConnection) -> Result<(), AppError> {
    sqlx::query(
        "DELETE FROM materials
         WHERE id NOT IN (SELECT material_id FROM workshop_materials)",
    )
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn link_materials(
    conn: &mut SqliteConnection,
    workshop_id: i64,
    paths: &[String],
) -> Result<(), AppError> {
    for path in paths {
        let name = path.rsplit('/').next().unwrap_or(path);

        sqlx::query("INSERT INTO materials (name, file_path) VALUES (?, ?) ON CONFLICT(file_path) DO NOTHING")
            .bind(name)
            .bind(path)
            .execute(&mut *conn)
            .await?;

        let material_id: i64 = sqlx::query_scalar("SELECT id FROM materials WHERE file_path = ?")
            .bind(path)
            .fetch_one(&mut *conn)
            .await?;

        sqlx::query(
            "INSERT OR IGNORE INTO workshop_materials (workshop_id, material_id) VALUES (?, ?)",
        )
        .bind(workshop_id)
        .bind(material_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
