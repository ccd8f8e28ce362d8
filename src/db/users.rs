use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::{DbUser, Role, User};
use crate::error::AppError;

const USER_COLUMNS: &str = "id, email, role, fname, lname, confirmed";

#[instrument]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
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
pub async fn find_user_by_email(pool: &Pool<Sqlite>, email: &str) -> Result<Option<User>, AppError> {
    info!("Finding user by email");
    let row = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = ? COLLATE NOCASE"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(User::from))
}

/// Checks an email/password pair. Invited users who have not yet chosen a
/// password never authenticate.
#[instrument(skip_all, fields(email))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    email: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");

    #[derive(sqlx::FromRow)]
    struct Credentials {
        id: i64,
        password: String,
        confirmed: bool,
    }

    let credentials = sqlx::query_as::<_, Credentials>(
        "SELECT id, password, confirmed FROM users WHERE email = ? COLLATE NOCASE",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    match credentials {
        Some(row) if row.confirmed && !row.password.is_empty() => {
            match bcrypt::verify(password, &row.password) {
                Ok(true) => Ok(Some(get_user(pool, row.id).await?)),
                _ => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

/// Creates a confirmed account with a password. Used for bootstrap and seeding.
#[instrument(skip(pool, password))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    email: &str,
    password: &str,
    role: Role,
    fname: &str,
    lname: &str,
) -> Result<i64, AppError> {
    info!("Creating new user");

    if find_user_by_email(pool, email).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "User with email '{}' already exists",
            email
        )));
    }

    let hashed_password = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

    let res = sqlx::query(
        "INSERT INTO users (email, password, role, fname, lname, confirmed)
         VALUES (?, ?, ?, ?, ?, TRUE)",
    )
    .bind(email)
    .bind(hashed_password)
    .bind(role.as_str())
    .bind(fname)
    .bind(lname)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

/// Creates an unconfirmed profile that can only be activated with the invite
/// token.
#[instrument(skip(pool, invite_token))]
pub async fn invite_user(
    pool: &Pool<Sqlite>,
    email: &str,
    fname: &str,
    lname: &str,
    role: Role,
    invite_token: &str,
) -> Result<i64, AppError> {
    info!("Inviting user");

    if find_user_by_email(pool, email).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "User with email '{}' already exists",
            email
        )));
    }

    let res = sqlx::query(
        "INSERT INTO users (email, role, fname, lname, invite_token, confirmed)
         VALUES (?, ?, ?, ?, ?, FALSE)",
    )
    .bind(email)
    .bind(role.as_str())
    .bind(fname)
    .bind(lname)
    .bind(invite_token)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip_all)]
pub async fn accept_invite(
    pool: &Pool<Sqlite>,
    invite_token: &str,
    password: &str,
) -> Result<User, AppError> {
    info!("Accepting invite");

    let user_id: Option<i64> =
        sqlx::query_scalar("SELECT id FROM users WHERE invite_token = ? AND confirmed = FALSE")
            .bind(invite_token)
            .fetch_optional(pool)
            .await?;

    let Some(user_id) = user_id else {
        return Err(AppError::NotFound("Invite not found or already used".to_string()));
    };

    let hashed_password = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

    sqlx::query(
        "UPDATE users SET password = ?, confirmed = TRUE, invite_token = NULL WHERE id = ?",
    )
    .bind(hashed_password)
    .bind(user_id)
    .execute(pool)
    .await?;

    get_user(pool, user_id).await
}

#[instrument]
pub async fn update_user_role(pool: &Pool<Sqlite>, user_id: i64, role: Role) -> Result<(), AppError> {
    info!("Updating user role");
    let res = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
        .bind(role.as_str())
        .bind(user_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("User with id {} not found", user_id)));
    }

    Ok(())
}

#[instrument]
pub async fn delete_user(pool: &Pool<Sqlite>, user_id: i64) -> Result<(), AppError> {
    info!("Deleting user");
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM user_sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM grades WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let res = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("User with id {} not found", user_id)));
    }

    tx.commit().await?;
    Ok(())
}

#[instrument]
pub async fn get_all_users(pool: &Pool<Sqlite>) -> Result<Vec<User>, AppError> {
    info!("Getting all users");
    let rows = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY lname, fname"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(User::from).collect())
}

/// Marks an invited profile as confirmed when its owner first signs in
/// through an OAuth provider.
#[instrument]
pub async fn confirm_user(pool: &Pool<Sqlite>, user_id: i64) -> Result<(), AppError> {
    info!("Confirming user");
    sqlx::query("UPDATE users SET confirmed = TRUE, invite_token = NULL WHERE id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}
