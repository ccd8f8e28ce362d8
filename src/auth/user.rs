use chrono::{NaiveDateTime, Utc};
use rand::{Rng, distr::Alphanumeric};
use rocket::http::Status;
use serde::Serialize;

use super::{Permission, Role};

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub fname: String,
    pub lname: String,
    pub confirmed: bool,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: Option<i64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub fname: Option<String>,
    pub lname: Option<String>,
    pub confirmed: Option<bool>,
}

impl From<DbUser> for User {
    fn from(user: DbUser) -> Self {
        let raw_role = user.role.unwrap_or_default();
        let role = Role::parse(&raw_role).unwrap_or_else(|_| {
            tracing::warn!(role = %raw_role, "Unknown stored role, treating as trainee");
            Role::Trainee
        });

        Self {
            id: user.id.unwrap_or_default(),
            email: user.email.unwrap_or_default(),
            role,
            fname: user.fname.unwrap_or_default(),
            lname: user.lname.unwrap_or_default(),
            confirmed: user.confirmed.unwrap_or_default(),
        }
    }
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.fname, self.lname).trim().to_string()
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), Status> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                email = %self.email,
                role = %self.role.as_str(),
                permission = ?permission,
                "Permission denied"
            );
            Err(Status::Forbidden)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSession {
    pub id: i64,
    pub user_id: i64,
    #[serde(skip_serializing)]
    pub token: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUserSession {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub token: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
}

impl From<DbUserSession> for UserSession {
    fn from(session: DbUserSession) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: session.id.unwrap_or_default(),
            user_id: session.user_id.unwrap_or_default(),
            token: session.token.unwrap_or_default(),
            created_at: session.created_at.unwrap_or(now),
            // A row without an expiry is treated as already expired.
            expires_at: session.expires_at.unwrap_or(now),
        }
    }
}

impl UserSession {
    pub fn generate_token() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(48)
            .map(char::from)
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now().naive_utc()
    }
}
