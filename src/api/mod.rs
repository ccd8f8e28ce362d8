pub mod admin;
pub mod auth;
pub mod challenges;
pub mod realtime;
pub mod storage;

use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::Request;
use serde::{Deserialize, Serialize};

use crate::auth::User;
use crate::validation::{ToValidationResponse, ValidationResponse};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserData {
    pub id: i64,
    pub email: String,
    pub fname: String,
    pub lname: String,
    pub role: String,
    pub confirmed: bool,
}

impl From<User> for UserData {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            role: user.role.to_string(),
            email: user.email,
            fname: user.fname,
            lname: user.lname,
            confirmed: user.confirmed,
        }
    }
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> Custom<Json<ValidationResponse>> {
    Status::Unauthorized.to_validation_response()
}

#[catch(403)]
pub fn forbidden_api(_req: &Request) -> Custom<Json<ValidationResponse>> {
    Status::Forbidden.to_validation_response()
}

#[catch(500)]
pub fn internal_error_api(_req: &Request) -> Custom<Json<ValidationResponse>> {
    Status::InternalServerError.to_validation_response()
}
