use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::State;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::info;

use crate::auth::{AdminUser, IdentityService, Permission, Role, UserSession};
use crate::db::{
    create_challenge, create_concept, create_recorded_session, create_workshop, delete_challenge,
    delete_concept, delete_recorded_session, delete_user, delete_workshop, get_all_users,
    get_challenge, get_concept, get_recorded_session, get_user, get_workshop, invite_user,
    list_challenges, list_concepts, list_recorded_sessions, list_workshops, update_challenge,
    update_concept, update_recorded_session, update_user_role, update_workshop,
};
use crate::error::AppError;
use crate::forms::{
    ChallengeForm, ConceptForm, InviteForm, Notification, RoleForm, SessionForm, WorkshopForm,
};
use crate::models::{Challenge, Concept, RecordedSession, Workshop};
use crate::pages::UserRow;
use crate::realtime::{ChangeFeed, ChangeKind};
use crate::storage::UploadTracker;
use crate::validation::{
    AppErrorExt, JsonValidateExt, PermissionCheckExt, ToValidationResponse, ValidationResponse,
};

#[derive(Debug, Responder)]
pub enum AdminError {
    Invalid(Custom<Json<ValidationResponse>>),
    Failed(Custom<Json<Notification>>),
}

impl From<Custom<Json<ValidationResponse>>> for AdminError {
    fn from(response: Custom<Json<ValidationResponse>>) -> Self {
        AdminError::Invalid(response)
    }
}

fn failed(error: AppError, message: &str) -> AdminError {
    error.log_and_record(message);
    AdminError::Failed(Custom(
        error.status_code(),
        Json(Notification::error(message)),
    ))
}

type AdminResult<T> = Result<Json<T>, AdminError>;

fn require(admin: &AdminUser, permission: Permission) -> Result<(), AdminError> {
    admin.0.require_permission(permission).validate_custom()?;
    Ok(())
}

#[get("/admin/workshops")]
pub async fn list_workshops_admin(
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Workshop>>, Custom<Json<ValidationResponse>>> {
    admin.0.require_permission(Permission::ManageContent).validate_custom()?;
    Ok(Json(list_workshops(db).await.validate_custom()?))
}

#[get("/admin/workshops/<id>/form")]
pub async fn workshop_form(
    id: i64,
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<WorkshopForm>, Custom<Json<ValidationResponse>>> {
    admin.0.require_permission(Permission::ManageContent).validate_custom()?;
    let workshop = get_workshop(db, id).await.validate_custom()?;
    Ok(Json(WorkshopForm::from(&workshop)))
}

/// Refuses to save while the same admin still has a material upload running.
fn ensure_no_upload(admin: &AdminUser, uploads: &UploadTracker) -> Result<(), AdminError> {
    if uploads.is_uploading(admin.0.id) {
        return Err(AdminError::Failed(Custom(
            Status::Conflict,
            Json(Notification::error(
                "Please wait for the file to finish uploading.",
            )),
        )));
    }
    Ok(())
}

#[post("/admin/workshops", data = "<form>")]
pub async fn create_workshop_admin(
    form: Json<WorkshopForm>,
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
    feed: &State<ChangeFeed>,
    uploads: &State<UploadTracker>,
) -> AdminResult<Notification> {
    require(&admin, Permission::ManageContent)?;
    ensure_no_upload(&admin, uploads)?;
    let form = form.validate_custom()?;

    let id = create_workshop(db, &form.to_record())
        .await
        .map_err(|e| failed(e, "Failed to save workshop."))?;
    feed.publish("workshops", ChangeKind::Insert, id);

    Ok(Json(Notification::success("Workshop added successfully!")))
}

#[put("/admin/workshops/<id>", data = "<form>")]
pub async fn update_workshop_admin(
    id: i64,
    form: Json<WorkshopForm>,
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
    feed: &State<ChangeFeed>,
    uploads: &State<UploadTracker>,
) -> AdminResult<Notification> {
    require(&admin, Permission::ManageContent)?;
    ensure_no_upload(&admin, uploads)?;
    let form = form.validate_custom()?;

    update_workshop(db, id, &form.to_record())
        .await
        .map_err(|e| failed(e, "Failed to save workshop."))?;
    feed.publish("workshops", ChangeKind::Update, id);

    Ok(Json(Notification::success("Workshop updated successfully!")))
}

#[delete("/admin/workshops/<id>")]
pub async fn delete_workshop_admin(
    id: i64,
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
    feed: &State<ChangeFeed>,
) -> AdminResult<Notification> {
    require(&admin, Permission::ManageContent)?;

    delete_workshop(db, id)
        .await
        .map_err(|e| failed(e, "Failed to delete workshop."))?;
    feed.publish("workshops", ChangeKind::Delete, id);

    Ok(Json(Notification::success("Workshop deleted successfully!")))
}

#[get("/admin/sessions")]
pub async fn list_sessions_admin(
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<RecordedSession>>, Custom<Json<ValidationResponse>>> {
    admin.0.require_permission(Permission::ManageContent).validate_custom()?;
    Ok(Json(list_recorded_sessions(db).await.validate_custom()?))
}

#[get("/admin/sessions/<id>/form")]
pub async fn session_form(
    id: i64,
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SessionForm>, Custom<Json<ValidationResponse>>> {
    admin.0.require_permission(Permission::ManageContent).validate_custom()?;
    let session = get_recorded_session(db, id).await.validate_custom()?;
    Ok(Json(SessionForm::from(&session)))
}

#[post("/admin/sessions", data = "<form>")]
pub async fn create_session_admin(
    form: Json<SessionForm>,
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
    feed: &State<ChangeFeed>,
) -> AdminResult<Notification> {
    require(&admin, Permission::ManageContent)?;
    let form = form.validate_custom()?;

    let id = create_recorded_session(db, &form.to_record())
        .await
        .map_err(|e| failed(e, "Failed to save session."))?;
    feed.publish("recorded_sessions", ChangeKind::Insert, id);

    Ok(Json(Notification::success("Session added successfully!")))
}

#[put("/admin/sessions/<id>", data = "<form>")]
pub async fn update_session_admin(
    id: i64,
    form: Json<SessionForm>,
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
    feed: &State<ChangeFeed>,
) -> AdminResult<Notification> {
    require(&admin, Permission::ManageContent)?;
    let form = form.validate_custom()?;

    update_recorded_session(db, id, &form.to_record())
        .await
        .map_err(|e| failed(e, "Failed to save session."))?;
    feed.publish("recorded_sessions", ChangeKind::Update, id);

    Ok(Json(Notification::success("Session updated successfully!")))
}

#[delete("/admin/sessions/<id>")]
pub async fn delete_session_admin(
    id: i64,
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
    feed: &State<ChangeFeed>,
) -> AdminResult<Notification> {
    require(&admin, Permission::ManageContent)?;

    delete_recorded_session(db, id)
        .await
        .map_err(|e| failed(e, "Failed to delete session."))?;
    feed.publish("recorded_sessions", ChangeKind::Delete, id);

    Ok(Json(Notification::success("Session deleted successfully!")))
}

#[get("/admin/challenges")]
pub async fn list_challenges_admin(
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Challenge>>, Custom<Json<ValidationResponse>>> {
    admin.0.require_permission(Permission::ManageContent).validate_custom()?;
    Ok(Json(list_challenges(db).await.validate_custom()?))
}

#[get("/admin/challenges/<id>/form")]
pub async fn challenge_form(
    id: i64,
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ChallengeForm>, Custom<Json<ValidationResponse>>> {
    admin.0.require_permission(Permission::ManageContent).validate_custom()?;
    let challenge = get_challenge(db, id).await.validate_custom()?;
    Ok(Json(ChallengeForm::from(&challenge)))
}

#[post("/admin/challenges", data = "<form>")]
pub async fn create_challenge_admin(
    form: Json<ChallengeForm>,
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
    feed: &State<ChangeFeed>,
) -> AdminResult<Notification> {
    require(&admin, Permission::ManageContent)?;
    let form = form.validate_custom()?;

    let id = create_challenge(db, &form.to_record())
        .await
        .map_err(|e| failed(e, "Failed to save challenge."))?;
    feed.publish("challenges", ChangeKind::Insert, id);

    Ok(Json(Notification::success("Challenge added successfully!")))
}

#[put("/admin/challenges/<id>", data = "<form>")]
pub async fn update_challenge_admin(
    id: i64,
    form: Json<ChallengeForm>,
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
    feed: &State<ChangeFeed>,
) -> AdminResult<Notification> {
    require(&admin, Permission::ManageContent)?;
    let form = form.validate_custom()?;

    update_challenge(db, id, &form.to_record())
        .await
        .map_err(|e| failed(e, "Failed to save challenge."))?;
    feed.publish("challenges", ChangeKind::Update, id);

    Ok(Json(Notification::success("Challenge updated successfully!")))
}

#[delete("/admin/challenges/<id>")]
pub async fn delete_challenge_admin(
    id: i64,
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
    feed: &State<ChangeFeed>,
) -> AdminResult<Notification> {
    require(&admin, Permission::ManageContent)?;

    delete_challenge(db, id)
        .await
        .map_err(|e| failed(e, "Failed to delete challenge."))?;
    feed.publish("challenges", ChangeKind::Delete, id);

    Ok(Json(Notification::success("Challenge deleted successfully!")))
}

#[get("/admin/concepts")]
pub async fn list_concepts_admin(
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Concept>>, Custom<Json<ValidationResponse>>> {
    admin.0.require_permission(Permission::ManageContent).validate_custom()?;
    Ok(Json(list_concepts(db).await.validate_custom()?))
}

#[get("/admin/concepts/<id>/form")]
pub async fn concept_form(
    id: i64,
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ConceptForm>, Custom<Json<ValidationResponse>>> {
    admin.0.require_permission(Permission::ManageContent).validate_custom()?;
    let concept = get_concept(db, id).await.validate_custom()?;
    Ok(Json(ConceptForm::from(&concept)))
}

#[post("/admin/concepts", data = "<form>")]
pub async fn create_concept_admin(
    form: Json<ConceptForm>,
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
    feed: &State<ChangeFeed>,
) -> AdminResult<Notification> {
    require(&admin, Permission::ManageContent)?;
    let form = form.validate_custom()?;

    let id = create_concept(db, &form.to_record())
        .await
        .map_err(|e| failed(e, "Failed to save concept."))?;
    feed.publish("concepts", ChangeKind::Insert, id);

    Ok(Json(Notification::success("Concept added successfully!")))
}

#[put("/admin/concepts/<id>", data = "<form>")]
pub async fn update_concept_admin(
    id: i64,
    form: Json<ConceptForm>,
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
    feed: &State<ChangeFeed>,
) -> AdminResult<Notification> {
    require(&admin, Permission::ManageContent)?;
    let form = form.validate_custom()?;

    update_concept(db, id, &form.to_record())
        .await
        .map_err(|e| failed(e, "Failed to save concept."))?;
    feed.publish("concepts", ChangeKind::Update, id);

    Ok(Json(Notification::success("Concept updated successfully!")))
}

#[delete("/admin/concepts/<id>")]
pub async fn delete_concept_admin(
    id: i64,
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
    feed: &State<ChangeFeed>,
) -> AdminResult<Notification> {
    require(&admin, Permission::ManageContent)?;

    delete_concept(db, id)
        .await
        .map_err(|e| failed(e, "Failed to delete concept."))?;
    feed.publish("concepts", ChangeKind::Delete, id);

    Ok(Json(Notification::success("Concept deleted successfully!")))
}

#[get("/admin/users")]
pub async fn list_users_admin(
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<UserRow>>, Custom<Json<ValidationResponse>>> {
    admin.0.require_permission(Permission::ManageContent).validate_custom()?;
    let users = get_all_users(db).await.validate_custom()?;
    Ok(Json(users.into_iter().map(UserRow::from).collect()))
}

#[derive(Serialize, Deserialize, Debug)]
pub struct InviteResponse {
    pub notification: Notification,
    pub user_id: i64,
    pub invite_token: String,
}

#[post("/admin/users/invite", data = "<form>")]
pub async fn invite_user_admin(
    form: Json<InviteForm>,
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
    feed: &State<ChangeFeed>,
) -> AdminResult<InviteResponse> {
    require(&admin, Permission::InviteUsers)?;
    let form = form.validate_custom()?;

    let role = if form.is_admin {
        Role::Admin
    } else {
        Role::Trainee
    };
    let invite_token = UserSession::generate_token();

    let user_id = invite_user(db, &form.email, &form.fname, &form.lname, role, &invite_token)
        .await
        .map_err(|e| failed(e, "Failed to invite user."))?;
    feed.publish("users", ChangeKind::Insert, user_id);

    info!(
        email = %form.email,
        invited_by = %admin.0.email,
        invite_token = %invite_token,
        "User invited"
    );

    Ok(Json(InviteResponse {
        notification: Notification::success("User invited successfully!"),
        user_id,
        invite_token,
    }))
}

#[put("/admin/users/<id>/role", data = "<form>")]
pub async fn update_role_admin(
    id: i64,
    form: Json<RoleForm>,
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
    feed: &State<ChangeFeed>,
    identity: &State<IdentityService>,
) -> AdminResult<Notification> {
    require(&admin, Permission::EditUserRoles)?;

    let role = Role::from_label(&form.role).validate_custom()?;
    let user = get_user(db, id)
        .await
        .map_err(|e| failed(e, "Failed to update role."))?;

    update_user_role(db, id, role)
        .await
        .map_err(|e| failed(e, "Failed to update role."))?;
    feed.publish("users", ChangeKind::Update, id);
    identity.profile_updated(id);

    Ok(Json(Notification::success(format!(
        "Role updated for {} {}.",
        user.fname, user.lname
    ))))
}

#[delete("/admin/users/<id>")]
pub async fn delete_user_admin(
    id: i64,
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
    feed: &State<ChangeFeed>,
) -> AdminResult<Notification> {
    require(&admin, Permission::DeleteUsers)?;

    if admin.0.id == id {
        return Err(AdminError::Invalid(
            AppError::Validation("Admins cannot delete their own account".to_string())
                .to_validation_response(),
        ));
    }

    let user = get_user(db, id)
        .await
        .map_err(|e| failed(e, "Failed to delete user."))?;

    delete_user(db, id)
        .await
        .map_err(|e| failed(e, "Failed to delete user."))?;
    feed.publish("users", ChangeKind::Delete, id);

    Ok(Json(Notification::success(format!(
        "User {} {} deleted successfully!",
        user.fname, user.lname
    ))))
}
