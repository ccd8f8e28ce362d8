use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::response::status::Custom;
use rocket::response::Redirect;
use rocket::serde::json::Json;
use rocket::State;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};
use validator::Validate;

use crate::auth::oauth::{OAuthClient, OAuthProvider, STATE_COOKIE};
use crate::auth::{
    clear_session_cookie, landing_path, session_token, set_session_cookie, IdentityService,
    User, UserSession,
};
use crate::db::{accept_invite, confirm_user, find_user_by_email};
use crate::error::AppError;
use crate::forms::AcceptInviteForm;
use crate::realtime::{ChangeFeed, ChangeKind};
use crate::validation::{AppErrorExt, JsonValidateExt, ToValidationResponse, ValidationResponse};

use super::UserData;

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "A valid email address is required"))]
    email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    password: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<UserData>,
    pub error: Option<String>,
    pub redirect_url: Option<String>,
}

impl LoginResponse {
    fn signed_in(user: User) -> Self {
        Self {
            success: true,
            redirect_url: Some(landing_path(user.role).to_string()),
            user: Some(UserData::from(user)),
            error: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SessionData {
    pub user_id: i64,
    pub expires_at: chrono::NaiveDateTime,
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    identity: &State<IdentityService>,
) -> Result<Json<LoginResponse>, Custom<Json<ValidationResponse>>> {
    let validated = login.validate_custom()?;

    match identity
        .sign_in_with_password(&validated.email, &validated.password)
        .await
    {
        Ok(signed_in) => {
            set_session_cookie(cookies, &signed_in.session);
            Ok(Json(LoginResponse::signed_in(signed_in.user)))
        }
        Err(AppError::Authentication(msg)) => {
            warn!(email = %validated.email, "Failed login attempt");
            Ok(Json(LoginResponse {
                success: false,
                user: None,
                error: Some(msg),
                redirect_url: None,
            }))
        }
        Err(e) => Err(e.to_validation_response()),
    }
}

#[post("/logout")]
pub async fn api_logout(cookies: &CookieJar<'_>, identity: &State<IdentityService>) -> Redirect {
    if let Some(token) = session_token(cookies) {
        if let Err(e) = identity.sign_out(&token).await {
            e.log_and_record("Signing out");
        }
    }

    clear_session_cookie(cookies);
    Redirect::to("/login")
}

#[post("/refresh")]
pub async fn api_refresh(
    cookies: &CookieJar<'_>,
    identity: &State<IdentityService>,
) -> Result<Json<SessionData>, Custom<Json<ValidationResponse>>> {
    let Some(token) = session_token(cookies) else {
        return Err(Status::Unauthorized.to_validation_response());
    };

    let session = identity.refresh(&token).await.validate_custom()?;
    set_session_cookie(cookies, &session);

    Ok(Json(SessionData {
        user_id: session.user_id,
        expires_at: session.expires_at,
    }))
}

#[get("/me")]
pub async fn api_me(user: User) -> Json<UserData> {
    Json(UserData::from(user))
}

#[get("/auth/oauth/<provider>")]
pub async fn oauth_start(
    provider: OAuthProvider,
    cookies: &CookieJar<'_>,
    oauth: &State<OAuthClient>,
) -> Result<Redirect, Custom<Json<ValidationResponse>>> {
    let state = UserSession::generate_token();
    let url = oauth.authorize_url(provider, &state).validate_custom()?;

    cookies.add_private(
        Cookie::build((STATE_COOKIE, state))
            .same_site(SameSite::Lax)
            .http_only(true)
            .max_age(rocket::time::Duration::minutes(10)),
    );

    info!(provider = %provider, "Redirecting to OAuth provider");
    Ok(Redirect::to(url))
}

fn oauth_failed() -> Redirect {
    Redirect::to("/login?error=oauth_failed")
}

#[get("/auth/oauth/<provider>/callback?<code>&<state>&<error>")]
#[allow(clippy::too_many_arguments)]
pub async fn oauth_callback(
    provider: OAuthProvider,
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    cookies: &CookieJar<'_>,
    oauth: &State<OAuthClient>,
    identity: &State<IdentityService>,
    db: &State<Pool<Sqlite>>,
) -> Redirect {
    let expected_state = cookies
        .get_private(STATE_COOKIE)
        .map(|c| c.value().to_string());
    cookies.remove_private(Cookie::build(STATE_COOKIE));

    if let Some(error) = error {
        warn!(provider = %provider, error = %error, "Provider returned an error");
        return oauth_failed();
    }

    let (Some(code), Some(state)) = (code, state) else {
        return oauth_failed();
    };

    if expected_state.as_deref() != Some(state.as_str()) {
        warn!(provider = %provider, "OAuth state mismatch");
        return oauth_failed();
    }

    let result: Result<User, AppError> = async {
        let email = oauth.exchange_code(provider, &code).await?;
        let user = find_user_by_email(db, &email)
            .await?
            .ok_or_else(|| AppError::Authorization(format!("No invited account for {}", email)))?;

        if !user.confirmed {
            confirm_user(db, user.id).await?;
        }

        Ok(user)
    }
    .await;

    let user = match result {
        Ok(user) => user,
        Err(e) => {
            e.log_and_record("OAuth callback");
            return oauth_failed();
        }
    };

    match identity.start_session(user).await {
        Ok(signed_in) => {
            set_session_cookie(cookies, &signed_in.session);
            Redirect::to(landing_path(signed_in.user.role))
        }
        Err(e) => {
            e.log_and_record("OAuth session");
            oauth_failed()
        }
    }
}

#[post("/invite/accept", data = "<form>")]
pub async fn api_accept_invite(
    form: Json<AcceptInviteForm>,
    cookies: &CookieJar<'_>,
    identity: &State<IdentityService>,
    feed: &State<ChangeFeed>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LoginResponse>, Custom<Json<ValidationResponse>>> {
    let validated = form.validate_custom()?;

    let user = accept_invite(db, &validated.token, &validated.password)
        .await
        .validate_custom()?;
    feed.publish("users", ChangeKind::Update, user.id);
    identity.profile_updated(user.id);

    let signed_in = identity.start_session(user).await.validate_custom()?;
    set_session_cookie(cookies, &signed_in.session);

    Ok(Json(LoginResponse::signed_in(signed_in.user)))
}
