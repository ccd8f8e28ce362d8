use chrono::Utc;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket::tokio::sync::broadcast;
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::db::{
    authenticate_user, create_user_session, extend_session, get_session_by_token, get_user,
    invalidate_session,
};
use crate::error::AppError;

use super::{User, UserSession};

pub const SESSION_COOKIE: &str = "session_token";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IdentityError {
    #[error("identity provider is not attached to this application")]
    ProviderMissing,
    #[error("identity could not be resolved")]
    ResolutionFailed,
    #[error("authentication required")]
    Unauthenticated,
    #[error("administrator role required")]
    NotAdmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    ProfileUpdated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub user_id: i64,
}

/// What a request knows about its caller. `is_loading` stays true only until
/// the session cookie has been resolved against the store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IdentityState {
    pub session: Option<UserSession>,
    pub user: Option<User>,
    pub is_loading: bool,
}

impl IdentityState {
    pub fn loading() -> Self {
        Self {
            session: None,
            user: None,
            is_loading: true,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(session: UserSession, user: User) -> Self {
        Self {
            session: Some(session),
            user: Some(user),
            is_loading: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignedIn {
    pub user: User,
    pub session: UserSession,
}

pub struct IdentityService {
    pool: SqlitePool,
    events: broadcast::Sender<AuthEvent>,
    session_lifetime: chrono::Duration,
}

impl IdentityService {
    pub fn new(pool: SqlitePool, session_lifetime: chrono::Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            pool,
            events,
            session_lifetime,
        }
    }

    pub fn session_lifetime(&self) -> chrono::Duration {
        self.session_lifetime
    }

    /// Receiver for auth state changes. Dropping it unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn publish(&self, kind: AuthEventKind, user_id: i64) {
        // No subscribers is not an error.
        let _ = self.events.send(AuthEvent { kind, user_id });
    }

    /// Looks up the session behind a token and the profile it belongs to.
    /// Unknown and expired tokens resolve to the anonymous state.
    #[instrument(skip_all)]
    pub async fn resolve(&self, token: &str) -> Result<IdentityState, AppError> {
        let session = match get_session_by_token(&self.pool, token).await {
            Ok(session) => session,
            Err(AppError::Authentication(_)) => {
                warn!("Unknown session token");
                return Ok(IdentityState::anonymous());
            }
            Err(e) => return Err(e),
        };

        if !session.is_valid() {
            warn!(session_id = session.id, "Session token expired");
            return Ok(IdentityState::anonymous());
        }

        match get_user(&self.pool, session.user_id).await {
            Ok(user) => Ok(IdentityState::signed_in(session, user)),
            Err(AppError::NotFound(_)) => {
                warn!(user_id = session.user_id, "Session belongs to a deleted user");
                Ok(IdentityState::anonymous())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn current_session(&self, token: &str) -> Result<Option<UserSession>, AppError> {
        Ok(self.resolve(token).await?.session)
    }

    #[instrument(skip(self, password))]
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignedIn, AppError> {
        match authenticate_user(&self.pool, email, password).await? {
            Some(user) => self.start_session(user).await,
            None => Err(AppError::Authentication(
                "Invalid login credentials".to_string(),
            )),
        }
    }

    /// Opens a session for a user whose identity was established elsewhere
    /// (OAuth callback, accepted invite).
    #[instrument(skip(self, user), fields(user_id = user.id))]
    pub async fn start_session(&self, user: User) -> Result<SignedIn, AppError> {
        let token = UserSession::generate_token();
        let now = Utc::now().naive_utc();
        let expires_at = now + self.session_lifetime;

        let id = create_user_session(&self.pool, user.id, &token, expires_at).await?;
        info!(email = %user.email, role = %user.role, "User signed in");
        self.publish(AuthEventKind::SignedIn, user.id);

        Ok(SignedIn {
            session: UserSession {
                id,
                user_id: user.id,
                token,
                created_at: now,
                expires_at,
            },
            user,
        })
    }

    #[instrument(skip_all)]
    pub async fn sign_out(&self, token: &str) -> Result<(), AppError> {
        let state = self.resolve(token).await?;
        invalidate_session(&self.pool, token).await?;

        if let Some(user) = state.user {
            info!(email = %user.email, "User signed out");
            self.publish(AuthEventKind::SignedOut, user.id);
        }

        Ok(())
    }

    /// Pushes the expiry of a live session forward by one session lifetime.
    #[instrument(skip_all)]
    pub async fn refresh(&self, token: &str) -> Result<UserSession, AppError> {
        let state = self.resolve(token).await?;
        let Some(mut session) = state.session else {
            return Err(AppError::Authentication(
                "Session expired or unknown".to_string(),
            ));
        };

        let expires_at = Utc::now().naive_utc() + self.session_lifetime;
        extend_session(&self.pool, token, expires_at).await?;
        session.expires_at = expires_at;

        self.publish(AuthEventKind::TokenRefreshed, session.user_id);
        Ok(session)
    }

    pub fn profile_updated(&self, user_id: i64) {
        self.publish(AuthEventKind::ProfileUpdated, user_id);
    }

    /// Fetches the current profile for a user named by an auth event.
    pub async fn refetch_profile(&self, user_id: i64) -> Result<Option<User>, AppError> {
        match get_user(&self.pool, user_id).await {
            Ok(user) => Ok(Some(user)),
            Err(AppError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

pub fn set_session_cookie(cookies: &CookieJar<'_>, session: &UserSession) {
    let lifetime = session.expires_at - Utc::now().naive_utc();
    cookies.add_private(
        Cookie::build((SESSION_COOKIE, session.token.clone()))
            .same_site(SameSite::Lax)
            .http_only(true)
            .max_age(rocket::time::Duration::seconds(lifetime.num_seconds().max(0))),
    );
}

pub fn clear_session_cookie(cookies: &CookieJar<'_>) {
    cookies.remove_private(Cookie::build(SESSION_COOKIE));
}

pub fn session_token(cookies: &CookieJar<'_>) -> Option<String> {
    cookies
        .get_private(SESSION_COOKIE)
        .map(|c| c.value().to_string())
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for IdentityState {
    type Error = IdentityError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(service) = request.rocket().state::<IdentityService>() else {
            error!("Identity provider not found in managed state");
            return Outcome::Error((
                Status::InternalServerError,
                IdentityError::ProviderMissing,
            ));
        };

        let token = session_token(request.cookies());

        let resolved: &Option<IdentityState> = request
            .local_cache_async(async move {
                match token {
                    Some(token) => match service.resolve(&token).await {
                        Ok(state) => Some(state),
                        Err(e) => {
                            e.log_and_record("Resolving request identity");
                            None
                        }
                    },
                    None => Some(IdentityState::anonymous()),
                }
            })
            .await;

        match resolved {
            Some(state) => Outcome::Success(state.clone()),
            None => Outcome::Error((
                Status::InternalServerError,
                IdentityError::ResolutionFailed,
            )),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = IdentityError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request.guard::<IdentityState>().await {
            Outcome::Success(IdentityState {
                user: Some(user), ..
            }) => Outcome::Success(user),
            Outcome::Success(_) => {
                Outcome::Error((Status::Unauthorized, IdentityError::Unauthenticated))
            }
            Outcome::Error(e) => Outcome::Error(e),
            Outcome::Forward(status) => Outcome::Forward(status),
        }
    }
}

/// A signed-in user holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = IdentityError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request.guard::<User>().await {
            Outcome::Success(user) if user.role.is_admin() => Outcome::Success(AdminUser(user)),
            Outcome::Success(user) => {
                warn!(email = %user.email, "Non-admin attempted an admin action");
                Outcome::Error((Status::Forbidden, IdentityError::NotAdmin))
            }
            Outcome::Error(e) => Outcome::Error(e),
            Outcome::Forward(status) => Outcome::Forward(status),
        }
    }
}
