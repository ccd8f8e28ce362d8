use serde::Serialize;

use super::{IdentityState, Role};

/// Outcome of checking a page's access rule against the caller's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Loading,
    Render,
    Redirect(&'static str),
}

/// Pages reachable by any signed-in user.
pub fn trainee_guard(identity: &IdentityState) -> GuardDecision {
    if identity.is_loading {
        return GuardDecision::Loading;
    }

    match identity.user {
        Some(_) => GuardDecision::Render,
        None => GuardDecision::Redirect("/login"),
    }
}

/// Admin pages. Anonymous callers go to the home page too, not to the login
/// form.
pub fn admin_guard(identity: &IdentityState) -> GuardDecision {
    if identity.is_loading {
        return GuardDecision::Loading;
    }

    match &identity.user {
        Some(user) if user.role == Role::Admin => GuardDecision::Render,
        _ => GuardDecision::Redirect("/"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Shell {
    Login,
    Dashboard,
    Admin,
}

impl Shell {
    pub fn for_path(path: &str) -> Self {
        if path == "/login" {
            Shell::Login
        } else if path == "/admin" || path.starts_with("/admin/") {
            Shell::Admin
        } else {
            Shell::Dashboard
        }
    }
}

/// Where a freshly signed-in user lands.
pub fn landing_path(role: Role) -> &'static str {
    match role {
        Role::Admin => "/admin",
        Role::Trainee => "/",
    }
}
