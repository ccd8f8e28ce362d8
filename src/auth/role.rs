use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewContent,
    ViewOwnResults,
    RunChallenges,

    ManageContent,
    UploadMaterials,
    InviteUsers,
    EditUserRoles,
    DeleteUsers,
}

/// The closed set of roles. Every role check in the crate goes through this
/// type rather than comparing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Trainee,
    Admin,
}

static TRAINEE_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewContent);
    permissions.insert(Permission::ViewOwnResults);
    permissions.insert(Permission::RunChallenges);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(TRAINEE_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ManageContent);
    permissions.insert(Permission::UploadMaterials);
    permissions.insert(Permission::InviteUsers);
    permissions.insert(Permission::EditUserRoles);
    permissions.insert(Permission::DeleteUsers);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Trainee => &TRAINEE_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Trainee => "trainee",
            Role::Admin => "admin",
        }
    }

    /// Parses a stored role. `user` is the legacy spelling of trainee.
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "trainee" | "user" => Ok(Role::Trainee),
            "admin" => Ok(Role::Admin),
            _ => Err(AppError::Validation(format!("Unknown role: {}", s))),
        }
    }

    /// Maps the admin role picker labels ("Admin" / "Trainee").
    pub fn from_label(label: &str) -> Result<Self, AppError> {
        match label {
            "Admin" | "admin" => Ok(Role::Admin),
            "Trainee" | "trainee" | "user" => Ok(Role::Trainee),
            _ => Err(AppError::Validation(format!("Unknown role: {}", label))),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Trainee => "Trainee",
            Role::Admin => "Admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
