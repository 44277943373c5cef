/// Access Policy Engine
///
/// The single source of truth for every controller-level access check.
/// Route handlers never compare roles themselves; they call `authorize`
/// with the request identity, the owner of the resource being acted on,
/// and the named action.
///
/// Rule order (first match wins):
/// 1. superuser          -> Allow everything, including role changes
/// 2. admin roles        -> Allow everything except changing a user's role
/// 3. editor roles       -> Deny profile management; otherwise Allow on
///                          ownership match or public read
/// 4. user               -> Allow on ownership match or public read
/// 5. anonymous          -> Allow public reads only

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::auth::IdentityContext;
use crate::error::AuthError;
use uuid::Uuid;

/// Portal roles, closed set. String forms match the stored `role` column
/// and the `role` claim carried in tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Superuser,
    Moderator,
    Author,
    PhotoAuthor,
    User,
}

impl Role {
    /// Admin roles have access to every endpoint except role changes.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Superuser | Role::Moderator)
    }

    /// Editor roles work on their own items only and never touch profiles.
    pub fn is_editor(&self) -> bool {
        matches!(self, Role::Author | Role::PhotoAuthor)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Superuser => "superuser",
            Role::Moderator => "moderator",
            Role::Author => "author",
            Role::PhotoAuthor => "photo-author",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "superuser" => Ok(Role::Superuser),
            "moderator" => Ok(Role::Moderator),
            "author" => Ok(Role::Author),
            "photo-author" => Ok(Role::PhotoAuthor),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Named actions the policy table covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Read of a public resource (profile, public post)
    ReadPublic,
    /// List a user's posts including private ones
    ListOwnerPosts,
    EditProfile,
    DeleteProfile,
    ChangeUserRole,
    EditPost,
    DeletePost,
}

impl Action {
    fn is_public_read(&self) -> bool {
        matches!(self, Action::ReadPublic)
    }

    /// Profile-management actions are off limits for editor roles even on
    /// their own account.
    fn is_profile_management(&self) -> bool {
        matches!(
            self,
            Action::EditProfile | Action::DeleteProfile | Action::ChangeUserRole
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        *self == Decision::Allow
    }

    /// Deny becomes `Forbidden` — identity was valid, the action was not.
    pub fn into_result(self) -> Result<(), AuthError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny => Err(AuthError::Forbidden),
        }
    }
}

/// Resolve an allow/deny decision for `action` on a resource owned by
/// `resource_owner`. `subject` is `None` for anonymous requests.
pub fn authorize(
    subject: Option<&IdentityContext>,
    resource_owner: Option<Uuid>,
    action: Action,
) -> Decision {
    let ctx = match subject {
        None => {
            return if action.is_public_read() {
                Decision::Allow
            } else {
                Decision::Deny
            }
        }
        Some(ctx) => ctx,
    };

    let owns_resource = resource_owner == Some(ctx.subject_id);

    match ctx.role {
        Role::Superuser => Decision::Allow,
        role if role.is_admin() => {
            if action == Action::ChangeUserRole {
                Decision::Deny
            } else {
                Decision::Allow
            }
        }
        role if role.is_editor() => {
            if action.is_profile_management() {
                Decision::Deny
            } else if owns_resource || action.is_public_read() {
                Decision::Allow
            } else {
                Decision::Deny
            }
        }
        _ => {
            if owns_resource || action.is_public_read() {
                Decision::Allow
            } else {
                Decision::Deny
            }
        }
    }
}
