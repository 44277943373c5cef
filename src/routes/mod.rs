mod auth;
mod health_check;
mod users;

pub use auth::{refresh_tokens, signin, signout};
pub use health_check::health_check;
pub use users::{change_role, delete_profile, get_user, list_posts, register, update_profile};
