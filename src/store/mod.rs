/// Persistence seams
///
/// Trait-backed stores so the Postgres implementations used in production
/// and the in-memory implementations used by tests are interchangeable.

mod session;
mod users;

pub use session::{MemorySessionStore, PgSessionStore, RefreshRecord, RotateOutcome, SessionStore};
pub use users::{MemoryUserStore, NewUser, PgUserStore, Post, ProfilePatch, User, UserStore};
