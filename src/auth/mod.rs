/// Authentication module
///
/// Token signing/verification, password hashing, token issuance, and
/// refresh rotation.

mod claims;
mod issuer;
mod jwt;
mod password;
mod refresh;

pub use claims::Claims;
pub use claims::IdentityContext;
pub use claims::TokenPurpose;
pub use issuer::generate_session_id;
pub use issuer::TokenIssuer;
pub use issuer::TokenPair;
pub use jwt::decode_token;
pub use jwt::decode_token_ignoring_expiry;
pub use jwt::encode_token;
pub use password::hash_password;
pub use password::verify_password;
pub use refresh::RefreshCoordinator;
