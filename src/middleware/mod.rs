/// Middleware module
///
/// Per-request token validation for protected scopes.

mod token_validator;

pub use token_validator::TokenValidator;
