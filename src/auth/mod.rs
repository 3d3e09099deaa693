mod middleware;
mod token;

pub use middleware::{AuthError, RequireAdmin, authenticate, bearer_token};
pub use token::{IssuedToken, TOKEN_PREFIX, TokenHasher, TokenParts, issue_admin_token, parse_token};
