//! JWT access token validation
//!
//! - `jwks` - signing key download and lookup by `kid`
//! - `validator` - signature, issuer, audience and expiry checks

pub mod jwks;
pub mod validator;

pub use jwks::SigningKeyResolver;
pub use validator::JwtValidator;
