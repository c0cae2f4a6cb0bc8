/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and strength rules
/// - [`jwt`]: access/refresh token issue and validation
/// - [`middleware`]: bearer/cookie extraction, `AuthContext` extractor
/// - [`authorization`]: admin and ownership checks

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
