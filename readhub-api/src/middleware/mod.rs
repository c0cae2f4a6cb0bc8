/// Middleware for the API server
///
/// - `security`: security response headers
/// - `rate_limit`: Redis fixed-window limits for the auth endpoints

pub mod rate_limit;
pub mod security;
