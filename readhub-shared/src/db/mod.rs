/// Database layer
///
/// - `pool`: PostgreSQL connection pool with health checks
/// - `migrations`: embedded sqlx migrations
///
/// Models and their queries live in [`crate::models`].

pub mod migrations;
pub mod pool;

pub use pool::{create_lazy_pool, create_pool, DatabaseConfig};
