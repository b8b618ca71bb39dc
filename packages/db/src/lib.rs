//! SurrealDB-backed job store.
//!
//! # Features
//!
//! - `memory` (default): in-memory engine, used by every test
//! - `rocksdb`: persistent engine for `rocksdb://` endpoints

mod connection;
pub mod repositories;
mod schema;

pub use connection::{Database, DbConfig, DbError, connect_db};
pub use schema::init_schema;

/// Connect to the store and make sure the job schema exists.
pub async fn init(config: DbConfig) -> Result<Database, DbError> {
    let db = connect_db(&config).await?;
    init_schema(&db).await?;
    Ok(db)
}
