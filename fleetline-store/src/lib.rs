pub mod app_config;
pub mod database;
pub mod push;
pub mod redis_repo;
pub mod trip_repo;

pub use database::DbClient;
pub use push::PushGatewaySink;
pub use redis_repo::RedisClient;
pub use trip_repo::PostgresLedger;
