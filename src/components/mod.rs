// Export components
pub mod google_calendar;
pub mod redis_service;
pub mod sync;

pub use redis_service::{RedisActor, RedisActorHandle};
pub use sync::SyncEngine;
