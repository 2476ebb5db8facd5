mod actor;
mod notifier;

pub use actor::{keys, RedisActor, RedisActorHandle, RedisCommand};
pub use notifier::RedisNotifier;
