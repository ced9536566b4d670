//! Broker implementations.
//!
//! - `inmemory`: in-process broker shared by server instances in one process
//! - `redis`: Redis pub/sub shared by server processes

pub mod inmemory;
pub mod redis;

pub use inmemory::InMemoryBroker;
pub use redis::RedisBroker;
