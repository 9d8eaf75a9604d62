//! Latchkey Redis - lock store backed by a Redis server
//!
//! `set_if_absent` maps to `SET NX PX`; the compare-and-swap and
//! compare-and-delete primitives run as server-side Lua scripts so the
//! check and the write happen atomically on the server.

pub mod config;
mod scripts;
pub mod store;

pub use config::RedisConfig;
pub use store::RedisStore;
