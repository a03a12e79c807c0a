//! Queue store implementations
//!
//! - `memory`: in-process storage for tests and embedding
//! - `sqlite`: the durable queue table

pub mod memory;
pub mod sqlite;

pub use memory::MemoryQueueStore;
pub use sqlite::SqliteQueueStore;
