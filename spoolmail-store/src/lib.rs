pub mod backends;
pub mod enqueue;
pub mod error;
pub mod record;
pub mod scaffold;
pub mod store;

pub use backends::{MemoryQueueStore, SqliteQueueStore};
pub use enqueue::{Enqueueable, RawMessage, enqueue};
pub use error::{Result, StoreError};
pub use record::{EmailRecord, Filter, NewEmail};
pub use scaffold::{create_migration, create_model};
pub use store::QueueStore;
