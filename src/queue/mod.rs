//! [`JobQueue`](crate::traits::JobQueue) backends.
//!
//! Both deliver at least once per publish and make no ordering promise to
//! consumers, although each happens to be FIFO per topic.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryJobQueue;
pub use sqlite::SqliteJobQueue;
