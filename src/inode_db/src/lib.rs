//! SQLite implementation of the INode backend and of the pool catalog.

mod factory;
mod sqlite_inode;
mod sqlite_pool;

pub use factory::*;
pub use sqlite_inode::SqliteINode;
pub use sqlite_pool::SqlitePoolManager;
