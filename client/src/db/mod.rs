//! SQLite persistence for records and the pending operation queue.

mod pending;
mod pool;
mod records;

pub use pending::*;
pub use pool::*;
pub use records::*;
