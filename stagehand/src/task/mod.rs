// Public API
mod hop;
pub use self::hop::{Hop, hop_to};

mod id;
pub use self::id::{Id, ThreadId};
pub(crate) use self::id::THREAD_ID_BITS;

mod join;
pub use self::join::{JoinError, JoinHandle};

// Exports
mod state;

#[allow(clippy::module_inception)]
mod task;
pub(crate) use self::task::{Task, TaskCell};
