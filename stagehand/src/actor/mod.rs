//! Default actors: serial executors backed by the runtime's global pool.

// Public API
mod handle;
pub use handle::Actor;

mod default_actor;
pub use default_actor::ActorRef;

// Exports
pub(crate) use default_actor::{ActorLock, Unlocked};

mod drain;
pub(crate) use drain::ProcessingJob;

pub(crate) mod status;

#[cfg(test)]
mod tests;
