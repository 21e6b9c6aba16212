use std::io;

/// Errors surfaced by the engine's caller-facing operations.
///
/// Only caller-contract violations live here. Broken internal invariants
/// (illegal state transitions, illegal restores) are engine bugs and abort
/// via panic instead of being reported.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `push` named a resource that was never registered.
    #[error("unknown resource tag `{name}`")]
    UnknownTag {
        /// Name of the offending tag.
        name: String,
    },

    /// A variable was registered under a name that is already taken.
    #[error("resource tag `{name}` is already registered")]
    DuplicateTag {
        /// The contested name.
        name: String,
    },

    /// `stop` was called while no workers were running.
    #[error("executor is not running")]
    NotRunning,

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread")]
    Spawn(#[from] io::Error),
}
