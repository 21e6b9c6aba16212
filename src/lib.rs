#![warn(rust_2018_idioms)]
#![warn(missing_docs)]

//! A dependency-aware execution engine for dataflow workloads.
//!
//! Clients submit opaque units of work ("instructions") that declare which
//! named resources they read and which they mutate. The engine orders those
//! units so that, for any single resource, effects are observed as if they
//! had executed in submission order, while independent or read-only work
//! runs concurrently on a pool of worker threads.
//!
//! The engine knows nothing about what the resources are; a tag may stand
//! for a tensor or a parameter buffer just as well as anything else the
//! client cares about ordering around. Per resource it keeps a FIFO of
//! pending instructions
//! and a small state machine (idle, reading with a concurrent-reader count,
//! or exclusively written), serviced by one worker thread. An instruction
//! fires once every resource it touches has served it in that resource's
//! submission order; writers take a resource exclusively, consecutive
//! readers share it.
//!
//! ```
//! use depflow::Engine;
//!
//! # fn main() -> Result<(), depflow::Error> {
//! let engine = Engine::new();
//! let x = engine.new_named_variable("x")?;
//! let y = engine.new_named_variable("y")?;
//!
//! {
//!     let _running = engine.scope()?; // start now, drain on drop
//!     engine.push(|| println!("mutate x"), &[], &[x.clone()])?;
//!     engine.push(|| println!("read x, mutate y"), &[x.clone()], &[y.clone()])?;
//! }
//! # Ok(())
//! # }
//! ```

mod engine;
mod error;
mod instruction;
mod queue;
mod state;
mod tag;
mod worker;

pub use crate::engine::{Engine, ExecPolicy, Scope};
pub use crate::error::Error;
pub use crate::tag::ResourceTag;
