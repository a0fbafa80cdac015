//! Pure domain logic shared by the session status daemon: the state
//! machine and tolerant parsing of transcript content.
//!
//! Nothing in this crate performs I/O except [`config`]'s path helpers;
//! the registry, timers, ingest, tailer, git probing, and project-boundary
//! probing live in the daemon crate and depend on this one.

pub mod config;
pub mod error;
pub mod patterns;
pub mod state;

pub use error::{CoreError, Result};
pub use state::{transition, MachineEvent, MachineState, PublishedStatus};
