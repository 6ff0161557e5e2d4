//! circomspect-runner: WASI host bridge for the precompiled circomspect
//! static analyzer.
//!
//! The bridge receives process-style arguments, environment variables, and a
//! working directory, and exposes a minimal POSIX-like surface to the guest:
//! a calibrated clock, cryptographic randomness, process exit and signal
//! delivery, and a sandboxed filesystem view rooted at preopened
//! directories. Every ancestor of the working directory is preopened so the
//! guest can resolve relative paths that climb above the invocation
//! directory.
//!
//! ```text
//! front-end ──► {args, env, preopens, bindings} ──► Session ──► imports
//!                                                                 │
//!                     ModuleSource ──► Runner: compile ──► instantiate ──► start
//! ```

pub mod bindings;
pub mod bridge;
pub mod cli;
pub mod clock;
pub mod error;
pub mod preopen;
pub mod random;
pub mod session;

pub use bindings::{FilesystemDelegate, HostBindings, HostFilesystem, PathOps};
pub use bridge::{ExecutedModule, FetchStrategy, ModuleSource, Runner};
pub use clock::ClockCalibration;
pub use error::RunnerError;
pub use preopen::enumerate_ancestor_preopens;
pub use random::RandomFill;
pub use session::{Session, SessionConfig, SessionSpec, PROGRAM_NAME};
