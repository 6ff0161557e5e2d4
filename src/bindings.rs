//! Host capability bindings
//!
//! The host services the guest can observe are bundled as a set of
//! independently replaceable function fields rather than a trait hierarchy:
//! swapping a single capability (a fake clock, a recording exit handler) is
//! plain field substitution. The set is built once per invocation and never
//! mutated afterwards.
//!
//! | Capability | Default |
//! |------------|---------|
//! | clock | monotonic counter + one-time wall calibration |
//! | random | first reachable secure source (see [`crate::random`]) |
//! | exit | terminate the host process with the guest's code |
//! | kill | deliver the signal to the current process (unix) |
//! | tty | fixed affirmative |
//! | path | component-wise relative/parent operations |
//! | fs | none; must be injected or session construction fails |

use crate::clock::ClockCalibration;
use crate::error::RunnerError;
use crate::random::{default_sources, select_fill, RandomFill};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Handler invoked when the guest requests process exit.
///
/// Either terminates the host process (and never returns) or yields the
/// typed error the caller should surface.
pub type ExitFn = Arc<dyn Fn(i32) -> RunnerError + Send + Sync>;

/// Handler invoked when the guest raises a signal.
pub type KillFn = Arc<dyn Fn(i32) -> Result<(), RunnerError> + Send + Sync>;

/// Filesystem access delegated by the bridge
///
/// The bridge itself never touches the filesystem; the front-end injects an
/// implementation of this trait.
pub trait FilesystemDelegate: Send + Sync {
    /// Resolve a preopen label against the invocation directory.
    /// The result must name an existing directory.
    fn resolve_dir(&self, base: &Path, label: &Path) -> std::io::Result<PathBuf>;

    /// Read a file into memory (used to load the module itself)
    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>>;
}

/// The std::fs-backed delegate used by the CLI front-end
#[derive(Debug, Clone, Copy, Default)]
pub struct HostFilesystem;

impl FilesystemDelegate for HostFilesystem {
    fn resolve_dir(&self, base: &Path, label: &Path) -> std::io::Result<PathBuf> {
        let resolved = if label.is_absolute() {
            label.to_path_buf()
        } else {
            base.join(label)
        };
        let metadata = std::fs::metadata(&resolved)?;
        if !metadata.is_dir() {
            return Err(std::io::Error::other(format!(
                "not a directory: {}",
                resolved.display()
            )));
        }
        Ok(resolved)
    }

    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// Path-manipulation capability used by the preopen resolver and the
/// front-end argument rewriter
#[derive(Clone, Copy)]
pub struct PathOps {
    /// Parent directory, `None` at the filesystem root
    pub parent: fn(&Path) -> Option<PathBuf>,

    /// Relative path from `from` to `to`; empty path when equal,
    /// `None` when the two cannot be related component-wise
    pub relative: fn(&Path, &Path) -> Option<PathBuf>,
}

impl PathOps {
    fn default_parent(path: &Path) -> Option<PathBuf> {
        path.parent().map(Path::to_path_buf)
    }

    fn default_relative(from: &Path, to: &Path) -> Option<PathBuf> {
        if from.is_absolute() != to.is_absolute() {
            return None;
        }
        let from_parts: Vec<Component> = from.components().collect();
        let to_parts: Vec<Component> = to.components().collect();

        let common = from_parts
            .iter()
            .zip(to_parts.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let mut out = PathBuf::new();
        for _ in common..from_parts.len() {
            out.push("..");
        }
        for part in &to_parts[common..] {
            out.push(part.as_os_str());
        }
        Some(out)
    }
}

impl Default for PathOps {
    fn default() -> Self {
        Self {
            parent: Self::default_parent,
            relative: Self::default_relative,
        }
    }
}

impl std::fmt::Debug for PathOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PathOps")
    }
}

/// The full capability set handed to a session
#[derive(Clone)]
pub struct HostBindings {
    /// Clock calibration captured at construction
    pub clock: ClockCalibration,

    /// Selected random-fill source
    pub random: RandomFill,

    /// Guest exit handler
    pub on_exit: ExitFn,

    /// Guest signal handler
    pub on_kill: KillFn,

    /// TTY query; the bridge targets CLI tools that format for a terminal
    pub is_tty: Arc<dyn Fn() -> bool + Send + Sync>,

    /// Path-manipulation utilities
    pub path: PathOps,

    /// Filesystem delegate; required before a session can be built
    pub fs: Option<Arc<dyn FilesystemDelegate>>,
}

impl HostBindings {
    /// Default bindings: process-controlling exit/kill, secure randomness
    /// only, no filesystem delegate.
    pub fn new() -> Result<Self, RunnerError> {
        Self::build(false)
    }

    /// Like [`new`](Self::new) but permits the insecure randomness fallback
    /// when no secure source is reachable.
    pub fn new_with_insecure_random() -> Result<Self, RunnerError> {
        Self::build(true)
    }

    fn build(allow_insecure: bool) -> Result<Self, RunnerError> {
        let clock = ClockCalibration::at_startup();
        let random = select_fill(default_sources(allow_insecure, clock.wall_ns()))?;
        Ok(Self {
            clock,
            random,
            on_exit: Arc::new(|code| -> RunnerError { std::process::exit(code) }),
            on_kill: Arc::new(deliver_signal),
            is_tty: Arc::new(|| true),
            path: PathOps::default(),
            fs: None,
        })
    }

    /// Bindings for hosts without process control: exit and kill surface as
    /// typed errors instead of terminating or signalling the host process.
    pub fn embedded() -> Result<Self, RunnerError> {
        let mut bindings = Self::new()?;
        bindings.on_exit = Arc::new(RunnerError::GuestExit);
        bindings.on_kill = Arc::new(|signal| Err(RunnerError::GuestKill(signal)));
        Ok(bindings)
    }

    /// Inject the filesystem delegate
    pub fn with_fs(mut self, fs: impl FilesystemDelegate + 'static) -> Self {
        self.fs = Some(Arc::new(fs));
        self
    }

    /// Substitute the random-fill source
    pub fn with_random(mut self, random: RandomFill) -> Self {
        self.random = random;
        self
    }

    /// Substitute the clock calibration
    pub fn with_clock(mut self, clock: ClockCalibration) -> Self {
        self.clock = clock;
        self
    }

    /// The filesystem delegate, or the configuration error a session
    /// surfaces when it is missing
    pub fn require_fs(&self) -> Result<&Arc<dyn FilesystemDelegate>, RunnerError> {
        self.fs.as_ref().ok_or_else(|| {
            RunnerError::configuration(
                "bindings must supply a filesystem delegate (`fs` is not set)",
            )
        })
    }
}

impl std::fmt::Debug for HostBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBindings")
            .field("clock", &self.clock)
            .field("random", &self.random)
            .field("fs", &self.fs.is_some())
            .finish_non_exhaustive()
    }
}

/// Send a signal to the current process
#[cfg(unix)]
fn deliver_signal(signal: i32) -> Result<(), RunnerError> {
    // Safety: kill(2) with our own pid takes no pointers
    let rc = unsafe { libc::kill(libc::getpid(), signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(RunnerError::GuestKill(signal))
    }
}

#[cfg(not(unix))]
fn deliver_signal(signal: i32) -> Result<(), RunnerError> {
    Err(RunnerError::GuestKill(signal))
}
