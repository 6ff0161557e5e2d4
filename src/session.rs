//! WASI runtime session
//!
//! A [`Session`] owns one immutable invocation configuration (arguments,
//! environment, preopen table, capability bindings) and turns it into the
//! pieces a wasmtime instance needs: a WASI Preview 1 context and a linker
//! carrying the import table. It is constructed per invocation, drives
//! exactly one module, and is discarded afterwards.
//!
//! The fixed program name `circomspect` is prepended ahead of the caller's
//! arguments so the guest sees a native-style argv[0].

use crate::bindings::HostBindings;
use crate::clock::{CalibratedMonotonicClock, CalibratedWallClock};
use crate::error::RunnerError;
use crate::random::SelectedRng;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use wasmtime::{Engine, Instance, Linker, Store};
use wasmtime_wasi::preview1::WasiP1Ctx;
use wasmtime_wasi::{DirPerms, FilePerms, WasiCtxBuilder};

/// argv[0] exposed to the guest
pub const PROGRAM_NAME: &str = "circomspect";

/// The default preopen table: just the working directory
pub fn default_preopens() -> BTreeMap<String, String> {
    BTreeMap::from([(".".to_string(), ".".to_string())])
}

/// Immutable invocation configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Caller-supplied guest arguments (argv[0] is prepended separately)
    pub args: Vec<String>,

    /// Environment variables passed through to the guest
    pub env: Vec<(String, String)>,

    /// Guest-path → host-path preopen table
    pub preopens: BTreeMap<String, String>,

    /// Host capability set
    pub bindings: HostBindings,

    /// Directory preopen host labels are resolved against
    pub working_directory: PathBuf,
}

impl SessionConfig {
    /// Configuration with the default preopen table and the process
    /// working directory
    pub fn new(args: Vec<String>, bindings: HostBindings) -> Self {
        Self {
            args,
            env: Vec::new(),
            preopens: default_preopens(),
            bindings,
            working_directory: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
        }
    }

    /// Set the guest environment
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    /// Replace the preopen table
    pub fn with_preopens(mut self, preopens: BTreeMap<String, String>) -> Self {
        self.preopens = preopens;
        self
    }

    /// Set the directory preopens are resolved against
    pub fn with_working_directory(mut self, path: PathBuf) -> Self {
        self.working_directory = path;
        self
    }
}

/// Per-store state: the WASI Preview 1 context
pub struct WasiState {
    pub wasi: WasiP1Ctx,
}

/// A preopen entry with its host side resolved through the filesystem
/// delegate
#[derive(Debug, Clone)]
pub struct ResolvedPreopen {
    /// Path visible to the guest
    pub guest_path: String,

    /// Host directory backing it
    pub host_path: PathBuf,
}

/// Inspectable view of what the guest will observe
#[derive(Debug, Clone)]
pub struct SessionSpec {
    /// Full argv, program name first
    pub argv: Vec<String>,

    /// Environment pairs
    pub env: Vec<(String, String)>,

    /// Resolved preopen table
    pub preopens: Vec<ResolvedPreopen>,
}

impl SessionSpec {
    /// One-line summary for logging
    pub fn summary(&self) -> String {
        format!(
            "argv={:?} env_vars={} preopens={}",
            self.argv,
            self.env.len(),
            self.preopens.len()
        )
    }
}

/// One runtime session: one configuration, one module, one start
pub struct Session {
    config: SessionConfig,
}

impl Session {
    /// Create a session.
    ///
    /// Fails synchronously with [`RunnerError::Configuration`] when the
    /// bindings carry no filesystem delegate, before any compilation or
    /// other asynchronous work begins.
    pub fn new(config: SessionConfig) -> Result<Self, RunnerError> {
        config.bindings.require_fs()?;
        Ok(Self { config })
    }

    /// The configuration this session was built from
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Resolve the configuration into the guest-observable spec
    pub fn spec(&self) -> Result<SessionSpec, RunnerError> {
        let fs = self.config.bindings.require_fs()?;

        let mut argv = Vec::with_capacity(self.config.args.len() + 1);
        argv.push(PROGRAM_NAME.to_string());
        argv.extend(self.config.args.iter().cloned());

        let mut preopens = Vec::with_capacity(self.config.preopens.len());
        for (guest_path, host_label) in &self.config.preopens {
            let host_path = fs
                .resolve_dir(&self.config.working_directory, Path::new(host_label))
                .map_err(|source| RunnerError::Preopen {
                    path: PathBuf::from(host_label),
                    source,
                })?;
            preopens.push(ResolvedPreopen {
                guest_path: guest_path.clone(),
                host_path,
            });
        }

        Ok(SessionSpec {
            argv,
            env: self.config.env.clone(),
            preopens,
        })
    }

    /// Build the WASI context the store will carry
    pub(crate) fn build_wasi_ctx(&self, spec: &SessionSpec) -> Result<WasiP1Ctx, RunnerError> {
        let mut builder = WasiCtxBuilder::new();
        builder.args(&spec.argv);
        for (key, value) in &spec.env {
            builder.env(key, value);
        }

        // stdout/stderr always flow back to the host; stdin only when the
        // tty query answers yes
        builder.inherit_stdout();
        builder.inherit_stderr();
        if (self.config.bindings.is_tty)() {
            builder.inherit_stdin();
        }

        builder.wall_clock(CalibratedWallClock {
            calibration: self.config.bindings.clock,
        });
        builder.monotonic_clock(CalibratedMonotonicClock {
            calibration: self.config.bindings.clock,
        });
        builder.secure_random(SelectedRng {
            fill: self.config.bindings.random.clone(),
        });

        // The analyzer writes report files next to its inputs, so preopens
        // are granted read/write
        for preopen in &spec.preopens {
            builder
                .preopened_dir(
                    &preopen.host_path,
                    &preopen.guest_path,
                    DirPerms::all(),
                    FilePerms::all(),
                )
                .map_err(|e| RunnerError::Preopen {
                    path: preopen.host_path.clone(),
                    source: std::io::Error::other(e.to_string()),
                })?;
        }

        Ok(builder.build_p1())
    }

    /// Build the import table for a compiled module: the full WASI Preview 1
    /// surface, with `proc_raise` routed through the kill binding
    pub(crate) fn import_linker(&self, engine: &Engine) -> Result<Linker<WasiState>, RunnerError> {
        let mut linker: Linker<WasiState> = Linker::new(engine);
        wasmtime_wasi::preview1::add_to_linker_sync(&mut linker, |state: &mut WasiState| {
            &mut state.wasi
        })
        .map_err(RunnerError::Instantiate)?;

        linker.allow_shadowing(true);
        let kill = self.config.bindings.on_kill.clone();
        linker
            .func_wrap(
                "wasi_snapshot_preview1",
                "proc_raise",
                move |signal: i32| -> wasmtime::Result<i32> {
                    match kill(signal) {
                        Ok(()) => Ok(0),
                        Err(e) => Err(wasmtime::Error::new(e)),
                    }
                },
            )
            .map_err(RunnerError::Instantiate)?;
        linker.allow_shadowing(false);

        Ok(linker)
    }

    /// Transfer control to the guest's entry point.
    ///
    /// A clean return and an exit with code 0 are both success. A non-zero
    /// exit routes through the exit binding; any other trap propagates
    /// unchanged.
    pub(crate) fn start(
        &self,
        store: &mut Store<WasiState>,
        instance: &Instance,
    ) -> Result<(), RunnerError> {
        let entry = instance
            .get_typed_func::<(), ()>(&mut *store, "_start")
            .map_err(|_| RunnerError::EntryPointNotFound("_start".to_string()))?;

        match entry.call(&mut *store, ()) {
            Ok(()) => Ok(()),
            Err(trap) => match trap.downcast::<wasmtime_wasi::I32Exit>() {
                Ok(wasmtime_wasi::I32Exit(0)) => Ok(()),
                Ok(wasmtime_wasi::I32Exit(code)) => Err((self.config.bindings.on_exit)(code)),
                Err(trap) => match trap.downcast::<RunnerError>() {
                    // A kill binding refusal raised out of proc_raise
                    Ok(raised) => Err(raised),
                    Err(trap) => Err(RunnerError::Fault(trap)),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::{HostBindings, HostFilesystem};

    fn bindings_with_fs() -> HostBindings {
        HostBindings::embedded().unwrap().with_fs(HostFilesystem)
    }

    #[test]
    fn test_session_requires_fs_delegate() {
        let bindings = HostBindings::embedded().unwrap();
        let result = Session::new(SessionConfig::new(vec![], bindings));
        assert!(matches!(result, Err(RunnerError::Configuration(_))));
    }

    #[test]
    fn test_program_name_is_prepended() {
        let config = SessionConfig::new(vec!["--help".to_string()], bindings_with_fs())
            .with_preopens(BTreeMap::new());
        let session = Session::new(config).unwrap();
        let spec = session.spec().unwrap();
        assert_eq!(spec.argv, vec!["circomspect", "--help"]);
    }

    #[test]
    fn test_default_preopen_table_is_dot() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::new(vec![], bindings_with_fs())
            .with_working_directory(dir.path().to_path_buf());
        let session = Session::new(config).unwrap();
        let spec = session.spec().unwrap();
        assert_eq!(spec.preopens.len(), 1);
        assert_eq!(spec.preopens[0].guest_path, ".");
        assert_eq!(spec.preopens[0].host_path, dir.path().join("."));
    }

    #[test]
    fn test_missing_preopen_dir_fails_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::new(vec![], bindings_with_fs())
            .with_working_directory(dir.path().to_path_buf())
            .with_preopens(BTreeMap::from([(
                "missing".to_string(),
                "missing".to_string(),
            )]));
        let session = Session::new(config).unwrap();
        assert!(matches!(
            session.spec(),
            Err(RunnerError::Preopen { .. })
        ));
    }

    #[test]
    fn test_env_is_passed_through_verbatim() {
        let config = SessionConfig::new(vec![], bindings_with_fs())
            .with_env(vec![("CIRCOM_ROOT".to_string(), "/srv".to_string())])
            .with_preopens(BTreeMap::new());
        let session = Session::new(config).unwrap();
        let spec = session.spec().unwrap();
        assert_eq!(spec.env.len(), 1);
        assert_eq!(spec.env[0].0, "CIRCOM_ROOT");
    }
}
