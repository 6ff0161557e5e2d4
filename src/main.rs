//! CLI front-end: run the bundled circomspect analyzer module with the
//! caller's arguments, environment, and working directory.

use circomspect_runner::bindings::{FilesystemDelegate, HostBindings, HostFilesystem};
use circomspect_runner::bridge::{ModuleSource, Runner};
use circomspect_runner::cli::{locate_module_from_env, shape_args, ModuleLocation};
use circomspect_runner::error::RunnerError;
use circomspect_runner::preopen::enumerate_ancestor_preopens;
use circomspect_runner::session::SessionConfig;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.exit_code() {
            Some(code) => ExitCode::from(code.clamp(0, 255) as u8),
            None => {
                eprintln!("{e}");
                ExitCode::FAILURE
            }
        },
    }
}

async fn run() -> Result<(), RunnerError> {
    let cwd = std::env::current_dir()
        .map_err(|e| RunnerError::configuration(format!("cannot determine working directory: {e}")))?;

    let bindings = HostBindings::new()?.with_fs(HostFilesystem);

    let args = shape_args(&cwd, std::env::args().skip(1), &bindings.path);
    let preopens = enumerate_ancestor_preopens(&cwd, &bindings.path);
    let env: Vec<(String, String)> = std::env::vars().collect();

    let source = match locate_module_from_env()? {
        ModuleLocation::File(path) => {
            let bytes = HostFilesystem.read(&path).map_err(|e| {
                RunnerError::invalid_input(format!(
                    "cannot read module '{}': {e}",
                    path.display()
                ))
            })?;
            ModuleSource::Bytes(bytes)
        }
        ModuleLocation::Url(url) => {
            let response = reqwest::get(&url)
                .await
                .map_err(|source| RunnerError::Fetch { source })?;
            ModuleSource::Response(response)
        }
    };

    let config = SessionConfig::new(args, bindings)
        .with_env(env)
        .with_preopens(preopens)
        .with_working_directory(cwd);

    let runner = Runner::new(config)?;
    runner.execute(source).await?;
    Ok(())
}
