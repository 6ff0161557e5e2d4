//! Front-end argument shaping and module location
//!
//! Positional arguments become guest CLI arguments verbatim, except
//! path-shaped tokens (anything not starting with `-`), which are rewritten
//! relative to the invocation directory so the guest can resolve them
//! against its preopens. An empty argument list becomes a help request.

use crate::bindings::PathOps;
use crate::error::RunnerError;
use std::path::{Component, Path, PathBuf};

/// Environment variable naming a module file to run
pub const MODULE_PATH_VAR: &str = "CIRCOMSPECT_WASM";

/// Environment variable naming a URL to fetch the module from
pub const MODULE_URL_VAR: &str = "CIRCOMSPECT_WASM_URL";

/// Shape raw process arguments into guest arguments
pub fn shape_args<I>(cwd: &Path, raw: I, ops: &PathOps) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut args: Vec<String> = raw
        .into_iter()
        .map(|token| {
            if token.starts_with('-') {
                token
            } else {
                rewrite_path_argument(cwd, &token, ops)
            }
        })
        .collect();

    if args.is_empty() {
        args.push("--help".to_string());
    }
    args
}

/// Re-express a path token relative to the invocation directory
fn rewrite_path_argument(cwd: &Path, token: &str, ops: &PathOps) -> String {
    let target = if Path::new(token).is_absolute() {
        PathBuf::from(token)
    } else {
        cwd.join(token)
    };
    let normalized = normalize_lexically(&target);

    match (ops.relative)(cwd, &normalized) {
        Some(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Some(rel) => rel.to_string_lossy().into_owned(),
        None => token.to_string(),
    }
}

/// Resolve `.` and `..` segments without touching the filesystem
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            Component::CurDir => {}
            _ => components.push(component),
        }
    }
    components.iter().collect()
}

/// Where the precompiled module lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleLocation {
    /// A file on the host filesystem
    File(PathBuf),

    /// A URL to fetch it from
    Url(String),
}

/// Pick the module location from explicit overrides, falling back to a
/// `circomspect.wasm` sitting next to the executable
pub fn locate_module(
    url_override: Option<String>,
    path_override: Option<String>,
    exe_path: &Path,
) -> ModuleLocation {
    if let Some(url) = url_override {
        return ModuleLocation::Url(url);
    }
    if let Some(path) = path_override {
        return ModuleLocation::File(PathBuf::from(path));
    }
    ModuleLocation::File(exe_path.with_file_name("circomspect.wasm"))
}

/// [`locate_module`] fed from the process environment
pub fn locate_module_from_env() -> Result<ModuleLocation, RunnerError> {
    let exe = std::env::current_exe()
        .map_err(|e| RunnerError::configuration(format!("cannot locate executable: {e}")))?;
    Ok(locate_module(
        std::env::var(MODULE_URL_VAR).ok(),
        std::env::var(MODULE_PATH_VAR).ok(),
        &exe,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(cwd: &str, raw: &[&str]) -> Vec<String> {
        shape_args(
            Path::new(cwd),
            raw.iter().map(|s| s.to_string()),
            &PathOps::default(),
        )
    }

    #[test]
    fn test_empty_args_become_help_request() {
        assert_eq!(shape("/a/b", &[]), vec!["--help"]);
    }

    #[test]
    fn test_flags_pass_verbatim() {
        assert_eq!(
            shape("/a/b", &["--sarif-file", "-v"]),
            vec!["--sarif-file", "-v"]
        );
    }

    #[test]
    fn test_relative_path_tokens_are_normalized() {
        assert_eq!(shape("/a/b", &["./x.circ"]), vec!["x.circ"]);
        assert_eq!(shape("/a/b", &["../shared/x.circ"]), vec!["../shared/x.circ"]);
    }

    #[test]
    fn test_absolute_path_tokens_become_relative() {
        assert_eq!(shape("/a/b", &["/a/b/c/x.circ"]), vec!["c/x.circ"]);
        assert_eq!(shape("/a/b", &["/a/x.circ"]), vec!["../x.circ"]);
    }

    #[test]
    fn test_cwd_itself_becomes_dot() {
        assert_eq!(shape("/a/b", &["."]), vec!["."]);
    }

    #[test]
    fn test_mixed_flags_and_paths() {
        assert_eq!(
            shape("/a/b", &["/a/b/main.circom", "--sarif-file", "out.sarif"]),
            vec!["main.circom", "--sarif-file", "out.sarif"]
        );
    }

    #[test]
    fn test_locate_module_priority() {
        let exe = Path::new("/opt/bin/circomspect");

        assert_eq!(
            locate_module(Some("https://example.com/m.wasm".into()), None, exe),
            ModuleLocation::Url("https://example.com/m.wasm".into())
        );
        assert_eq!(
            locate_module(
                Some("https://example.com/m.wasm".into()),
                Some("/tmp/m.wasm".into()),
                exe
            ),
            ModuleLocation::Url("https://example.com/m.wasm".into())
        );
        assert_eq!(
            locate_module(None, Some("/tmp/m.wasm".into()), exe),
            ModuleLocation::File(PathBuf::from("/tmp/m.wasm"))
        );
        assert_eq!(
            locate_module(None, None, exe),
            ModuleLocation::File(PathBuf::from("/opt/bin/circomspect.wasm"))
        );
    }
}
