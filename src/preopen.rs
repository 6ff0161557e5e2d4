//! Ancestor preopen enumeration
//!
//! A WASI sandbox only resolves paths inside declared preopened roots. The
//! guest receives relative path arguments that may climb arbitrarily far
//! above the invocation directory (`../../shared/x.circ`), so every ancestor
//! of the working directory, up to and including the filesystem root, gets
//! its own preopen entry. Each entry is keyed by the literal relative path
//! from the working directory to that ancestor and maps to the same string,
//! so the guest label and the host path coincide.
//!
//! ```text
//! cwd = /a/b   →   { ".": ".", "..": "..", "../..": "../.." }
//! cwd = /      →   { ".": "." }
//! ```

use crate::bindings::PathOps;
use std::collections::BTreeMap;
use std::path::Path;

/// The label for an ancestor: its relative path from `base`, or `.` when
/// the relative path is empty
pub fn relative_label(base: &Path, ancestor: &Path, ops: &PathOps) -> String {
    let rel = (ops.relative)(base, ancestor).unwrap_or_default();
    if rel.as_os_str().is_empty() {
        ".".to_string()
    } else {
        rel.to_string_lossy().into_owned()
    }
}

/// Enumerate preopens for every ancestor of `cwd`, the root included.
///
/// Walks the parent chain from `cwd`; termination is decided only after
/// computing the parent, so the root itself always lands in the table. A
/// working directory at depth *d* yields exactly *d+1* entries.
pub fn enumerate_ancestor_preopens(cwd: &Path, ops: &PathOps) -> BTreeMap<String, String> {
    let mut table = BTreeMap::new();
    let mut cursor = cwd.to_path_buf();
    loop {
        let label = relative_label(cwd, &cursor, ops);
        table.insert(label.clone(), label);
        match (ops.parent)(&cursor) {
            Some(next) if next != cursor => cursor = next,
            _ => break,
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preopens(cwd: &str) -> BTreeMap<String, String> {
        enumerate_ancestor_preopens(Path::new(cwd), &PathOps::default())
    }

    #[test]
    fn test_two_levels_deep() {
        let table = preopens("/a/b");
        assert_eq!(table.len(), 3);
        assert_eq!(table.get("."), Some(&".".to_string()));
        assert_eq!(table.get(".."), Some(&"..".to_string()));
        assert_eq!(table.get("../.."), Some(&"../..".to_string()));
    }

    #[test]
    fn test_root_yields_single_entry() {
        let table = preopens("/");
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("."), Some(&".".to_string()));
    }

    #[test]
    fn test_entry_count_matches_depth() {
        // Depth counted with the root at 0
        for (cwd, depth) in [
            ("/", 0usize),
            ("/srv", 1),
            ("/srv/projects", 2),
            ("/srv/projects/circuits/audit", 4),
        ] {
            let table = preopens(cwd);
            assert_eq!(table.len(), depth + 1, "cwd={cwd}");
            assert!(table.contains_key("."));
        }
    }

    #[test]
    fn test_idempotent_for_same_cwd() {
        let a = preopens("/x/y/z");
        let b = preopens("/x/y/z");
        assert_eq!(a, b);
    }

    #[test]
    fn test_labels_are_pure_parent_chains() {
        let table = preopens("/x/y/z");
        for label in table.keys() {
            assert!(
                label == "." || label.split('/').all(|seg| seg == ".."),
                "unexpected label: {label}"
            );
        }
    }
}
