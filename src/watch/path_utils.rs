// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher.

use std::path::Path;

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// - First we try a direct `strip_prefix(root)`.
/// - If that fails (e.g. due to symlinks or different absolute prefixes),
///   we canonicalize both paths and try again.
///
/// Returns `None` if the path cannot be related to `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(rel.to_string_lossy().replace('\\', "/"));
    }

    // macOS reports /private/var/... for paths watched as /var/...
    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(rel.to_string_lossy().replace('\\', "/"));
        }
    }

    None
}

/// True if the pattern contains glob metacharacters.
pub fn has_glob_meta(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

/// The leading path components of a glob that contain no metacharacters.
///
/// `"lib/**/*.js"` -> `"lib"`, `"*.html"` -> `""`.
pub fn literal_base(pattern: &str) -> String {
    pattern
        .split('/')
        .take_while(|component| !has_glob_meta(component))
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_base_stops_at_first_meta_component() {
        assert_eq!(literal_base("lib/**/*.js"), "lib");
        assert_eq!(literal_base("src/app/*.ts"), "src/app");
        assert_eq!(literal_base("*.html"), "");
        assert_eq!(literal_base("{a,b}/x.js"), "");
    }

    #[test]
    fn relative_str_uses_forward_slashes() {
        let root = Path::new("/proj");
        assert_eq!(
            relative_str(root, Path::new("/proj/lib/a.js")).as_deref(),
            Some("lib/a.js")
        );
        assert_eq!(relative_str(root, Path::new("/nope/definitely/missing")), None);
    }
}
