// src/watch/classifier.rs

//! Partition watch paths into the `main` and `renderer` categories.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::ConfigFile;
use crate::errors::{AppmonError, Result};
use crate::fs::FileSystem;
use crate::types::Category;
use crate::watch::path_utils::{has_glob_meta, literal_base, relative_str};

/// Paths that never count as a change, whatever the watch sets say.
pub const BUILTIN_IGNORES: &[&str] = &[
    "**/node_modules/**",
    "**/.git/**",
    "**/*.swp",
    "**/*.swx",
    "**/*~",
    "**/.#*",
    "**/4913",
];

/// Compiled patterns of one category.
#[derive(Clone)]
pub struct WatchSet {
    category: Category,
    patterns: Vec<String>,
    globs: GlobSet,
}

impl fmt::Debug for WatchSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSet")
            .field("category", &self.category)
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl WatchSet {
    pub fn category(&self) -> Category {
        self.category
    }

    /// Patterns in declaration order, normalized relative to the root.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// `rel_path` uses forward slashes and is relative to the project root.
    pub fn matches(&self, rel_path: &str) -> bool {
        self.globs.is_match(rel_path)
    }
}

/// A directory handed to the OS watcher.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct WatchRoot {
    pub path: PathBuf,
    pub recursive: bool,
}

/// Resolves paths to a [`Category`].
///
/// Built once from configuration and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct PathClassifier {
    root: PathBuf,
    main: WatchSet,
    renderer: WatchSet,
    ignore: GlobSet,
    roots: Vec<WatchRoot>,
}

impl PathClassifier {
    /// Build the classifier for a validated config.
    ///
    /// Fails with a configuration error if a literal path does not exist, or
    /// if the literal base directory of a glob does not exist.
    pub fn from_config(cfg: &ConfigFile, root: &Path, fs: &dyn FileSystem) -> Result<Self> {
        Self::build(
            root,
            &cfg.paths_for(Category::Main),
            &cfg.paths_for(Category::Renderer),
            &cfg.default.exclude,
            fs,
        )
    }

    pub fn build(
        root: &Path,
        main: &[String],
        renderer: &[String],
        exclude: &[String],
        fs: &dyn FileSystem,
    ) -> Result<Self> {
        let root = fs.canonicalize(root).unwrap_or_else(|_| root.to_path_buf());

        let mut roots = BTreeSet::new();
        let main = build_watch_set(&root, Category::Main, main, fs, &mut roots)?;
        let renderer = build_watch_set(&root, Category::Renderer, renderer, fs, &mut roots)?;

        let ignore_patterns: Vec<String> = BUILTIN_IGNORES
            .iter()
            .map(|s| s.to_string())
            .chain(exclude.iter().cloned())
            .collect();
        let ignore = build_globset(&ignore_patterns).context("building ignore globset")?;

        Ok(Self {
            roots: collapse_roots(roots),
            root,
            main,
            renderer,
            ignore,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn watch_set(&self, category: Category) -> &WatchSet {
        match category {
            Category::Main => &self.main,
            Category::Renderer => &self.renderer,
        }
    }

    /// Directories the OS watcher must observe, without redundant nesting.
    pub fn watch_roots(&self) -> &[WatchRoot] {
        &self.roots
    }

    /// Classify a path relative to the root.
    ///
    /// Ignored paths resolve to `None`. When both sets match (overlapping
    /// globs), `main` wins: a restart subsumes a refresh.
    pub fn classify_relative(&self, rel_path: &str) -> Option<Category> {
        if self.ignore.is_match(rel_path) {
            return None;
        }
        if self.main.matches(rel_path) {
            Some(Category::Main)
        } else if self.renderer.matches(rel_path) {
            Some(Category::Renderer)
        } else {
            None
        }
    }

    /// Classify an absolute path as reported by the OS watcher.
    pub fn classify(&self, path: &Path) -> Option<Category> {
        let rel = relative_str(&self.root, path)?;
        self.classify_relative(&rel)
    }

    /// Path shown in status lines: relative to the root when possible.
    pub fn display_path(&self, path: &Path) -> String {
        relative_str(&self.root, path).unwrap_or_else(|| path.to_string_lossy().into_owned())
    }

    /// All existing files matched by either watch set, sorted by path.
    pub fn collect_matching_files(&self, fs: &dyn FileSystem) -> anyhow::Result<Vec<(Category, PathBuf)>> {
        let mut found = BTreeSet::new();

        for watch_root in self.roots.iter() {
            if !watch_root.recursive {
                for path in fs.read_dir(&watch_root.path)? {
                    if fs.is_file(&path) {
                        if let Some(cat) = self.classify(&path) {
                            found.insert((path, cat));
                        }
                    }
                }
                continue;
            }

            let mut stack = vec![watch_root.path.clone()];
            while let Some(dir) = stack.pop() {
                for path in fs.read_dir(&dir)? {
                    if fs.is_dir(&path) {
                        let ignored = relative_str(&self.root, &path)
                            .map(|rel| self.ignore.is_match(format!("{rel}/")) || self.ignore.is_match(&rel))
                            .unwrap_or(false);
                        if !ignored {
                            stack.push(path);
                        }
                    } else if fs.is_file(&path) {
                        if let Some(cat) = self.classify(&path) {
                            found.insert((path, cat));
                        }
                    }
                }
            }
        }

        Ok(found.into_iter().map(|(path, cat)| (cat, path)).collect())
    }
}

fn build_watch_set(
    root: &Path,
    category: Category,
    raw_patterns: &[String],
    fs: &dyn FileSystem,
    roots: &mut BTreeSet<WatchRoot>,
) -> Result<WatchSet> {
    let mut patterns = Vec::with_capacity(raw_patterns.len());

    for raw in raw_patterns {
        let pattern = normalize_pattern(root, raw)?;

        if has_glob_meta(&pattern) {
            let base = root.join(literal_base(&pattern));
            if !fs.is_dir(&base) {
                return Err(AppmonError::config(format!(
                    "{category} watch pattern '{raw}': base directory {base:?} does not exist"
                )));
            }
            roots.insert(WatchRoot {
                path: base,
                recursive: true,
            });
            patterns.push(pattern);
            continue;
        }

        let full = root.join(&pattern);
        if fs.is_dir(&full) {
            roots.insert(WatchRoot {
                path: full,
                recursive: true,
            });
            patterns.push(format!("{pattern}/**"));
            patterns.push(pattern);
        } else if fs.is_file(&full) {
            let parent = full.parent().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            roots.insert(WatchRoot {
                path: parent,
                recursive: false,
            });
            patterns.push(pattern);
        } else {
            return Err(AppmonError::config(format!(
                "{category} watch path '{raw}' does not exist (resolved to {full:?})"
            )));
        }
    }

    let globs = build_globset(&patterns)
        .with_context(|| format!("building {category} watch globset"))?;

    Ok(WatchSet {
        category,
        patterns,
        globs,
    })
}

/// Make a pattern relative to `root`, with forward slashes and no `./`.
fn normalize_pattern(root: &Path, raw: &str) -> Result<String> {
    let pattern = raw.trim().replace('\\', "/");
    let pattern = pattern.strip_prefix("./").unwrap_or(&pattern).to_string();

    let as_path = Path::new(&pattern);
    if as_path.is_absolute() {
        return match as_path.strip_prefix(root) {
            Ok(rel) => Ok(rel.to_string_lossy().replace('\\', "/")),
            Err(_) => Err(AppmonError::config(format!(
                "watch path '{raw}' is outside the project root {root:?}"
            ))),
        };
    }
    Ok(pattern)
}

/// Drop roots already covered by a recursive ancestor.
fn collapse_roots(roots: BTreeSet<WatchRoot>) -> Vec<WatchRoot> {
    let recursive: Vec<PathBuf> = roots
        .iter()
        .filter(|r| r.recursive)
        .map(|r| r.path.clone())
        .collect();

    roots
        .into_iter()
        .filter(|r| {
            !recursive
                .iter()
                .any(|ancestor| ancestor != &r.path && r.path.starts_with(ancestor))
        })
        .filter(|r| r.recursive || !recursive.iter().any(|a| a == &r.path))
        .collect()
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
