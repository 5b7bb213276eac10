#![allow(dead_code)]

use std::path::Path;

use appmon::config::{ConfigFile, RawConfigFile, WatchEntry};
use appmon::fs::mock::MockFileSystem;
use appmon::types::{Category, Verbosity};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigBuilder {
    config: RawConfigFile,
}

impl ConfigBuilder {
    pub fn new(command: &str) -> Self {
        let mut config = RawConfigFile::default();
        config.app.command = command.to_string();
        Self { config }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.config.app.args.push(arg.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.config.app.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn cwd(mut self, dir: &str) -> Self {
        self.config.app.cwd = Some(dir.to_string());
        self
    }

    pub fn main(self, pattern: &str) -> Self {
        self.watch(Some(Category::Main), pattern)
    }

    pub fn renderer(self, pattern: &str) -> Self {
        self.watch(Some(Category::Renderer), pattern)
    }

    /// Add a `[[watch]]` entry with one path; `None` leaves the category out.
    pub fn watch(mut self, category: Option<Category>, pattern: &str) -> Self {
        self.config.watch.push(WatchEntry {
            category,
            paths: vec![pattern.to_string()],
        });
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.config.default.exclude.push(pattern.to_string());
        self
    }

    pub fn debounce(mut self, value: &str) -> Self {
        self.config.timing.debounce = value.to_string();
        self
    }

    pub fn terminate_timeout(mut self, value: &str) -> Self {
        self.config.timing.terminate_timeout = value.to_string();
        self
    }

    pub fn resident_after_crash(mut self, value: bool) -> Self {
        self.config.app.resident_after_crash = Some(value);
        self
    }

    pub fn verbosity(mut self, level: Verbosity) -> Self {
        self.config.log.level = Some(level);
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// A mock project at `root` containing `files` (relative paths).
pub fn mock_project(root: &Path, files: &[&str]) -> MockFileSystem {
    let fs = MockFileSystem::new();
    fs.add_dir(root);
    for file in files {
        fs.add_file(root.join(file));
    }
    fs
}
