// src/config/validate.rs

use std::collections::HashMap;

use globset::Glob;

use crate::config::model::{ConfigFile, RawConfigFile, Timing};
use crate::errors::{AppmonError, Result};
use crate::types::{parse_duration, Category};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::AppmonError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let timing = validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw, timing))
    }
}

/// Structural validation that needs no filesystem access.
///
/// Path existence is checked later, when the classifier is built against the
/// project root.
pub fn validate_config(raw: &RawConfigFile) -> Result<()> {
    validate_raw_config(raw).map(|_| ())
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<Timing> {
    validate_app(cfg)?;
    let timing = validate_timing(cfg)?;
    ensure_has_watch_entries(cfg)?;
    validate_watch_entries(cfg)?;
    validate_patterns(cfg)?;
    validate_no_ambiguous_paths(cfg)?;
    Ok(timing)
}

fn validate_app(cfg: &RawConfigFile) -> Result<()> {
    if cfg.app.command.trim().is_empty() {
        return Err(AppmonError::config("[app].command must not be empty"));
    }
    Ok(())
}

fn validate_timing(cfg: &RawConfigFile) -> Result<Timing> {
    let debounce = parse_duration(&cfg.timing.debounce)
        .map_err(|e| AppmonError::config(format!("[timing].debounce: {e}")))?;
    let terminate_timeout = parse_duration(&cfg.timing.terminate_timeout)
        .map_err(|e| AppmonError::config(format!("[timing].terminate_timeout: {e}")))?;

    if debounce.is_zero() {
        return Err(AppmonError::config("[timing].debounce must be > 0"));
    }
    if terminate_timeout.is_zero() {
        return Err(AppmonError::config("[timing].terminate_timeout must be > 0"));
    }

    Ok(Timing {
        debounce,
        terminate_timeout,
    })
}

fn ensure_has_watch_entries(cfg: &RawConfigFile) -> Result<()> {
    if cfg.watch.is_empty() {
        return Err(AppmonError::config(
            "config must contain at least one [[watch]] entry",
        ));
    }
    Ok(())
}

fn validate_watch_entries(cfg: &RawConfigFile) -> Result<()> {
    for (idx, entry) in cfg.watch.iter().enumerate() {
        if entry.category.is_none() {
            return Err(AppmonError::config(format!(
                "[[watch]] entry #{} has no category (expected \"main\" or \"renderer\")",
                idx + 1
            )));
        }
        if entry.paths.is_empty() {
            return Err(AppmonError::config(format!(
                "[[watch]] entry #{} has no paths",
                idx + 1
            )));
        }
    }
    Ok(())
}

fn validate_patterns(cfg: &RawConfigFile) -> Result<()> {
    let all = cfg
        .watch
        .iter()
        .flat_map(|w| w.paths.iter())
        .chain(cfg.default.exclude.iter());

    for pat in all {
        Glob::new(pat).map_err(|e| {
            AppmonError::config(format!("invalid glob pattern '{pat}': {e}"))
        })?;
    }
    Ok(())
}

/// A pattern may belong to exactly one category.
fn validate_no_ambiguous_paths(cfg: &RawConfigFile) -> Result<()> {
    let mut seen: HashMap<String, Category> = HashMap::new();

    for entry in cfg.watch.iter() {
        let Some(category) = entry.category else {
            continue;
        };
        for pat in entry.paths.iter() {
            let key = normalize_pattern(pat);
            match seen.get(&key) {
                Some(existing) if *existing != category => {
                    return Err(AppmonError::config(format!(
                        "path '{}' is assigned to both '{}' and '{}'",
                        pat, existing, category
                    )));
                }
                _ => {
                    seen.insert(key, category);
                }
            }
        }
    }
    Ok(())
}

fn normalize_pattern(pat: &str) -> String {
    let pat = pat.trim().replace('\\', "/");
    pat.strip_prefix("./").unwrap_or(&pat).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{AppSection, WatchEntry};

    fn raw(watch: Vec<WatchEntry>) -> RawConfigFile {
        RawConfigFile {
            app: AppSection {
                command: "electron".into(),
                ..AppSection::default()
            },
            timing: Default::default(),
            log: Default::default(),
            default: Default::default(),
            watch,
        }
    }

    fn entry(category: Option<Category>, paths: &[&str]) -> WatchEntry {
        WatchEntry {
            category,
            paths: paths.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn accepts_disjoint_categories_and_parses_default_timing() {
        let cfg = raw(vec![
            entry(Some(Category::Main), &["main.js"]),
            entry(Some(Category::Renderer), &["renderer.js", "index.html"]),
        ]);
        let timing = validate_raw_config(&cfg).unwrap();
        assert_eq!(timing.debounce.as_millis(), 300);
        assert_eq!(timing.terminate_timeout.as_secs(), 3);
    }

    #[test]
    fn rejects_entry_without_category() {
        let cfg = raw(vec![entry(None, &["main.js"])]);
        let err = validate_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("no category"), "{err}");
    }

    #[test]
    fn rejects_path_in_both_categories() {
        let cfg = raw(vec![
            entry(Some(Category::Main), &["./shared.js"]),
            entry(Some(Category::Renderer), &["shared.js"]),
        ]);
        match validate_config(&cfg) {
            Err(AppmonError::ConfigError(msg)) => assert!(msg.contains("both")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_path_in_same_category_is_fine() {
        let cfg = raw(vec![
            entry(Some(Category::Main), &["main.js"]),
            entry(Some(Category::Main), &["main.js"]),
        ]);
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn rejects_empty_command_and_zero_debounce() {
        let mut cfg = raw(vec![entry(Some(Category::Main), &["main.js"])]);
        cfg.app.command = "  ".into();
        assert!(validate_config(&cfg).is_err());

        let mut cfg = raw(vec![entry(Some(Category::Main), &["main.js"])]);
        cfg.timing.debounce = "0ms".into();
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn rejects_invalid_glob() {
        let cfg = raw(vec![entry(Some(Category::Main), &["src/[oops"])]);
        assert!(validate_config(&cfg).is_err());
    }
}
