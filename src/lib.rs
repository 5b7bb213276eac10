// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logbus;
pub mod logging;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{config_root_dir, load_with_command_override, ConfigFile};
use crate::engine::{
    Runtime, SupervisorCore, SupervisorEvent, SupervisorHandle, SupervisorOptions,
    EVENT_CHANNEL_CAPACITY,
};
use crate::errors::{AppmonError, Result};
use crate::exec::{ChildProcessController, LaunchSpec};
use crate::fs::{FileSystem, RealFileSystem};
use crate::logbus::LogBus;
use crate::logging::resolve_verbosity;
use crate::types::Category;
use crate::watch::{spawn_watcher, PathClassifier};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and the project root
/// - the path classifier and file watcher
/// - the child process controller
/// - the supervisor core and runtime
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_with_command_override(&config_path, &args.command)?;
    let root = config_root_dir(&config_path);

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let classifier = PathClassifier::from_config(&cfg, &root, fs.as_ref())?;

    if args.dry_run {
        print_dry_run(&cfg, &classifier);
        return Ok(());
    }

    let verbosity = resolve_verbosity(args.verbosity, cfg.log.level);
    let supervisor = launch(&cfg, classifier, LogBus::stdio(verbosity), fs)?;

    // Ctrl-C → graceful shutdown.
    {
        let handle = supervisor.handle();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for Ctrl+C");
                return;
            }
            let _ = handle.close().await;
        });
    }

    supervisor.wait().await
}

/// A running supervisor: its control handle and the task driving it.
#[derive(Debug)]
pub struct Supervisor {
    handle: SupervisorHandle,
    task: JoinHandle<Result<()>>,
}

impl Supervisor {
    pub fn handle(&self) -> SupervisorHandle {
        self.handle.clone()
    }

    /// Wait for the supervisor to stop.
    pub async fn wait(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(AppmonError::Other(anyhow::anyhow!("supervisor task failed: {err}"))),
        }
    }
}

/// Start watching and launch the app. Must be called within a Tokio runtime.
///
/// The returned [`Supervisor`] owns the watcher; it stops watching once the
/// supervisor loop ends.
pub fn launch(
    cfg: &ConfigFile,
    classifier: PathClassifier,
    logbus: LogBus,
    fs: Arc<dyn FileSystem>,
) -> Result<Supervisor> {
    let root = classifier.root().to_path_buf();
    let (tx, rx) = mpsc::channel::<SupervisorEvent>(EVENT_CHANNEL_CAPACITY);

    let watcher = spawn_watcher(
        Arc::new(classifier),
        cfg.timing.debounce,
        tx.clone(),
        logbus.clone(),
        fs,
    )?;

    let spec = LaunchSpec::from_config(cfg, &root);
    info!(cmd = %spec.display(), cwd = ?spec.cwd, "launching app");
    let controller =
        ChildProcessController::new(spec, cfg.timing.terminate_timeout, tx.clone(), logbus.clone());

    let options = SupervisorOptions {
        resident_after_crash: cfg.resident_after_crash(),
    };
    let core = SupervisorCore::new(options, root.clone());
    let runtime = Runtime::new(core, rx, controller, logbus);

    let task = tokio::spawn(async move {
        let result = runtime.run().await.map(|_controller| ());
        drop(watcher);
        result
    });

    Ok(Supervisor {
        handle: SupervisorHandle::new(tx),
        task,
    })
}

/// Print the resolved launch command, timings and watch sets.
fn print_dry_run(cfg: &ConfigFile, classifier: &PathClassifier) {
    println!("appmon dry-run");
    println!("  root: {}", classifier.root().display());
    println!("  command: {}", LaunchSpec::from_config(cfg, classifier.root()).display());
    if let Some(cwd) = &cfg.app.cwd {
        println!("  cwd: {cwd}");
    }
    for (key, value) in &cfg.app.env {
        println!("  env: {key}={value}");
    }
    println!("  debounce: {:?}", cfg.timing.debounce);
    println!("  terminate_timeout: {:?}", cfg.timing.terminate_timeout);
    println!("  resident_after_crash: {}", cfg.resident_after_crash());
    println!();

    for category in Category::ALL {
        let set = classifier.watch_set(category);
        println!("{category} ({}):", set.patterns().len());
        for pattern in set.patterns() {
            println!("  - {pattern}");
        }
    }
    if !cfg.default.exclude.is_empty() {
        println!("exclude: {:?}", cfg.default.exclude);
    }

    println!("watch roots:");
    for root in classifier.watch_roots() {
        let mode = if root.recursive { "recursive" } else { "flat" };
        println!("  - {} ({mode})", display_root(classifier.root(), &root.path));
    }

    debug!("dry-run complete (nothing launched)");
}

fn display_root(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}
