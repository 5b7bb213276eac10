// src/watch/debounce.rs

//! Per-category debouncing of classified file changes.
//!
//! Editors often produce several raw events for one logical save (write,
//! metadata touch, rename-into-place). [`Debouncer`] keeps one pending slot
//! per category; every new event for that category replaces the path and
//! pushes the deadline out by the window. Categories never delay each other.
//!
//! The debouncer is pure: the caller supplies `now` and sleeps until
//! [`Debouncer::next_deadline`], which keeps it cancellable and testable.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;

use crate::types::Category;

/// One settled burst of changes in a single category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub category: Category,
    /// Absolute path of the most recent raw event in the burst.
    pub path: PathBuf,
    /// When the burst settled.
    pub at: Instant,
}

#[derive(Debug, Clone)]
struct Pending {
    path: PathBuf,
    deadline: Instant,
    raw_events: usize,
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    pending: BTreeMap<Category, Pending>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: BTreeMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a raw event. Restarts the window for `category`.
    pub fn push(&mut self, category: Category, path: PathBuf, now: Instant) {
        let deadline = now + self.window;
        self.pending
            .entry(category)
            .and_modify(|p| {
                p.path = path.clone();
                p.deadline = deadline;
                p.raw_events += 1;
            })
            .or_insert(Pending {
                path,
                deadline,
                raw_events: 1,
            });
    }

    /// Earliest deadline among pending categories.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove and return every burst whose window has elapsed at `now`.
    pub fn drain_due(&mut self, now: Instant) -> Vec<ChangeEvent> {
        let due: Vec<Category> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(cat, _)| *cat)
            .collect();

        due.into_iter()
            .filter_map(|category| {
                self.pending.remove(&category).map(|p| {
                    tracing::trace!(
                        %category,
                        raw_events = p.raw_events,
                        "debounce window settled"
                    );
                    ChangeEvent {
                        category,
                        path: p.path,
                        at: now,
                    }
                })
            })
            .collect()
    }
}
