//! Registry of cleanup actions run at startup or shutdown.
//!
//! Each action reports how many items it cleaned. Its description may contain
//! `{count}`, which is replaced by that number when the result is logged.

use std::error::Error as StdError;
use std::fmt;

use log::{info, warn};

use crate::sync::{Guarded, LockStrategy, ReentrantRwLock};

/// Error returned by a cleanup action.
pub type CleanupError = Box<dyn StdError + Send + Sync>;

type CleanupAction = Box<dyn Fn() -> Result<u64, CleanupError> + Send + Sync>;

struct CleanupEntry {
    description: String,
    action: CleanupAction,
}

/// Outcome of one registered action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The action succeeded; the description with `{count}` filled in
    Cleaned {
        /// Items cleaned
        count: u64,
        /// Rendered description
        message: String,
    },

    /// The action failed
    Failed {
        /// Raw description
        description: String,
        /// Error reported by the action
        error: String,
    },
}

/// Result of running every registered action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// One outcome per action, in registration order
    pub outcomes: Vec<CleanupOutcome>,
}

impl CleanupReport {
    /// Total items cleaned by successful actions.
    pub fn total_cleaned(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|outcome| match outcome {
                CleanupOutcome::Cleaned { count, .. } => *count,
                CleanupOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    /// Number of actions that failed.
    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, CleanupOutcome::Failed { .. }))
            .count()
    }
}

/// An explicit list of cleanup actions.
///
/// Build one, register actions on it, and pass it to whatever runs them.
/// Actions run in registration order. A failing action is logged and the
/// rest still run. Actions must not register on the registry running them.
pub struct CleanupRegistry<L = ReentrantRwLock> {
    entries: Guarded<Vec<CleanupEntry>, L>,
}

impl<L: LockStrategy + Default> CleanupRegistry<L> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Guarded::new(Vec::new()),
        }
    }
}

impl<L: LockStrategy + Default> Default for CleanupRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: LockStrategy> CleanupRegistry<L> {
    /// Register `action` under `description`.
    pub fn register(
        &self,
        description: impl Into<String>,
        action: impl Fn() -> Result<u64, CleanupError> + Send + Sync + 'static,
    ) {
        self.entries.write().push(CleanupEntry {
            description: description.into(),
            action: Box::new(action),
        });
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no actions are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registered action.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Run every action.
    pub fn run(&self) -> CleanupReport {
        let entries = self.entries.read();
        let mut report = CleanupReport::default();

        for entry in entries.iter() {
            let outcome = match (entry.action)() {
                Ok(count) => {
                    let message = entry.description.replace("{count}", &count.to_string());
                    info!("{}", message);
                    CleanupOutcome::Cleaned { count, message }
                }
                Err(err) => {
                    warn!("Cleanup \"{}\" failed: {}", entry.description, err);
                    CleanupOutcome::Failed {
                        description: entry.description.clone(),
                        error: err.to_string(),
                    }
                }
            };
            report.outcomes.push(outcome);
        }

        report
    }
}

impl<L> fmt::Debug for CleanupRegistry<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupRegistry").finish_non_exhaustive()
    }
}
