use std::fmt;
use anyhow::Result;
use crate::store::RecordStore;
use super::Container;
use super::snapshot::SnapshotState;

/// Where a container is in its life, kept next to the immutable `Container`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Observed,
    Stopped,
    Crashed,
}

impl Lifecycle {
    /// From the `State` block of a snapshot. No state block means running.
    pub fn from_state(state: Option<&SnapshotState>) -> Self {
        match state {
            None => Lifecycle::Observed,
            Some(s) if s.running => Lifecycle::Observed,
            Some(s) => Self::after_exit(s.exit_code),
        }
    }

    pub fn after_exit(exit_code: i64) -> Self {
        if exit_code == 0 {
            Lifecycle::Stopped
        } else {
            Lifecycle::Crashed
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Lifecycle::Observed => "observed",
            Lifecycle::Stopped => "stopped",
            Lifecycle::Crashed => "crashed",
        };
        f.write_str(s)
    }
}

/// Bring the store in line with a container's lifecycle state
pub fn reconcile(container: &Container, lifecycle: Lifecycle, store: &mut dyn RecordStore) -> Result<()> {
    match lifecycle {
        Lifecycle::Observed => {
            tracing::info!("Publishing records for {} ({})", container.name(), container.short_id());
            container.publish_records(store)
        }
        Lifecycle::Stopped => {
            tracing::info!("Suppressing records for {} ({})", container.name(), container.short_id());
            container.suppress_records(store)
        }
        Lifecycle::Crashed => {
            tracing::warn!(
                "Container {} ({}) crashed; suppressing its records",
                container.name(),
                container.short_id()
            );
            container.suppress_records(store)
        }
    }
}
