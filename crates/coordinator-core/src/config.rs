//! Coordinator-wide tunables: pending/stall timeout policy, the tick
//! interval.
//!
//! This is a plain struct built in code — the library has no config-file
//! I/O of its own. `coordinator-cli` loads a TOML file and turns it into
//! one of these (see its own `config` module).

use std::time::Duration;

/// Tunables for the scheduler loop. All timeout fields are optional;
/// leaving a pair unset disables that policy entirely.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How often the scheduler re-scans the pending bag even with no
    /// wakeup signal (suggested 50ms).
    pub tick_interval: Duration,
    /// Log + fire `on_stall_warning` once a pending item has waited this
    /// long without being dispatched.
    pub pending_warn_after: Option<Duration>,
    /// Fail a pending item once it has waited this long.
    pub pending_timeout: Option<Duration>,
    /// Fire `on_stall_warning` once this long has elapsed since the last
    /// terminal transition, with pending work still outstanding.
    pub stall_warn_after: Option<Duration>,
    /// Fail every pending item once this long has elapsed since the last
    /// terminal transition.
    pub stall_timeout: Option<Duration>,
    /// Deadline to drain in-flight handlers when `stop()` is called
    /// without an explicit timeout.
    pub default_stop_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            pending_warn_after: None,
            pending_timeout: None,
            stall_warn_after: None,
            stall_timeout: None,
            default_stop_timeout: Duration::from_secs(30),
        }
    }
}
