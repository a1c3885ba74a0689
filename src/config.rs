//! Process-wide config toggles.
//!
//! The original source keeps these as module-level globals
//! (`pyroute2.config`). We keep the same "one process, one config" shape but
//! make it explicit: a `ProcessConfig` value, installed once via [`install`]
//! and read through [`get`].

use std::sync::OnceLock;

/// How a child process enters a network namespace / runs helper work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildProcessMode {
    Fork,
    Mp,
}

#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Replace the kernel netlink socket with [`crate::rtnl::mock::MockEngine`].
    pub mock_netlink: bool,
    /// Skip real `setns(2)` calls in [`crate::netns`].
    pub mock_netns: bool,
    /// TTL for the SQL-backed object cache layer, which this crate doesn't
    /// implement; carried here only so callers configuring a fuller stack
    /// that does have one place to set it.
    pub cache_expire: std::time::Duration,
    pub child_process_mode: ChildProcessMode,
    /// Directories searched for named network namespaces.
    pub netns_path: Vec<String>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        ProcessConfig {
            mock_netlink: false,
            mock_netns: false,
            cache_expire: std::time::Duration::from_secs(30),
            child_process_mode: ChildProcessMode::Fork,
            netns_path: vec!["/var/run/netns".to_string()],
        }
    }
}

static CONFIG: OnceLock<ProcessConfig> = OnceLock::new();

/// Install the process-wide configuration. Must be called at most once;
/// later calls are no-ops and return `false`.
pub fn install(config: ProcessConfig) -> bool {
    CONFIG.set(config).is_ok()
}

/// The active process configuration, falling back to defaults if
/// [`install`] was never called (as in unit tests).
pub fn get() -> &'static ProcessConfig {
    CONFIG.get_or_init(ProcessConfig::default)
}
