//! Collaboration runtime settings

use std::time::Duration;

/// Tunables of the room hub and connection handler
#[derive(Debug, Clone)]
pub struct CollabConfig {
    /// Quiet period after the last edit before an autosave
    pub autosave_interval: Duration,
    /// Edits that force an immediate autosave
    pub autosave_threshold: u32,
    /// Transport ping period
    pub ping_interval: Duration,
    /// Frames buffered per connection before the peer is dropped
    pub outbound_buffer: usize,
    /// Attempts to join a room that closed underneath the caller
    pub join_retries: u32,
    /// Undo entries kept per room; `None` keeps all
    pub history_limit: Option<usize>,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            autosave_interval: Duration::from_secs(300),
            autosave_threshold: 30,
            ping_interval: Duration::from_secs(10),
            outbound_buffer: 256,
            join_retries: 3,
            history_limit: None,
        }
    }
}
