//! Runtime tuning knobs, with defaults matching the timing constants in §4.

use std::time::Duration;

/// Configuration shared by [`SessionRegistry`](crate::registry::SessionRegistry),
/// its [`CommandQueue`](crate::command_queue::CommandQueue) and
/// [`Receiver`](crate::receiver::Receiver).
#[derive(Debug, Clone)]
pub struct Config {
    /// How long a session may go without a status reply before it is
    /// considered disconnected.
    pub status_timeout: Duration,
    /// Approximate interval between automatic status-request heartbeats
    /// issued by the command queue.
    pub heartbeat_every: Duration,
    /// How long the command queue and receiver threads block on an
    /// empty queue / no readable socket before re-checking their
    /// exit condition.
    pub poll_timeout: Duration,
    /// Candidate paths for the uinput character device, tried in order.
    pub uinput_paths: Vec<&'static str>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            status_timeout: Duration::from_secs(14),
            heartbeat_every: Duration::from_secs(5),
            poll_timeout: Duration::from_millis(500),
            uinput_paths: vec!["/dev/uinput", "/dev/input/uinput"],
        }
    }
}
