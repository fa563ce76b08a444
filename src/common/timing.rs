// src/common/timing.rs

use core::time::Duration;

// === Wakeup (console sleeps between commands) ===

/// Number of `\r` probes sent before giving up on waking the console.
pub const WAKEUP_ATTEMPTS: usize = 3;
/// Pause between unanswered wakeup probes.
pub const WAKEUP_BACKOFF: Duration = Duration::from_secs(1);

// === Reads ===

/// Maximum wait for any single reply byte.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);
/// How long the std links block in the OS before reporting "no byte yet".
/// Kept short so the protocol-level deadline governs.
pub const LINK_POLL_TIMEOUT: Duration = Duration::from_millis(50);
/// Idle delay between polls of a link that has nothing to read.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

// === Connections ===

/// TCP connect timeout per attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Connect attempts made by the socket transport before failing the cycle.
pub const CONNECT_ATTEMPTS: usize = 10;
/// Pause between failed connect attempts.
pub const CONNECT_BACKOFF: Duration = Duration::from_millis(500);
/// Polls made while waiting for a closed link to report itself closed.
pub const CLOSE_POLL_ATTEMPTS: usize = 20;
/// Pause between close polls.
pub const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(50);

// === Text report ===

/// Read attempts on a report file that another process may be rewriting.
pub const REPORT_READ_ATTEMPTS: usize = 5;
/// Pause between report read attempts.
pub const REPORT_RETRY_PAUSE: Duration = Duration::from_millis(500);

// === Scheduling ===

/// Default interval between fetch cycles.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
/// Shortest interval between fetch cycles a configuration may ask for.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);
