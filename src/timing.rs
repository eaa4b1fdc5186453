//! Step timing utilities.

use std::time::{Duration, Instant};

/// A simple timer for measuring how long a pipeline step took.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed time as `[1.2s]`, or `[1.5m]` past a minute.
    pub fn finish(self) -> String {
        format_elapsed(self.start.elapsed())
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs >= 60.0 {
        format!("[{:.1}m]", secs / 60.0)
    } else {
        format!("[{:.1}s]", secs)
    }
}
