//! Device restart for a node running as a supervised process.
//!
//! A process cannot power-cycle its host. [`ProcessRestart`] records the
//! reason and cancels the shutdown token instead; `main` then exits with a
//! failure status so the service manager starts the node again.

use std::sync::Mutex;

use audiolink_core::ShutdownToken;
use tracing::error;

use crate::application::lock;
use crate::application::ports::DeviceControl;

pub struct ProcessRestart {
    shutdown: ShutdownToken,
    reason: Mutex<Option<String>>,
}

impl ProcessRestart {
    pub fn new(shutdown: ShutdownToken) -> Self {
        Self {
            shutdown,
            reason: Mutex::new(None),
        }
    }

    /// The first restart reason, if a restart was requested.
    pub fn restart_reason(&self) -> Option<String> {
        lock(&self.reason).clone()
    }
}

impl DeviceControl for ProcessRestart {
    fn restart(&self, reason: &str) {
        error!("restarting: {reason}");
        lock(&self.reason).get_or_insert_with(|| reason.to_string());
        self.shutdown.cancel();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
