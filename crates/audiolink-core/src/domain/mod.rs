//! Domain state for the AudioLink transport.
//!
//! Nothing in here performs I/O. Every type is `Send + Sync` and is shared
//! between the event-dispatch context and the transport session thread via
//! `Arc`.

pub mod event;
pub mod peers;
pub mod session;
pub mod signal;
pub mod target;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the guard if a previous holder panicked.
///
/// Every critical section is a handful of field writes, so guarded state
/// stays consistent across a panic. The node crate uses it too.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_lock_recovers_poisoned_mutex() {
        // Arrange
        let mutex = Arc::new(Mutex::new(7));
        let poisoner = Arc::clone(&mutex);
        let _ = thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the mutex");
        })
        .join();
        assert!(mutex.is_poisoned());

        // Act
        let value = *lock(&mutex);

        // Assert
        assert_eq!(value, 7);
    }
}
