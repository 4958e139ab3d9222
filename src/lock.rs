use std::sync::{Mutex, MutexGuard};

/// Acquire a mutex guard, intentionally ignoring poisoning.
///
/// Every mutex in this crate guards a single map or slot that is left
/// consistent between statements, and none is held across an `.await`.
/// A panic elsewhere while holding one cannot leave a half-applied update,
/// so recovering the guard is safe and keeps non-`Send` poison errors out
/// of async code.
pub(crate) fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // ---
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
