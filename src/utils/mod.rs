// Utility functions

use std::sync::{Mutex, MutexGuard};

/// Safely acquire a mutex lock, recovering from poisoning by returning the guard.
/// This is useful when you want to continue even if a previous thread panicked.
/// The mutex state may be inconsistent, so use with caution.
pub fn lock_mutex_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Mutex was poisoned, recovering: {}", poisoned);
            poisoned.into_inner()
        }
    }
}

/// Stable 64-bit hash of a string, for short content-addressed identifiers
/// (cache file names, in-flight run keys). Not cryptographic.
pub fn short_hash(input: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    hasher.finish()
}
