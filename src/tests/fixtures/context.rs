// Only one application context may exist per process, so tests that build one
// take this lock first. Keep the guard alive until the context is dropped.

use std::sync::{Mutex, MutexGuard, PoisonError};

static CONTEXT_LOCK: Mutex<()> = Mutex::new(());

pub fn exclusive_context() -> MutexGuard<'static, ()> {
    CONTEXT_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}
