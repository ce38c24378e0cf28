// Configuration reads the process environment, which every test thread
// shares. `ScopedEnv` serializes those tests and restores the variables it
// touched when dropped.

use std::sync::{Mutex, MutexGuard, PoisonError};

static ENV_LOCK: Mutex<()> = Mutex::new(());

const PREFIX: &str = "POS_SELFREG_";

pub struct ScopedEnv {
    saved: Vec<(String, String)>,
    _lock: MutexGuard<'static, ()>,
}

impl ScopedEnv {
    /// Clears every `POS_SELFREG_*` variable, then sets `vars`.
    pub fn with(vars: &[(&str, &str)]) -> Self {
        let lock = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let saved: Vec<(String, String)> = std::env::vars()
            .filter(|(key, _)| key.starts_with(PREFIX))
            .collect();
        clear_prefixed();
        for (key, value) in vars {
            // SAFETY: environment mutation is serialized by ENV_LOCK.
            unsafe { std::env::set_var(key, value) };
        }
        Self { saved, _lock: lock }
    }

    pub fn clean() -> Self {
        Self::with(&[])
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        clear_prefixed();
        for (key, value) in &self.saved {
            // SAFETY: still holding ENV_LOCK.
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn clear_prefixed() {
    let keys: Vec<String> = std::env::vars()
        .map(|(key, _)| key)
        .filter(|key| key.starts_with(PREFIX))
        .collect();
    for key in keys {
        // SAFETY: callers hold ENV_LOCK.
        unsafe { std::env::remove_var(key) };
    }
}
