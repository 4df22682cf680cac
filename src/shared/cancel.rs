use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const CANCEL_POLL_SLICE_MS: u64 = 50;

/// Shared flag observed by long-running sandbox commands and retry backoff.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Sleeps in short slices. Returns `false` when the token fired before `total` elapsed.
pub fn sleep_with_cancel(cancel: &CancelToken, total: Duration) -> bool {
    let mut remaining = total;
    while remaining > Duration::from_millis(0) {
        if cancel.is_cancelled() {
            return false;
        }
        let step = remaining.min(Duration::from_millis(CANCEL_POLL_SLICE_MS));
        thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
    !cancel.is_cancelled()
}

#[derive(Debug, Default)]
pub struct CancelRegistry {
    tokens: Mutex<HashMap<String, CancelToken>>,
}

impl CancelRegistry {
    pub fn token(&self, run_id: &str) -> CancelToken {
        let mut tokens = self.tokens.lock().unwrap_or_else(|err| err.into_inner());
        tokens.entry(run_id.to_string()).or_default().clone()
    }

    pub fn cancel(&self, run_id: &str) -> CancelToken {
        let token = self.token(run_id);
        token.cancel();
        token
    }

    pub fn is_cancelled(&self, run_id: &str) -> bool {
        let tokens = self.tokens.lock().unwrap_or_else(|err| err.into_inner());
        tokens
            .get(run_id)
            .map(CancelToken::is_cancelled)
            .unwrap_or(false)
    }

    pub fn run_ids(&self) -> Vec<String> {
        let tokens = self.tokens.lock().unwrap_or_else(|err| err.into_inner());
        tokens.keys().cloned().collect()
    }

    pub fn forget(&self, run_id: &str) {
        let mut tokens = self.tokens.lock().unwrap_or_else(|err| err.into_inner());
        tokens.remove(run_id);
    }
}
