//! User-facing notifications (flash messages)

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;

use crate::decision::Severity;

/// Messages kept per key before the oldest are dropped
const MAX_PENDING: usize = 50;

/// Outbound notification channel. Fire-and-forget: nothing is returned and
/// the access decision never depends on delivery.
pub trait Notifier: Send + Sync {
    fn notify(&self, key: &str, text: &str, severity: Severity);
}

/// A pending message for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlashMessage {
    pub text: String,
    pub level: Severity,
    pub created_at: DateTime<Utc>,
}

/// In-memory flash store keyed by session
#[derive(Default)]
pub struct FlashStore {
    pending: Mutex<HashMap<String, Vec<FlashMessage>>>,
}

impl FlashStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every pending message for a key, oldest first
    pub fn drain(&self, key: &str) -> Vec<FlashMessage> {
        self.pending.lock().remove(key).unwrap_or_default()
    }

    /// Number of messages waiting for a key
    pub fn pending(&self, key: &str) -> usize {
        self.pending.lock().get(key).map(Vec::len).unwrap_or(0)
    }
}

impl Notifier for FlashStore {
    fn notify(&self, key: &str, text: &str, severity: Severity) {
        let mut pending = self.pending.lock();
        let queue = pending.entry(key.to_string()).or_default();
        if queue.len() >= MAX_PENDING {
            queue.remove(0);
        }
        queue.push(FlashMessage {
            text: text.to_string(),
            level: severity,
            created_at: Utc::now(),
        });
    }
}
