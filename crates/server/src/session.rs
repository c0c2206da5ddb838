//! Active call registry
//!
//! Tracks media-stream connections for status reporting and capacity limits.
//! Conversation state itself lives inside each `CallSession`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::ServerError;

/// Default cap on concurrent media streams
pub const DEFAULT_MAX_CALLS: usize = 100;

/// One live media stream
#[derive(Debug, Clone, Serialize)]
pub struct ActiveCall {
    pub id: String,
    /// Set once the `start` event arrives
    pub stream_sid: Option<String>,
    pub call_sid: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Registry of live calls keyed by connection id
pub struct CallRegistry {
    calls: RwLock<HashMap<String, ActiveCall>>,
    max_calls: usize,
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALLS)
    }
}

impl CallRegistry {
    pub fn new(max_calls: usize) -> Self {
        Self {
            calls: RwLock::new(HashMap::new()),
            max_calls,
        }
    }

    /// Reserve a slot for a new connection
    pub fn register(&self) -> Result<String, ServerError> {
        let mut calls = self.calls.write();
        if calls.len() >= self.max_calls {
            return Err(ServerError::Session(format!(
                "Max concurrent calls reached ({})",
                self.max_calls
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        calls.insert(
            id.clone(),
            ActiveCall {
                id: id.clone(),
                stream_sid: None,
                call_sid: None,
                started_at: Utc::now(),
            },
        );
        tracing::debug!(call_id = %id, active = calls.len(), "Registered call");
        Ok(id)
    }

    /// Attach transport identifiers from the `start` event
    pub fn attach_stream(&self, id: &str, stream_sid: &str, call_sid: Option<&str>) {
        if let Some(call) = self.calls.write().get_mut(id) {
            call.stream_sid = Some(stream_sid.to_string());
            call.call_sid = call_sid.map(str::to_string);
        }
    }

    pub fn get(&self, id: &str) -> Option<ActiveCall> {
        self.calls.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<ActiveCall> {
        let removed = self.calls.write().remove(id);
        if removed.is_some() {
            tracing::debug!(call_id = %id, "Removed call");
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.calls.read().len()
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    /// Snapshot of live calls, oldest first
    pub fn list(&self) -> Vec<ActiveCall> {
        let mut calls: Vec<_> = self.calls.read().values().cloned().collect();
        calls.sort_by_key(|c| c.started_at);
        calls
    }
}

/// Removes the call from the registry when dropped
pub struct CallGuard {
    registry: Arc<CallRegistry>,
    id: String,
}

impl CallGuard {
    pub fn new(registry: Arc<CallRegistry>, id: String) -> Self {
        Self { registry, id }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
        crate::metrics::set_active_calls(self.registry.count());
    }
}
