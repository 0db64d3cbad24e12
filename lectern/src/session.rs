//! In-process session store with TTL eviction.
//!
//! Two-level locking: the `DashMap` shards guard insert/evict/lookup, a
//! per-entry `tokio::Mutex` guards mutation. The gateway holds the entry
//! lock only around its read-modify-write; the executor's streaming phase
//! never takes it. Sessions for different ids share no mutable state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One conversation turn, append-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            action: None,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>, action: Option<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            action,
            timestamp: Utc::now(),
        }
    }
}

/// Per-conversation state.
#[derive(Debug)]
pub struct Session {
    pub conversation_id: String,
    pub turns: Vec<Turn>,
    /// Merged context across turns; last write wins per key.
    pub accumulated_context: Map<String, Value>,
    pub last_intent: Option<String>,
    pub last_action: Option<String>,
    /// Set when the last turn produced a renderable artifact; restored only
    /// for referential follow-up messages.
    pub artifact_type: Option<String>,
    /// The prompt that triggered a pending clarify, so a clarify reply can be
    /// lifted back into the original actionable intent.
    pub pending_prompt: Option<String>,
    touched_at: Instant,
}

impl Session {
    fn new(conversation_id: String) -> Self {
        Self {
            conversation_id,
            turns: Vec::new(),
            accumulated_context: Map::new(),
            last_intent: None,
            last_action: None,
            artifact_type: None,
            pending_prompt: None,
            touched_at: Instant::now(),
        }
    }

    /// Merges keys into the accumulated context; the new values win.
    pub fn merge_context(&mut self, context: &Map<String, Value>) {
        for (k, v) in context {
            self.accumulated_context.insert(k.clone(), v.clone());
        }
    }

    /// The last `limit` turns, excluding any trailing turns newer than the
    /// current message is expected to be.
    pub fn history_tail(&self, limit: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(limit);
        &self.turns[start..]
    }

    pub fn touch(&mut self) {
        self.touched_at = Instant::now();
    }
}

/// Renders turns as plain conversation text for LLM prompt context.
pub fn history_text(history: &[Turn]) -> String {
    history
        .iter()
        .map(|t| {
            let who = match t.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            match &t.action {
                Some(action) => format!("{who} ({action}): {}", t.content),
                None => format!("{who}: {}", t.content),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// TTL-scoped store from conversation id to session.
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Looks up the session, or creates one (also when the given id is
    /// unknown or expired). Returns the effective conversation id.
    pub fn get_or_create(&self, id: Option<&str>) -> (String, Arc<Mutex<Session>>) {
        if let Some(id) = id {
            if let Some(entry) = self.sessions.get(id) {
                return (id.to_string(), entry.clone());
            }
        }
        let id = id
            .map(str::to_string)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("conv-{}", uuid::Uuid::new_v4()));
        let session = Arc::new(Mutex::new(Session::new(id.clone())));
        self.sessions.insert(id.clone(), session.clone());
        (id, session)
    }

    /// Removes sessions idle past the TTL. Called by the background sweeper.
    pub async fn evict_expired(&self) -> usize {
        let mut expired = Vec::new();
        for entry in self.sessions.iter() {
            if let Ok(session) = entry.value().try_lock() {
                if session.touched_at.elapsed() >= self.ttl {
                    expired.push(entry.key().clone());
                }
            }
        }
        let count = expired.len();
        for id in expired {
            self.sessions.remove(&id);
        }
        if count > 0 {
            debug!(count, "evicted expired sessions");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Spawns the low-priority TTL sweeper.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.evict_expired().await;
            }
        })
    }
}
