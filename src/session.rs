//! Dashboard viewer sessions.
//!
//! A session is created the first time a request arrives without a known
//! `session_id` cookie and is refreshed by every later request carrying it.
//! A reaper task drops sessions idle for longer than the TTL. The tracker
//! only exists to report how many people are looking at the dashboard.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::DISPLAY_TIME_FORMAT;

/// How long the reaper waits for the session map before skipping a pass.
const REAP_LOCK_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub ip: String,
    pub user_agent: String,
    pub created_at: DateTime<Local>,
    pub last_activity: DateTime<Local>,
    /// Monotonic twin of `last_activity`, used for expiry
    last_seen: Instant,
}

/// Point-in-time view for the traffic endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficReport {
    pub users: usize,
    pub user_data: BTreeMap<String, SessionInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub ip: String,
    pub user_agent: String,
    pub timestamp: String,
}

pub struct SessionTracker {
    sessions: Mutex<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Refresh the session named by `id`, or mint a new one if `id` is
    /// absent or unknown. Returns the id the client should keep using.
    pub fn touch(&self, id: Option<&str>, ip: &str, user_agent: &str) -> String {
        self.touch_at(id, ip, user_agent, Instant::now())
    }

    pub fn touch_at(&self, id: Option<&str>, ip: &str, user_agent: &str, now: Instant) -> String {
        let wall = Local::now();
        let mut sessions = self.sessions.lock();

        if let Some(session) = id.and_then(|id| sessions.get_mut(id)) {
            session.ip = ip.to_string();
            session.user_agent = user_agent.to_string();
            session.last_activity = wall;
            session.last_seen = now;
            return session.id.clone();
        }

        let id = Uuid::new_v4().to_string();
        debug!("New dashboard session {} from {}", id, ip);
        sessions.insert(
            id.clone(),
            Session {
                id: id.clone(),
                ip: ip.to_string(),
                user_agent: user_agent.to_string(),
                created_at: wall,
                last_activity: wall,
                last_seen: now,
            },
        );
        id
    }

    /// Remove sessions idle for longer than the TTL. Returns how many were
    /// removed, or `None` if the map stayed locked past the timeout.
    pub fn reap(&self) -> Option<usize> {
        self.reap_at(Instant::now())
    }

    pub fn reap_at(&self, now: Instant) -> Option<usize> {
        let Some(mut sessions) = self.sessions.try_lock_for(REAP_LOCK_TIMEOUT) else {
            warn!("Session map busy, skipping reaper pass");
            return None;
        };

        let before = sessions.len();
        sessions.retain(|_, s| now.saturating_duration_since(s.last_seen) <= self.ttl);
        let removed = before - sessions.len();
        if removed > 0 {
            info!("Reaped {} idle sessions, {} active", removed, sessions.len());
        }
        Some(removed)
    }

    pub fn report(&self) -> TrafficReport {
        let sessions = self.sessions.lock();
        let user_data = sessions
            .values()
            .map(|s| {
                (
                    s.id.clone(),
                    SessionInfo {
                        ip: s.ip.clone(),
                        user_agent: s.user_agent.clone(),
                        timestamp: s.last_activity.format(DISPLAY_TIME_FORMAT).to_string(),
                    },
                )
            })
            .collect();

        TrafficReport {
            users: sessions.len(),
            user_data,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run [`reap`](Self::reap) every `interval` until `shutdown` flips to
    /// `true` or its sender is dropped.
    pub fn spawn_reaper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.reap();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Session reaper stopped");
        })
    }
}
