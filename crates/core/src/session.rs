//! Session handling and visitor identity.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::device::DeviceProbe;
use crate::error::Result;
use crate::hash::short_hash;
use crate::storage::Storage;

/// Session timeout duration (30 minutes of inactivity).
pub const SESSION_TIMEOUT_MINUTES: i64 = 30;

/// Storage key holding the serialized session.
pub const SESSION_STORAGE_KEY: &str = "exp_session";

/// A visitor session for event correlation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session ID
    pub id: Uuid,
    /// Session start time
    pub created_at: DateTime<Utc>,
    /// Last time the session was read
    pub last_touched_at: DateTime<Utc>,
    /// Session is invalid after this instant
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Creates a new session.
    pub fn new(now: DateTime<Utc>, timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_touched_at: now,
            expires_at: now + timeout,
        }
    }

    /// Checks if the session has timed out.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Refreshes the last-touch timestamp and pushes out expiry.
    pub fn touch(&mut self, now: DateTime<Utc>, timeout: Duration) {
        self.last_touched_at = now;
        self.expires_at = now + timeout;
    }

    /// Returns the session duration.
    pub fn duration(&self) -> Duration {
        self.last_touched_at - self.created_at
    }
}

/// Owns the session id and browser fingerprint.
///
/// When storage fails the store keeps going with an in-memory session that
/// does not survive a reload.
pub struct IdentityStore {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn DeviceProbe>,
    timeout: Duration,
    /// In-memory mirror of the session; the only copy in degraded mode
    current: Mutex<Option<Session>>,
    degraded: AtomicBool,
    fingerprint: OnceLock<String>,
}

impl IdentityStore {
    pub fn new(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        probe: Arc<dyn DeviceProbe>,
    ) -> Self {
        Self {
            storage,
            clock,
            probe,
            timeout: Duration::minutes(SESSION_TIMEOUT_MINUTES),
            current: Mutex::new(None),
            degraded: AtomicBool::new(false),
            fingerprint: OnceLock::new(),
        }
    }

    /// Overrides the inactivity timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the current session id, rotating it after inactivity.
    ///
    /// Every call refreshes the last-touch timestamp.
    pub fn session_id(&self) -> String {
        self.session().id.to_string()
    }

    /// Returns the current session, rotating it after inactivity.
    pub fn session(&self) -> Session {
        let now = self.clock.now();
        let mut current = self.current.lock();

        // Once persisting has failed, storage may read back nothing; the
        // in-memory copy is then the live session.
        let stored = match self.load() {
            Ok(None) if self.is_degraded() => current.clone(),
            Ok(stored) => stored,
            Err(e) => {
                self.note_degraded(&e);
                current.clone()
            }
        };

        let session = match stored {
            Some(mut session) if !session.is_expired(now) => {
                session.touch(now, self.timeout);
                session
            }
            previous => {
                let session = Session::new(now, self.timeout);
                debug!(
                    session_id = %session.id,
                    rotated = previous.is_some(),
                    previous_duration_secs = previous.as_ref().map(|p| p.duration().num_seconds()),
                    "Started new session"
                );
                session
            }
        };

        if let Err(e) = self.persist(&session) {
            self.note_degraded(&e);
        }

        *current = Some(session.clone());
        session
    }

    /// Returns the browser fingerprint, computed once per process.
    pub fn fingerprint(&self) -> String {
        self.fingerprint
            .get_or_init(|| compute_fingerprint(self.probe.as_ref()))
            .clone()
    }

    /// Probe the fingerprint is derived from.
    pub fn probe(&self) -> &dyn DeviceProbe {
        self.probe.as_ref()
    }

    /// Whether storage has failed and identity is held in memory only.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn load(&self) -> Result<Option<Session>> {
        let Some(raw) = self.storage.get(SESSION_STORAGE_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable stored session");
                Ok(None)
            }
        }
    }

    fn persist(&self, session: &Session) -> Result<()> {
        let raw = serde_json::to_string(session)?;
        self.storage.set(SESSION_STORAGE_KEY, &raw)
    }

    fn note_degraded(&self, error: &crate::Error) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(error = %error, "Session storage unavailable, keeping session in memory");
        }
    }
}

/// Derives the fingerprint from device signals.
///
/// Not unique. Collisions only mean two visitors share a bucket.
pub fn compute_fingerprint(probe: &dyn DeviceProbe) -> String {
    let signals = probe.signals();
    let screen = format!(
        "{}x{}x{}",
        signals.screen_width.unwrap_or(0),
        signals.screen_height.unwrap_or(0),
        signals.color_depth.unwrap_or(0)
    );

    let components = [
        signals.user_agent.unwrap_or_default(),
        signals.language.unwrap_or_default(),
        screen,
        signals.timezone_offset_minutes.unwrap_or(0).to_string(),
        signals.canvas_signature.unwrap_or_default(),
    ];

    short_hash(&components.join("|"))
}
