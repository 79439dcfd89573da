//! Round-robin credential rotation with rate-limit quarantine.
//!
//! ```text
//! AVAILABLE --[mark_unusable]--> RATE_LIMITED --[cooldown elapsed, if configured]--> AVAILABLE
//! ```
//!
//! Without a cooldown a rate-limited credential stays out of rotation until
//! the pool is rebuilt (process restart).

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// An authentication artifact for one provider: session token or API key.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    id: String,
    secret: String,
    /// Position inside the owning pool, assigned at pool construction.
    slot: usize,
}

impl Credential {
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            slot: 0,
        }
    }

    /// Build a credential from a bare API key, identified by its last four
    /// characters so logs never carry the full key.
    pub fn from_api_key(key: impl Into<String>) -> Self {
        let key = key.into();
        let tail: String = key
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        Self::new(format!("key-…{tail}"), key)
    }

    /// Parse a comma-separated credential list.
    ///
    /// Entries are either `name:secret` or a bare key. Blank entries are
    /// skipped.
    pub fn parse_list(raw: &str) -> Vec<Credential> {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.split_once(':') {
                Some((name, secret)) if !name.is_empty() && !secret.is_empty() => {
                    Credential::new(name, secret)
                }
                _ => Credential::from_api_key(entry),
            })
            .collect()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Available,
    RateLimited,
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialStatus::Available => write!(f, "available"),
            CredentialStatus::RateLimited => write!(f, "rate_limited"),
        }
    }
}

/// Point-in-time view of one pool slot, for telemetry and logs.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialState {
    pub id: String,
    pub status: CredentialStatus,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Slot {
    credential: Credential,
    status: CredentialStatus,
    last_used: Option<DateTime<Utc>>,
    limited_since: Option<Instant>,
}

#[derive(Debug)]
struct PoolInner {
    slots: Vec<Slot>,
    /// Next slot to try. Always `< slots.len()` when the pool is non-empty.
    index: usize,
}

/// Fixed-size, thread-safe rotation over the credentials of one provider.
///
/// Shared between dispatchers as `Arc<CredentialPool>`. The lock is held
/// only while reading/advancing the index and flipping statuses, never
/// across a backend call.
#[derive(Debug)]
pub struct CredentialPool {
    name: String,
    cooldown: Option<Duration>,
    inner: Mutex<PoolInner>,
}

impl CredentialPool {
    pub fn new(name: impl Into<String>, credentials: Vec<Credential>) -> Self {
        let slots = credentials
            .into_iter()
            .enumerate()
            .map(|(slot, mut credential)| {
                credential.slot = slot;
                Slot {
                    credential,
                    status: CredentialStatus::Available,
                    last_used: None,
                    limited_since: None,
                }
            })
            .collect();

        Self {
            name: name.into(),
            cooldown: None,
            inner: Mutex::new(PoolInner { slots, index: 0 }),
        }
    }

    /// Let rate-limited credentials rejoin the rotation after `cooldown`.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.lock_inner().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Acquires the inner mutex lock, recovering from poison if necessary.
    fn lock_inner(&self) -> std::sync::MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(pool = %self.name, "Recovered from poisoned mutex");
            poisoned.into_inner()
        })
    }

    /// Return the next available credential after the rotation index,
    /// wrapping around the pool at most once.
    ///
    /// `None` means every credential is rate-limited (or the pool is empty).
    pub fn next(&self) -> Option<Credential> {
        let mut inner = self.lock_inner();
        let len = inner.slots.len();
        let start = inner.index;

        for offset in 0..len {
            let idx = (start + offset) % len;
            let slot = &mut inner.slots[idx];
            self.maybe_recover(slot);

            if slot.status == CredentialStatus::Available {
                slot.last_used = Some(Utc::now());
                let credential = slot.credential.clone();
                inner.index = (idx + 1) % len;
                return Some(credential);
            }
        }

        None
    }

    /// Take a credential out of rotation after the provider throttled it.
    pub fn mark_unusable(&self, credential: &Credential) {
        let mut inner = self.lock_inner();

        let idx = match inner.slots.get(credential.slot) {
            Some(slot) if slot.credential.id == credential.id => Some(credential.slot),
            _ => inner
                .slots
                .iter()
                .position(|slot| slot.credential.id == credential.id),
        };

        let Some(idx) = idx else {
            tracing::warn!(pool = %self.name, credential = %credential.id, "Unknown credential, ignoring");
            return;
        };

        let slot = &mut inner.slots[idx];
        if slot.status != CredentialStatus::RateLimited {
            tracing::warn!(
                pool = %self.name,
                credential = %credential.id,
                "Credential rate-limited, removed from rotation"
            );
        }
        slot.status = CredentialStatus::RateLimited;
        slot.limited_since = Some(Instant::now());
    }

    pub fn available_count(&self) -> usize {
        let mut inner = self.lock_inner();
        let mut available = 0;
        for slot in inner.slots.iter_mut() {
            self.maybe_recover(slot);
            if slot.status == CredentialStatus::Available {
                available += 1;
            }
        }
        available
    }

    pub fn states(&self) -> Vec<CredentialState> {
        let mut inner = self.lock_inner();
        inner
            .slots
            .iter_mut()
            .map(|slot| {
                self.maybe_recover(slot);
                CredentialState {
                    id: slot.credential.id.clone(),
                    status: slot.status,
                    last_used: slot.last_used,
                }
            })
            .collect()
    }

    fn maybe_recover(&self, slot: &mut Slot) {
        if slot.status == CredentialStatus::RateLimited
            && let Some(cooldown) = self.cooldown
            && let Some(since) = slot.limited_since
            && since.elapsed() >= cooldown
        {
            tracing::info!(
                pool = %self.name,
                credential = %slot.credential.id,
                "Credential cooldown elapsed, back in rotation"
            );
            slot.status = CredentialStatus::Available;
            slot.limited_since = None;
        }
    }
}
