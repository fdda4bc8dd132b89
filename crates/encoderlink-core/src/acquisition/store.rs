//! Sample store
//!
//! Holds every record captured during one acquisition session. The poller
//! appends, consumers take snapshots. Nothing is ever dropped implicitly; the
//! store only empties on [`SampleStore::reset`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::protocol::RawSample;

/// Identity of one acquisition session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Unique id, renewed on every reset
    pub id: Uuid,
    /// When the session started
    pub started_at: DateTime<Utc>,
}

impl SessionInfo {
    fn begin() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    samples: Vec<RawSample>,
    session: SessionInfo,
}

/// Shared, append-only buffer of samples for one session
///
/// Cloning gives another handle to the same store.
#[derive(Debug, Clone)]
pub struct SampleStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for SampleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleStore {
    /// Create an empty store and start a session
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                samples: Vec::new(),
                session: SessionInfo::begin(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Appends are single pushes, so a panicking holder cannot leave a torn Vec
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a sample at the tail
    pub fn append(&self, sample: RawSample) {
        self.lock().samples.push(sample);
    }

    /// Append a batch of samples under a single lock
    pub fn extend<I: IntoIterator<Item = RawSample>>(&self, samples: I) {
        self.lock().samples.extend(samples);
    }

    /// Copy out the current contents
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            session: inner.session.clone(),
            samples: inner.samples.clone(),
        }
    }

    /// Clear all samples and begin a new session
    pub fn reset(&self) -> SessionInfo {
        let mut inner = self.lock();
        inner.samples = Vec::new();
        inner.session = SessionInfo::begin();
        inner.session.clone()
    }

    /// Number of stored samples
    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.lock().samples.is_empty()
    }

    /// Current session
    pub fn session(&self) -> SessionInfo {
        self.lock().session.clone()
    }
}

/// Point-in-time copy of a [`SampleStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    session: SessionInfo,
    samples: Vec<RawSample>,
}

impl Snapshot {
    /// Session the samples belong to
    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    /// Take ownership of the samples
    pub fn into_samples(self) -> Vec<RawSample> {
        self.samples
    }
}

impl Deref for Snapshot {
    type Target = [RawSample];

    fn deref(&self) -> &[RawSample] {
        &self.samples
    }
}
