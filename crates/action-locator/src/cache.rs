//! Healed-locator cache
//!
//! [`LocatorCache`] is owned by one session. Writes always replace the entry
//! for a fingerprint. Invalidation marks an entry stale instead of removing
//! it, so the history of what was cached stays inspectable. An optional
//! [`SharedLocatorCache`] layer carries healed locators across runs.

use action_primitives::LocatorCandidate;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use selfheal_core_types::StepFingerprint;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::LocatorError;

/// One cache slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub candidate: LocatorCandidate,
    #[serde(default)]
    pub stale: bool,
    pub written_at: DateTime<Utc>,
}

impl CacheEntry {
    fn fresh(candidate: LocatorCandidate) -> Self {
        Self {
            candidate,
            stale: false,
            written_at: Utc::now(),
        }
    }
}

/// Cross-run cache shared by concurrent sessions.
///
/// Reads go through the sharded map. Healing of a fingerprint is serialized
/// by [`SharedLocatorCache::heal_lock`].
#[derive(Default)]
pub struct SharedLocatorCache {
    entries: DashMap<StepFingerprint, CacheEntry>,
    heal_locks: DashMap<StepFingerprint, Arc<Mutex<()>>>,
}

impl SharedLocatorCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Current non-stale candidate
    pub fn get(&self, fingerprint: &StepFingerprint) -> Option<LocatorCandidate> {
        self.entries
            .get(fingerprint)
            .filter(|entry| !entry.stale)
            .map(|entry| entry.candidate.clone())
    }

    pub fn write(&self, fingerprint: StepFingerprint, candidate: LocatorCandidate) {
        self.entries.insert(fingerprint, CacheEntry::fresh(candidate));
    }

    /// Mark stale if the live entry is still the locator that failed.
    ///
    /// An entry a peer rewrote since `failed` was read is left alone. Callers
    /// hold [`SharedLocatorCache::heal_lock`] for the fingerprint.
    pub fn invalidate(&self, fingerprint: &StepFingerprint, failed: &LocatorCandidate) -> bool {
        match self.entries.get_mut(fingerprint) {
            Some(mut entry) if !entry.stale && same_locator(&entry.candidate, failed) => {
                entry.stale = true;
                true
            }
            _ => false,
        }
    }

    /// Per-fingerprint async lock held while a step is being healed
    pub fn heal_lock(&self, fingerprint: &StepFingerprint) -> Arc<Mutex<()>> {
        self.heal_locks
            .entry(fingerprint.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a cache file. A missing file yields an empty cache.
    pub fn load(path: impl AsRef<Path>) -> Result<Arc<Self>, LocatorError> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no shared locator cache on disk");
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path).map_err(|err| LocatorError::CachePersistence {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        let stored: BTreeMap<StepFingerprint, CacheEntry> =
            serde_json::from_str(&raw).map_err(|err| LocatorError::Serialization(err.to_string()))?;

        let cache = Self::default();
        for (fingerprint, entry) in stored {
            cache.entries.insert(fingerprint, entry);
        }
        info!(
            path = %path.display(),
            entries = cache.entries.len(),
            "loaded shared locator cache"
        );
        Ok(Arc::new(cache))
    }

    /// Persist live entries as pretty JSON, keyed by fingerprint
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), LocatorError> {
        let path = path.as_ref();
        let stored: BTreeMap<StepFingerprint, CacheEntry> = self
            .entries
            .iter()
            .filter(|entry| !entry.stale)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let raw = serde_json::to_string_pretty(&stored)
            .map_err(|err| LocatorError::Serialization(err.to_string()))?;

        let persistence = |err: std::io::Error| LocatorError::CachePersistence {
            path: path.display().to_string(),
            reason: err.to_string(),
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(persistence)?;
        }
        std::fs::write(path, raw).map_err(persistence)?;
        info!(path = %path.display(), entries = stored.len(), "saved shared locator cache");
        Ok(())
    }
}

/// Session-scoped cache: fingerprint -> currently authoritative candidate
#[derive(Default)]
pub struct LocatorCache {
    entries: HashMap<StepFingerprint, CacheEntry>,
    shared: Option<Arc<SharedLocatorCache>>,
}

impl LocatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer a cross-run cache under this one
    pub fn with_shared(mut self, shared: Arc<SharedLocatorCache>) -> Self {
        self.shared = Some(shared);
        self
    }

    pub fn shared(&self) -> Option<&Arc<SharedLocatorCache>> {
        self.shared.as_ref()
    }

    /// Live candidate for the fingerprint. A stale session entry hides the
    /// shared layer.
    pub fn get(&self, fingerprint: &StepFingerprint) -> Option<LocatorCandidate> {
        match self.entries.get(fingerprint) {
            Some(entry) if entry.stale => None,
            Some(entry) => Some(entry.candidate.clone()),
            None => self
                .shared
                .as_ref()
                .and_then(|shared| shared.get(fingerprint)),
        }
    }

    /// Replace the entry for the fingerprint
    pub fn write(&mut self, fingerprint: StepFingerprint, candidate: LocatorCandidate) {
        debug!(
            fingerprint = fingerprint.short(),
            locator = %candidate,
            "cache write"
        );
        if let Some(shared) = &self.shared {
            shared.write(fingerprint.clone(), candidate.clone());
        }
        self.entries.insert(fingerprint, CacheEntry::fresh(candidate));
    }

    /// Mark the entry stale in both layers where it still holds `failed`;
    /// returns whether anything live was invalidated
    pub fn invalidate(&mut self, fingerprint: &StepFingerprint, failed: &LocatorCandidate) -> bool {
        let shared = self
            .shared
            .as_ref()
            .map(|shared| shared.invalidate(fingerprint, failed))
            .unwrap_or(false);
        let local = match self.entries.get_mut(fingerprint) {
            Some(entry) if !entry.stale && same_locator(&entry.candidate, failed) => {
                entry.stale = true;
                true
            }
            _ => false,
        };
        if local || shared {
            debug!(fingerprint = fingerprint.short(), "cache invalidate");
        }
        local || shared
    }

    /// Raw entry, including stale ones
    pub fn entry(&self, fingerprint: &StepFingerprint) -> Option<&CacheEntry> {
        self.entries.get(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn same_locator(a: &LocatorCandidate, b: &LocatorCandidate) -> bool {
    a.strategy == b.strategy && a.selector == b.selector
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::{CandidateSource, Locator};

    fn fingerprint() -> StepFingerprint {
        StepFingerprint::derive("click", "Login button", "https://app.test/login")
    }

    fn healed() -> LocatorCandidate {
        LocatorCandidate::new(
            Locator::role_name("button", "Sign In"),
            0.9,
            CandidateSource::HealedTier1,
        )
    }

    #[test]
    fn write_then_read_returns_identical_candidate() {
        let mut cache = LocatorCache::new();
        cache.write(fingerprint(), healed());
        assert_eq!(cache.get(&fingerprint()), Some(healed()));
    }

    #[test]
    fn write_replaces_previous_entry() {
        let mut cache = LocatorCache::new();
        cache.write(fingerprint(), healed());
        let replacement = LocatorCandidate::new(
            Locator::exact_text("Sign In"),
            0.95,
            CandidateSource::HealedTier1,
        );
        cache.write(fingerprint(), replacement.clone());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&fingerprint()), Some(replacement));
    }

    #[test]
    fn invalidate_marks_stale_without_deleting() {
        let mut cache = LocatorCache::new();
        cache.write(fingerprint(), healed());
        assert!(cache.invalidate(&fingerprint(), &healed()));
        assert!(cache.get(&fingerprint()).is_none());
        let entry = cache.entry(&fingerprint()).unwrap();
        assert!(entry.stale);
        assert_eq!(entry.candidate, healed());
        assert!(!cache.invalidate(&fingerprint(), &healed()));
    }

    #[test]
    fn shared_layer_feeds_new_sessions() {
        let shared = SharedLocatorCache::new();
        let mut first = LocatorCache::new().with_shared(shared.clone());
        first.write(fingerprint(), healed());

        let mut second = LocatorCache::new().with_shared(shared.clone());
        assert_eq!(second.get(&fingerprint()), Some(healed()));

        assert!(second.invalidate(&fingerprint(), &healed()));
        assert!(shared.get(&fingerprint()).is_none());
    }

    #[test]
    fn outdated_failure_leaves_peer_entry_live() {
        let shared = SharedLocatorCache::new();
        let old =
            LocatorCandidate::new(Locator::css("#old-login"), 0.9, CandidateSource::HealedTier1);
        shared.write(fingerprint(), old.clone());

        let mut slow = LocatorCache::new().with_shared(shared.clone());
        assert_eq!(slow.get(&fingerprint()), Some(old.clone()));

        let mut peer = LocatorCache::new().with_shared(shared.clone());
        peer.write(fingerprint(), healed());

        assert!(!slow.invalidate(&fingerprint(), &old));
        assert_eq!(shared.get(&fingerprint()), Some(healed()));
        assert_eq!(slow.get(&fingerprint()), Some(healed()));
    }

    #[test]
    fn save_and_load_skip_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("locators.json");

        let shared = SharedLocatorCache::new();
        shared.write(fingerprint(), healed());
        let other = StepFingerprint::derive("fill", "Email", "https://app.test/login");
        shared.write(other.clone(), healed());
        shared.invalidate(&other, &healed());
        shared.save(&path).unwrap();

        let loaded = SharedLocatorCache::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(&fingerprint()), Some(healed()));
    }

    #[tokio::test]
    async fn heal_lock_is_per_fingerprint() {
        let shared = SharedLocatorCache::new();
        let lock = shared.heal_lock(&fingerprint());
        let _guard = lock.lock().await;

        let same = shared.heal_lock(&fingerprint());
        assert!(same.try_lock().is_err());

        let other = shared.heal_lock(&StepFingerprint::derive("click", "Logout", "https://app.test/"));
        assert!(other.try_lock().is_ok());
    }
}
