//! Memoization of per-track analysis results.
//!
//! Results are pure functions of the decoded signal, so they are keyed by a
//! caller-supplied track id plus a fingerprint of the samples. A changed
//! source produces a different fingerprint and misses.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::analysis::track::TrackAnalysis;
use crate::core::types::PcmSignal;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Cache key: stable track identity plus content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackKey {
    pub id: String,
    pub fingerprint: u64,
}

impl TrackKey {
    pub fn new(id: impl Into<String>, signal: &PcmSignal) -> Self {
        Self {
            id: id.into(),
            fingerprint: fingerprint_signal(signal),
        }
    }
}

#[inline]
fn fnv1a(mut hash: u64, bytes: &[u8]) -> u64 {
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// FNV-1a hash of the sample rate, channel count and raw sample bits.
pub fn fingerprint_signal(signal: &PcmSignal) -> u64 {
    let mut hash = fnv1a(FNV_OFFSET, &signal.sample_rate().to_le_bytes());
    hash = fnv1a(hash, &signal.channels().to_le_bytes());
    for s in signal.samples() {
        hash = fnv1a(hash, &s.to_bits().to_le_bytes());
    }
    hash
}

/// Storage for analysis results, shared across worker threads.
pub trait AnalysisCache: Send + Sync {
    /// Returns the stored result if `key.id` is present with the same fingerprint.
    fn get(&self, key: &TrackKey) -> Option<TrackAnalysis>;

    /// Stores a result, replacing any previous entry for `key.id`.
    fn insert(&self, key: TrackKey, analysis: TrackAnalysis);

    /// Removes the entry for `id`. Returns true if one existed.
    fn invalidate(&self, id: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process cache over `RwLock<HashMap>`.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (u64, TrackAnalysis)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnalysisCache for MemoryCache {
    fn get(&self, key: &TrackKey) -> Option<TrackAnalysis> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        match entries.get(&key.id) {
            Some((fingerprint, analysis)) if *fingerprint == key.fingerprint => Some(analysis.clone()),
            Some(_) => {
                log::debug!("Cache entry for '{}' is stale", key.id);
                None
            }
            None => None,
        }
    }

    fn insert(&self, key: TrackKey, analysis: TrackAnalysis) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.id, (key.fingerprint, analysis));
    }

    fn invalidate(&self, id: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(id).is_some()
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}
