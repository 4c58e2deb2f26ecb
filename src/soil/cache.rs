//! Hour-bucket cache for resolved soil state
//!
//! The key carries the `YYYY-MM-DD-HH` bucket, so an entry is only ever
//! served within the hour it was computed in. Inserting into a new bucket
//! drops every entry from older buckets.

use crate::soil::resolver::ResolvedSoilState;
use chrono::NaiveDateTime;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub device_id: String,
    pub field_id: String,
    pub hour_bucket: String,
}

impl CacheKey {
    pub fn new(device_id: &str, field_id: &str, now: NaiveDateTime) -> Self {
        Self {
            device_id: device_id.to_string(),
            field_id: field_id.to_string(),
            hour_bucket: hour_bucket(now),
        }
    }
}

pub fn hour_bucket(now: NaiveDateTime) -> String {
    now.format("%Y-%m-%d-%H").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug)]
pub struct SoilStateCache {
    enabled: bool,
    entries: DashMap<CacheKey, ResolvedSoilState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SoilStateCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn get(&self, key: &CacheKey) -> Option<ResolvedSoilState> {
        if !self.enabled {
            return None;
        }
        match self.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value().clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: CacheKey, state: ResolvedSoilState) {
        if !self.enabled {
            return;
        }
        let before = self.entries.len();
        self.entries
            .retain(|existing, _| existing.hour_bucket == key.hour_bucket);
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            debug!(
                evicted = evicted,
                bucket = %key.hour_bucket,
                "Evicted soil state from previous hours"
            );
        }
        self.entries.insert(key, state);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::ReadingSource;
    use crate::soil::{ParameterSource, SoilParameterSet};
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 12, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn state() -> ResolvedSoilState {
        ResolvedSoilState {
            parameters: SoilParameterSet::new(35.5, 25.0, 15.2, ParameterSource::Default),
            real_humidity: 25.0,
            real_humidity_source: ReadingSource::Default,
            history_rows: 0,
            is_real_data: false,
        }
    }

    #[test]
    fn test_hour_bucket_format() {
        assert_eq!(hour_bucket(at(7, 59)), "2025-12-01-07");
    }

    #[test]
    fn test_same_hour_hits_next_hour_misses() {
        let cache = SoilStateCache::new(true);
        cache.insert(CacheKey::new("D1", "F1", at(9, 5)), state());

        assert!(cache.get(&CacheKey::new("D1", "F1", at(9, 55))).is_some());
        assert!(cache.get(&CacheKey::new("D1", "F1", at(10, 0))).is_none());
        assert!(cache.get(&CacheKey::new("D2", "F1", at(9, 10))).is_none());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 2));
    }

    #[test]
    fn test_new_bucket_evicts_old_entries() {
        let cache = SoilStateCache::new(true);
        cache.insert(CacheKey::new("D1", "F1", at(9, 0)), state());
        cache.insert(CacheKey::new("D2", "F2", at(9, 30)), state());
        assert_eq!(cache.stats().entries, 2);

        cache.insert(CacheKey::new("D1", "F1", at(10, 1)), state());
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let cache = SoilStateCache::new(false);
        let key = CacheKey::new("D1", "F1", at(9, 0));
        cache.insert(key.clone(), state());
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.stats().entries, 0);
    }
}
