//! LRU cache of per-page scale estimates

use std::num::NonZeroUsize;

use lru::LruCache;

use super::estimator::ScaleEstimate;

/// LRU cache for scale estimates, keyed by page index
pub struct EstimateCache {
    cache: LruCache<usize, ScaleEstimate>,
}

impl EstimateCache {
    /// Create a new cache with the given capacity (at least one entry)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    /// Get a cached estimate, promoting it in the LRU order
    #[must_use]
    pub fn get(&mut self, page: usize) -> Option<ScaleEstimate> {
        self.cache.get(&page).copied()
    }

    /// Check if a page is cached without promoting it
    #[must_use]
    pub fn contains(&self, page: usize) -> bool {
        self.cache.contains(&page)
    }

    pub fn insert(&mut self, estimate: ScaleEstimate) {
        self.cache.put(estimate.page, estimate);
    }

    pub fn invalidate_all(&mut self) {
        self.cache.clear();
    }

    pub fn invalidate_page(&mut self, page: usize) {
        self.cache.pop(&page);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::estimator::ScaleSignals;

    fn estimate(page: usize) -> ScaleEstimate {
        ScaleEstimate {
            page,
            scale: 4.0,
            signals: ScaleSignals::default(),
            capped: false,
            fallback: false,
        }
    }

    #[test]
    fn cache_insert_and_get() {
        let mut cache = EstimateCache::new(10);
        cache.insert(estimate(3));

        assert!(cache.contains(3));
        assert_eq!(cache.get(3).map(|e| e.scale), Some(4.0));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_lru_eviction() {
        let mut cache = EstimateCache::new(2);
        for page in 0..3 {
            cache.insert(estimate(page));
        }

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(0));
        assert!(cache.contains(1));
        assert!(cache.contains(2));
    }

    #[test]
    fn cache_invalidation() {
        let mut cache = EstimateCache::new(10);
        for page in 0..5 {
            cache.insert(estimate(page));
        }
        cache.invalidate_page(2);
        assert!(!cache.contains(2));
        assert_eq!(cache.len(), 4);

        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_capacity_holds_one() {
        assert_eq!(EstimateCache::new(0).capacity(), 1);
    }
}
