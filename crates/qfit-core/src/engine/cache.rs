use nalgebra::Point3;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Coordinates are snapped to this grid (Å) before lookup and sampling.
pub const COORDINATE_QUANTUM: f64 = 1e-4;

pub const DEFAULT_CACHE_CAPACITY: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Identity of the sampled atom subset (a fragment index).
    pub subset: usize,
    pub snapshot: Vec<[i64; 3]>,
}

impl CacheKey {
    pub fn new(subset: usize, coordinates: impl Iterator<Item = Point3<f64>>) -> Self {
        Self {
            subset,
            snapshot: coordinates.map(|p| quantise(&p)).collect(),
        }
    }

    /// The snapped coordinates the key stands for.
    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.snapshot
            .iter()
            .map(|q| Point3::new(q[0] as f64, q[1] as f64, q[2] as f64) * COORDINATE_QUANTUM)
            .collect()
    }
}

fn quantise(point: &Point3<f64>) -> [i64; 3] {
    [point.x, point.y, point.z].map(|v| (v / COORDINATE_QUANTUM).round() as i64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

/// Shared memo of sampled densities for rigid atom subsets.
///
/// Values depend only on the key, so concurrent fills and evictions never
/// change results.
#[derive(Debug)]
pub struct ScoreCache {
    entries: RwLock<HashMap<CacheKey, Arc<[f64]>>>,
    capacity: usize,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl Default for ScoreCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl ScoreCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn get_or_insert_with(
        &self,
        key: CacheKey,
        compute: impl FnOnce(&CacheKey) -> Vec<f64>,
    ) -> Arc<[f64]> {
        if let Some(values) = self.entries.read().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(values);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let values: Arc<[f64]> = compute(&key).into();

        let mut entries = self.entries.write();
        if entries.len() >= self.capacity {
            entries.clear();
        }
        entries.insert(key, Arc::clone(&values));
        values
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.read().len(),
        }
    }
}
