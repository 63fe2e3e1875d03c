//! Compiled LUT cache keyed by file path.
//!
//! Parsing, normalizing and compiling a LUT is expensive, so each distinct
//! path is compiled at most once until it is invalidated. Thread-safe:
//! concurrent misses on one path share a single compile, while misses on
//! different paths proceed independently.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lutfx_compute::{CpuBackend, LutCache};
//!
//! let cache = LutCache::new(Arc::new(CpuBackend::new()));
//! let lut = cache.get_or_compile("look.cube")?;
//! cache.invalidate("look.cube"); // file changed on disk
//! ```

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use lutfx_lut::{cube, normalize, Dimension, LutResult, NormalizedLut, RawCube};
use tracing::{debug, trace, warn};

use crate::backend::GraphicsBackend;
use crate::ComputeResult;

/// Source of parsed .cube tables.
pub trait CubeReader: Send + Sync {
    /// Parse and validate the table at `path`.
    fn read(&self, path: &Path) -> LutResult<RawCube>;
}

/// Reads .cube files from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct CubeFileReader;

impl CubeReader for CubeFileReader {
    fn read(&self, path: &Path) -> LutResult<RawCube> {
        cube::read(path)
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// Entry limit; the oldest entry is evicted past it (None = unbounded).
    pub max_entries: Option<usize>,
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests served from the cache.
    pub hits: u64,
    /// Requests that started a compile.
    pub misses: u64,
    /// Successful compiles.
    pub compiles: u64,
    /// Failed compiles.
    pub failures: u64,
    /// Entries dropped by `invalidate`/`invalidate_all`.
    pub invalidations: u64,
}

impl CacheStats {
    /// Hit rate as percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// A LUT compiled by the backend, owned by its cache entry.
#[derive(Debug)]
pub struct CompiledLut<L> {
    dimension: Dimension,
    size: usize,
    generation: u64,
    handle: L,
}

impl<L> CompiledLut<L> {
    /// Normalize `cube` and compile it on `backend`.
    pub fn compile<B>(backend: &B, cube: &RawCube) -> ComputeResult<Self>
    where
        B: GraphicsBackend<Lut = L> + ?Sized,
    {
        let generation = backend.device_generation();
        let handle = match normalize(cube)? {
            NormalizedLut::OneD(tables) => backend.compile_table_transfer(&tables)?,
            NormalizedLut::ThreeD(volume) => backend.compile_volumetric_lookup(
                volume.extents(),
                volume.strides(),
                volume.as_bytes(),
            )?,
        };

        Ok(Self {
            dimension: cube.dimension,
            size: cube.size,
            generation,
            handle,
        })
    }

    /// Dimension of the source table.
    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Grid edge length of the source table.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Device generation the handle was compiled against.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Backend handle.
    pub fn handle(&self) -> &L {
        &self.handle
    }
}

type Shared<L> = Arc<CompiledLut<L>>;

/// A compile in progress, shared by every caller that missed on its path.
struct InFlight<L> {
    result: Mutex<Option<ComputeResult<Shared<L>>>>,
    ready: Condvar,
    /// Set when the path is invalidated mid-compile. The slot is then
    /// detached from the in-flight map and its result is handed to waiting
    /// callers but not cached.
    stale: AtomicBool,
}

impl<L> InFlight<L> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
            stale: AtomicBool::new(false),
        }
    }

    fn publish(&self, result: ComputeResult<Shared<L>>) {
        *lock(&self.result) = Some(result);
        self.ready.notify_all();
    }

    fn wait(&self) -> ComputeResult<Shared<L>> {
        let mut guard = lock(&self.result);
        loop {
            if let Some(result) = guard.as_ref() {
                return result.clone();
            }
            guard = self.ready.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct Entries<L> {
    map: HashMap<PathBuf, Shared<L>>,
    /// Insertion order, for `max_entries` eviction.
    order: VecDeque<PathBuf>,
}

impl<L> Entries<L> {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn insert(&mut self, path: PathBuf, lut: Shared<L>, max_entries: Option<usize>) {
        if self.map.insert(path.clone(), lut).is_none() {
            self.order.push_back(path);
        }
        if let Some(max) = max_entries {
            while self.map.len() > max.max(1) {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                trace!(path = %oldest.display(), "evicting LUT");
                self.map.remove(&oldest);
            }
        }
    }

    fn remove(&mut self, path: &Path) -> bool {
        if self.map.remove(path).is_some() {
            self.order.retain(|p| p != path);
            true
        } else {
            false
        }
    }

    fn clear(&mut self) -> usize {
        let n = self.map.len();
        self.map.clear();
        self.order.clear();
        n
    }
}

/// Sentinel for "no device observed yet".
const NO_DEVICE: u64 = u64::MAX;

/// Path-keyed cache of compiled LUTs.
///
/// Lock order is `inflight` then `entries`; `stats` is always taken last
/// and never held across another acquisition.
pub struct LutCache<B: GraphicsBackend, R = CubeFileReader> {
    backend: Arc<B>,
    reader: R,
    config: CacheConfig,
    /// Last device generation seen.
    device: AtomicU64,
    entries: RwLock<Entries<B::Lut>>,
    inflight: Mutex<HashMap<PathBuf, Arc<InFlight<B::Lut>>>>,
    stats: RwLock<CacheStats>,
}

impl<B: GraphicsBackend> LutCache<B, CubeFileReader> {
    /// Creates a cache reading .cube files from disk.
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_reader(backend, CubeFileReader)
    }
}

impl<B: GraphicsBackend, R: CubeReader> LutCache<B, R> {
    /// Creates a cache with a custom table source.
    pub fn with_reader(backend: Arc<B>, reader: R) -> Self {
        Self {
            backend,
            reader,
            config: CacheConfig::default(),
            device: AtomicU64::new(NO_DEVICE),
            entries: RwLock::new(Entries::new()),
            inflight: Mutex::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Backend the cache compiles on.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Table source.
    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the compiled LUT for `path`, compiling it on a miss.
    ///
    /// On failure nothing is cached; every caller that was waiting on the
    /// same compile receives the same error.
    pub fn get_or_compile(&self, path: impl AsRef<Path>) -> ComputeResult<Shared<B::Lut>> {
        let path = path.as_ref();
        self.observe_device(self.backend.device_generation());

        if let Some(lut) = self.lookup(path) {
            return Ok(lut);
        }

        let slot = {
            let mut inflight = lock(&self.inflight);
            // Leaders publish to `entries` before leaving `inflight`, so a
            // second look under this lock cannot miss a finished compile.
            if let Some(lut) = self.lookup(path) {
                return Ok(lut);
            }
            if let Some(slot) = inflight.get(path) {
                let slot = Arc::clone(slot);
                drop(inflight);
                trace!(path = %path.display(), "waiting on in-flight LUT compile");
                return slot.wait();
            }
            let slot = Arc::new(InFlight::new());
            inflight.insert(path.to_path_buf(), Arc::clone(&slot));
            slot
        };

        write(&self.stats).misses += 1;
        debug!(path = %path.display(), backend = self.backend.name(), "compiling LUT");

        let result = self
            .reader
            .read(path)
            .map_err(Into::into)
            .and_then(|cube| CompiledLut::compile(&*self.backend, &cube))
            .map(Arc::new);

        {
            let mut inflight = lock(&self.inflight);
            if let Ok(lut) = &result {
                if slot.stale.load(Ordering::SeqCst) {
                    debug!(path = %path.display(), "LUT invalidated during compile, not caching");
                } else {
                    write(&self.entries).insert(
                        path.to_path_buf(),
                        Arc::clone(lut),
                        self.config.max_entries,
                    );
                }
            }
            // An invalidation may have replaced this slot with a newer compile.
            if inflight.get(path).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                inflight.remove(path);
            }
        }

        match &result {
            Ok(_) => write(&self.stats).compiles += 1,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "LUT compile failed");
                write(&self.stats).failures += 1;
            }
        }

        slot.publish(result.clone());
        result
    }

    /// Drops the entry for `path`, if any.
    ///
    /// A compile already running for `path` still answers the callers
    /// waiting on it, but its result is not cached and later calls start a
    /// fresh compile.
    pub fn invalidate(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut inflight = lock(&self.inflight);
        if let Some(slot) = inflight.remove(path) {
            slot.stale.store(true, Ordering::SeqCst);
        }
        let removed = write(&self.entries).remove(path);
        drop(inflight);

        if removed {
            debug!(path = %path.display(), "LUT invalidated");
            write(&self.stats).invalidations += 1;
        }
    }

    /// Drops every entry.
    pub fn invalidate_all(&self) {
        let mut inflight = lock(&self.inflight);
        for (_, slot) in inflight.drain() {
            slot.stale.store(true, Ordering::SeqCst);
        }
        let removed = write(&self.entries).clear();
        drop(inflight);

        debug!(removed, "LUT cache cleared");
        write(&self.stats).invalidations += removed as u64;
    }

    /// Records the backend's device generation, clearing the cache when it
    /// differs from the last one seen. Returns true if the cache was cleared.
    pub fn observe_device(&self, generation: u64) -> bool {
        let previous = self.device.swap(generation, Ordering::SeqCst);
        if previous == NO_DEVICE || previous == generation {
            return false;
        }
        debug!(previous, generation, "device changed, dropping compiled LUTs");
        self.invalidate_all();
        true
    }

    /// True if a compiled LUT for `path` is cached.
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        read(&self.entries).map.contains_key(path.as_ref())
    }

    /// Number of cached LUTs.
    pub fn len(&self) -> usize {
        read(&self.entries).map.len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        read(&self.stats).clone()
    }

    fn lookup(&self, path: &Path) -> Option<Shared<B::Lut>> {
        let lut = read(&self.entries).map.get(path).cloned()?;
        write(&self.stats).hits += 1;
        trace!(path = %path.display(), "LUT cache hit");
        Some(lut)
    }
}

// The cache never leaves shared state half-updated while holding a lock,
// so a poisoned lock still guards consistent data.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CpuBackend;
    use lutfx_lut::LutError;

    struct MapReader(HashMap<PathBuf, RawCube>);

    impl CubeReader for MapReader {
        fn read(&self, path: &Path) -> LutResult<RawCube> {
            self.0.get(path).cloned().ok_or(LutError::NotFound {
                path: path.to_path_buf(),
                kind: std::io::ErrorKind::NotFound,
            })
        }
    }

    fn cache_with(paths: &[&str]) -> LutCache<CpuBackend, MapReader> {
        let tables = paths
            .iter()
            .map(|p| (PathBuf::from(p), RawCube::identity(Dimension::OneD, 4)))
            .collect();
        LutCache::with_reader(Arc::new(CpuBackend::new()), MapReader(tables))
    }

    #[test]
    fn max_entries_evicts_oldest() {
        let cache = cache_with(&["a", "b", "c"]).with_config(CacheConfig {
            max_entries: Some(2),
        });

        cache.get_or_compile("a").unwrap();
        cache.get_or_compile("b").unwrap();
        cache.get_or_compile("c").unwrap();

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let cache = cache_with(&["a"]);
        cache.get_or_compile("a").unwrap();
        cache.get_or_compile("a").unwrap();
        cache.get_or_compile("a").unwrap();
        let _ = cache.get_or_compile("missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.compiles, 1);
        assert_eq!(stats.failures, 1);
        assert!((stats.hit_rate() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn invalidating_unknown_path_is_a_no_op() {
        let cache = cache_with(&["a"]);
        cache.get_or_compile("a").unwrap();
        cache.invalidate("zzz");

        assert!(cache.contains("a"));
        assert_eq!(cache.stats().invalidations, 0);
    }

    #[test]
    fn first_device_observation_keeps_entries() {
        let cache = cache_with(&["a"]);
        assert!(!cache.observe_device(0));
        cache.get_or_compile("a").unwrap();
        assert!(!cache.observe_device(0));
        assert!(cache.contains("a"));
        assert!(cache.observe_device(7));
        assert!(cache.is_empty());
    }
}
