//! Viewport-driven tile loading: debounce, generation tracking, a
//! center-out priority queue, concurrency-capped starts, and stale-result
//! discard.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use crossbeam_channel::{unbounded, Receiver, Sender};
use fxhash::{FxHashMap, FxHashSet};

use crate::cache::TileCache;
use crate::config::{CacheConfig, TileLoaderConfig};
use crate::geo::{TileCoord, ViewportBounds};
use crate::prioritizer::{get_viewport_center_tile, get_visible_tiles, prioritize_by_distance};
use crate::scheduler::{Scheduler, TimerHandle};

/// The host-provided tile fetch/decode hook. `load_tile` is the only
/// suspension point in the whole core; everything else is synchronous.
#[async_trait]
pub trait TileSource<T>: Send + Sync {
    async fn load_tile(&self, coord: TileCoord, generation: u64) -> Result<T, String>;
}

/// Where a tile sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    Pending,
    Loading,
    Loaded,
    Error,
}

/// Everything the core knows about one tile.
#[derive(Debug, Clone)]
pub struct TileRecord<T> {
    pub coord: TileCoord,
    pub key: String,
    pub state: TileState,
    pub payload: Option<T>,
    pub error: Option<String>,
    pub generation: u64,
    loaded_at: Option<Instant>,
}

impl<T> TileRecord<T> {
    fn pending(coord: TileCoord, generation: u64) -> Self {
        Self {
            coord,
            key: coord.key(),
            state: TileState::Pending,
            payload: None,
            error: None,
            generation,
            loaded_at: None,
        }
    }
}

/// Snapshot of in-flight/queued counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadingStats {
    pub queued: usize,
    pub in_flight: usize,
    pub generation: u64,
}

enum CompletedLoad<T> {
    Success { key: String, generation: u64, payload: T },
    Failure { key: String, generation: u64, error: String },
}

struct LoaderState<T> {
    records: FxHashMap<String, TileRecord<T>>,
    queue: std::collections::VecDeque<String>,
    in_flight: FxHashSet<String>,
    load_generation: u64,
    last_zoom: Option<u8>,
    is_zooming: bool,
    pan_timer: Option<TimerHandle>,
    zoom_timer: Option<TimerHandle>,
}

impl<T> Default for LoaderState<T> {
    fn default() -> Self {
        Self {
            records: FxHashMap::default(),
            queue: std::collections::VecDeque::new(),
            in_flight: FxHashSet::default(),
            load_generation: 0,
            last_zoom: None,
            is_zooming: false,
            pan_timer: None,
            zoom_timer: None,
        }
    }
}

/// The viewport-driven loader. Owns the tile record map, queue, and
/// in-flight set; the cache is the only state it shares with readers.
///
/// A debounce callback can fire on any scheduler-owned thread, so every
/// method that needs both locks takes `state` before `cache`, and no
/// method holds both across a callback or await boundary. `get_tile` locks
/// only one at a time instead, by copying the payload out of the cache
/// guard before ever touching `state`.
pub struct TileLoader<T> {
    state: Mutex<LoaderState<T>>,
    cache: Mutex<TileCache<T>>,
    config: TileLoaderConfig,
    scheduler: Arc<dyn Scheduler>,
    source: Arc<dyn TileSource<T>>,
    size_estimator: Arc<dyn Fn(&T) -> usize + Send + Sync>,
    result_tx: Sender<CompletedLoad<T>>,
    result_rx: Receiver<CompletedLoad<T>>,
}

impl<T> TileLoader<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(
        loader_config: TileLoaderConfig,
        cache_config: CacheConfig,
        scheduler: Arc<dyn Scheduler>,
        source: Arc<dyn TileSource<T>>,
    ) -> Self {
        Self::with_size_estimator(
            loader_config,
            cache_config,
            scheduler,
            source,
            Arc::new(crate::cache::default_estimate_size),
        )
    }

    pub fn with_size_estimator(
        loader_config: TileLoaderConfig,
        cache_config: CacheConfig,
        scheduler: Arc<dyn Scheduler>,
        source: Arc<dyn TileSource<T>>,
        size_estimator: Arc<dyn Fn(&T) -> usize + Send + Sync>,
    ) -> Self {
        let (result_tx, result_rx) = unbounded();
        Self {
            state: Mutex::new(LoaderState::default()),
            cache: Mutex::new(TileCache::new(cache_config.max_size_mb)),
            config: loader_config,
            scheduler,
            source,
            size_estimator,
            result_tx,
            result_rx,
        }
    }

    /// Entry point for a pan or zoom change. Bumps the generation
    /// synchronously on zoom, then arms a debounce timer that commits the
    /// change once it fires.
    pub fn update_viewport(self: &Arc<Self>, bounds: ViewportBounds, zoom: u8) {
        let zoom_changed = {
            let mut state = self.state.lock().unwrap();
            let changed = state.last_zoom != Some(zoom);
            if changed {
                self.handle_zoom_change_locked(&mut state, zoom);
            }
            changed
        };

        let mut state = self.state.lock().unwrap();
        if let Some(handle) = state.pan_timer.take() {
            self.scheduler.cancel(handle);
        }
        if !zoom_changed {
            if let Some(handle) = state.zoom_timer.take() {
                self.scheduler.cancel(handle);
            }
        }

        if zoom_changed {
            state.is_zooming = true;
            let this = self.clone();
            let handle = self.scheduler.arm(
                self.config.zoom_debounce,
                Box::new(move || {
                    this.state.lock().unwrap().is_zooming = false;
                    this.process_view_change(bounds, zoom);
                }),
            );
            state.zoom_timer = Some(handle);
        } else {
            let this = self.clone();
            let handle = self.scheduler.arm(
                self.config.pan_debounce,
                Box::new(move || {
                    this.process_view_change(bounds, zoom);
                }),
            );
            state.pan_timer = Some(handle);
        }
    }

    fn handle_zoom_change_locked(&self, state: &mut LoaderState<T>, new_zoom: u8) {
        state.load_generation += 1;
        state.last_zoom = Some(new_zoom);
        state.queue.clear();

        self.cache.lock().unwrap().invalidate_old_generations(state.load_generation);

        let generation = state.load_generation;
        let stale_in_flight: Vec<String> = state
            .in_flight
            .iter()
            .filter(|k| state.records.get(*k).map(|r| r.generation < generation).unwrap_or(false))
            .cloned()
            .collect();
        for key in stale_in_flight {
            state.in_flight.remove(&key);
            if let Some(record) = state.records.get_mut(&key) {
                record.state = TileState::Pending;
            }
        }

        #[cfg(feature = "debug")]
        log::debug!("generation bumped to {generation} on zoom change to {new_zoom}");
    }

    /// Enumerates and enqueues the tiles a committed view change needs.
    pub fn process_view_change(&self, bounds: ViewportBounds, zoom: u8) {
        let visible = get_visible_tiles(&bounds, zoom);
        let center = get_viewport_center_tile(&bounds, zoom);
        let ordered = prioritize_by_distance(&visible, center);

        let mut state = self.state.lock().unwrap();
        let cache = self.cache.lock().unwrap();
        let generation = state.load_generation;

        for coord in ordered {
            let key = coord.key();
            if cache.has(&key) || state.queue.contains(&key) || state.in_flight.contains(&key) {
                continue;
            }
            match state.records.get_mut(&key) {
                Some(record) => {
                    record.generation = generation;
                    record.state = TileState::Pending;
                }
                None => {
                    state.records.insert(key.clone(), TileRecord::pending(coord, generation));
                }
            }
            state.queue.push_back(key);
        }
    }

    /// Drains completed loads, then starts new ones up to the per-frame
    /// and concurrency caps. Call once per render tick.
    pub fn process_queue(self: &Arc<Self>) {
        self.drain_results();

        let mut state = self.state.lock().unwrap();
        if state.is_zooming {
            return;
        }

        let mut starts_this_tick = 0;
        while state.in_flight.len() < self.config.max_concurrent_loads
            && starts_this_tick < self.config.max_starts_per_frame
        {
            let Some(key) = state.queue.pop_front() else { break };
            let generation = state.load_generation;
            let stale = match state.records.get(&key) {
                Some(record) => record.generation != generation,
                None => true,
            };
            if stale {
                continue;
            }

            state.in_flight.insert(key.clone());
            if let Some(record) = state.records.get_mut(&key) {
                record.state = TileState::Loading;
            }
            let coord = state.records.get(&key).map(|r| r.coord);
            drop(state);

            if let Some(coord) = coord {
                self.spawn_load(key, coord, generation);
            }
            starts_this_tick += 1;
            state = self.state.lock().unwrap();
        }
    }

    fn spawn_load(self: &Arc<Self>, key: String, coord: TileCoord, generation: u64) {
        let source = self.source.clone();
        let tx = self.result_tx.clone();

        #[cfg(feature = "tokio-runtime")]
        {
            tokio::spawn(async move {
                let result = source.load_tile(coord, generation).await;
                let completed = match result {
                    Ok(payload) => CompletedLoad::Success { key, generation, payload },
                    Err(error) => CompletedLoad::Failure { key, generation, error },
                };
                let _ = tx.send(completed);
            });
        }

        #[cfg(not(feature = "tokio-runtime"))]
        {
            panic!("TileLoader requires the `tokio-runtime` feature to start loads");
        }
    }

    /// Applies every completed load sitting in the result channel,
    /// discarding any whose generation has been superseded.
    fn drain_results(&self) {
        while let Ok(completed) = self.result_rx.try_recv() {
            let mut state = self.state.lock().unwrap();
            let current_generation = state.load_generation;

            match completed {
                CompletedLoad::Success { key, generation, payload } => {
                    state.in_flight.remove(&key);
                    if generation != current_generation {
                        #[cfg(feature = "debug")]
                        log::debug!("discarding stale success for {key} (gen {generation} != {current_generation})");
                        continue;
                    }
                    let size = (self.size_estimator)(&payload);
                    if let Some(record) = state.records.get_mut(&key) {
                        record.payload = Some(payload.clone());
                        record.state = TileState::Loaded;
                        record.loaded_at = Some(Instant::now());
                    }
                    self.cache.lock().unwrap().set(&key, payload, size, generation);
                }
                CompletedLoad::Failure { key, generation, error } => {
                    state.in_flight.remove(&key);
                    if generation != current_generation {
                        #[cfg(feature = "debug")]
                        log::debug!("discarding stale failure for {key} (gen {generation} != {current_generation})");
                        continue;
                    }
                    #[cfg(feature = "debug")]
                    log::warn!("tile load failed for {key}: {error}");
                    if let Some(record) = state.records.get_mut(&key) {
                        record.state = TileState::Error;
                        record.error = Some(error);
                    }
                }
            }
        }
    }

    /// Looks up a tile, reflecting cache contents into the returned
    /// record when present.
    ///
    /// Locks the cache, copies the payload out, and drops the cache guard
    /// before ever touching `state` (callers, e.g. a renderer on its own
    /// thread, never hold both locks at once here), so this can't invert
    /// the state-then-cache order the loader uses everywhere else.
    pub fn get_tile(&self, key: &str) -> Option<TileRecord<T>> {
        let cached_payload = self.cache.lock().unwrap().get(key);
        if let Some(payload) = cached_payload {
            let mut state = self.state.lock().unwrap();
            let coord = TileCoord::parse_key(key)?;
            let record = state.records.entry(key.to_string()).or_insert_with(|| {
                TileRecord::pending(coord, state.load_generation)
            });
            record.payload = Some(payload.clone());
            record.state = TileState::Loaded;
            return Some(record.clone());
        }
        self.state.lock().unwrap().records.get(key).cloned()
    }

    pub fn get_loaded_tiles(&self) -> Vec<TileRecord<T>> {
        self.state
            .lock()
            .unwrap()
            .records
            .values()
            .filter(|r| r.state == TileState::Loaded)
            .cloned()
            .collect()
    }

    /// Walks up the parent chain looking for the nearest loaded ancestor.
    pub fn find_loaded_parent(&self, coord: TileCoord) -> Option<TileRecord<T>> {
        let state = self.state.lock().unwrap();
        let mut current = coord;
        while let Some(parent) = current.parent() {
            if let Some(record) = state.records.get(&parent.key()) {
                if record.state == TileState::Loaded {
                    return Some(record.clone());
                }
            }
            current = parent;
        }
        None
    }

    pub fn fade_alpha(&self, record: &TileRecord<T>) -> f64 {
        match record.loaded_at {
            None => 1.0,
            Some(loaded_at) => {
                let elapsed = loaded_at.elapsed().as_secs_f64() * 1000.0;
                (elapsed / self.config.fade_duration.as_millis() as f64).min(1.0)
            }
        }
    }

    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.lock().unwrap().stats()
    }

    pub fn loading_stats(&self) -> LoadingStats {
        let state = self.state.lock().unwrap();
        LoadingStats {
            queued: state.queue.len(),
            in_flight: state.in_flight.len(),
            generation: state.load_generation,
        }
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.records.clear();
        state.queue.clear();
        state.in_flight.clear();
        if let Some(h) = state.pan_timer.take() {
            self.scheduler.cancel(h);
        }
        if let Some(h) = state.zoom_timer.take() {
            self.scheduler.cancel(h);
        }
        self.cache.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TileSource<Vec<u8>> for CountingSource {
        async fn load_tile(&self, _coord: TileCoord, _generation: u64) -> Result<Vec<u8>, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0u8; 16])
        }
    }

    fn make_loader(calls: Arc<AtomicUsize>) -> (Arc<TileLoader<Vec<u8>>>, Arc<ManualScheduler>) {
        let scheduler = Arc::new(ManualScheduler::new());
        let source = Arc::new(CountingSource { calls });
        let loader = Arc::new(TileLoader::new(
            TileLoaderConfig::for_testing(),
            CacheConfig::default(),
            scheduler.clone(),
            source,
        ));
        (loader, scheduler)
    }

    #[test]
    fn queue_and_in_flight_disjoint() {
        let (loader, _scheduler) = make_loader(Arc::new(AtomicUsize::new(0)));
        let bounds = ViewportBounds::new(-10.0, -10.0, 10.0, 10.0);
        loader.process_view_change(bounds, 4);
        let state = loader.state.lock().unwrap();
        let overlap: Vec<_> = state.queue.iter().filter(|k| state.in_flight.contains(*k)).collect();
        assert!(overlap.is_empty());
    }

    #[tokio::test]
    async fn frame_pacing_caps_starts_per_tick() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (loader, _scheduler) = make_loader(calls.clone());
        let bounds = ViewportBounds::new(-60.0, -60.0, 60.0, 60.0);
        loader.process_view_change(bounds, 2);
        loader.process_queue();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrency_cap_is_respected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (loader, _scheduler) = make_loader(calls);
        let bounds = ViewportBounds::new(-60.0, -60.0, 60.0, 60.0);
        loader.process_view_change(bounds, 2);
        for _ in 0..5 {
            loader.process_queue();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(loader.loading_stats().in_flight <= TileLoaderConfig::for_testing().max_concurrent_loads);
    }
}
