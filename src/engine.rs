use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::error::RenderError;
use crate::surface::{RenderTarget, RenderedPage};

/// Produces one page of the loaded document. Implementations must not depend
/// on any other page having been rendered first.
pub trait PageRenderer: Send + Sync {
    fn render_page(&self, index: usize) -> Result<RenderedPage, RenderError>;
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Pages kept on either side of the current one. Eviction and pre-render
    /// scheduling both use this radius.
    pub radius: usize,
    /// Background render threads.
    pub workers: usize,
}

impl EngineConfig {
    pub const DEFAULT_RADIUS: usize = 3;

    pub fn with_radius(radius: usize) -> Self {
        Self {
            radius,
            workers: (radius * 2).max(1),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::with_radius(Self::DEFAULT_RADIUS)
    }
}

// ---------------------------------------------------------------------------
// Cache state (shared between the caller and worker threads via Mutex + Condvar)
// ---------------------------------------------------------------------------

pub struct CacheState {
    pub current: usize,
    pub total: usize,
    pub radius: usize,
    pub prerender: bool,
    /// Bumped whenever the document handle or the render parameters change.
    /// Results rendered under an older generation are dropped.
    pub generation: u64,
    renderer: Option<Arc<dyn PageRenderer>>,

    pages: HashMap<usize, RenderedPage>,
    aspects: HashMap<usize, f32>,

    in_progress: HashSet<usize>,
    /// Pages whose background render failed. Not retried in the background;
    /// an on-demand render still tries again.
    failed: HashSet<usize>,
    shutdown: bool,
}

pub type SharedState = Arc<(Mutex<CacheState>, Condvar)>;

fn lock(shared: &SharedState) -> MutexGuard<'_, CacheState> {
    shared.0.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CacheState {
    pub fn new(radius: usize) -> Self {
        Self {
            current: 1,
            total: 0,
            radius,
            prerender: true,
            generation: 0,
            renderer: None,
            pages: HashMap::new(),
            aspects: HashMap::new(),
            in_progress: HashSet::new(),
            failed: HashSet::new(),
            shutdown: false,
        }
    }

    /// `[current - radius, current + radius]` clipped to the document.
    pub fn window(&self) -> RangeInclusive<usize> {
        if self.total == 0 {
            return 1..=0;
        }
        let lo = self.current.saturating_sub(self.radius).max(1);
        let hi = (self.current + self.radius).min(self.total);
        lo..=hi
    }

    pub fn in_window(&self, index: usize) -> bool {
        self.window().contains(&index)
    }

    pub fn get(&self, index: usize) -> Option<RenderedPage> {
        self.pages.get(&index).cloned()
    }

    fn is_available(&self, index: usize) -> bool {
        !self.pages.contains_key(&index)
            && !self.in_progress.contains(&index)
            && !self.failed.contains(&index)
    }

    /// Nearest uncached page in the window, scanning forward first since
    /// reading mostly moves forward.
    pub fn find_work(&self) -> Option<usize> {
        if !self.prerender || self.renderer.is_none() || self.total == 0 || self.shutdown {
            return None;
        }
        if self.in_window(self.current) && self.is_available(self.current) {
            return Some(self.current);
        }
        for dist in 1..=self.radius {
            let fwd = self.current + dist;
            if fwd <= self.total && self.is_available(fwd) {
                return Some(fwd);
            }
            if let Some(bwd) = self.current.checked_sub(dist) {
                if bwd >= 1 && self.is_available(bwd) {
                    return Some(bwd);
                }
            }
        }
        None
    }

    /// Store a rendered page. Ignored when pre-rendering is off or the page
    /// already left the window.
    pub fn insert(&mut self, page: RenderedPage) -> bool {
        let index = page.index;
        if !self.prerender || !self.in_window(index) {
            return false;
        }
        self.failed.remove(&index);
        self.aspects.insert(index, page.aspect_ratio());
        self.pages.insert(index, page);
        true
    }

    pub fn evict_outside_window(&mut self) {
        let window = self.window();
        let before = self.pages.len();
        self.pages.retain(|i, _| window.contains(i));
        self.aspects.retain(|i, _| window.contains(i));
        let evicted = before - self.pages.len();
        if evicted > 0 {
            log::debug!("evicted {} page(s) outside {:?}", evicted, window);
        }
    }

    pub fn clear(&mut self) {
        self.pages.clear();
        self.aspects.clear();
        self.failed.clear();
        self.generation += 1;
    }

    pub fn set_current(&mut self, index: usize) {
        self.current = index;
    }
}

// ---------------------------------------------------------------------------
// Background pre-render workers
// ---------------------------------------------------------------------------

fn spawn_prerender_workers(shared: &SharedState, count: usize) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|n| {
            let shared = Arc::clone(shared);
            thread::Builder::new()
                .name(format!("leaf-prerender-{n}"))
                .spawn(move || prerender_loop(&shared))
        })
        .filter_map(|spawned| match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("could not spawn pre-render worker: {e}");
                None
            }
        })
        .collect()
}

fn prerender_loop(shared: &SharedState) {
    loop {
        let (index, renderer, generation) = {
            let mut state = lock(shared);
            loop {
                if state.shutdown {
                    return;
                }
                if let (Some(index), Some(renderer)) = (state.find_work(), state.renderer.clone()) {
                    state.in_progress.insert(index);
                    break (index, renderer, state.generation);
                }
                state = shared.1.wait(state).unwrap_or_else(PoisonError::into_inner);
            }
        };

        let result = renderer.render_page(index);
        drop(renderer);

        let mut state = lock(shared);
        state.in_progress.remove(&index);
        if state.generation != generation {
            log::debug!("dropping stale pre-render of page {index}");
        } else {
            match result {
                Ok(page) => {
                    if !state.insert(page) {
                        log::debug!("pre-rendered page {index} already left the window");
                    }
                }
                Err(e) => {
                    log::debug!("pre-render of page {index} failed: {e}");
                    state.failed.insert(index);
                }
            }
        }
        shared.1.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Sliding-window render cache with background pre-rendering. Adapters for
/// fixed-layout formats hold one of these and hand it a [`PageRenderer`].
pub struct PageEngine {
    shared: SharedState,
    target: Option<Arc<dyn RenderTarget>>,
    workers: Vec<JoinHandle<()>>,
}

impl PageEngine {
    pub fn new(config: EngineConfig) -> Self {
        let shared: SharedState = Arc::new((
            Mutex::new(CacheState::new(config.radius)),
            Condvar::new(),
        ));
        let workers = spawn_prerender_workers(&shared, config.workers.max(1));
        Self {
            shared,
            target: None,
            workers,
        }
    }

    /// Install the renderer for a freshly loaded document. Any previous
    /// document is released first and the current page resets to 1.
    pub fn attach(&mut self, renderer: Arc<dyn PageRenderer>, total: usize) {
        self.detach();
        let mut state = lock(&self.shared);
        state.renderer = Some(renderer);
        state.total = total;
        state.current = 1;
        state.clear();
        self.shared.1.notify_all();
    }

    /// Swap the renderer of the loaded document, keeping the current page.
    /// Used when render parameters such as zoom change.
    pub fn replace_renderer(&mut self, renderer: Arc<dyn PageRenderer>) {
        let mut state = lock(&self.shared);
        if state.renderer.is_none() {
            return;
        }
        state.renderer = Some(renderer);
        state.clear();
        self.shared.1.notify_all();
    }

    /// Release the document. Blocks until in-flight background renders have
    /// returned so nothing keeps the renderer alive afterwards.
    pub fn detach(&mut self) {
        let mut state = lock(&self.shared);
        state.renderer = None;
        state.total = 0;
        state.current = 1;
        state.clear();
        while !state.in_progress.is_empty() {
            state = self
                .shared
                .1
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.shared.1.notify_all();
    }

    pub fn is_loaded(&self) -> bool {
        lock(&self.shared).renderer.is_some()
    }

    /// Render `index` into `target`, serving it from the cache when possible,
    /// then evict out-of-window pages and wake the pre-render workers.
    pub fn render(
        &mut self,
        target: &Arc<dyn RenderTarget>,
        index: usize,
    ) -> Result<RenderedPage, RenderError> {
        self.target = Some(Arc::clone(target));

        let (renderer, generation, prerender, cached) = {
            let mut state = lock(&self.shared);
            let Some(renderer) = state.renderer.clone() else {
                return Err(RenderError::NotLoaded);
            };
            if index == 0 || index > state.total {
                return Err(RenderError::OutOfRange {
                    index,
                    total: state.total,
                });
            }
            state.set_current(index);
            target.clear();

            let mut cached = None;
            if state.prerender {
                loop {
                    if let Some(page) = state.get(index) {
                        cached = Some(page);
                        break;
                    }
                    if !state.in_progress.contains(&index) {
                        state.in_progress.insert(index);
                        break;
                    }
                    // A worker is already rendering this page.
                    state = self
                        .shared
                        .1
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
            (renderer, state.generation, state.prerender, cached)
        };

        let page = match cached {
            Some(page) => {
                log::trace!("page {index} served from cache");
                page
            }
            None => {
                let result = renderer.render_page(index);
                let mut state = lock(&self.shared);
                if prerender {
                    state.in_progress.remove(&index);
                }
                let stored = match &result {
                    Ok(page) if state.generation == generation => state.insert(page.clone()),
                    _ => false,
                };
                self.shared.1.notify_all();
                drop(state);
                let page = result?;
                log::trace!("page {index} rendered (cached: {stored})");
                page
            }
        };

        target.present(page.clone());

        let mut state = lock(&self.shared);
        state.evict_outside_window();
        self.shared.1.notify_all();
        Ok(page)
    }

    /// Navigate to `index`, clamped to the document. Renders into the last
    /// target if there is one.
    pub fn go_to(&mut self, index: usize) -> Result<(), RenderError> {
        let total = self.total_pages();
        if total == 0 {
            return Err(RenderError::NotLoaded);
        }
        let index = index.clamp(1, total);
        match self.target.clone() {
            Some(target) => self.render(&target, index).map(|_| ()),
            None => {
                let mut state = lock(&self.shared);
                state.set_current(index);
                state.evict_outside_window();
                self.shared.1.notify_all();
                Ok(())
            }
        }
    }

    pub fn next(&mut self) -> Result<(), RenderError> {
        let (current, total) = (self.current_page(), self.total_pages());
        if total == 0 || current >= total {
            return Ok(());
        }
        self.go_to(current + 1)
    }

    pub fn prev(&mut self) -> Result<(), RenderError> {
        let (current, total) = (self.current_page(), self.total_pages());
        if total == 0 || current <= 1 {
            return Ok(());
        }
        self.go_to(current - 1)
    }

    pub fn current_page(&self) -> usize {
        lock(&self.shared).current
    }

    pub fn total_pages(&self) -> usize {
        lock(&self.shared).total
    }

    pub fn aspect_ratio(&self, index: usize) -> Option<f32> {
        lock(&self.shared).aspects.get(&index).copied()
    }

    pub fn prerender_enabled(&self) -> bool {
        lock(&self.shared).prerender
    }

    /// Disabling drops both caches immediately and makes every render go to
    /// the renderer.
    pub fn set_prerender(&mut self, enabled: bool) {
        let mut state = lock(&self.shared);
        if state.prerender == enabled {
            return;
        }
        state.prerender = enabled;
        if !enabled {
            state.clear();
        }
        self.shared.1.notify_all();
    }

    /// Drop every cached page of the loaded document.
    pub fn invalidate(&mut self) {
        let mut state = lock(&self.shared);
        state.clear();
        self.shared.1.notify_all();
    }

    /// Render the current page into the last target again, if both exist.
    pub fn rerender_current(&mut self) -> Result<Option<RenderedPage>, RenderError> {
        let Some(target) = self.target.clone() else {
            return Ok(None);
        };
        if !self.is_loaded() {
            return Ok(None);
        }
        let current = self.current_page();
        self.render(&target, current).map(Some)
    }

    /// Block until background pre-rendering of the current window has
    /// settled, successfully or not.
    pub fn wait_for_prerender(&self) {
        let mut state = lock(&self.shared);
        while !state.in_progress.is_empty() || state.find_work().is_some() {
            if self.workers.is_empty() {
                return;
            }
            state = self
                .shared
                .1
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Sorted indices currently held in the render cache.
    pub fn cached_pages(&self) -> Vec<usize> {
        let state = lock(&self.shared);
        let mut keys: Vec<usize> = state.pages.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn window(&self) -> RangeInclusive<usize> {
        lock(&self.shared).window()
    }
}

impl Drop for PageEngine {
    fn drop(&mut self) {
        {
            let mut state = lock(&self.shared);
            state.shutdown = true;
            state.renderer = None;
            self.shared.1.notify_all();
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::Surface;
    use image::RgbaImage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRenderer {
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    impl CountingRenderer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_on: None,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PageRenderer for CountingRenderer {
        fn render_page(&self, index: usize) -> Result<RenderedPage, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(index) {
                return Err(RenderError::decode(index, "broken page"));
            }
            Ok(RenderedPage::raster(index, RgbaImage::new(10, 14), 1.0))
        }
    }

    fn target() -> (Surface, Arc<dyn RenderTarget>) {
        let surface = Surface::new();
        let target: Arc<dyn RenderTarget> = Arc::new(surface.clone());
        (surface, target)
    }

    fn engine(radius: usize) -> PageEngine {
        PageEngine::new(EngineConfig::with_radius(radius))
    }

    #[test]
    fn window_is_clipped_to_document() {
        let mut state = CacheState::new(3);
        state.total = 10;
        state.current = 1;
        assert_eq!(state.window(), 1..=4);
        state.current = 9;
        assert_eq!(state.window(), 6..=10);
        state.total = 0;
        assert!(state.window().is_empty());
    }

    #[test]
    fn find_work_prefers_forward_pages() {
        let mut state = CacheState::new(2);
        state.total = 10;
        state.current = 5;
        state.renderer = Some(CountingRenderer::new());
        state.pages.insert(5, RenderedPage::raster(5, RgbaImage::new(1, 1), 1.0));
        assert_eq!(state.find_work(), Some(6));
        state.in_progress.insert(6);
        assert_eq!(state.find_work(), Some(4));
        state.prerender = false;
        assert_eq!(state.find_work(), None);
    }

    #[test]
    fn insert_outside_window_is_dropped() {
        let mut state = CacheState::new(1);
        state.total = 10;
        state.current = 5;
        assert!(!state.insert(RenderedPage::raster(8, RgbaImage::new(1, 1), 1.0)));
        assert!(state.insert(RenderedPage::raster(6, RgbaImage::new(1, 1), 1.0)));
        assert_eq!(state.aspects.len(), 1);
    }

    #[test]
    fn cache_matches_window_after_render() {
        let mut engine = engine(3);
        engine.attach(CountingRenderer::new(), 20);
        let (_surface, target) = target();

        for index in [1, 2, 10, 20, 7] {
            engine.render(&target, index).unwrap();
            engine.wait_for_prerender();
            let expected: Vec<usize> = engine.window().collect();
            assert_eq!(engine.cached_pages(), expected, "after render({index})");
        }
    }

    #[test]
    fn render_presents_into_target() {
        let mut engine = engine(1);
        engine.attach(CountingRenderer::new(), 3);
        let (surface, target) = target();
        let page = engine.render(&target, 2).unwrap();
        assert_eq!(page.index, 2);
        assert_eq!(surface.page().map(|p| p.index), Some(2));
        assert_eq!(engine.current_page(), 2);
    }

    #[test]
    fn prerender_disabled_always_renders() {
        let renderer = CountingRenderer::new();
        let mut engine = engine(3);
        engine.attach(renderer.clone(), 10);
        engine.set_prerender(false);
        let (_surface, target) = target();

        engine.render(&target, 4).unwrap();
        engine.render(&target, 4).unwrap();
        assert_eq!(renderer.calls(), 2);
        assert!(engine.cached_pages().is_empty());
    }

    #[test]
    fn second_render_hits_cache() {
        let renderer = CountingRenderer::new();
        let mut engine = engine(1);
        engine.attach(renderer.clone(), 3);
        let (_surface, target) = target();

        engine.render(&target, 2).unwrap();
        engine.wait_for_prerender();
        let after_window = renderer.calls();
        assert_eq!(after_window, 3);
        engine.render(&target, 2).unwrap();
        engine.render(&target, 3).unwrap();
        assert_eq!(renderer.calls(), after_window);
    }

    #[test]
    fn disabling_prerender_clears_cache() {
        let mut engine = engine(2);
        engine.attach(CountingRenderer::new(), 10);
        let (_surface, target) = target();
        engine.render(&target, 5).unwrap();
        engine.wait_for_prerender();
        assert!(!engine.cached_pages().is_empty());
        assert!(engine.aspect_ratio(5).is_some());

        engine.set_prerender(false);
        assert!(engine.cached_pages().is_empty());
        assert_eq!(engine.aspect_ratio(5), None);
    }

    #[test]
    fn navigation_clamps_and_stops_at_boundaries() {
        let renderer = CountingRenderer::new();
        let mut engine = engine(1);
        engine.attach(renderer.clone(), 5);
        let (_surface, target) = target();
        engine.render(&target, 1).unwrap();

        engine.go_to(0).unwrap();
        assert_eq!(engine.current_page(), 1);
        engine.prev().unwrap();
        engine.prev().unwrap();
        assert_eq!(engine.current_page(), 1);

        engine.go_to(5 + 5).unwrap();
        assert_eq!(engine.current_page(), 5);
        assert_eq!(engine.total_pages(), 5);
        engine.next().unwrap();
        engine.next().unwrap();
        assert_eq!(engine.current_page(), 5);
    }

    #[test]
    fn failed_prerender_is_not_surfaced() {
        let renderer = Arc::new(CountingRenderer {
            calls: AtomicUsize::new(0),
            fail_on: Some(3),
        });
        let mut engine = engine(1);
        engine.attach(renderer, 5);
        let (_surface, target) = target();

        engine.render(&target, 2).unwrap();
        engine.wait_for_prerender();
        assert_eq!(engine.cached_pages(), vec![1, 2]);

        let err = engine.render(&target, 3).unwrap_err();
        assert!(matches!(err, RenderError::Decode { index: 3, .. }));
    }

    #[test]
    fn render_without_document_fails() {
        let mut engine = engine(1);
        let (_surface, target) = target();
        assert!(matches!(
            engine.render(&target, 1),
            Err(RenderError::NotLoaded)
        ));
        engine.attach(CountingRenderer::new(), 2);
        assert!(matches!(
            engine.render(&target, 3),
            Err(RenderError::OutOfRange { index: 3, total: 2 })
        ));
    }

    #[test]
    fn attach_resets_to_first_page() {
        let mut engine = engine(1);
        engine.attach(CountingRenderer::new(), 8);
        let (_surface, target) = target();
        engine.render(&target, 6).unwrap();
        engine.attach(CountingRenderer::new(), 4);
        assert_eq!(engine.current_page(), 1);
        assert_eq!(engine.total_pages(), 4);
        assert!(engine.cached_pages().is_empty());
    }
}
