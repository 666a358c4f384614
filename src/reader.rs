//! Reading session: owns the active adapter and the settings, keeps the
//! canonical current page and drives the dual-page and scroll layouts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapter::{AdapterConfig, AdapterKind, ContentAdapter, Services, Source, create_adapter};
use crate::error::{ApplyError, LoadError, RenderError};
use crate::layout::spread::slide_transition;
use crate::layout::{DisplayMode, Navigation, ScrollLayout, Slide, SpreadLayout, SpreadPair};
use crate::settings::{ReaderSettings, ViewMode};
use crate::surface::{Flow, RenderTarget, RenderedPage, Surface};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Empty,
    Loading,
    Ready,
    Error(String),
}

/// Position the host persists between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub page: usize,
    pub total: usize,
}

/// Result of laying out the visible pair in dual mode.
#[derive(Debug, Clone)]
pub struct SpreadView {
    pub pair: SpreadPair,
    pub mode: DisplayMode,
    pub left: Option<RenderedPage>,
    pub right: Option<RenderedPage>,
    pub show_left: bool,
    pub show_right: bool,
    pub slide: Option<Slide>,
}

fn flow_for(mode: ViewMode) -> Flow {
    match mode {
        ViewMode::Scroll => Flow::Scrolled,
        ViewMode::Single | ViewMode::Dual => Flow::Paginated,
    }
}

fn title_hint(path: &Path) -> Option<String> {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().into_owned())
}

pub struct Reader {
    services: Services,
    config: AdapterConfig,
    settings: ReaderSettings,
    adapter: Option<Box<dyn ContentAdapter>>,
    status: Status,
    title: Option<String>,
    current: usize,
    spread: SpreadLayout,
    scroll: ScrollLayout,
    last_shown: Option<(usize, DisplayMode)>,
    slide: Option<Slide>,
}

impl Reader {
    pub fn new(settings: ReaderSettings) -> Self {
        Self::with_services(Services::default(), AdapterConfig::default(), settings)
    }

    pub fn with_services(services: Services, config: AdapterConfig, settings: ReaderSettings) -> Self {
        let settings = settings.normalized();
        let mut scroll = ScrollLayout::new(0, 1);
        scroll.set_zoom(settings.zoom_factor());
        Self {
            services,
            config,
            settings,
            adapter: None,
            status: Status::Empty,
            title: None,
            current: 1,
            spread: SpreadLayout::new(),
            scroll,
            last_shown: None,
            slide: None,
        }
    }

    /// Replace the relative aspect difference that promotes a single page.
    pub fn with_spread_threshold(mut self, threshold: f32) -> Self {
        self.spread = SpreadLayout::with_threshold(threshold);
        self
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn kind(&self) -> Option<AdapterKind> {
        self.adapter.as_ref().map(|a| a.kind())
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    pub fn current_page(&self) -> usize {
        self.current
    }

    pub fn total_pages(&self) -> usize {
        self.adapter.as_ref().map_or(0, |a| a.total_pages())
    }

    pub fn progress(&self) -> Option<Progress> {
        (self.status == Status::Ready).then(|| Progress {
            page: self.current,
            total: self.total_pages(),
        })
    }

    /// Effective view mode. Reflowable text has no facing pages, so dual
    /// mode shows one location at a time.
    pub fn view_mode(&self) -> ViewMode {
        match (self.settings.view_mode, self.kind()) {
            (ViewMode::Dual, Some(AdapterKind::Epub)) => ViewMode::Single,
            (mode, _) => mode,
        }
    }

    pub fn aspect_ratio(&self, page: usize) -> Option<f32> {
        self.adapter.as_ref().and_then(|a| a.page_aspect_ratio(page))
    }

    /// Transition for the most recently rendered view.
    pub fn slide(&self) -> Option<Slide> {
        self.slide
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Open `paths` as one document. `initial_page` is a restored position;
    /// it is used only if it lies within the loaded document.
    pub fn open(&mut self, paths: Vec<PathBuf>, initial_page: Option<usize>) -> Result<(), LoadError> {
        self.close();
        self.status = Status::Loading;
        match self.load(paths, initial_page) {
            Ok(()) => {
                self.status = Status::Ready;
                Ok(())
            }
            Err(e) => {
                log::warn!("open failed: {e}");
                self.status = Status::Error(e.to_string());
                Err(e)
            }
        }
    }

    fn load(&mut self, mut paths: Vec<PathBuf>, initial_page: Option<usize>) -> Result<(), LoadError> {
        let kind = AdapterKind::detect(&paths)?;
        let mut adapter = create_adapter(kind, &self.services, &self.config);
        adapter.set_prerender(self.settings.prerender);
        adapter.set_direction(self.settings.direction);
        adapter.set_epub_theme(self.settings.epub_theme);
        adapter.set_flow(flow_for(self.settings.view_mode));
        adapter.set_font_size(self.settings.font_size)?;
        if let Err(e) = adapter.set_zoom(self.settings.zoom) {
            log::debug!("zoom before load: {e}");
        }

        let hint = paths.first().and_then(|p| title_hint(p));
        let source = if paths.len() == 1 {
            Source::Path(paths.remove(0))
        } else {
            Source::Paths(paths)
        };
        adapter.load(source)?;

        let total = adapter.total_pages();
        let page = match initial_page {
            Some(p) if (1..=total).contains(&p) => p,
            Some(p) => {
                log::info!("restored page {p} is outside 1..={total}, starting at 1");
                1
            }
            None => 1,
        };
        adapter.go_to(page).map_err(|e| LoadError::Corrupt(e.to_string()))?;

        self.title = adapter.title().or(hint);
        self.current = page;
        self.spread.set_total(total);
        self.spread.reset();
        self.scroll = ScrollLayout::new(total, page);
        self.scroll.set_zoom(self.settings.zoom_factor());
        self.last_shown = None;
        self.slide = None;
        log::info!(
            "opened {kind} {:?} with {total} pages at page {page}",
            self.title.as_deref().unwrap_or("")
        );
        self.adapter = Some(adapter);
        Ok(())
    }

    /// Release the open document, if any.
    pub fn close(&mut self) {
        if let Some(mut adapter) = self.adapter.take() {
            adapter.destroy();
        }
        self.status = Status::Empty;
        self.title = None;
        self.current = 1;
        self.last_shown = None;
        self.slide = None;
    }

    /// Store `settings` and push what changed into the open document.
    pub fn apply_settings(&mut self, settings: ReaderSettings) -> Result<(), ApplyError> {
        let settings = settings.normalized();
        let old = std::mem::replace(&mut self.settings, settings.clone());
        self.scroll.set_zoom(settings.zoom_factor());
        let Some(adapter) = self.adapter.as_mut() else {
            return Ok(());
        };

        if old.prerender != settings.prerender {
            adapter.set_prerender(settings.prerender);
        }
        if old.direction != settings.direction {
            adapter.set_direction(settings.direction);
        }
        if old.epub_theme != settings.epub_theme {
            adapter.set_epub_theme(settings.epub_theme);
        }
        if old.view_mode != settings.view_mode {
            adapter.set_flow(flow_for(settings.view_mode));
            self.last_shown = None;
            self.scroll.scroll_to_page(self.current);
        }
        if old.zoom != settings.zoom {
            adapter.set_zoom(settings.zoom)?;
        }
        if old.font_size != settings.font_size && adapter.kind() == AdapterKind::Epub {
            if adapter.current_page() != self.current {
                adapter.go_to(self.current)?;
            }
            adapter.set_font_size(settings.font_size)?;
            // Reflow moves the current location and may change the count.
            let (current, total) = (adapter.current_page(), adapter.total_pages());
            self.current = current;
            self.spread.set_total(total);
            self.scroll.set_total(total, current);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    pub fn navigation(&self) -> Navigation {
        let total = self.total_pages();
        let display = self
            .spread
            .pair()
            .filter(|p| p.contains(self.current) && p.direction == self.settings.direction)
            .map_or(DisplayMode::Spread, |_| self.spread.mode());
        Navigation::new(self.view_mode(), self.current, total)
            .with_display(display, self.settings.direction)
    }

    /// Returns whether the current page changed.
    pub fn next(&mut self) -> bool {
        match self.navigation().next() {
            Some(page) => self.step_to(page),
            None => false,
        }
    }

    pub fn prev(&mut self) -> bool {
        match self.navigation().prev() {
            Some(page) => self.step_to(page),
            None => false,
        }
    }

    fn step_to(&mut self, page: usize) -> bool {
        let before = self.current;
        self.set_current(page);
        self.current != before
    }

    /// Jump to `page`, clamped into the document. Returns the page landed on.
    pub fn go_to(&mut self, page: usize) -> usize {
        if self.adapter.is_none() {
            return self.current;
        }
        let page = self.navigation().go_to(page);
        self.set_current(page);
        self.current
    }

    /// In the page scroll view the page under the top of the viewport wins,
    /// since the last pages cannot always scroll that far. EPUB scrolls its
    /// own rendition and keeps `page`.
    fn set_current(&mut self, page: usize) {
        self.scroll.scroll_to_page(page);
        self.scroll.on_scroll();
        let page_scroll =
            self.view_mode() == ViewMode::Scroll && self.kind() != Some(AdapterKind::Epub);
        self.current = match self.scroll.top_page() {
            Some(top) if page_scroll => top,
            _ => page,
        };
    }

    // -----------------------------------------------------------------------
    // Continuous scroll
    // -----------------------------------------------------------------------

    pub fn scroll_layout(&self) -> &ScrollLayout {
        &self.scroll
    }

    /// Lay out the scroll view for a viewport; the first call lands on the
    /// current page.
    pub fn layout_scroll(&mut self, width: f32, height: f32) {
        self.scroll.layout(width, height);
    }

    /// Scroll by `dy` pixels; the page under the top of the viewport
    /// becomes current.
    pub fn scroll_by(&mut self, dy: f32) -> Option<usize> {
        let page = self.scroll.scroll_by(dy)?;
        self.current = page;
        Some(page)
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    fn adapter_mut(&mut self) -> Result<&mut Box<dyn ContentAdapter>, RenderError> {
        self.adapter.as_mut().ok_or(RenderError::NotLoaded)
    }

    /// Render an arbitrary page without moving the current page. Used for
    /// the items of the scroll view.
    pub fn render_page(
        &mut self,
        target: &Arc<dyn RenderTarget>,
        page: usize,
    ) -> Result<RenderedPage, RenderError> {
        self.adapter_mut()?.render(target, page)
    }

    /// Render the current page on its own.
    pub fn render_single(&mut self, target: &Arc<dyn RenderTarget>) -> Result<RenderedPage, RenderError> {
        let page = self.current;
        let rendered = self.adapter_mut()?.render(target, page)?;
        self.record_shown(page, DisplayMode::Spread);
        Ok(rendered)
    }

    /// Render the pair holding the current page into `left` and `right`,
    /// then decide between a spread and a promoted single page. The partner
    /// page is rendered first so the cache window centres on the current
    /// one. A partner that fails to render is logged and left blank.
    pub fn render_spread(
        &mut self,
        left: &Arc<dyn RenderTarget>,
        right: &Arc<dyn RenderTarget>,
    ) -> Result<SpreadView, RenderError> {
        let current = self.current;
        let adapter = self.adapter.as_mut().ok_or(RenderError::NotLoaded)?;
        let total = adapter.total_pages();
        let pair = SpreadPair::for_page(current, total, self.settings.direction);
        self.spread.set_total(total);
        self.spread.show(pair, |p| adapter.page_aspect_ratio(p));
        if pair.left().is_none() {
            left.clear();
        }
        if pair.right().is_none() {
            right.clear();
        }

        let mut order: Vec<usize> = pair.pages().filter(|&p| p != current).collect();
        order.push(current);
        let (mut left_page, mut right_page) = (None, None);
        for page in order {
            let (target, slot) = if pair.left() == Some(page) {
                (left, &mut left_page)
            } else {
                (right, &mut right_page)
            };
            match adapter.render(target, page) {
                Ok(rendered) => {
                    self.spread.report(page, rendered.aspect_ratio());
                    *slot = Some(rendered);
                }
                Err(e) if page != current => {
                    log::warn!("partner page {page} failed to render: {e}");
                    target.clear();
                    self.spread.report(page, 0.0);
                }
                Err(e) => return Err(e),
            }
        }

        let mode = self.spread.mode();
        // Arriving on the hidden page of a promoted pair lands on the
        // promoted one; steps within the pair stay where they were sent.
        let entering = self.last_shown.is_none_or(|(from, _)| !pair.contains(from));
        let shown = match pair.promoted(mode) {
            Some(promoted) if entering && promoted != current => {
                log::debug!("page {current} is hidden, moving to page {promoted}");
                self.set_current(promoted);
                promoted
            }
            _ => current,
        };
        let (show_left, show_right) = pair.visible(mode);
        self.record_shown(shown, mode);
        Ok(SpreadView {
            pair,
            mode,
            left: left_page,
            right: right_page,
            show_left,
            show_right,
            slide: self.slide,
        })
    }

    fn record_shown(&mut self, page: usize, mode: DisplayMode) {
        self.slide = self
            .last_shown
            .and_then(|(from, from_mode)| slide_transition(from, page, from_mode, mode));
        self.last_shown = Some((page, mode));
    }

    /// Decide the layout of every pair in the document. Pages are rendered
    /// into scratch surfaces; the current page is left unchanged.
    pub fn survey_spreads(&mut self) -> Result<Vec<(SpreadPair, DisplayMode)>, RenderError> {
        let direction = self.settings.direction;
        let threshold = self.spread.threshold();
        let adapter = self.adapter.as_mut().ok_or(RenderError::NotLoaded)?;
        let total = adapter.total_pages();
        let mut layout = SpreadLayout::with_threshold(threshold);
        layout.set_total(total);

        let scratch: Arc<dyn RenderTarget> = Arc::new(Surface::new());
        let mut out = Vec::with_capacity(total.div_ceil(2));
        for first in (1..=total).step_by(2) {
            let pair = SpreadPair::for_page(first, total, direction);
            layout.show(pair, |_| None);
            for page in pair.pages() {
                let aspect = match adapter.render(&scratch, page) {
                    Ok(rendered) => rendered.aspect_ratio(),
                    Err(e) => {
                        log::warn!("page {page} failed to render: {e}");
                        0.0
                    }
                };
                layout.report(page, aspect);
            }
            out.push((pair, layout.mode()));
        }
        scratch.clear();
        Ok(out)
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Direction, EpubTheme};
    use image::RgbaImage;
    use std::fs;

    fn write_pages(dir: &Path, sizes: &[(u32, u32)]) -> Vec<PathBuf> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &(w, h))| {
                let p = dir.join(format!("page{}.png", i + 1));
                RgbaImage::new(w, h).save(&p).unwrap();
                p
            })
            .collect()
    }

    fn reader(settings: ReaderSettings) -> Reader {
        Reader::new(settings)
    }

    fn surface() -> Arc<dyn RenderTarget> {
        Arc::new(Surface::new())
    }

    #[test]
    fn restored_page_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        write_pages(dir.path(), &[(10, 14); 5]);
        let mut r = reader(ReaderSettings::default());

        r.open(vec![dir.path().to_path_buf()], Some(4)).unwrap();
        assert_eq!(r.status(), &Status::Ready);
        assert_eq!(r.progress(), Some(Progress { page: 4, total: 5 }));

        r.open(vec![dir.path().to_path_buf()], Some(9)).unwrap();
        assert_eq!(r.current_page(), 1);
        r.open(vec![dir.path().to_path_buf()], Some(0)).unwrap();
        assert_eq!(r.current_page(), 1);
    }

    #[test]
    fn failed_open_sets_error_and_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("notes.txt");
        fs::write(&bad, "hi").unwrap();
        let mut r = reader(ReaderSettings::default());
        assert!(r.open(vec![bad], None).is_err());
        assert!(matches!(r.status(), Status::Error(_)));
        assert_eq!(r.progress(), None);

        let pages = write_pages(dir.path(), &[(10, 14); 2]);
        r.open(pages, None).unwrap();
        assert_eq!(r.status(), &Status::Ready);
        assert_eq!(r.title(), Some("page1"));
    }

    #[test]
    fn single_mode_navigation_clamps() {
        let dir = tempfile::tempdir().unwrap();
        let pages = write_pages(dir.path(), &[(10, 14); 3]);
        let mut r = reader(ReaderSettings::default());
        r.open(pages, None).unwrap();
        assert!(!r.prev());
        assert!(r.next());
        assert!(r.next());
        assert!(!r.next());
        assert_eq!(r.current_page(), 3);
        assert_eq!(r.go_to(0), 1);
        assert_eq!(r.go_to(99), 3);
    }

    #[test]
    fn wide_partner_promotes_the_other_page() {
        let dir = tempfile::tempdir().unwrap();
        // Page 4 is landscape next to a portrait page 3.
        let pages = write_pages(dir.path(), &[(10, 14), (10, 14), (10, 14), (20, 14), (10, 14)]);
        let settings = ReaderSettings {
            view_mode: ViewMode::Dual,
            ..Default::default()
        };
        let mut r = reader(settings);
        r.open(pages, Some(3)).unwrap();
        let (left, right) = (surface(), surface());

        let view = r.render_spread(&left, &right).unwrap();
        assert_eq!(view.mode, DisplayMode::LeftOnly);
        assert_eq!((view.show_left, view.show_right), (true, false));

        // Page 4 is current but stays hidden behind the promoted page 3.
        assert!(r.next());
        assert_eq!(r.current_page(), 4);
        let view = r.render_spread(&left, &right).unwrap();
        assert_eq!(r.current_page(), 4);
        assert_eq!((view.show_left, view.show_right), (true, false));

        assert!(r.next());
        assert_eq!(r.current_page(), 5);
        let view = r.render_spread(&left, &right).unwrap();
        assert_eq!(view.mode, DisplayMode::Spread);
        assert_eq!(view.slide, None);
        assert!(!r.next());
    }

    #[test]
    fn arriving_on_a_hidden_page_lands_on_the_promoted_one() {
        let dir = tempfile::tempdir().unwrap();
        // Page 3 is landscape, so page 4 fills the view alone.
        let pages = write_pages(dir.path(), &[(10, 14), (10, 14), (20, 14), (10, 14), (10, 14)]);
        let settings = ReaderSettings {
            view_mode: ViewMode::Dual,
            ..Default::default()
        };
        let mut r = reader(settings);
        r.open(pages, None).unwrap();
        let (left, right) = (surface(), surface());
        r.render_spread(&left, &right).unwrap();

        assert!(r.next());
        assert_eq!(r.current_page(), 3);
        let view = r.render_spread(&left, &right).unwrap();
        assert_eq!(view.mode, DisplayMode::RightOnly);
        assert_eq!((view.show_left, view.show_right), (false, true));
        assert_eq!(r.current_page(), 4);

        assert!(r.next());
        assert_eq!(r.current_page(), 5);
        r.render_spread(&left, &right).unwrap();

        // Coming back also lands on page 4; stepping within the pair does not.
        assert!(r.prev());
        r.render_spread(&left, &right).unwrap();
        assert_eq!(r.current_page(), 4);
        assert!(r.prev());
        let view = r.render_spread(&left, &right).unwrap();
        assert_eq!(r.current_page(), 3);
        assert_eq!((view.show_left, view.show_right), (false, true));
        assert!(r.prev());
        assert_eq!(r.current_page(), 1);
    }

    #[test]
    fn right_to_left_swaps_sides() {
        let dir = tempfile::tempdir().unwrap();
        let pages = write_pages(dir.path(), &[(10, 14), (10, 15)]);
        let settings = ReaderSettings {
            view_mode: ViewMode::Dual,
            direction: Direction::Rtl,
            ..Default::default()
        };
        let mut r = reader(settings);
        r.open(pages, None).unwrap();
        let view = r.render_spread(&surface(), &surface()).unwrap();
        assert_eq!(view.mode, DisplayMode::Spread);
        assert_eq!(view.right.map(|p| p.index), Some(1));
        assert_eq!(view.left.map(|p| p.index), Some(2));
    }

    #[test]
    fn survey_reports_each_pair() {
        let dir = tempfile::tempdir().unwrap();
        let pages = write_pages(dir.path(), &[(10, 14), (10, 14), (10, 14), (20, 14), (10, 14)]);
        let mut r = reader(ReaderSettings::default());
        r.open(pages, Some(2)).unwrap();
        let modes: Vec<_> = r
            .survey_spreads()
            .unwrap()
            .into_iter()
            .map(|(pair, mode)| (pair.first, mode))
            .collect();
        assert_eq!(
            modes,
            vec![
                (1, DisplayMode::Spread),
                (3, DisplayMode::LeftOnly),
                (5, DisplayMode::Spread)
            ]
        );
        assert_eq!(r.current_page(), 2);
    }

    #[test]
    fn settings_flow_into_the_adapter() {
        let dir = tempfile::tempdir().unwrap();
        let pages = write_pages(dir.path(), &[(200, 100); 2]);
        let config = AdapterConfig {
            max_image_edge: 100,
            ..AdapterConfig::default()
        };
        let mut r = Reader::with_services(Services::default(), config, ReaderSettings::default());
        r.open(pages, None).unwrap();
        let target = surface();
        assert_eq!(r.render_single(&target).unwrap().width, 100);

        let settings = ReaderSettings {
            zoom: 50,
            epub_theme: EpubTheme::Dark,
            ..r.settings().clone()
        };
        r.apply_settings(settings).unwrap();
        assert_eq!(r.render_single(&target).unwrap().width, 50);
        assert_eq!(r.settings().epub_theme, EpubTheme::Dark);
    }

    #[test]
    fn scrolling_moves_the_current_page() {
        let dir = tempfile::tempdir().unwrap();
        let pages = write_pages(dir.path(), &[(10, 14); 20]);
        let settings = ReaderSettings {
            view_mode: ViewMode::Scroll,
            ..Default::default()
        };
        let mut r = reader(settings);
        r.open(pages, Some(5)).unwrap();
        r.layout_scroll(1000.0, 800.0);
        let size = r.scroll_layout().item_size();
        assert_eq!(r.scroll_layout().scroll_top(), 4.0 * size);
        assert_eq!(r.scroll_by(size), Some(6));
        assert_eq!(r.current_page(), 6);
        assert!(r.next());
        assert_eq!(r.scroll_layout().scroll_top(), 6.0 * size);
    }

    #[test]
    fn scroll_view_current_page_follows_the_clamped_top() {
        let dir = tempfile::tempdir().unwrap();
        let pages = write_pages(dir.path(), &[(10, 14); 5]);
        let settings = ReaderSettings {
            view_mode: ViewMode::Scroll,
            ..Default::default()
        };
        let mut r = reader(settings);
        r.open(pages, None).unwrap();
        // Slots are 598px, so the 2990px column stops scrolling at 1490px.
        r.layout_scroll(1000.0, 1500.0);
        let size = r.scroll_layout().item_size();
        assert_eq!(size, 598.0);

        assert_eq!(r.go_to(5), 3);
        assert_eq!(r.current_page(), 3);
        assert_eq!(r.scroll_layout().scroll_top(), 5.0 * size - 1500.0);
        assert!(!r.next());
        assert!(r.prev());
        assert_eq!(r.current_page(), 2);
        assert_eq!(r.scroll_by(-size), Some(1));
        assert_eq!(r.current_page(), 1);
    }

    #[test]
    fn close_releases_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let pages = write_pages(dir.path(), &[(10, 14); 2]);
        let mut r = reader(ReaderSettings::default());
        r.open(pages, None).unwrap();
        r.close();
        assert_eq!(r.status(), &Status::Empty);
        assert_eq!(r.total_pages(), 0);
        assert!(matches!(r.render_single(&surface()), Err(RenderError::NotLoaded)));
    }
}
