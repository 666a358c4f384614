use std::ops::Range;

pub const GAP: f32 = 32.0;
/// Share of the viewport width a page occupies at 100% zoom.
pub const PAGE_WIDTH_PCT: f32 = 0.8;
/// Assumed height over width of every page (A4).
pub const PAGE_ASPECT: f32 = 1.414;
pub const FALLBACK_ITEM_HEIGHT: f32 = 600.0;
/// Items laid out beyond each edge of the viewport.
pub const OVERSCAN: usize = 3;

/// One laid-out page of the continuous scroll view, in content
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollItem {
    pub page: usize,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// Windowed layout over every page of the document. Only the items near the
/// viewport are handed out, and the current page is derived from the scroll
/// offset.
#[derive(Debug, Clone)]
pub struct ScrollLayout {
    total: usize,
    zoom: f32,
    viewport: Option<(f32, f32)>,
    scroll_top: f32,
    last_reported: usize,
    restore: Option<usize>,
}

impl ScrollLayout {
    /// Starts at `current` once the first viewport size is known.
    pub fn new(total: usize, current: usize) -> Self {
        Self {
            total,
            zoom: 1.0,
            viewport: None,
            scroll_top: 0.0,
            last_reported: current,
            restore: (total > 0).then_some(current),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn scroll_top(&self) -> f32 {
        self.scroll_top
    }

    /// Page count changed (new document); scroll back to `current` after
    /// the next layout pass.
    pub fn set_total(&mut self, total: usize, current: usize) {
        if total == self.total {
            return;
        }
        self.total = total;
        self.scroll_top = 0.0;
        self.last_reported = current;
        self.restore = (total > 0).then_some(current);
        if self.viewport.is_some() {
            self.apply_restore();
        }
    }

    pub fn set_zoom(&mut self, factor: f32) {
        if factor > 0.0 {
            self.zoom = factor;
            self.clamp_scroll();
        }
    }

    /// Lay out for a viewport of `width` x `height`. The first call also
    /// performs the pending scroll to the restored page.
    pub fn layout(&mut self, width: f32, height: f32) {
        self.viewport = Some((width.max(0.0), height.max(0.0)));
        self.apply_restore();
        self.clamp_scroll();
    }

    /// Height of one page slot including the gap below it.
    pub fn item_size(&self) -> f32 {
        match self.viewport {
            Some((width, _)) if width > 0.0 => {
                (width * PAGE_WIDTH_PCT / PAGE_ASPECT * self.zoom).round() + GAP
            }
            _ => FALLBACK_ITEM_HEIGHT + GAP,
        }
    }

    pub fn content_height(&self) -> f32 {
        self.item_size() * self.total as f32
    }

    fn max_scroll(&self) -> f32 {
        let viewport_height = self.viewport.map_or(0.0, |(_, h)| h);
        (self.content_height() - viewport_height).max(0.0)
    }

    fn clamp_scroll(&mut self) {
        self.scroll_top = self.scroll_top.clamp(0.0, self.max_scroll());
    }

    fn apply_restore(&mut self) {
        if let Some(page) = self.restore.take() {
            log::debug!("restoring scroll position to page {page}");
            self.scroll_to_page(page);
        }
    }

    /// Align the top of `page` with the top of the viewport, as far as the
    /// content allows.
    pub fn scroll_to_page(&mut self, page: usize) {
        let index = page.clamp(1, self.total.max(1)) - 1;
        self.scroll_top = index as f32 * self.item_size();
        self.clamp_scroll();
    }

    /// Scroll by `dy` pixels. Returns the new current page only when it
    /// changed.
    pub fn scroll_by(&mut self, dy: f32) -> Option<usize> {
        self.scroll_top += dy;
        self.clamp_scroll();
        self.on_scroll()
    }

    /// The page whose slot is nearest the top of the viewport.
    pub fn top_page(&self) -> Option<usize> {
        if self.total == 0 {
            return None;
        }
        let index = (self.scroll_top / self.item_size()).round() as usize;
        Some((index + 1).clamp(1, self.total))
    }

    /// Derive the current page from the scroll offset, reporting it only if
    /// it differs from the last report.
    pub fn on_scroll(&mut self) -> Option<usize> {
        let page = self.top_page()?;
        if page == self.last_reported {
            return None;
        }
        self.last_reported = page;
        Some(page)
    }

    /// Indices (0-based) of the items to lay out, overscan included.
    pub fn visible_range(&self) -> Range<usize> {
        if self.total == 0 {
            return 0..0;
        }
        let size = self.item_size();
        let viewport_height = self.viewport.map_or(FALLBACK_ITEM_HEIGHT, |(_, h)| h);
        let first = (self.scroll_top / size).floor() as usize;
        let last = ((self.scroll_top + viewport_height) / size).ceil() as usize;
        let start = first.saturating_sub(OVERSCAN).min(self.total);
        let end = (last + OVERSCAN).min(self.total);
        start..end
    }

    pub fn visible_items(&self) -> Vec<ScrollItem> {
        let size = self.item_size();
        let height = size - GAP;
        self.visible_range()
            .map(|i| ScrollItem {
                page: i + 1,
                top: i as f32 * size,
                width: height / PAGE_ASPECT,
                height,
            })
            .collect()
    }
}
