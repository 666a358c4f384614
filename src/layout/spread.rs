use std::collections::HashMap;

use crate::settings::Direction;

/// Relative aspect difference at which one page of a pair is shown alone.
pub const DEFAULT_THRESHOLD: f32 = 0.08;

/// Height over width of the empty slot drawn while a page is pending (A4).
pub const SLOT_ASPECT: f32 = 1.414;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    #[default]
    Spread,
    /// Right page hidden, left page fills the view.
    LeftOnly,
    /// Left page hidden, right page fills the view.
    RightOnly,
}

impl DisplayMode {
    pub fn is_promoted(self) -> bool {
        self != DisplayMode::Spread
    }

    pub fn shows_left(self) -> bool {
        self != DisplayMode::RightOnly
    }

    pub fn shows_right(self) -> bool {
        self != DisplayMode::LeftOnly
    }
}

/// The two pages visible together in dual mode. `first` is always odd so
/// pairs line up as (1,2), (3,4), ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpreadPair {
    pub first: usize,
    pub second: Option<usize>,
    pub direction: Direction,
}

impl SpreadPair {
    pub fn for_page(current: usize, total: usize, direction: Direction) -> Self {
        let current = current.clamp(1, total.max(1));
        let first = if current % 2 == 0 { current - 1 } else { current };
        let second = (first < total).then_some(first + 1);
        Self {
            first,
            second,
            direction,
        }
    }

    pub fn left(&self) -> Option<usize> {
        match self.direction {
            Direction::Ltr => Some(self.first),
            Direction::Rtl => self.second,
        }
    }

    pub fn right(&self) -> Option<usize> {
        match self.direction {
            Direction::Ltr => self.second,
            Direction::Rtl => Some(self.first),
        }
    }

    pub fn contains(&self, page: usize) -> bool {
        page == self.first || self.second == Some(page)
    }

    /// Pages in reading order.
    pub fn pages(&self) -> impl Iterator<Item = usize> {
        std::iter::once(self.first).chain(self.second)
    }

    pub fn is_opening(&self) -> bool {
        self.first <= 1
    }

    /// Which sides are drawn as `(left, right)`. A promoted pair shows its
    /// promoted page whichever page of the pair is current.
    pub fn visible(&self, mode: DisplayMode) -> (bool, bool) {
        (
            mode.shows_left() && self.left().is_some(),
            mode.shows_right() && self.right().is_some(),
        )
    }

    /// The page shown alone under `mode`, if the pair is promoted.
    pub fn promoted(&self, mode: DisplayMode) -> Option<usize> {
        match mode {
            DisplayMode::Spread => None,
            DisplayMode::LeftOnly => self.left(),
            DisplayMode::RightOnly => self.right(),
        }
    }
}

/// Which pair layout fits two measured aspect ratios. Unmeasured sides
/// (ratio 0) always give a spread.
pub fn decide(left: f32, right: f32, threshold: f32) -> DisplayMode {
    if left <= 0.0 || right <= 0.0 {
        return DisplayMode::Spread;
    }
    let factor = 1.0 - threshold;
    if right <= left * factor {
        DisplayMode::LeftOnly
    } else if left <= right * factor {
        DisplayMode::RightOnly
    } else {
        DisplayMode::Spread
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slide {
    Forward,
    Backward,
}

/// Slide animation for moving from `from` to `to`. Leaving a promoted page
/// for a spread is not animated.
pub fn slide_transition(
    from: usize,
    to: usize,
    from_mode: DisplayMode,
    to_mode: DisplayMode,
) -> Option<Slide> {
    if from == to || (from_mode.is_promoted() && !to_mode.is_promoted()) {
        return None;
    }
    Some(if to > from {
        Slide::Forward
    } else {
        Slide::Backward
    })
}

/// Tracks the visible pair and decides spread or single-page promotion once
/// both sides have reported their intrinsic size.
#[derive(Debug, Clone)]
pub struct SpreadLayout {
    threshold: f32,
    total: usize,
    pair: Option<SpreadPair>,
    left_aspect: f32,
    right_aspect: f32,
    reported: HashMap<usize, f32>,
    memo: HashMap<usize, f32>,
}

impl Default for SpreadLayout {
    fn default() -> Self {
        Self::with_threshold(DEFAULT_THRESHOLD)
    }
}

impl SpreadLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(threshold: f32) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
            total: 0,
            pair: None,
            left_aspect: 0.0,
            right_aspect: 0.0,
            reported: HashMap::new(),
            memo: HashMap::new(),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn pair(&self) -> Option<SpreadPair> {
        self.pair
    }

    pub fn mode(&self) -> DisplayMode {
        decide(self.left_aspect, self.right_aspect, self.threshold)
    }

    pub fn reset(&mut self) {
        self.pair = None;
        self.left_aspect = 0.0;
        self.right_aspect = 0.0;
        self.reported.clear();
        self.memo.clear();
    }

    /// A different page count means a different document.
    pub fn set_total(&mut self, total: usize) {
        if total != self.total {
            self.total = total;
            self.reset();
        }
    }

    /// Make `pair` the visible one. Known ratios (ours, or `cached` from the
    /// adapter) decide the layout immediately; otherwise it starts as a
    /// spread until both sides report.
    pub fn show(
        &mut self,
        pair: SpreadPair,
        cached: impl Fn(usize) -> Option<f32>,
    ) -> DisplayMode {
        if self.pair == Some(pair) {
            return self.mode();
        }
        self.pair = Some(pair);
        self.reported.clear();
        self.left_aspect = 0.0;
        self.right_aspect = 0.0;
        if pair.is_opening() {
            log::trace!("opening spread, measuring afresh");
            return self.mode();
        }

        let known = |page: Option<usize>| {
            page.and_then(|p| self.memo.get(&p).copied().or_else(|| cached(p)))
                .filter(|a| *a > 0.0)
        };
        if let (Some(l), Some(r)) = (known(pair.left()), known(pair.right())) {
            self.left_aspect = l;
            self.right_aspect = r;
        }
        self.mode()
    }

    /// Record the intrinsic ratio of a rendered page. Reports for pages
    /// outside the visible pair are ignored. The layout is re-decided only
    /// once both sides have reported.
    pub fn report(&mut self, page: usize, aspect: f32) -> DisplayMode {
        let Some(pair) = self.pair else {
            return self.mode();
        };
        if !pair.contains(page) {
            log::trace!("ignoring stale measurement for page {page}");
            return self.mode();
        }
        if aspect > 0.0 {
            self.memo.insert(page, aspect);
        }
        self.reported.insert(page, aspect);

        let (Some(left), Some(right)) = (pair.left(), pair.right()) else {
            return self.mode();
        };
        if let (Some(&l), Some(&r)) = (self.reported.get(&left), self.reported.get(&right)) {
            self.left_aspect = l;
            self.right_aspect = r;
            log::debug!(
                "pair {left}/{right} measured {l:.3}/{r:.3} -> {:?}",
                self.mode()
            );
        }
        self.mode()
    }
}
