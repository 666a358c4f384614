use super::spread::{DisplayMode, SpreadPair};
use crate::settings::{Direction, ViewMode};

/// Where "previous" and "next" lead from the current page. Every method
/// returns `None` when the move would leave the document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Navigation {
    pub view_mode: ViewMode,
    /// Layout of the visible pair; only read in dual mode.
    pub display: DisplayMode,
    pub direction: Direction,
    pub current: usize,
    pub total: usize,
}

impl Navigation {
    pub fn new(view_mode: ViewMode, current: usize, total: usize) -> Self {
        Self {
            view_mode,
            display: DisplayMode::Spread,
            direction: Direction::Ltr,
            current,
            total,
        }
    }

    pub fn with_display(mut self, display: DisplayMode, direction: Direction) -> Self {
        self.display = display;
        self.direction = direction;
        self
    }

    /// `page` clamped into the document.
    pub fn go_to(&self, page: usize) -> usize {
        page.clamp(1, self.total.max(1))
    }

    pub fn next(&self) -> Option<usize> {
        if self.total == 0 {
            return None;
        }
        let target = match self.view_mode {
            ViewMode::Single | ViewMode::Scroll => self.current + 1,
            ViewMode::Dual => {
                let pair = self.pair();
                match pair.second {
                    // A promoted pair is stepped through one page at a time.
                    Some(second) if self.display.is_promoted() && self.current != second => {
                        second
                    }
                    _ => pair.first + 2,
                }
            }
        };
        (target <= self.total && target != self.current).then_some(target)
    }

    pub fn prev(&self) -> Option<usize> {
        if self.total == 0 {
            return None;
        }
        let target = match self.view_mode {
            ViewMode::Single | ViewMode::Scroll => self.current.checked_sub(1)?,
            ViewMode::Dual => {
                let pair = self.pair();
                if self.display.is_promoted() && pair.second == Some(self.current) {
                    pair.first
                } else {
                    pair.first.checked_sub(2)?
                }
            }
        };
        (target >= 1 && target != self.current).then_some(target)
    }

    fn pair(&self) -> SpreadPair {
        SpreadPair::for_page(self.current, self.total, self.direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dual(current: usize, total: usize, display: DisplayMode) -> Navigation {
        Navigation::new(ViewMode::Dual, current, total).with_display(display, Direction::Ltr)
    }

    #[test]
    fn single_steps_by_one_and_stops_at_the_ends() {
        let nav = Navigation::new(ViewMode::Single, 1, 3);
        assert_eq!(nav.prev(), None);
        assert_eq!(nav.next(), Some(2));
        let nav = Navigation::new(ViewMode::Scroll, 3, 3);
        assert_eq!(nav.next(), None);
        assert_eq!(nav.prev(), Some(2));
    }

    #[test]
    fn go_to_clamps() {
        let nav = Navigation::new(ViewMode::Dual, 4, 12);
        assert_eq!(nav.go_to(0), 1);
        assert_eq!(nav.go_to(17), 12);
        assert_eq!(nav.go_to(7), 7);
        assert_eq!(Navigation::new(ViewMode::Single, 1, 0).next(), None);
    }

    #[test]
    fn spread_moves_by_pairs() {
        assert_eq!(dual(3, 10, DisplayMode::Spread).next(), Some(5));
        assert_eq!(dual(4, 10, DisplayMode::Spread).next(), Some(5));
        assert_eq!(dual(4, 10, DisplayMode::Spread).prev(), Some(1));
        assert_eq!(dual(1, 10, DisplayMode::Spread).prev(), None);
        assert_eq!(dual(9, 10, DisplayMode::Spread).next(), None);
        assert_eq!(dual(9, 9, DisplayMode::Spread).next(), None);
    }

    #[test]
    fn promoted_left_page_steps_onto_its_neighbour() {
        let at_three = dual(3, 10, DisplayMode::LeftOnly);
        assert_eq!(at_three.next(), Some(4));
        let at_four = dual(4, 10, DisplayMode::LeftOnly);
        assert_eq!(at_four.next(), Some(5));
        assert_eq!(at_three.prev(), Some(1));
    }

    #[test]
    fn promoted_right_page() {
        let at_four = dual(4, 10, DisplayMode::RightOnly);
        assert_eq!(at_four.next(), Some(5));
        assert_eq!(at_four.prev(), Some(3));
        assert_eq!(dual(3, 10, DisplayMode::RightOnly).prev(), Some(1));
    }

    #[test]
    fn promoted_pair_without_partner() {
        let last = dual(9, 9, DisplayMode::LeftOnly);
        assert_eq!(last.next(), None);
        assert_eq!(last.prev(), Some(7));
    }

    #[test]
    fn right_to_left_follows_reading_order() {
        let nav = Navigation::new(ViewMode::Dual, 3, 10)
            .with_display(DisplayMode::LeftOnly, Direction::Rtl);
        assert_eq!(nav.next(), Some(4));
        let nav = Navigation { current: 4, ..nav };
        assert_eq!(nav.next(), Some(5));
        assert_eq!(nav.prev(), Some(3));
    }
}
