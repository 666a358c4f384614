//! Page arrangement: dual-page spreads, paging rules and the continuous
//! scroll layout. Nothing here touches pixels.

pub mod navigation;
pub mod scroll;
pub mod spread;

pub use self::navigation::Navigation;
pub use self::scroll::{ScrollItem, ScrollLayout};
pub use self::spread::{DisplayMode, Slide, SpreadLayout, SpreadPair};
