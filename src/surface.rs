use std::sync::{Arc, Mutex, PoisonError};

use image::RgbaImage;

use crate::settings::Direction;

// ---------------------------------------------------------------------------
// Render output
// ---------------------------------------------------------------------------

/// One rendered page. Cheap to clone: pixel and text payloads are shared, so
/// the cache can keep its copy while a target displays another.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub index: usize,
    /// Intrinsic size of the page content, after orientation is applied.
    pub width: u32,
    pub height: u32,
    /// Ratio between the raster size and the intended display size. Fixed
    /// layout pages are rasterized above display density and scaled down.
    pub display_scale: f32,
    pub content: PageContent,
}

#[derive(Debug, Clone)]
pub enum PageContent {
    Raster(Arc<RgbaImage>),
    Text(Arc<TextPage>),
}

impl RenderedPage {
    pub fn raster(index: usize, image: RgbaImage, display_scale: f32) -> Self {
        let (width, height) = image.dimensions();
        Self {
            index,
            width,
            height,
            display_scale,
            content: PageContent::Raster(Arc::new(image)),
        }
    }

    /// Height over width of the page content, or 0.0 when unknown.
    pub fn aspect_ratio(&self) -> f32 {
        if self.width == 0 || self.height == 0 {
            0.0
        } else {
            self.height as f32 / self.width as f32
        }
    }

    /// Size the page wants on screen, in logical pixels.
    pub fn display_size(&self) -> (u32, u32) {
        let scale = if self.display_scale > 0.0 {
            self.display_scale
        } else {
            1.0
        };
        (
            (self.width as f32 / scale).round() as u32,
            (self.height as f32 / scale).round() as u32,
        )
    }

    pub fn as_raster(&self) -> Option<&RgbaImage> {
        match &self.content {
            PageContent::Raster(img) => Some(img),
            PageContent::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextPage> {
        match &self.content {
            PageContent::Text(text) => Some(text),
            PageContent::Raster(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Reflowable text output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub background: [u8; 3],
    pub foreground: [u8; 3],
    pub link: [u8; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// One location per surface.
    Paginated,
    /// The whole document flowed onto one surface.
    Scrolled,
}

/// Text laid out for the active position of a reflowable document.
#[derive(Debug, Clone, PartialEq)]
pub struct TextPage {
    pub chapter_title: String,
    pub text: String,
    pub font_size: u32,
    pub direction: Direction,
    pub palette: Palette,
    pub flow: Flow,
}

// ---------------------------------------------------------------------------
// Render targets
// ---------------------------------------------------------------------------

/// Something a rendered page can be placed into. The host environment
/// decides how to display it.
pub trait RenderTarget: Send + Sync {
    fn clear(&self);
    fn present(&self, page: RenderedPage);
}

/// Shared slot holding whatever page was last presented.
#[derive(Debug, Clone, Default)]
pub struct Surface {
    slot: Arc<Mutex<Option<RenderedPage>>>,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self) -> Option<RenderedPage> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl RenderTarget for Surface {
    fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn present(&self, page: RenderedPage) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(page);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_ratio_is_height_over_width() {
        let page = RenderedPage::raster(1, RgbaImage::new(100, 141), 1.0);
        assert!((page.aspect_ratio() - 1.41).abs() < 1e-6);

        let empty = RenderedPage::raster(1, RgbaImage::new(0, 0), 1.0);
        assert_eq!(empty.aspect_ratio(), 0.0);
    }

    #[test]
    fn display_size_undoes_oversampling() {
        let page = RenderedPage::raster(1, RgbaImage::new(400, 600), 2.0);
        assert_eq!(page.display_size(), (200, 300));
    }

    #[test]
    fn surface_clones_share_the_slot() {
        let surface = Surface::new();
        let handle = surface.clone();
        handle.present(RenderedPage::raster(4, RgbaImage::new(2, 2), 1.0));
        assert_eq!(surface.page().map(|p| p.index), Some(4));
        surface.clear();
        assert!(handle.is_empty());
    }
}
