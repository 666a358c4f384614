use std::sync::Arc;

use image::RgbaImage;

use super::{AdapterConfig, AdapterKind, ContentAdapter, Source};
use crate::engine::{PageEngine, PageRenderer};
use crate::error::{LoadError, RenderError};
use crate::surface::{RenderTarget, RenderedPage};

/// Pages are rasterized at this multiple of the display size and shown
/// scaled down, so text stays crisp.
pub const OVERSAMPLE: f32 = 2.0;

/// An opened fixed-layout document.
pub trait PdfDocument: Send + Sync {
    fn page_count(&self) -> usize;

    /// Raster of page `index` (1-based) at `scale` times its natural size.
    fn rasterize(&self, index: usize, scale: f32) -> Result<RgbaImage, String>;
}

/// Opens fixed-layout documents from their bytes.
pub trait PdfLoader: Send + Sync {
    fn open(&self, bytes: Vec<u8>) -> Result<Arc<dyn PdfDocument>, LoadError>;
}

struct PdfRenderer {
    doc: Arc<dyn PdfDocument>,
    zoom: f32,
}

impl PageRenderer for PdfRenderer {
    fn render_page(&self, index: usize) -> Result<RenderedPage, RenderError> {
        let img = self
            .doc
            .rasterize(index, self.zoom * OVERSAMPLE)
            .map_err(|e| RenderError::decode(index, e))?;
        Ok(RenderedPage::raster(index, img, OVERSAMPLE))
    }
}

pub struct PdfAdapter {
    engine: PageEngine,
    loader: Arc<dyn PdfLoader>,
    doc: Option<Arc<dyn PdfDocument>>,
    zoom: f32,
}

impl PdfAdapter {
    pub fn new(loader: Arc<dyn PdfLoader>, config: &AdapterConfig) -> Self {
        Self {
            engine: PageEngine::new(config.engine),
            loader,
            doc: None,
            zoom: 1.0,
        }
    }

    pub fn engine(&self) -> &PageEngine {
        &self.engine
    }

    fn renderer(&self, doc: &Arc<dyn PdfDocument>) -> Arc<PdfRenderer> {
        Arc::new(PdfRenderer {
            doc: Arc::clone(doc),
            zoom: self.zoom,
        })
    }
}

impl ContentAdapter for PdfAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Pdf
    }

    fn load(&mut self, source: Source) -> Result<(), LoadError> {
        self.destroy();
        let bytes = source.into_bytes()?;
        let doc = self.loader.open(bytes)?;
        let total = doc.page_count();
        if total == 0 {
            return Err(LoadError::Empty("document has no pages".into()));
        }
        self.engine.attach(self.renderer(&doc), total);
        self.doc = Some(doc);
        log::info!("loaded pdf with {total} pages");
        Ok(())
    }

    fn render(
        &mut self,
        target: &Arc<dyn RenderTarget>,
        index: usize,
    ) -> Result<RenderedPage, RenderError> {
        self.engine.render(target, index)
    }

    fn go_to(&mut self, index: usize) -> Result<(), RenderError> {
        self.engine.go_to(index)
    }

    fn next(&mut self) -> Result<(), RenderError> {
        self.engine.next()
    }

    fn prev(&mut self) -> Result<(), RenderError> {
        self.engine.prev()
    }

    fn total_pages(&self) -> usize {
        self.engine.total_pages()
    }

    fn current_page(&self) -> usize {
        self.engine.current_page()
    }

    fn page_aspect_ratio(&self, index: usize) -> Option<f32> {
        self.engine.aspect_ratio(index)
    }

    /// Invalidates the cache and renders the visible page again right away.
    fn set_zoom(&mut self, zoom: u32) -> Result<(), RenderError> {
        let zoom = zoom.max(1) as f32 / 100.0;
        if (zoom - self.zoom).abs() < f32::EPSILON {
            return Ok(());
        }
        self.zoom = zoom;
        let Some(doc) = self.doc.clone() else {
            return Ok(());
        };
        self.engine.replace_renderer(self.renderer(&doc));
        self.engine.rerender_current().map(|_| ())
    }

    fn set_prerender(&mut self, enabled: bool) {
        self.engine.set_prerender(enabled);
    }

    fn destroy(&mut self) {
        self.engine.detach();
        self.doc = None;
    }
}

// ---------------------------------------------------------------------------
// Pdfium backend
// ---------------------------------------------------------------------------

#[cfg(feature = "pdfium")]
mod pdfium {
    use std::sync::{Arc, Mutex, PoisonError};

    use image::RgbaImage;
    use pdfium_render::prelude::*;

    use super::{PdfDocument, PdfLoader};
    use crate::error::LoadError;

    // Pdfium is not reentrant; every call into it holds this lock.
    static PDFIUM_LOCK: Mutex<()> = Mutex::new(());

    /// Bind the library shipped next to the executable, falling back to the
    /// system one.
    fn init_pdfium() -> Result<Pdfium, PdfiumError> {
        let local = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.to_path_buf()));
        if let Some(dir) = local {
            if let Ok(binding) =
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
            {
                return Ok(Pdfium::new(binding));
            }
        }
        Pdfium::bind_to_system_library().map(Pdfium::new)
    }

    pub struct PdfiumLoader;

    struct PdfiumDocument {
        bytes: Vec<u8>,
        pages: usize,
    }

    impl PdfLoader for PdfiumLoader {
        fn open(&self, bytes: Vec<u8>) -> Result<Arc<dyn PdfDocument>, LoadError> {
            let _guard = PDFIUM_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            let pdfium = init_pdfium()
                .map_err(|e| LoadError::Unsupported(format!("pdfium unavailable: {e}")))?;
            let pages = {
                let document = pdfium
                    .load_pdf_from_byte_slice(&bytes, None)
                    .map_err(|e| LoadError::Corrupt(e.to_string()))?;
                document.pages().len() as usize
            };
            Ok(Arc::new(PdfiumDocument { bytes, pages }))
        }
    }

    impl PdfDocument for PdfiumDocument {
        fn page_count(&self) -> usize {
            self.pages
        }

        fn rasterize(&self, index: usize, scale: f32) -> Result<RgbaImage, String> {
            let page_index = u16::try_from(index.saturating_sub(1)).map_err(|e| e.to_string())?;
            let _guard = PDFIUM_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            let pdfium = init_pdfium().map_err(|e| e.to_string())?;
            let document = pdfium
                .load_pdf_from_byte_slice(&self.bytes, None)
                .map_err(|e| e.to_string())?;
            let page = document.pages().get(page_index).map_err(|e| e.to_string())?;

            let config = PdfRenderConfig::new().scale_page_by_factor(scale);
            let bitmap = page.render_with_config(&config).map_err(|e| e.to_string())?;
            let width = bitmap.width() as u32;
            let height = bitmap.height() as u32;
            let rgba = bitmap.as_rgba_bytes().to_vec();
            RgbaImage::from_raw(width, height, rgba)
                .ok_or_else(|| format!("bitmap size mismatch for {width}x{height}"))
        }
    }
}

#[cfg(not(feature = "pdfium"))]
struct UnavailableLoader;

#[cfg(not(feature = "pdfium"))]
impl PdfLoader for UnavailableLoader {
    fn open(&self, _bytes: Vec<u8>) -> Result<Arc<dyn PdfDocument>, LoadError> {
        Err(LoadError::Unsupported(
            "built without PDF support (enable the `pdfium` feature)".into(),
        ))
    }
}

pub fn default_pdf_loader() -> Arc<dyn PdfLoader> {
    #[cfg(feature = "pdfium")]
    {
        Arc::new(pdfium::PdfiumLoader)
    }
    #[cfg(not(feature = "pdfium"))]
    {
        Arc::new(UnavailableLoader)
    }
}
