use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use image::{DynamicImage, RgbaImage};
use rayon::prelude::*;

use super::{AdapterConfig, AdapterKind, ContentAdapter, Source};
use crate::engine::{PageEngine, PageRenderer};
use crate::error::{LoadError, RenderError};
use crate::files::{collect_images, natural_sort};
use crate::surface::{RenderTarget, RenderedPage};

/// Pages decoded right after load, before any window exists.
const PRELOAD_COUNT: usize = 3;

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

fn exif_orientation(path: &Path) -> Option<u32> {
    let file = File::open(path).ok()?;
    let exif = exif::Reader::new()
        .read_from_container(&mut BufReader::new(file))
        .ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    field.value.get_uint(0).filter(|v| (1..=8).contains(v))
}

fn apply_orientation(img: DynamicImage, orientation: Option<u32>) -> DynamicImage {
    match orientation {
        Some(2) => img.fliph(),
        Some(3) => img.rotate180(),
        Some(4) => img.flipv(),
        Some(5) => img.rotate90().fliph(),
        Some(6) => img.rotate90(),
        Some(7) => img.rotate270().fliph(),
        Some(8) => img.rotate270(),
        _ => img,
    }
}

/// Decode `path`, upright per its EXIF tag, shrunk to fit `fit` if larger.
/// The aspect ratio is preserved.
pub fn decode_image(path: &Path, fit: Option<(u32, u32)>) -> Result<RgbaImage, String> {
    let img = image::open(path).map_err(|e| e.to_string())?;
    let img = apply_orientation(img, exif_orientation(path));
    let img = match fit {
        Some((w, h)) if img.width() > w || img.height() > h => img.thumbnail(w, h),
        _ => img,
    };
    Ok(img.to_rgba8())
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Preload {
    alive: AtomicBool,
    pages: Mutex<HashMap<usize, RenderedPage>>,
}

impl Preload {
    fn live() -> Arc<Self> {
        Arc::new(Self {
            alive: AtomicBool::new(true),
            pages: Mutex::default(),
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn store(&self, page: RenderedPage) {
        let mut pages = self.pages.lock().unwrap_or_else(PoisonError::into_inner);
        // Checked under the lock so a concurrent kill() wins.
        if self.is_alive() {
            pages.insert(page.index, page);
        }
    }

    fn take(&self, index: usize) -> Option<RenderedPage> {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&index)
    }

    fn kill(&self) {
        let mut pages = self.pages.lock().unwrap_or_else(PoisonError::into_inner);
        self.alive.store(false, Ordering::Release);
        pages.clear();
    }
}

struct ImageRenderer {
    paths: Arc<Vec<PathBuf>>,
    fit: Option<(u32, u32)>,
    preload: Arc<Preload>,
}

impl ImageRenderer {
    fn decode(&self, index: usize) -> Result<RenderedPage, RenderError> {
        let path = self
            .paths
            .get(index.wrapping_sub(1))
            .ok_or(RenderError::OutOfRange {
                index,
                total: self.paths.len(),
            })?;
        let img = decode_image(path, self.fit)
            .map_err(|e| RenderError::decode(index, format!("{}: {e}", path.display())))?;
        Ok(RenderedPage::raster(index, img, 1.0))
    }
}

impl PageRenderer for ImageRenderer {
    fn render_page(&self, index: usize) -> Result<RenderedPage, RenderError> {
        if let Some(page) = self.preload.take(index) {
            log::trace!("page {index} taken from preload");
            return Ok(page);
        }
        self.decode(index)
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// A set of image files, one page per file, in natural order.
pub struct ImageAdapter {
    engine: PageEngine,
    paths: Arc<Vec<PathBuf>>,
    max_edge: u32,
    recursive: bool,
    zoom: u32,
    preload: Arc<Preload>,
}

impl ImageAdapter {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            engine: PageEngine::new(config.engine),
            paths: Arc::new(Vec::new()),
            max_edge: config.max_image_edge,
            recursive: config.recursive,
            zoom: 100,
            preload: Arc::new(Preload::default()),
        }
    }

    /// Page files in display order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn engine(&self) -> &PageEngine {
        &self.engine
    }

    fn fit(&self) -> Option<(u32, u32)> {
        if self.max_edge == 0 {
            return None;
        }
        let edge = (self.max_edge as u64 * self.zoom as u64 / 100).max(1);
        let edge = u32::try_from(edge).unwrap_or(u32::MAX);
        Some((edge, edge))
    }

    fn renderer(&self) -> Arc<ImageRenderer> {
        Arc::new(ImageRenderer {
            paths: Arc::clone(&self.paths),
            fit: self.fit(),
            preload: Arc::clone(&self.preload),
        })
    }

    /// Load an explicit list of image paths.
    pub fn load_paths(&mut self, paths: Vec<PathBuf>) -> Result<(), LoadError> {
        self.destroy();

        // Loose files are sorted among themselves; folders keep the
        // per-directory order `collect_images` builds.
        let mut pages = Vec::with_capacity(paths.len());
        let mut folders = Vec::new();
        for path in paths {
            let meta = fs::metadata(&path).map_err(|e| LoadError::io(&path, e))?;
            if meta.is_dir() {
                folders.push(path);
            } else {
                pages.push(path);
            }
        }
        natural_sort(&mut pages);
        natural_sort(&mut folders);
        for folder in folders {
            pages.extend(collect_images(&folder, self.recursive)?);
        }
        if pages.is_empty() {
            return Err(LoadError::Empty("image set".into()));
        }

        let total = pages.len();
        self.paths = Arc::new(pages);
        self.preload = Preload::live();
        self.engine.attach(self.renderer(), total);
        log::info!("loaded image set with {total} pages");

        if self.engine.prerender_enabled() {
            self.spawn_preload();
        }
        Ok(())
    }

    fn spawn_preload(&self) {
        let renderer = self.renderer();
        let count = PRELOAD_COUNT.min(self.paths.len());
        rayon::spawn(move || {
            (1..=count).into_par_iter().for_each(|index| {
                if !renderer.preload.is_alive() {
                    return;
                }
                match renderer.decode(index) {
                    Ok(page) => renderer.preload.store(page),
                    Err(e) => log::debug!("preload skipped: {e}"),
                }
            });
        });
    }
}

impl ContentAdapter for ImageAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Image
    }

    fn load(&mut self, source: Source) -> Result<(), LoadError> {
        match source {
            Source::Path(path) => self.load_paths(vec![path]),
            Source::Paths(paths) => self.load_paths(paths),
            Source::Bytes(_) => Err(LoadError::Unsupported(
                "image sets are loaded from paths".into(),
            )),
        }
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

    fn set_zoom(&mut self, zoom: u32) -> Result<(), RenderError> {
        if zoom == self.zoom {
            return Ok(());
        }
        self.zoom = zoom.max(1);
        // Preloaded pages were decoded for the old size.
        self.preload.kill();
        self.preload = Arc::new(Preload::default());
        self.engine.replace_renderer(self.renderer());
        Ok(())
    }

    fn set_prerender(&mut self, enabled: bool) {
        self.engine.set_prerender(enabled);
    }

    fn destroy(&mut self) {
        self.preload.kill();
        self.engine.detach();
        self.paths = Arc::new(Vec::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::Surface;
    use image::{ImageBuffer, Rgba};

    fn write_page(dir: &Path, name: &str, w: u32, h: u32) -> PathBuf {
        let path = dir.join(name);
        let img: RgbaImage = ImageBuffer::from_pixel(w, h, Rgba([200, 10, 10, 255]));
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn orientation_swaps_dimensions_for_rotations() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(4, 2));
        let rotated = apply_orientation(img.clone(), Some(6));
        assert_eq!((rotated.width(), rotated.height()), (2, 4));
        let flipped = apply_orientation(img, Some(2));
        assert_eq!((flipped.width(), flipped.height()), (4, 2));
    }

    #[test]
    fn decode_fits_without_changing_aspect() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_page(dir.path(), "big.png", 400, 200);
        let img = decode_image(&path, Some((100, 100))).unwrap();
        assert_eq!(img.dimensions(), (100, 50));
        let small = decode_image(&path, Some((1000, 1000))).unwrap();
        assert_eq!(small.dimensions(), (400, 200));
    }

    #[test]
    fn loads_in_natural_order_and_renders_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let p10 = write_page(dir.path(), "p10.png", 10, 20);
        let p2 = write_page(dir.path(), "p2.png", 20, 10);
        let p1 = write_page(dir.path(), "p1.png", 10, 14);

        let mut adapter = ImageAdapter::new(&AdapterConfig::default());
        adapter.load(Source::Paths(vec![p10.clone(), p1.clone(), p2.clone()])).unwrap();
        assert_eq!(adapter.paths(), [p1, p2, p10]);
        assert_eq!(adapter.total_pages(), 3);
        assert_eq!(adapter.current_page(), 1);

        let surface = Surface::new();
        let target: Arc<dyn RenderTarget> = Arc::new(surface.clone());
        let page = adapter.render(&target, 2).unwrap();
        assert_eq!((page.width, page.height), (20, 10));
        assert!((page.aspect_ratio() - 0.5).abs() < 1e-6);
        assert_eq!(adapter.page_aspect_ratio(2), Some(0.5));
    }

    #[test]
    fn recursive_folder_keeps_chapters_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for chapter in ["ch1", "ch2", "ch10"] {
            fs::create_dir(dir.path().join(chapter)).unwrap();
        }
        let expected = vec![
            write_page(dir.path(), "cover.png", 4, 4),
            write_page(&dir.path().join("ch1"), "1.png", 4, 4),
            write_page(&dir.path().join("ch1"), "2.png", 4, 4),
            write_page(&dir.path().join("ch2"), "1.png", 4, 4),
            write_page(&dir.path().join("ch2"), "2.png", 4, 4),
            write_page(&dir.path().join("ch10"), "1.png", 4, 4),
        ];

        let config = AdapterConfig {
            recursive: true,
            ..AdapterConfig::default()
        };
        let mut adapter = ImageAdapter::new(&config);
        adapter.load(Source::Path(dir.path().to_path_buf())).unwrap();
        assert_eq!(adapter.paths(), expected.as_slice());
    }

    #[test]
    fn missing_file_fails_and_adapter_stays_usable() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = ImageAdapter::new(&AdapterConfig::default());
        let err = adapter
            .load(Source::Path(dir.path().join("gone.png")))
            .unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
        assert_eq!(adapter.total_pages(), 0);

        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(
            adapter.load(Source::Path(empty.path().to_path_buf())),
            Err(LoadError::Empty(_))
        ));

        let page = write_page(dir.path(), "ok.png", 3, 3);
        adapter.load(Source::Path(page)).unwrap();
        assert_eq!(adapter.total_pages(), 1);
    }

    #[test]
    fn corrupt_page_is_a_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("1.png");
        fs::write(&bad, b"not a png").unwrap();
        let mut adapter = ImageAdapter::new(&AdapterConfig::default());
        adapter.load(Source::Path(bad)).unwrap();

        let target: Arc<dyn RenderTarget> = Arc::new(Surface::new());
        assert!(matches!(
            adapter.render(&target, 1),
            Err(RenderError::Decode { index: 1, .. })
        ));
    }

    #[test]
    fn zoom_changes_decoded_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_page(dir.path(), "1.png", 200, 100);
        let config = AdapterConfig {
            max_image_edge: 100,
            ..AdapterConfig::default()
        };
        let mut adapter = ImageAdapter::new(&config);
        adapter.load(Source::Path(path)).unwrap();
        let target: Arc<dyn RenderTarget> = Arc::new(Surface::new());

        assert_eq!(adapter.render(&target, 1).unwrap().width, 100);
        adapter.set_zoom(200).unwrap();
        assert!(adapter.engine().cached_pages().is_empty());
        assert_eq!(adapter.render(&target, 1).unwrap().width, 200);
    }
}
