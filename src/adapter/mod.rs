//! Format adapters behind one capability interface.

pub mod archive;
pub mod epub;
pub mod pdf;
pub mod raster;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::{ArchiveExtractor, ArchiveFormat, SystemExtractor};
use crate::engine::EngineConfig;
use crate::error::{LoadError, ReflowError, RenderError};
use crate::files::{extension_of, is_image_file};
use crate::settings::{Direction, EpubTheme};
use crate::surface::{Flow, RenderTarget, RenderedPage};

pub use self::archive::ArchiveAdapter;
pub use self::epub::EpubAdapter;
pub use self::pdf::{PdfAdapter, PdfDocument, PdfLoader, default_pdf_loader};
pub use self::raster::ImageAdapter;

/// What a document is loaded from.
#[derive(Debug, Clone)]
pub enum Source {
    Path(PathBuf),
    Paths(Vec<PathBuf>),
    Bytes(Vec<u8>),
}

impl Source {
    /// Single path, or the first of several.
    pub fn first_path(&self) -> Option<&Path> {
        match self {
            Source::Path(p) => Some(p),
            Source::Paths(ps) => ps.first().map(PathBuf::as_path),
            Source::Bytes(_) => None,
        }
    }

    /// Whole contents as bytes, reading the file when given a path.
    pub fn into_bytes(self) -> Result<Vec<u8>, LoadError> {
        match self {
            Source::Bytes(bytes) => Ok(bytes),
            other => {
                let path = other
                    .first_path()
                    .map(Path::to_path_buf)
                    .ok_or_else(|| LoadError::Empty("empty path list".into()))?;
                std::fs::read(&path).map_err(|e| LoadError::io(path, e))
            }
        }
    }
}

/// Uniform contract over every supported document format. Pages are
/// 1-based.
pub trait ContentAdapter: Send {
    fn kind(&self) -> AdapterKind;

    /// Title from the document's own metadata.
    fn title(&self) -> Option<String> {
        None
    }

    /// Discard any loaded document and load `source`. On failure the
    /// adapter is left unloaded and can be reused.
    fn load(&mut self, source: Source) -> Result<(), LoadError>;

    fn render(
        &mut self,
        target: &Arc<dyn RenderTarget>,
        index: usize,
    ) -> Result<RenderedPage, RenderError>;

    fn go_to(&mut self, index: usize) -> Result<(), RenderError>;
    fn next(&mut self) -> Result<(), RenderError>;
    fn prev(&mut self) -> Result<(), RenderError>;

    fn total_pages(&self) -> usize;
    fn current_page(&self) -> usize;

    /// Height over width of `index` if it has been measured.
    fn page_aspect_ratio(&self, _index: usize) -> Option<f32> {
        None
    }

    /// Zoom in percent.
    fn set_zoom(&mut self, _zoom: u32) -> Result<(), RenderError> {
        Ok(())
    }

    fn set_font_size(&mut self, _size: u32) -> Result<(), ReflowError> {
        Ok(())
    }

    fn set_direction(&mut self, _direction: Direction) {}

    fn set_epub_theme(&mut self, _theme: EpubTheme) {}

    fn set_flow(&mut self, _flow: Flow) {}

    fn set_prerender(&mut self, enabled: bool);

    /// Release everything the loaded document owns. Idempotent.
    fn destroy(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    Image,
    Archive,
    Pdf,
    Epub,
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AdapterKind::Image => "image",
            AdapterKind::Archive => "archive",
            AdapterKind::Pdf => "pdf",
            AdapterKind::Epub => "epub",
        })
    }
}

impl AdapterKind {
    /// Pick the adapter for a selection of paths. A directory or a set of
    /// image files is an image set; anything else must be a single file of a
    /// known format.
    pub fn detect(paths: &[PathBuf]) -> Result<Self, LoadError> {
        let Some(first) = paths.first() else {
            return Err(LoadError::Empty("nothing selected".into()));
        };
        if paths.len() > 1 {
            return if paths.iter().all(|p| is_image_file(p)) {
                Ok(AdapterKind::Image)
            } else {
                Err(LoadError::Unsupported(
                    "multiple files must all be images".into(),
                ))
            };
        }
        if first.is_dir() || is_image_file(first) {
            return Ok(AdapterKind::Image);
        }
        if ArchiveFormat::of(first).is_some() {
            return Ok(AdapterKind::Archive);
        }
        match extension_of(first).as_deref() {
            Some("pdf") => Ok(AdapterKind::Pdf),
            Some("epub") => Ok(AdapterKind::Epub),
            _ => Err(LoadError::Unsupported(first.display().to_string())),
        }
    }
}

/// External collaborators the adapters need.
#[derive(Clone)]
pub struct Services {
    pub extractor: Arc<dyn ArchiveExtractor>,
    pub pdf: Arc<dyn PdfLoader>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            extractor: Arc::new(SystemExtractor::default()),
            pdf: default_pdf_loader(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AdapterConfig {
    pub engine: EngineConfig,
    /// Longest edge of a decoded raster page at 100% zoom.
    pub max_image_edge: u32,
    /// Characters per location at the reference 16px font size.
    pub chars_per_location: usize,
    /// Host dark-mode preference, used by the `system` reading theme.
    pub prefers_dark: bool,
    /// Descend into subfolders when a folder is opened as an image set.
    pub recursive: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            max_image_edge: 4096,
            chars_per_location: 1600,
            prefers_dark: false,
            recursive: false,
        }
    }
}

pub fn create_adapter(
    kind: AdapterKind,
    services: &Services,
    config: &AdapterConfig,
) -> Box<dyn ContentAdapter> {
    log::debug!("creating {kind} adapter");
    match kind {
        AdapterKind::Image => Box::new(ImageAdapter::new(config)),
        AdapterKind::Archive => Box::new(ArchiveAdapter::new(
            Arc::clone(&services.extractor),
            config,
        )),
        AdapterKind::Pdf => Box::new(PdfAdapter::new(Arc::clone(&services.pdf), config)),
        AdapterKind::Epub => Box::new(EpubAdapter::new(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn detects_formats_by_extension() {
        assert_eq!(AdapterKind::detect(&paths(&["a.PDF"])).unwrap(), AdapterKind::Pdf);
        assert_eq!(AdapterKind::detect(&paths(&["b.epub"])).unwrap(), AdapterKind::Epub);
        assert_eq!(AdapterKind::detect(&paths(&["c.cbz"])).unwrap(), AdapterKind::Archive);
        assert_eq!(AdapterKind::detect(&paths(&["d.rar"])).unwrap(), AdapterKind::Archive);
        assert_eq!(
            AdapterKind::detect(&paths(&["1.png", "2.jpg"])).unwrap(),
            AdapterKind::Image
        );
    }

    #[test]
    fn rejects_unknown_and_mixed_selections() {
        assert!(matches!(
            AdapterKind::detect(&paths(&["notes.txt"])),
            Err(LoadError::Unsupported(_))
        ));
        assert!(matches!(
            AdapterKind::detect(&paths(&["1.png", "b.pdf"])),
            Err(LoadError::Unsupported(_))
        ));
        assert!(matches!(AdapterKind::detect(&[]), Err(LoadError::Empty(_))));
    }

    #[test]
    fn directory_is_an_image_set() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            AdapterKind::detect(&[dir.path().to_path_buf()]).unwrap(),
            AdapterKind::Image
        );
    }
}
