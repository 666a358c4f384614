use std::path::PathBuf;
use std::sync::Arc;

use super::{AdapterConfig, AdapterKind, ContentAdapter, ImageAdapter, Source};
use crate::archive::ArchiveExtractor;
use crate::error::{LoadError, RenderError};
use crate::surface::{RenderTarget, RenderedPage};

/// Comic archives (CBZ/ZIP, RAR). The archive is unpacked into a private
/// directory and read as an image set; the directory is removed on destroy.
pub struct ArchiveAdapter {
    images: ImageAdapter,
    extractor: Arc<dyn ArchiveExtractor>,
    temp_dir: Option<PathBuf>,
}

impl ArchiveAdapter {
    pub fn new(extractor: Arc<dyn ArchiveExtractor>, config: &AdapterConfig) -> Self {
        Self {
            images: ImageAdapter::new(config),
            extractor,
            temp_dir: None,
        }
    }

    pub fn temp_dir(&self) -> Option<&PathBuf> {
        self.temp_dir.as_ref()
    }

    fn remove_temp_dir(&mut self) {
        if let Some(dir) = self.temp_dir.take() {
            if let Err(e) = self.extractor.delete(&dir) {
                log::warn!("failed to delete temp dir {}: {e}", dir.display());
            }
        }
    }
}

impl ContentAdapter for ArchiveAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Archive
    }

    fn load(&mut self, source: Source) -> Result<(), LoadError> {
        self.destroy();
        let archive = source
            .first_path()
            .map(PathBuf::from)
            .ok_or_else(|| LoadError::Unsupported("archives are loaded from a path".into()))?;

        let extracted = self.extractor.extract(&archive)?;
        self.temp_dir = Some(extracted.dir);
        if let Err(e) = self.images.load_paths(extracted.paths) {
            self.remove_temp_dir();
            return Err(e);
        }
        Ok(())
    }

    fn render(
        &mut self,
        target: &Arc<dyn RenderTarget>,
        index: usize,
    ) -> Result<RenderedPage, RenderError> {
        self.images.render(target, index)
    }

    fn go_to(&mut self, index: usize) -> Result<(), RenderError> {
        self.images.go_to(index)
    }

    fn next(&mut self) -> Result<(), RenderError> {
        self.images.next()
    }

    fn prev(&mut self) -> Result<(), RenderError> {
        self.images.prev()
    }

    fn total_pages(&self) -> usize {
        self.images.total_pages()
    }

    fn current_page(&self) -> usize {
        self.images.current_page()
    }

    fn page_aspect_ratio(&self, index: usize) -> Option<f32> {
        self.images.page_aspect_ratio(index)
    }

    fn set_zoom(&mut self, zoom: u32) -> Result<(), RenderError> {
        self.images.set_zoom(zoom)
    }

    fn set_prerender(&mut self, enabled: bool) {
        self.images.set_prerender(enabled);
    }

    fn destroy(&mut self) {
        // Pages must be released before their files go away.
        self.images.destroy();
        self.remove_temp_dir();
    }
}

impl Drop for ArchiveAdapter {
    fn drop(&mut self) {
        self.destroy();
    }
}
