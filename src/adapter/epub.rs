//! Reflowable EPUB documents.
//!
//! An EPUB has no intrinsic page count. Chapter text is split into
//! locations of roughly one screen each, and the location count is the page
//! count. Locations depend on the font size, so a font change regenerates
//! them and restores the reading position through a [`Position`] marker,
//! which does not depend on layout.

use std::io::Cursor;
use std::sync::{Arc, LazyLock};

use epub::doc::EpubDoc;
use regex::Regex;

use super::{AdapterConfig, AdapterKind, ContentAdapter, Source};
use crate::error::{LoadError, ReflowError, RenderError};
use crate::settings::{Direction, EpubTheme};
use crate::surface::{Flow, PageContent, RenderTarget, RenderedPage, TextPage};

/// Font size the configured location length is calibrated for.
const REFERENCE_FONT_SIZE: u32 = 16;

// ---------------------------------------------------------------------------
// Text extraction
// ---------------------------------------------------------------------------

static SKIPPED_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<head\b.*?</head\s*>|<script\b.*?</script\s*>|<style\b.*?</style\s*>")
        .expect("valid regex")
});
static BLOCK_BREAKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(p|div|h[1-6]|li|blockquote|tr|section|pre)\s*>|<br\s*/?>")
        .expect("valid regex")
});
static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\r\u{a0}]+").expect("valid regex"));
static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(h[1-3]|title)\b[^>]*>(.*?)</(h[1-3]|title)\s*>").expect("valid regex")
});

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.find(';').filter(|&i| i <= 10) else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Plain text of an XHTML chapter, one paragraph per line.
pub fn html_to_text(html: &str) -> String {
    let body = SKIPPED_BLOCKS.replace_all(html, "");
    let body = BLOCK_BREAKS.replace_all(&body, "\n");
    let body = TAGS.replace_all(&body, "");
    let body = decode_entities(&body);
    body.lines()
        .map(|line| SPACES.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn chapter_title(html: &str) -> Option<String> {
    HEADING
        .captures_iter(html)
        .filter_map(|c| c.get(2))
        .map(|m| html_to_text(m.as_str()))
        .find(|t| !t.is_empty())
}

#[derive(Debug, Clone)]
pub struct Chapter {
    pub title: String,
    pub text: String,
}

impl Chapter {
    fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    fn slice(&self, from: usize, to: usize) -> &str {
        let byte_at = |n: usize| {
            self.text
                .char_indices()
                .nth(n)
                .map(|(b, _)| b)
                .unwrap_or(self.text.len())
        };
        &self.text[byte_at(from)..byte_at(to)]
    }
}

#[derive(Debug, Clone)]
pub struct Book {
    pub title: Option<String>,
    pub chapters: Vec<Chapter>,
}

impl Book {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, LoadError> {
        let mut doc = EpubDoc::from_reader(Cursor::new(bytes))
            .map_err(|e| LoadError::Corrupt(format!("not a readable EPUB: {e}")))?;
        let title = doc.mdata("title").map(|m| m.value.to_string());

        let mut chapters = Vec::new();
        for i in 0..doc.get_num_chapters() {
            if !doc.set_current_chapter(i) {
                log::warn!("skipping unreadable spine item {i}");
                continue;
            }
            let Some((html, _mime)) = doc.get_current_str() else {
                log::warn!("spine item {i} has no text content");
                continue;
            };
            chapters.push(Chapter {
                title: chapter_title(&html).unwrap_or_else(|| format!("Chapter {}", i + 1)),
                text: html_to_text(&html),
            });
        }
        log::debug!("read {} chapters from epub", chapters.len());
        Ok(Self { title, chapters })
    }
}

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

/// Layout-independent reading position: a character offset in a chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub chapter: usize,
    pub offset: usize,
}

/// Start positions of every location, in reading order. Locations never
/// span two chapters.
#[derive(Debug, Clone, Default)]
pub struct LocationIndex {
    starts: Vec<Position>,
}

impl LocationIndex {
    /// Split every chapter into chunks of at most `chars` characters,
    /// preferring to break after whitespace in the second half of a chunk.
    pub fn generate(chapters: &[Chapter], chars: usize) -> Result<Self, ReflowError> {
        if chars == 0 {
            return Err(ReflowError::InvalidChunkSize);
        }
        let mut starts = Vec::new();
        for (chapter, ch) in chapters.iter().enumerate() {
            let text: Vec<char> = ch.text.chars().collect();
            let mut offset = 0;
            while offset < text.len() {
                starts.push(Position { chapter, offset });
                let hard_end = (offset + chars).min(text.len());
                if hard_end == text.len() {
                    break;
                }
                let soft_floor = offset + chars / 2;
                let end = (soft_floor.max(offset + 1)..=hard_end)
                    .rev()
                    .find(|&i| text[i - 1].is_whitespace())
                    .unwrap_or(hard_end);
                offset = end;
            }
        }
        if starts.is_empty() {
            return Err(ReflowError::NoContent);
        }
        Ok(Self { starts })
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Marker for the start of location `index` (1-based).
    pub fn position_of(&self, index: usize) -> Option<Position> {
        index.checked_sub(1).and_then(|i| self.starts.get(i)).copied()
    }

    /// Location (1-based) containing `pos`.
    pub fn index_of(&self, pos: Position) -> usize {
        self.starts.partition_point(|s| *s <= pos).max(1)
    }

    /// Chapter and character range of location `index`.
    fn span(&self, index: usize, chapters: &[Chapter]) -> Option<(usize, usize, usize)> {
        let start = self.position_of(index)?;
        let end = match self.starts.get(index) {
            Some(next) if next.chapter == start.chapter => next.offset,
            _ => chapters.get(start.chapter)?.char_len(),
        };
        Some((start.chapter, start.offset, end))
    }
}

/// Characters per location at `font_size`, scaled from the reference size.
pub fn chars_per_location(base: usize, font_size: u32) -> usize {
    let font_size = font_size.max(1) as f64;
    ((base as f64 * REFERENCE_FONT_SIZE as f64 / font_size).round() as usize).max(1)
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// EPUB adapter. Keeps one rendition surface for the active position
/// instead of a page cache.
pub struct EpubAdapter {
    book: Option<Arc<Book>>,
    locations: LocationIndex,
    base_chars: usize,
    font_size: u32,
    direction: Direction,
    theme: EpubTheme,
    prefers_dark: bool,
    flow: Flow,
    current: usize,
    marker: Option<Position>,
    rendition: Option<Arc<dyn RenderTarget>>,
}

impl EpubAdapter {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            book: None,
            locations: LocationIndex::default(),
            base_chars: config.chars_per_location,
            font_size: REFERENCE_FONT_SIZE,
            direction: Direction::Ltr,
            theme: EpubTheme::Light,
            prefers_dark: config.prefers_dark,
            flow: Flow::Paginated,
            current: 1,
            marker: None,
            rendition: None,
        }
    }

    pub fn book(&self) -> Option<&Book> {
        self.book.as_deref()
    }

    /// Stable marker for the current position.
    pub fn position(&self) -> Option<Position> {
        self.marker
    }

    /// Location currently holding `pos`.
    pub fn locate(&self, pos: Position) -> usize {
        self.locations.index_of(pos)
    }

    pub fn open_book(&mut self, book: Book) -> Result<(), LoadError> {
        self.destroy();
        let locations = LocationIndex::generate(
            &book.chapters,
            chars_per_location(self.base_chars, self.font_size),
        )?;
        log::info!(
            "loaded epub {:?}: {} chapters, {} locations",
            book.title.as_deref().unwrap_or("untitled"),
            book.chapters.len(),
            locations.len()
        );
        self.locations = locations;
        self.book = Some(Arc::new(book));
        self.current = 1;
        self.marker = self.locations.position_of(1);
        Ok(())
    }

    fn compose(&self, index: usize) -> Result<RenderedPage, RenderError> {
        let book = self.book.as_ref().ok_or(RenderError::NotLoaded)?;
        let (chapter_title, text) = match self.flow {
            Flow::Paginated => {
                let (chapter, from, to) = self
                    .locations
                    .span(index, &book.chapters)
                    .ok_or(RenderError::OutOfRange {
                        index,
                        total: self.locations.len(),
                    })?;
                let ch = &book.chapters[chapter];
                (ch.title.clone(), ch.slice(from, to).to_string())
            }
            Flow::Scrolled => {
                let text = book
                    .chapters
                    .iter()
                    .map(|c| c.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                (book.title.clone().unwrap_or_default(), text)
            }
        };
        let page = TextPage {
            chapter_title,
            text,
            font_size: self.font_size,
            direction: self.direction,
            palette: self.theme.palette(self.prefers_dark),
            flow: self.flow,
        };
        Ok(RenderedPage {
            index,
            width: 0,
            height: 0,
            display_scale: 1.0,
            content: PageContent::Text(Arc::new(page)),
        })
    }

    /// Show the current location again with the current styling.
    fn refresh(&mut self) -> Result<(), RenderError> {
        let Some(target) = self.rendition.clone() else {
            return Ok(());
        };
        if self.book.is_none() {
            return Ok(());
        }
        let page = self.compose(self.current)?;
        target.present(page);
        Ok(())
    }

    fn refresh_logged(&mut self) {
        if let Err(e) = self.refresh() {
            log::warn!("could not refresh epub rendition: {e}");
        }
    }
}

impl ContentAdapter for EpubAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Epub
    }

    fn title(&self) -> Option<String> {
        self.book.as_ref().and_then(|b| b.title.clone())
    }

    fn load(&mut self, source: Source) -> Result<(), LoadError> {
        self.destroy();
        let book = Book::from_bytes(source.into_bytes()?)?;
        self.open_book(book)
    }

    fn render(
        &mut self,
        target: &Arc<dyn RenderTarget>,
        index: usize,
    ) -> Result<RenderedPage, RenderError> {
        if self.book.is_none() {
            return Err(RenderError::NotLoaded);
        }
        if index == 0 || index > self.locations.len() {
            return Err(RenderError::OutOfRange {
                index,
                total: self.locations.len(),
            });
        }
        let same_target = self
            .rendition
            .as_ref()
            .is_some_and(|r| Arc::ptr_eq(r, target));
        if !same_target {
            if let Some(old) = self.rendition.take() {
                old.clear();
            }
            target.clear();
            self.rendition = Some(Arc::clone(target));
        }

        self.current = index;
        self.marker = self.locations.position_of(index);
        let page = self.compose(index)?;
        target.present(page.clone());
        Ok(page)
    }

    fn go_to(&mut self, index: usize) -> Result<(), RenderError> {
        if self.book.is_none() {
            return Err(RenderError::NotLoaded);
        }
        let index = index.clamp(1, self.locations.len().max(1));
        match self.rendition.clone() {
            Some(target) => self.render(&target, index).map(|_| ()),
            None => {
                self.current = index;
                self.marker = self.locations.position_of(index);
                Ok(())
            }
        }
    }

    fn next(&mut self) -> Result<(), RenderError> {
        if self.book.is_none() || self.current >= self.locations.len() {
            return Ok(());
        }
        self.go_to(self.current + 1)
    }

    fn prev(&mut self) -> Result<(), RenderError> {
        if self.book.is_none() || self.current <= 1 {
            return Ok(());
        }
        self.go_to(self.current - 1)
    }

    fn total_pages(&self) -> usize {
        self.locations.len()
    }

    fn current_page(&self) -> usize {
        self.current
    }

    /// Captures the marker, regenerates locations for the new size, then
    /// resolves the marker back to a location.
    fn set_font_size(&mut self, size: u32) -> Result<(), ReflowError> {
        if size == self.font_size {
            return Ok(());
        }
        let saved = self.marker.or_else(|| self.locations.position_of(self.current));
        self.font_size = size.max(1);

        let Some(book) = self.book.clone() else {
            return Ok(());
        };
        let before = self.locations.len();
        self.locations = LocationIndex::generate(
            &book.chapters,
            chars_per_location(self.base_chars, self.font_size),
        )?;
        if let Some(pos) = saved {
            self.current = self.locations.index_of(pos);
            self.marker = Some(pos);
        } else {
            self.current = 1;
        }
        log::debug!(
            "reflowed at {}px: {} -> {} locations, now at {}",
            self.font_size,
            before,
            self.locations.len(),
            self.current
        );
        self.refresh_logged();
        Ok(())
    }

    fn set_direction(&mut self, direction: Direction) {
        if self.direction != direction {
            self.direction = direction;
            self.refresh_logged();
        }
    }

    fn set_epub_theme(&mut self, theme: EpubTheme) {
        if self.theme != theme {
            self.theme = theme;
            self.refresh_logged();
        }
    }

    fn set_flow(&mut self, flow: Flow) {
        if self.flow != flow {
            self.flow = flow;
            self.refresh_logged();
        }
    }

    fn set_prerender(&mut self, _enabled: bool) {
        // Nothing is cached beyond the rendition itself.
    }

    fn destroy(&mut self) {
        if let Some(target) = self.rendition.take() {
            target.clear();
        }
        self.book = None;
        self.locations = LocationIndex::default();
        self.current = 1;
        self.marker = None;
    }
}
