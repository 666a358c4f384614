//! Reading engine for image folders, comic archives, PDF and EPUB.
//!
//! A [`Reader`] opens a document through a format adapter, keeps a window
//! of rendered pages around the current one and decides how pages are laid
//! out in single, dual and continuous scroll views.

pub mod adapter;
pub mod archive;
pub mod engine;
pub mod error;
pub mod files;
pub mod layout;
pub mod reader;
pub mod settings;
pub mod surface;

pub use adapter::{AdapterConfig, AdapterKind, ContentAdapter, Services, Source, create_adapter};
pub use engine::{EngineConfig, PageEngine, PageRenderer};
pub use error::{ApplyError, ExtractError, LoadError, ReflowError, RenderError};
pub use reader::{Progress, Reader, SpreadView, Status};
pub use settings::{Direction, EpubTheme, Preset, ReaderSettings, ViewMode};
pub use surface::{PageContent, RenderTarget, RenderedPage, Surface, TextPage};
