use std::path::PathBuf;

/// Failure to open a document. Fatal for that document only: the adapter is
/// left unloaded and can be reused for another source.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("no pages found in {0}")]
    Empty(String),

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt or unreadable document: {0}")]
    Corrupt(String),

    #[error("unsupported source: {0}")]
    Unsupported(String),

    #[error("archive extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error(transparent)]
    Reflow(#[from] ReflowError),
}

impl LoadError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure to produce one page.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no document loaded")]
    NotLoaded,

    #[error("page {index} is outside 1..={total}")]
    OutOfRange { index: usize, total: usize },

    #[error("page {index}: {detail}")]
    Decode { index: usize, detail: String },
}

impl RenderError {
    pub fn decode(index: usize, detail: impl ToString) -> Self {
        Self::Decode {
            index,
            detail: detail.to_string(),
        }
    }
}

/// Failure to rebuild the location index of a reflowable document.
#[derive(Debug, thiserror::Error)]
pub enum ReflowError {
    #[error("location size must be at least one character")]
    InvalidChunkSize,

    #[error("document has no chapters")]
    NoContent,
}

/// Failure reported by the archive extraction service.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("archive not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("no image files found in {}", .0.display())]
    NoImages(PathBuf),

    #[error("7-Zip executable not found on PATH (needed for RAR archives)")]
    MissingTool,

    #[error("extractor exited with failure: {0}")]
    ToolFailed(String),

    #[error("refusing to delete {} outside the temp directory", .0.display())]
    OutsideTempRoot(PathBuf),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure to apply changed settings to an open document.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Reflow(#[from] ReflowError),
}
