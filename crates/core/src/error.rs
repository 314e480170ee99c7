use thiserror::Error;

/// Maximum accepted upload size in bytes. Larger files are rejected before
/// any parsing happens.
pub const MAX_UPLOAD_BYTES: u64 = 200 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported document format: {0} (expected pdf or docx)")]
    UnsupportedFormat(String),

    #[error("a document named {0} is already indexed")]
    DuplicateDocument(String),

    #[error("document has no extractable text: {0}")]
    EmptyDocument(String),

    #[error("file exceeds the {limit} byte upload limit: {path}")]
    FileTooLarge { path: String, limit: u64 },

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("docx parse error: {0}")]
    DocxParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("index not found: {0}")]
    NotFound(String),

    #[error("search scope is empty")]
    EmptyScope,

    #[error("selected indices do not share one embedding space: {0}")]
    IncompatibleIndices(String),

    #[error("no retrieval context found for the query")]
    NoContextFound,

    #[error("translation failed: {0}")]
    TranslationFailed(String),

    #[error("summarization failed: {0}")]
    SummarizationFailed(String),

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(String),
}

impl EngineError {
    /// Transient provider failures are worth one more attempt; everything
    /// else is terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Http(error) => error.is_timeout() || error.is_connect(),
            _ => false,
        }
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
