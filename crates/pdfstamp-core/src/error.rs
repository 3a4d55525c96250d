use thiserror::Error;

#[derive(Error, Debug)]
pub enum StampError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to load signature image: {0}")]
    ImageLoad(String),

    #[error("Failed to open PDF: {0}")]
    PdfOpen(String),

    #[error("Page {page} is out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("Failed to rasterize page {page}: {reason}")]
    Rasterization { page: u32, reason: String },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StampError>;
