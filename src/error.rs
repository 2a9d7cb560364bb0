/// Error types for the presentation package layer.
use thiserror::Error;

/// Result type for presentation package operations.
pub type Result<T> = std::result::Result<T, PptxError>;

#[derive(Error, Debug)]
pub enum PptxError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP container error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML parsing or writing error
    #[error("XML error: {0}")]
    Xml(String),

    /// Part not found in the package
    #[error("Part not found: {0}")]
    PartNotFound(String),

    /// Package structure is not what a .pptx requires
    #[error("Invalid package: {0}")]
    InvalidPackage(String),
}

impl From<quick_xml::Error> for PptxError {
    fn from(err: quick_xml::Error) -> Self {
        PptxError::Xml(err.to_string())
    }
}
