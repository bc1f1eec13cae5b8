//! Error types for annual-report parsing.

use thiserror::Error;

/// Result type for XBRL operations.
pub type Result<T> = std::result::Result<T, XbrlError>;

/// Errors that can occur while processing an annual report.
#[derive(Debug, Error)]
pub enum XbrlError {
    /// The archive could not be opened.
    #[error("invalid ZIP archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Reading an archive entry failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Total uncompressed size exceeds the safety limit.
    #[error("ZIP too large: {size} bytes (max {max})")]
    TooLarge {
        /// Total uncompressed size.
        size: u64,
        /// Configured maximum.
        max: u64,
    },

    /// Compression ratio suggests a ZIP bomb.
    #[error("suspicious compression ratio: {ratio:.1} (max {max})")]
    SuspiciousRatio {
        /// Observed ratio.
        ratio: f64,
        /// Configured maximum.
        max: f64,
    },

    /// No XHTML document was found in the archive.
    #[error("no XHTML file found in ZIP archive")]
    NoXhtml,

    /// The XHTML document could not be parsed.
    #[error("XBRL parse error: {0}")]
    Parse(String),
}
