//! Session-ending conditions surfaced by the capture core.

use thiserror::Error;

/// Errors that end a capture session.
///
/// Degraded conditions (empty OCR result, missing navigation glyph, ambiguous
/// margins) never show up here; they are handled by fallbacks and logged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The frame source returned nothing (viewer closed or lost).
    #[error("viewer frame lost after {pages_persisted} persisted page(s)")]
    FrameLost { pages_persisted: u32 },

    /// Neither direct detection nor consensus search produced a usable region.
    #[error("could not determine the content region")]
    RegionNotFound,

    /// No viewer window could be found or started.
    #[error("viewer window not found: {0}")]
    ViewerNotFound(String),

    /// The viewer could not be switched to fullscreen.
    #[error("failed to enter fullscreen mode")]
    FullscreenFailed,

    /// The user stopped the session before page capture began.
    #[error("cancelled by user")]
    Cancelled,

    /// A captured page could not be written out.
    #[error("failed to persist page {page}: {message}")]
    Persist { page: u32, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            SessionError::FrameLost { pages_persisted: 4 }.to_string(),
            "viewer frame lost after 4 persisted page(s)"
        );
        assert_eq!(SessionError::Cancelled.to_string(), "cancelled by user");
    }
}
