//! Offline analysis of captured pages.
//!
//! This module provides:
//! - Text/image/mixed page classification (`classifier`)
//! - Markdown export with OCR text and kept page images (`markdown`)
//! - Removal of text-only images from exported folders (`cleanup`)

pub mod classifier;
pub mod cleanup;
pub mod markdown;

pub use classifier::{PageKind, classify_page};
pub use cleanup::{CleanupStats, cleanup_images};
pub use markdown::{ExportStats, export_book};
