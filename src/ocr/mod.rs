//! OCR through the Tesseract command line tool.
//!
//! This module provides:
//! - Tesseract discovery (`find_tesseract`)
//! - Word and line recognition with bounding boxes (`OcrEngine`)
//! - Locating UI labels on screen (`find_text_in_region`)

pub mod engine;
pub mod locate;
pub mod preprocess;
pub mod setup;

pub use engine::{OcrEngine, OcrLine, OcrWord, TesseractEngine};
pub use locate::{MatchPick, TextMatch, find_text_in_region};
pub use setup::find_tesseract;

use anyhow::Result;

use crate::automation::config::OcrConfig;

/// Creates the Tesseract engine described by the config.
pub fn create_engine(config: &OcrConfig) -> Result<TesseractEngine> {
    let paths = setup::find_tesseract(config)?;
    Ok(TesseractEngine::new(paths, config.language.clone()))
}
