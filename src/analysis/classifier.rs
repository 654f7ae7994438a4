//! Page classification into text, image and mixed pages.
//!
//! Three gates, in order: too few recognized words means an image page; no
//! tall run of non-text content rows means a text page; otherwise the share
//! of the page height covered by text lines separates image from mixed.

use image::RgbaImage;

use crate::automation::config::ClassifierConfig;
use crate::automation::detection::{max_consecutive_run, row_content_mask};
use crate::ocr::OcrLine;

/// Content kind of a captured page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    Text,
    Image,
    Mixed,
}

impl PageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::Text => "text",
            PageKind::Image => "image",
            PageKind::Mixed => "mixed",
        }
    }

    /// Whether the page image is worth keeping next to its text.
    pub fn keeps_image(&self) -> bool {
        !matches!(self, PageKind::Text)
    }
}

impl std::fmt::Display for PageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Median with the two middle values averaged and the result truncated.
fn median(values: &mut [u32]) -> Option<u32> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    let median = if values.len() % 2 == 0 {
        (values[mid - 1] as f64 + values[mid] as f64) / 2.0
    } else {
        values[mid] as f64
    };
    Some(median as u32)
}

/// Expected text line height: the median height of lines taller than
/// `min_line_height`.
pub fn typical_line_height(lines: &[OcrLine], config: &ClassifierConfig) -> u32 {
    let mut heights: Vec<u32> = lines
        .iter()
        .map(|line| line.height())
        .filter(|&h| h > config.min_line_height)
        .collect();
    median(&mut heights).unwrap_or(config.fallback_line_height)
}

/// Flags rows covered by a recognized line's vertical span.
pub fn text_row_mask(lines: &[OcrLine], height: u32, config: &ClassifierConfig) -> Vec<bool> {
    let mut mask = vec![false; height as usize];
    for line in lines {
        let line_height = line.height();
        if line_height < config.min_line_height {
            continue;
        }
        let start = line.y().clamp(0, height as i32) as usize;
        let end = (line.y() as i64 + line_height as i64).clamp(0, height as i64) as usize;
        mask[start..end.max(start)].iter_mut().for_each(|row| *row = true);
    }
    mask
}

/// Classifies a page from its pixels and OCR lines.
pub fn classify_page(img: &RgbaImage, lines: &[OcrLine], config: &ClassifierConfig) -> PageKind {
    let word_count: usize = lines.iter().map(|line| line.word_count()).sum();
    if word_count < config.min_words {
        return PageKind::Image;
    }

    let line_height = typical_line_height(lines, config);
    let min_graphic_height = (line_height * config.graphic_line_factor) as usize;

    let height = img.height();
    let content = row_content_mask(img);
    let text = text_row_mask(lines, height, config);
    let graphic_rows: Vec<bool> = content
        .iter()
        .zip(&text)
        .map(|(&has_content, &is_text)| has_content && !is_text)
        .collect();

    let longest = max_consecutive_run(&graphic_rows);
    log::debug!(
        "Classifier: {} words, line height {}, longest graphic run {} (min {})",
        word_count,
        line_height,
        longest,
        min_graphic_height
    );

    if longest <= min_graphic_height {
        return PageKind::Text;
    }

    if height == 0 {
        return PageKind::Image;
    }
    let covered: u64 = lines.iter().map(|line| line.height() as u64).sum();
    let coverage = covered as f64 / height as f64;
    if coverage < config.text_coverage_ratio {
        PageKind::Image
    } else {
        PageKind::Mixed
    }
}
