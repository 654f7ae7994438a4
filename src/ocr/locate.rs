//! Finding UI labels on screen by OCR.

use crate::calibration::{Region, Screen};

use super::engine::{OcrEngine, OcrLine, OcrWord};
use super::preprocess::{crop_region, upscale};

/// Which match wins when a label appears more than once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchPick {
    Topmost,
    Bottommost,
}

/// A located label in absolute screen coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct TextMatch {
    pub x: i32,
    pub y: i32,
    /// The matched word as recognized, in scaled crop coordinates.
    pub word: OcrWord,
}

/// Picks the word containing `needle` (case-insensitive) according to `pick`.
pub fn best_match<'a>(lines: &'a [OcrLine], needle: &str, pick: MatchPick) -> Option<&'a OcrWord> {
    let needle = needle.to_lowercase();
    let mut matches: Vec<&OcrWord> = lines
        .iter()
        .flat_map(|line| line.words.iter())
        .filter(|word| word.text.to_lowercase().contains(&needle))
        .collect();
    matches.sort_by_key(|word| word.y);

    match pick {
        MatchPick::Topmost => matches.first().copied(),
        MatchPick::Bottommost => matches.last().copied(),
    }
}

/// Captures the screen, crops `region`, upscales it by `scale` and searches
/// the recognized words for `needle`.
///
/// Returns the center of the matched word mapped back to screen
/// coordinates, or `None` when nothing matches or no frame is available.
pub fn find_text_in_region<S: Screen>(
    screen: &mut S,
    ocr: &dyn OcrEngine,
    region: &Region,
    needle: &str,
    pick: MatchPick,
    scale: u32,
) -> Option<TextMatch> {
    let scale = scale.max(1);
    let frame = screen.capture_frame()?;
    let crop = upscale(&crop_region(&frame, region), scale);
    let lines = ocr.recognize(&crop);

    let word = best_match(&lines, needle, pick)?;
    let (cx, cy) = word.center();
    let found = TextMatch {
        x: region.left as i32 + cx / scale as i32,
        y: region.top as i32 + cy / scale as i32,
        word: word.clone(),
    };
    log::debug!("Found '{}' as '{}' at ({}, {})", needle, word.text, found.x, found.y);
    Some(found)
}
