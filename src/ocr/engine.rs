use anyhow::{Result, anyhow};
use image::RgbaImage;
use std::process::Command;
use tempfile::NamedTempFile;

use super::setup::TesseractPaths;

/// A single recognized word with its bounding box.
///
/// Coordinates are in the space of the image that was recognized, which may
/// be a scaled crop; callers un-scale before comparing across regions.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl OcrWord {
    pub fn center(&self) -> (i32, i32) {
        (
            self.x + self.width as i32 / 2,
            self.y + self.height as i32 / 2,
        )
    }
}

/// Words sharing a visual row, in reading order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrLine {
    pub words: Vec<OcrWord>,
}

impl OcrLine {
    pub fn new(words: Vec<OcrWord>) -> Self {
        Self { words }
    }

    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Top of the line, taken from its first word.
    pub fn y(&self) -> i32 {
        self.words.first().map(|w| w.y).unwrap_or(0)
    }

    /// Height of the line, taken from its first word.
    pub fn height(&self) -> u32 {
        self.words.first().map(|w| w.height).unwrap_or(0)
    }

    pub fn word_count(&self) -> usize {
        self.text().split_whitespace().count()
    }
}

/// Text recognition backend.
///
/// Recognition never fails from the caller's point of view: errors are
/// logged and reported as "no text found".
pub trait OcrEngine {
    fn recognize(&self, img: &RgbaImage) -> Vec<OcrLine>;
}

/// Runs the Tesseract command line tool with TSV output.
pub struct TesseractEngine {
    paths: TesseractPaths,
    language: String,
}

impl TesseractEngine {
    pub fn new(paths: TesseractPaths, language: impl Into<String>) -> Self {
        Self {
            paths,
            language: language.into(),
        }
    }

    fn run(&self, img: &RgbaImage) -> Result<Vec<OcrLine>> {
        // Save image to temporary file
        let temp_input = NamedTempFile::with_suffix(".png")?;
        img.save(temp_input.path())?;

        // Create temporary output base (Tesseract adds .tsv extension)
        let temp_output = NamedTempFile::new()?;
        let output_base = temp_output.path().to_string_lossy().to_string();

        let mut command = Command::new(&self.paths.executable);
        command.arg(temp_input.path()).arg(&output_base);
        if let Some(tessdata) = &self.paths.tessdata {
            command.arg("--tessdata-dir").arg(tessdata);
        }
        let output = command
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg("3") // Fully automatic page segmentation
            .arg("tsv")
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr.trim()));
        }

        let tsv_path = format!("{}.tsv", output_base);
        let tsv_content = std::fs::read_to_string(&tsv_path)
            .map_err(|e| anyhow!("Failed to read Tesseract output: {}", e))?;
        let _ = std::fs::remove_file(&tsv_path);

        Ok(parse_tsv_output(&tsv_content))
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, img: &RgbaImage) -> Vec<OcrLine> {
        match self.run(img) {
            Ok(lines) => lines,
            Err(e) => {
                log::warn!("OCR failed: {}", e);
                Vec::new()
            }
        }
    }
}

/// Parses Tesseract TSV output into lines of boxed words.
///
/// TSV fields: level, page_num, block_num, par_num, line_num, word_num,
/// left, top, width, height, conf, text. Only level 5 (word) rows with
/// non-empty text are kept; words are grouped by (block, paragraph, line).
pub fn parse_tsv_output(tsv: &str) -> Vec<OcrLine> {
    let mut lines: Vec<OcrLine> = Vec::new();
    let mut current_key: Option<(i32, i32, i32)> = None;
    let mut current_words: Vec<OcrWord> = Vec::new();

    for row in tsv.lines().skip(1) {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        let level: i32 = fields[0].parse().unwrap_or(-1);
        if level != 5 {
            continue;
        }

        let text = fields[11].trim();
        let conf: f32 = fields[10].parse().unwrap_or(-1.0);
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let key = (
            fields[2].parse().unwrap_or(-1),
            fields[3].parse().unwrap_or(-1),
            fields[4].parse().unwrap_or(-1),
        );

        if current_key != Some(key) && !current_words.is_empty() {
            lines.push(OcrLine::new(std::mem::take(&mut current_words)));
        }
        current_key = Some(key);

        current_words.push(OcrWord {
            text: text.to_string(),
            x: fields[6].parse().unwrap_or(0),
            y: fields[7].parse().unwrap_or(0),
            width: fields[8].parse().unwrap_or(0),
            height: fields[9].parse().unwrap_or(0),
        });
    }

    if !current_words.is_empty() {
        lines.push(OcrLine::new(current_words));
    }

    lines
}
