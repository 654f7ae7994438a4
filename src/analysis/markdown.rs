//! Markdown export of a captured book.
//!
//! Every page is recognized, classified and written to `markdown/<book>.md`.
//! Image and mixed pages also keep a downscaled JPEG next to the markdown
//! file, referenced from their page section.

use anyhow::{Context, Result, anyhow};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::classifier::{PageKind, classify_page};
use crate::automation::config::{ExportConfig, SessionConfig};
use crate::ocr::{OcrEngine, OcrLine};

/// Name of the export summary written next to the markdown file.
pub const SUMMARY_FILE_NAME: &str = "export.json";

/// Totals of a markdown export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    pub pages: usize,
    pub text_pages: usize,
    pub image_pages: usize,
    pub mixed_pages: usize,
    pub words: usize,
    pub images_saved: usize,
}

impl ExportStats {
    fn count(&mut self, kind: PageKind) {
        match kind {
            PageKind::Text => self.text_pages += 1,
            PageKind::Image => self.image_pages += 1,
            PageKind::Mixed => self.mixed_pages += 1,
        }
    }
}

fn is_page_png(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("page_") && name.ends_with(".png"))
}

fn list_page_pngs(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_page_png(path))
        .collect();
    files.sort();
    files
}

/// Finds the page images of a book: `pages/page_*.png`, otherwise
/// `page_*.png` in the book folder itself. Sorted by name.
pub fn find_input_pages(book_dir: &Path) -> Vec<PathBuf> {
    let files = list_page_pngs(&crate::paths::get_pages_dir(book_dir));
    if !files.is_empty() {
        return files;
    }
    list_page_pngs(book_dir)
}

/// Flags lines noticeably taller than the average line as headings.
pub fn detect_headings(lines: &[OcrLine], factor: f64) -> Vec<bool> {
    if lines.is_empty() {
        return Vec::new();
    }
    let average =
        lines.iter().map(|line| line.height() as f64).sum::<f64>() / lines.len() as f64;
    lines
        .iter()
        .map(|line| average > 0.0 && line.height() as f64 > average * factor)
        .collect()
}

/// File name of the JPEG kept for a page.
pub fn page_image_name(page: usize) -> String {
    format!("page_{:04}.jpg", page)
}

/// Writes a page as RGB JPEG, downscaled to the configured maximum width.
///
/// Returns the size of the written file in bytes.
pub fn save_page_image(img: &RgbaImage, path: &Path, config: &ExportConfig) -> Result<u64> {
    let mut rgb = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
    if config.max_image_width > 0 && rgb.width() > config.max_image_width {
        let ratio = config.max_image_width as f64 / rgb.width() as f64;
        let height = ((rgb.height() as f64 * ratio) as u32).max(1);
        rgb = image::imageops::resize(&rgb, config.max_image_width, height, FilterType::Lanczos3);
    }

    let file = File::create(path)
        .with_context(|| format!("Failed to create image file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, config.jpeg_quality)
        .encode_image(&rgb)
        .with_context(|| format!("Failed to encode JPEG: {}", path.display()))?;
    writer.flush()?;
    drop(writer);

    Ok(std::fs::metadata(path)?.len())
}

fn book_name(book_dir: &Path) -> String {
    let resolved = book_dir
        .canonicalize()
        .unwrap_or_else(|_| book_dir.to_path_buf());
    resolved
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "book".to_string())
}

/// Writes the markdown file of a book folder with the given OCR engine.
pub fn create_markdown(
    book_dir: &Path,
    ocr: &dyn OcrEngine,
    config: &SessionConfig,
) -> Result<ExportStats> {
    let files = find_input_pages(book_dir);
    if files.is_empty() {
        return Err(anyhow!(
            "No page_*.png images found in {}",
            book_dir.display()
        ));
    }
    log::info!("{} page(s) found", files.len());

    let md_dir = crate::paths::get_markdown_dir(book_dir);
    std::fs::create_dir_all(&md_dir)
        .with_context(|| format!("Failed to create {}", md_dir.display()))?;

    let name = book_name(book_dir);
    let md_path = md_dir.join(format!("{}.md", name));

    let mut md_lines = vec![format!("# {}", name), String::new()];
    let mut stats = ExportStats::default();

    for (index, file) in files.iter().enumerate() {
        let page = index + 1;
        let img = image::open(file)
            .with_context(|| format!("Failed to open page image: {}", file.display()))?
            .to_rgba8();

        let lines = ocr.recognize(&img);
        let headings = detect_headings(&lines, config.export.heading_factor);
        let words: usize = lines.iter().map(|line| line.word_count()).sum();
        stats.words += words;

        let kind = classify_page(&img, &lines, &config.classifier);
        stats.count(kind);
        stats.pages += 1;

        md_lines.push(format!("<!-- Page {} -->", page));
        md_lines.push(String::new());

        if kind.keeps_image() {
            let image_name = page_image_name(page);
            let size = save_page_image(&img, &md_dir.join(&image_name), &config.export)?;
            stats.images_saved += 1;
            md_lines.push(format!("![Page {}]({})", page, image_name));
            md_lines.push(String::new());
            log::info!(
                "[{}/{}] {}: {} ({} words, image {} KB)",
                page,
                files.len(),
                file.display(),
                kind,
                words,
                size / 1024
            );
        } else {
            log::info!(
                "[{}/{}] {}: {} ({} words)",
                page,
                files.len(),
                file.display(),
                kind,
                words
            );
        }

        if !lines.is_empty() {
            for (line, is_heading) in lines.iter().zip(&headings) {
                let text = line.text();
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                if *is_heading {
                    md_lines.push(format!("## {}", text));
                } else {
                    md_lines.push(text.to_string());
                }
            }
            md_lines.push(String::new());
        }
    }

    std::fs::write(&md_path, md_lines.join("\n"))
        .with_context(|| format!("Failed to write markdown file: {}", md_path.display()))?;
    export_summary(&stats, &md_dir.join(SUMMARY_FILE_NAME))?;

    log::info!(
        "Markdown written: {} ({} pages: {} text, {} image, {} mixed; {} words, {} images)",
        md_path.display(),
        stats.pages,
        stats.text_pages,
        stats.image_pages,
        stats.mixed_pages,
        stats.words,
        stats.images_saved
    );
    Ok(stats)
}

/// Writes the export totals as pretty-printed JSON.
pub fn export_summary(stats: &ExportStats, output_path: &Path) -> Result<()> {
    let json =
        serde_json::to_string_pretty(stats).context("Failed to serialize export summary")?;
    std::fs::write(output_path, json)
        .with_context(|| format!("Failed to write summary: {}", output_path.display()))?;
    Ok(())
}

/// Exports a book folder using Tesseract.
pub fn export_book(book_dir: &Path, config: &SessionConfig) -> Result<ExportStats> {
    let engine = crate::ocr::create_engine(&config.ocr).context("OCR is required for export")?;
    create_markdown(book_dir, &engine, config)
}
