//! Removal of page images that carry no graphics.
//!
//! Works on exported `markdown/` folders: images the markdown file does not
//! reference are deleted, and referenced images whose pixels show no tall
//! graphic block are deleted together with their reference line.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::automation::detection::{max_consecutive_run, row_content_mask};

/// Image counts of one cleaned folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub images: usize,
    pub removed: usize,
}

impl CleanupStats {
    pub fn kept(&self) -> usize {
        self.images - self.removed
    }
}

fn collect_markdown_dirs(dir: &Path, found: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut subdirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    subdirs.sort();
    for subdir in subdirs {
        if subdir.file_name().is_some_and(|name| name == "markdown") {
            found.push(subdir.clone());
        }
        collect_markdown_dirs(&subdir, found);
    }
}

/// Finds the markdown folders below `target`: its own `markdown/` folder
/// if present, otherwise every `markdown/` folder at any depth.
pub fn find_markdown_dirs(target: &Path) -> Vec<PathBuf> {
    let own = crate::paths::get_markdown_dir(target);
    if own.is_dir() {
        return vec![own];
    }
    let mut found = Vec::new();
    collect_markdown_dirs(target, &mut found);
    found
}

/// Whether an image shows only text, judged by its tallest block of
/// consecutive content rows. Unreadable images are kept.
pub fn is_text_only_image(path: &Path, min_graphic_height: usize) -> bool {
    match image::open(path) {
        Ok(img) => {
            let content = row_content_mask(&img.to_rgba8());
            max_consecutive_run(&content) <= min_graphic_height
        }
        Err(e) => {
            log::warn!("Could not analyze {}: {}", path.display(), e);
            false
        }
    }
}

/// Image file names referenced by `![..](name.jpg)` links.
pub fn referenced_images(markdown: &str) -> HashSet<String> {
    let Ok(pattern) = Regex::new(r"!\[[^\]]*\]\(([^)]+\.jpg)\)") else {
        return HashSet::new();
    };
    pattern
        .captures_iter(markdown)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Drops the image links to `file_name` along with their line break.
pub fn remove_reference(markdown: &str, file_name: &str) -> Result<String> {
    let link = Regex::new(&format!(r"!\[[^\]]*\]\({}\)\n?", regex::escape(file_name)))?;
    Ok(link.replace_all(markdown, "").into_owned())
}

/// Collapses runs of three or more line breaks into one blank line.
pub fn collapse_blank_lines(markdown: &str) -> Result<String> {
    let blank_lines = Regex::new(r"\n{3,}")?;
    Ok(blank_lines.replace_all(markdown, "\n\n").into_owned())
}

fn sorted_files(dir: &Path, accept: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(&accept)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Cleans one markdown folder and rewrites its markdown file.
pub fn cleanup_markdown_dir(md_dir: &Path, min_graphic_height: usize) -> Result<CleanupStats> {
    let images = sorted_files(md_dir, |name| {
        name.starts_with("page_") && name.ends_with(".jpg")
    })?;
    if images.is_empty() {
        return Ok(CleanupStats::default());
    }
    let Some(md_file) = sorted_files(md_dir, |name| name.ends_with(".md"))?
        .into_iter()
        .next()
    else {
        return Ok(CleanupStats::default());
    };

    let mut markdown = std::fs::read_to_string(&md_file)
        .with_context(|| format!("Failed to read {}", md_file.display()))?;
    let referenced = referenced_images(&markdown);

    let mut removed = 0;
    for image in &images {
        let Some(file_name) = image.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let remove = if referenced.contains(file_name) {
            is_text_only_image(image, min_graphic_height)
        } else {
            log::debug!("Unreferenced image: {}", file_name);
            true
        };
        if !remove {
            continue;
        }
        markdown = remove_reference(&markdown, file_name)?;
        std::fs::remove_file(image)
            .with_context(|| format!("Failed to remove {}", image.display()))?;
        removed += 1;
    }

    if removed > 0 {
        let markdown = collapse_blank_lines(&markdown)?;
        std::fs::write(&md_file, markdown)
            .with_context(|| format!("Failed to write {}", md_file.display()))?;
    }

    Ok(CleanupStats {
        images: images.len(),
        removed,
    })
}

/// Cleans every markdown folder found below `target`.
pub fn cleanup_images(target: &Path, min_graphic_height: usize) -> Result<CleanupStats> {
    if !target.exists() {
        return Err(anyhow::anyhow!("Path not found: {}", target.display()));
    }

    let md_dirs = find_markdown_dirs(target);
    if md_dirs.is_empty() {
        log::info!("No markdown folders found in {}", target.display());
        return Ok(CleanupStats::default());
    }
    log::info!("{} book(s) found", md_dirs.len());

    let mut total = CleanupStats::default();
    for md_dir in &md_dirs {
        let stats = cleanup_markdown_dir(md_dir, min_graphic_height)?;
        if stats.images > 0 {
            let book = md_dir
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            log::info!(
                "{}: {} images, {} removed, {} kept",
                book,
                stats.images,
                stats.removed,
                stats.kept()
            );
        }
        total.images += stats.images;
        total.removed += stats.removed;
    }

    log::info!(
        "Total: {} images, {} removed, {} kept",
        total.images,
        total.removed,
        total.kept()
    );
    Ok(total)
}
