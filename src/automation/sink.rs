//! Persistence of captured pages.

use anyhow::{Context, Result};
use image::{ImageFormat, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};

/// A distinct page image with its 1-based number in capture order.
#[derive(Clone, Debug)]
pub struct CapturedPage {
    pub number: u32,
    pub image: RgbaImage,
}

/// Destination for captured pages.
///
/// `persist` returns only after the page is completely written.
pub trait PageSink {
    fn persist(&mut self, page: &CapturedPage) -> Result<PathBuf>;
}

/// File name for a page number: `page_0001.png`.
pub fn page_file_name(number: u32) -> String {
    format!("page_{:04}.png", number)
}

/// Writes pages as PNG files into one directory.
pub struct PngDirectory {
    dir: PathBuf,
}

impl PngDirectory {
    /// Creates the directory if needed and removes page files left over
    /// from an earlier session.
    pub fn prepare(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut removed = 0;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_page = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("page_") && n.ends_with(".png"));
            if is_page {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                removed += 1;
            }
        }
        if removed > 0 {
            log::info!("Removed {} old page file(s) from {}", removed, dir.display());
        }

        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl PageSink for PngDirectory {
    fn persist(&mut self, page: &CapturedPage) -> Result<PathBuf> {
        let path = self.dir.join(page_file_name(page.number));
        // Written under a temporary name so an interrupted write never
        // leaves a truncated page file behind
        let partial = path.with_extension("png.partial");
        page.image
            .save_with_format(&partial, ImageFormat::Png)
            .with_context(|| format!("Failed to write {}", partial.display()))?;
        fs::rename(&partial, &path)
            .with_context(|| format!("Failed to finalize {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    #[test]
    fn test_page_file_name() {
        assert_eq!(page_file_name(1), "page_0001.png");
        assert_eq!(page_file_name(1234), "page_1234.png");
    }

    #[test]
    fn test_prepare_clears_only_old_pages() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("pages");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("page_0001.png"), b"old").unwrap();
        fs::write(dir.join("notes.txt"), b"keep").unwrap();

        let sink = PngDirectory::prepare(&dir).unwrap();

        assert!(!sink.dir().join("page_0001.png").exists());
        assert!(sink.dir().join("notes.txt").exists());
    }

    #[test]
    fn test_persist_writes_png() {
        let root = tempfile::tempdir().unwrap();
        let mut sink = PngDirectory::prepare(root.path()).unwrap();
        let page = CapturedPage {
            number: 7,
            image: ImageBuffer::from_pixel(8, 4, Rgba([10, 20, 30, 255])),
        };

        let path = sink.persist(&page).unwrap();

        assert_eq!(path, root.path().join("page_0007.png"));
        let loaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(loaded.dimensions(), (8, 4));
        assert_eq!(loaded.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
        assert!(!root.path().join("page_0007.png.partial").exists());
    }
}
