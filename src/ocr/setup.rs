//! Locating the Tesseract executable and its trained data.

use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};

use crate::automation::config::OcrConfig;

/// Resolved Tesseract installation.
#[derive(Clone, Debug)]
pub struct TesseractPaths {
    pub executable: PathBuf,
    /// `None` lets Tesseract use its compiled-in default.
    pub tessdata: Option<PathBuf>,
}

#[cfg(windows)]
const EXECUTABLE_NAME: &str = "tesseract.exe";
#[cfg(not(windows))]
const EXECUTABLE_NAME: &str = "tesseract";

#[cfg(windows)]
const COMMON_INSTALL_DIRS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR",
    r"C:\Program Files (x86)\Tesseract-OCR",
];
#[cfg(not(windows))]
const COMMON_INSTALL_DIRS: &[&str] = &["/usr/local/bin", "/usr/bin", "/opt/homebrew/bin"];

/// Returns the per-user directory where a portable Tesseract may live.
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("book-capture")
        .join("tesseract")
}

/// Resolves the Tesseract installation.
///
/// Order: configured path, per-user directory, common install directories,
/// then the `tesseract` found on PATH.
pub fn find_tesseract(config: &OcrConfig) -> Result<TesseractPaths> {
    let executable = find_tesseract_executable(config)?;
    let tessdata = find_tessdata_dir(config, &executable);
    log::debug!(
        "Tesseract: {} (tessdata: {})",
        executable.display(),
        tessdata
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "default".to_string())
    );
    Ok(TesseractPaths {
        executable,
        tessdata,
    })
}

fn find_tesseract_executable(config: &OcrConfig) -> Result<PathBuf> {
    if let Some(path) = &config.tesseract_path {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
        log::warn!("Configured tesseract_path does not exist: {}", path);
    }

    let local_exe = get_tesseract_dir().join(EXECUTABLE_NAME);
    if local_exe.exists() {
        return Ok(local_exe);
    }

    for dir in COMMON_INSTALL_DIRS {
        let p = Path::new(dir).join(EXECUTABLE_NAME);
        if p.exists() {
            return Ok(p);
        }
    }

    if let Ok(output) = std::process::Command::new("tesseract")
        .arg("--version")
        .output()
    {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    Err(anyhow!(
        "Tesseract not found. Install Tesseract-OCR, add it to PATH, \
         or set ocr.tesseract_path in config.json."
    ))
}

fn find_tessdata_dir(config: &OcrConfig, executable: &Path) -> Option<PathBuf> {
    if let Some(dir) = &config.tessdata_dir {
        return Some(PathBuf::from(dir));
    }

    // A tessdata folder next to a portable or installed executable
    let sibling = executable.parent().map(|p| p.join("tessdata"));
    if let Some(dir) = sibling {
        if dir.is_dir() {
            return Some(dir);
        }
    }

    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&prefix);
        if p.is_dir() {
            return Some(p);
        }
    }

    None
}
