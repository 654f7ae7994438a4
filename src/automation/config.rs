//! Configuration types for a capture session.
//!
//! Loads settings from config.json at startup. Every heuristic threshold used
//! by calibration, navigation, the capture loop and the page classifier lives
//! here so it can be tuned without touching the algorithms.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Capture loop settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Consecutive unchanged frames that mark the end of the document.
    /// Three absorbs a single slow render without stopping early.
    pub idle_threshold: u32,
    /// Wait after each page turn so the viewer finishes rendering (milliseconds)
    pub settle_ms: u64,
    /// Similarity above which two crops count as the same page (0.0-1.0)
    pub similarity_threshold: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            idle_threshold: 3,
            settle_ms: 500,
            similarity_threshold: 0.99,
        }
    }
}

/// Content region calibration settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Minimum corner-vs-center brightness difference for direct detection
    pub margin_contrast: f64,
    /// Column/row variance threshold as a fraction of the maximum variance
    pub variance_fraction: f64,
    /// Minimum accepted region width as a fraction of screen width
    pub min_width_fraction: f64,
    /// Minimum accepted region height as a fraction of screen height
    pub min_height_fraction: f64,
    /// Number of consecutive right edges that must agree
    pub consensus_window: usize,
    /// Maximum spread (pixels) of the right edges inside the window
    pub edge_tolerance: u32,
    /// Upper bound on pages sampled during the consensus search
    pub max_pages: u32,
    /// Right edge at or beyond this fraction of the width counts as full width
    pub full_width_fraction: f64,
    /// Share of full-width samples that selects the full screen width
    pub full_width_majority: f64,
    /// Right edge used when nothing was observed, as a fraction of width
    pub fallback_width_fraction: f64,
    /// Padding added to every side of the detected region (pixels)
    pub padding: u32,
    /// Wait before sampling each page (milliseconds)
    pub sample_delay_ms: u64,
    /// Wait after each page turn during the search (milliseconds)
    pub settle_ms: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            margin_contrast: 50.0,
            variance_fraction: 0.05,
            min_width_fraction: 0.2,
            min_height_fraction: 0.3,
            consensus_window: 3,
            edge_tolerance: 20,
            max_pages: 50,
            full_width_fraction: 0.9,
            full_width_majority: 0.7,
            fallback_width_fraction: 0.6,
            padding: 20,
            sample_delay_ms: 300,
            settle_ms: 500,
        }
    }
}

/// Navigation control localization settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Wait after hovering so the arrow glyph renders (milliseconds)
    pub hover_settle_ms: u64,
    /// Peak column gradient must exceed this multiple of the mean
    pub gradient_ratio: f64,
    /// Width of the searched margin strip as a fraction of screen width
    pub strip_fraction: f64,
    /// Pixels skipped at the outer screen edge
    pub edge_inset: u32,
    /// Hover x without a region, as a fraction of screen width (next side)
    pub fallback_hover_fraction: f64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            hover_settle_ms: 500,
            gradient_ratio: 2.0,
            strip_fraction: 0.2,
            edge_inset: 5,
            fallback_hover_fraction: 0.95,
        }
    }
}

/// Page classifier settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Pages with fewer recognized words are images
    pub min_words: usize,
    /// Line height used when OCR produced no usable lines (pixels)
    pub fallback_line_height: u32,
    /// A graphic must be taller than this multiple of the line height
    pub graphic_line_factor: u32,
    /// Text coverage below this ratio makes a graphic page an image page
    pub text_coverage_ratio: f64,
    /// Lines shorter than this are not masked; only taller ones set the median (pixels)
    pub min_line_height: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_words: 10,
            fallback_line_height: 30,
            graphic_line_factor: 2,
            text_coverage_ratio: 0.15,
            min_line_height: 5,
        }
    }
}

/// Tesseract settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Explicit path to tesseract; searched in the data dir and PATH if unset
    pub tesseract_path: Option<String>,
    /// Explicit tessdata directory
    pub tessdata_dir: Option<String>,
    /// Tesseract language string, e.g. "deu+eng"
    pub language: String,
    /// Upscale factor applied to UI crops before OCR
    pub ui_scale_factor: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: None,
            tessdata_dir: None,
            language: "deu+eng".to_string(),
            ui_scale_factor: 2,
        }
    }
}

/// Viewer application settings and the menu labels used to drive it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Executable name of the viewer (case-insensitive)
    pub process_name: String,
    /// Menu bar entry that opens the navigation menu
    pub goto_menu_label: String,
    /// Navigation menu entry that jumps to the title page
    pub title_page_label: String,
    /// Menu bar entry that opens the view menu
    pub view_menu_label: String,
    /// View menu entry that enters fullscreen
    pub fullscreen_label: String,
    /// Word shown in the fullscreen banner
    pub fullscreen_banner_label: String,
    /// Maximum wait for the fullscreen banner to disappear (milliseconds)
    pub banner_timeout_ms: u64,
    /// Poll interval while waiting for the banner (milliseconds)
    pub banner_poll_ms: u64,
    /// Fixed wait used instead of polling when OCR is unavailable (milliseconds)
    pub banner_fallback_ms: u64,
    /// Wait for a dropdown menu to open after clicking its label (milliseconds)
    pub menu_open_ms: u64,
    /// Wait for the viewer to react to a menu entry (milliseconds)
    pub menu_action_ms: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            process_name: "kindle.exe".to_string(),
            goto_menu_label: "Gehe".to_string(),
            title_page_label: "Titelseite".to_string(),
            view_menu_label: "Ansicht".to_string(),
            fullscreen_label: "Vollbild".to_string(),
            fullscreen_banner_label: "Beenden".to_string(),
            banner_timeout_ms: 10_000,
            banner_poll_ms: 500,
            banner_fallback_ms: 5_000,
            menu_open_ms: 800,
            menu_action_ms: 1_000,
        }
    }
}

/// Markdown export settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// JPEG quality for page images referenced from markdown
    pub jpeg_quality: u8,
    /// Page images wider than this are downscaled (pixels)
    pub max_image_width: u32,
    /// Lines taller than this multiple of the average height become headings
    pub heading_factor: f64,
    /// Minimum content-row run that marks a stored image as graphic (pixels)
    pub cleanup_min_graphic_height: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 80,
            max_image_width: 1200,
            heading_factor: 1.4,
            cleanup_min_graphic_height: 60,
        }
    }
}

/// Complete session configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub capture: CaptureConfig,
    pub calibration: CalibrationConfig,
    pub navigation: NavigationConfig,
    pub classifier: ClassifierConfig,
    pub ocr: OcrConfig,
    pub viewer: ViewerConfig,
    pub export: ExportConfig,
}

impl CaptureConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl CalibrationConfig {
    pub fn sample_delay(&self) -> Duration {
        Duration::from_millis(self.sample_delay_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl ViewerConfig {
    pub fn menu_open(&self) -> Duration {
        Duration::from_millis(self.menu_open_ms)
    }

    pub fn menu_action(&self) -> Duration {
        Duration::from_millis(self.menu_action_ms)
    }
}

impl NavigationConfig {
    pub fn hover_settle(&self) -> Duration {
        Duration::from_millis(self.hover_settle_ms)
    }
}

/// Loads configuration from the given file or returns defaults.
///
/// A missing or unparsable file is not an error: the defaults are used and
/// the reason is logged.
pub fn load_config(config_path: &Path) -> SessionConfig {
    log::info!("Looking for config at: {}", config_path.display());

    if config_path.exists() {
        match fs::read_to_string(config_path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("Config loaded from {}", config_path.display());
                    return config;
                }
                Err(e) => {
                    log::warn!(
                        "Failed to parse {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    );
                }
            },
            Err(e) => {
                log::warn!(
                    "Failed to read {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
            }
        }
    } else {
        log::info!("Config file not found. Using default config.");
    }

    SessionConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_constants() {
        let config = SessionConfig::default();
        assert_eq!(config.capture.idle_threshold, 3);
        assert_eq!(config.capture.similarity_threshold, 0.99);
        assert_eq!(config.calibration.consensus_window, 3);
        assert_eq!(config.calibration.edge_tolerance, 20);
        assert_eq!(config.calibration.max_pages, 50);
        assert_eq!(config.calibration.padding, 20);
        assert_eq!(config.navigation.gradient_ratio, 2.0);
        assert_eq!(config.classifier.min_words, 10);
        assert_eq!(config.classifier.fallback_line_height, 30);
        assert_eq!(config.ocr.language, "deu+eng");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "capture": { "idle_threshold": 5 }, "ocr": { "language": "deu" } }"#;
        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.capture.idle_threshold, 5);
        assert_eq!(config.capture.settle_ms, 500);
        assert_eq!(config.ocr.language, "deu");
        assert_eq!(config.ocr.ui_scale_factor, 2);
        assert_eq!(config.viewer.process_name, "kindle.exe");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.json"));
        assert_eq!(config.calibration.padding, 20);
    }

    #[test]
    fn test_invalid_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = load_config(&path);
        assert_eq!(config.capture.idle_threshold, 3);
    }
}
