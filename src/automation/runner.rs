//! Capture session runner.
//!
//! Sequences calibration, navigation localization and the capture loop on
//! a prepared viewer, and on Windows drives the whole desktop flow around
//! it: window discovery, menu preparation, stop signals and cleanup.

use crate::automation::abort::CancelToken;
use crate::automation::config::SessionConfig;
use crate::automation::sink::PageSink;
use crate::automation::state::{CaptureOutcome, capture_pages};
use crate::calibration::{
    DocumentViewer, NavigationAnchors, Region, Screen, calibrate_region, locate_navigation,
};
use crate::error::SessionError;

/// What a finished session determined and captured. A session stopped
/// before capturing has no pages; one stopped during calibration has no
/// region either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub region: Option<Region>,
    pub anchors: NavigationAnchors,
    pub outcome: CaptureOutcome,
}

impl SessionReport {
    fn stopped(region: Option<Region>) -> Self {
        SessionReport {
            region,
            anchors: NavigationAnchors::default(),
            outcome: CaptureOutcome {
                pages: 0,
                completed: false,
            },
        }
    }
}

/// Runs a capture session on a viewer already showing the first page in
/// fullscreen.
pub fn run_session<S: Screen, P: PageSink>(
    screen: &mut S,
    sink: &mut P,
    config: &SessionConfig,
    cancel: &CancelToken,
) -> Result<SessionReport, SessionError> {
    let mut viewer = DocumentViewer::new(&mut *screen);

    log::info!("Detecting content region...");
    let region = match calibrate_region(&mut viewer, &config.calibration, cancel) {
        Ok(region) => region,
        Err(SessionError::Cancelled) => {
            log::info!("Stopped during calibration");
            return Ok(SessionReport::stopped(None));
        }
        Err(e) => return Err(e),
    };

    if cancel.is_cancelled() {
        return Ok(SessionReport::stopped(Some(region)));
    }
    let anchors = locate_navigation(
        viewer.screen_mut(),
        Some(&region),
        &config.navigation,
        cancel,
    );
    if cancel.is_cancelled() {
        return Ok(SessionReport::stopped(Some(region)));
    }
    let mut viewer = viewer.with_anchors(anchors);

    let outcome = capture_pages(&mut viewer, sink, region, &config.capture, cancel)?;

    Ok(SessionReport {
        region: Some(region),
        anchors,
        outcome,
    })
}

/// Captures a book from the running viewer into `pages_dir`.
#[cfg(windows)]
pub fn capture_book(pages_dir: &std::path::Path, config: &SessionConfig) -> anyhow::Result<()> {
    use anyhow::Context;
    use std::time::Duration;

    use crate::automation::prepare::{
        enter_fullscreen, navigate_to_title_page, wait_for_banner_to_clear,
    };
    use crate::automation::sink::PngDirectory;
    use crate::capture::{
        DesktopScreen, KeyWatcher, activate_window, find_viewer_window, install_console_handler,
        minimize_window, window_bounds,
    };
    use crate::ocr::OcrEngine;

    let cancel = CancelToken::new();
    install_console_handler(cancel.clone());

    let mut sink = PngDirectory::prepare(pages_dir)?;
    crate::logger::set_session_log(Some(pages_dir.join("session.log")));
    log::info!("Output folder: {}", pages_dir.display());

    let ocr = match crate::ocr::create_engine(&config.ocr) {
        Ok(engine) => Some(engine),
        Err(e) => {
            log::warn!("OCR unavailable, menus use fixed positions: {}", e);
            None
        }
    };
    let ocr = ocr.as_ref().map(|engine| engine as &dyn OcrEngine);

    let result = (|| -> anyhow::Result<SessionReport> {
        let hwnd = find_viewer_window(&config.viewer.process_name)
            .map_err(|e| SessionError::ViewerNotFound(e.to_string()))?;
        activate_window(hwnd)?;
        let window = window_bounds(hwnd)?;
        log::info!("Viewer window: {}", window);

        let mut screen = DesktopScreen::new(hwnd).context("Failed to start screen capture")?;

        if !navigate_to_title_page(&mut screen, ocr, &window, config) {
            log::warn!("Could not navigate to the title page, continuing");
        }
        if !enter_fullscreen(&mut screen, ocr, &window, config) {
            return Err(SessionError::FullscreenFailed.into());
        }
        wait_for_banner_to_clear(&mut screen, ocr, config, &cancel)?;
        std::thread::sleep(Duration::from_secs(1));

        log::info!("Press any key to stop capturing");
        let watcher = KeyWatcher::spawn(cancel.clone());
        let report = run_session(&mut screen, &mut sink, config, &cancel);
        drop(watcher);

        log::info!("Leaving fullscreen...");
        if activate_window(hwnd).is_ok() {
            screen.press_escape();
            std::thread::sleep(Duration::from_millis(500));
            minimize_window(hwnd);
        }

        Ok(report?)
    })();

    match &result {
        Ok(report) => {
            if let Some(region) = &report.region {
                log::info!("Content region: {}", region);
            }
            if report.outcome.completed {
                log::info!("Done: {} page(s) captured", report.outcome.pages);
            } else {
                log::info!("Stopped: {} page(s) captured", report.outcome.pages);
            }
        }
        Err(e) => log::error!("Capture failed: {:#}", e),
    }

    crate::logger::set_session_log(None);
    result.map(|_| ())
}

#[cfg(not(windows))]
pub fn capture_book(_pages_dir: &std::path::Path, _config: &SessionConfig) -> anyhow::Result<()> {
    Err(anyhow::anyhow!(
        "Capturing requires Windows; the markdown, cleanup and classify commands work here"
    ))
}
