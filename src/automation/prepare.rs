//! Bringing the viewer into capture position.
//!
//! Menus are driven by reading their labels with OCR. When OCR is not
//! available, or a menu label is not found, fixed positions relative to the
//! window are clicked instead.

use std::time::Duration;

use crate::automation::abort::CancelToken;
use crate::automation::config::SessionConfig;
use crate::calibration::{Region, Screen};
use crate::error::SessionError;
use crate::ocr::{MatchPick, OcrEngine, find_text_in_region};

/// Dropdown search box relative to the center of its menu label.
struct Dropdown {
    left: i64,
    top: i64,
    right: i64,
    bottom: i64,
}

const GOTO_DROPDOWN: Dropdown = Dropdown {
    left: -50,
    top: 5,
    right: 150,
    bottom: 180,
};

const VIEW_DROPDOWN: Dropdown = Dropdown {
    left: -30,
    top: 5,
    right: 250,
    bottom: 200,
};

#[derive(Debug, PartialEq, Eq)]
enum MenuResult {
    Selected,
    MenuNotFound,
    EntryNotFound,
}

/// Opens the menu whose label contains `menu_label` and clicks the entry
/// containing `entry_label`.
fn select_menu_entry<S: Screen>(
    screen: &mut S,
    ocr: &dyn OcrEngine,
    window: &Region,
    menu_label: &str,
    entry_label: &str,
    dropdown: &Dropdown,
    config: &SessionConfig,
) -> MenuResult {
    let size = screen.size();
    let scale = config.ocr.ui_scale_factor;

    let menu_bar = Region::clamped(
        window.left as i64,
        window.top as i64 - 5,
        window.left as i64 + 300,
        window.top as i64 + 30,
        size,
    );
    let Some(menu) = menu_bar.and_then(|region| {
        find_text_in_region(screen, ocr, &region, menu_label, MatchPick::Topmost, scale)
    }) else {
        log::warn!("Menu '{}' not found", menu_label);
        return MenuResult::MenuNotFound;
    };
    log::info!("  '{}' found at ({}, {})", menu_label, menu.x, menu.y);

    screen.click(menu.x, menu.y);
    std::thread::sleep(config.viewer.menu_open());

    let (mx, my) = (menu.x as i64, menu.y as i64);
    let entry = Region::clamped(
        mx + dropdown.left,
        my + dropdown.top,
        mx + dropdown.right,
        my + dropdown.bottom,
        size,
    )
    .and_then(|region| {
        find_text_in_region(screen, ocr, &region, entry_label, MatchPick::Topmost, scale)
    });

    match entry {
        Some(entry) => {
            log::info!("  '{}' found at ({}, {})", entry_label, entry.x, entry.y);
            screen.click(entry.x, entry.y);
            std::thread::sleep(config.viewer.menu_action());
            MenuResult::Selected
        }
        None => {
            log::warn!("Menu entry '{}' not found", entry_label);
            screen.press_escape();
            MenuResult::EntryNotFound
        }
    }
}

fn fixed_point(window: &Region, width_fraction: f64, y_offset: i32) -> (i32, i32) {
    (
        window.left as i32 + (window.width() as f64 * width_fraction) as i32,
        window.top as i32 + y_offset,
    )
}

/// Jumps to the title page through the "go to" menu.
///
/// Returns `false` when the menu opened but had no title page entry; the
/// caller may continue, since the viewer could already be there.
pub fn navigate_to_title_page<S: Screen>(
    screen: &mut S,
    ocr: Option<&dyn OcrEngine>,
    window: &Region,
    config: &SessionConfig,
) -> bool {
    log::info!("Navigating to title page...");
    let viewer = &config.viewer;

    if let Some(ocr) = ocr {
        match select_menu_entry(
            screen,
            ocr,
            window,
            &viewer.goto_menu_label,
            &viewer.title_page_label,
            &GOTO_DROPDOWN,
            config,
        ) {
            MenuResult::Selected => return true,
            MenuResult::EntryNotFound => return false,
            MenuResult::MenuNotFound => {}
        }
    }

    let (x, y) = fixed_point(window, 0.31, 100);
    log::info!("  Using fixed menu position ({}, {})", x, y);
    screen.click(x, y);
    std::thread::sleep(config.viewer.menu_open());
    screen.click(x, y + 72);
    std::thread::sleep(config.viewer.menu_action());
    true
}

/// Switches the viewer to fullscreen through the "view" menu.
pub fn enter_fullscreen<S: Screen>(
    screen: &mut S,
    ocr: Option<&dyn OcrEngine>,
    window: &Region,
    config: &SessionConfig,
) -> bool {
    log::info!("Entering fullscreen mode...");
    let viewer = &config.viewer;

    if let Some(ocr) = ocr {
        match select_menu_entry(
            screen,
            ocr,
            window,
            &viewer.view_menu_label,
            &viewer.fullscreen_label,
            &VIEW_DROPDOWN,
            config,
        ) {
            MenuResult::Selected => return true,
            MenuResult::EntryNotFound => return false,
            MenuResult::MenuNotFound => {}
        }
    }

    let (x, y) = fixed_point(window, 0.47, 100);
    log::info!("  Using fixed fullscreen position ({}, {})", x, y);
    screen.click(x, y);
    std::thread::sleep(config.viewer.menu_open());
    true
}

/// Waits for the "press to exit fullscreen" banner to disappear.
///
/// Polls the screen center until the banner label is gone or the timeout
/// elapses; a timeout is logged and not an error. Without OCR, waits a
/// fixed time instead.
pub fn wait_for_banner_to_clear<S: Screen>(
    screen: &mut S,
    ocr: Option<&dyn OcrEngine>,
    config: &SessionConfig,
    cancel: &CancelToken,
) -> Result<(), SessionError> {
    log::info!("Waiting for the fullscreen banner to disappear...");
    let viewer = &config.viewer;

    let Some(ocr) = ocr else {
        log::info!("  OCR unavailable, waiting {}ms", viewer.banner_fallback_ms);
        if !cancel.sleep(Duration::from_millis(viewer.banner_fallback_ms)) {
            return Err(SessionError::Cancelled);
        }
        return Ok(());
    };

    let (w, h) = screen.size();
    let (cx, cy) = (w as i64 / 2, h as i64 / 2);
    let center = Region::clamped(cx - 200, cy - 50, cx + 200, cy + 50, (w, h))
        .ok_or(SessionError::FullscreenFailed)?;
    let poll = Duration::from_millis(viewer.banner_poll_ms);
    let polls = (viewer.banner_timeout_ms / viewer.banner_poll_ms.max(1)).max(1);

    for i in 0..polls {
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        let banner = find_text_in_region(
            screen,
            ocr,
            &center,
            &viewer.fullscreen_banner_label,
            MatchPick::Topmost,
            config.ocr.ui_scale_factor,
        );
        if banner.is_none() {
            log::info!(
                "  Banner gone after {:.1}s",
                ((i + 1) * viewer.banner_poll_ms) as f64 / 1000.0
            );
            return Ok(());
        }

        if !cancel.sleep(poll) {
            return Err(SessionError::Cancelled);
        }
    }

    log::warn!("Timed out waiting for the fullscreen banner");
    Ok(())
}
