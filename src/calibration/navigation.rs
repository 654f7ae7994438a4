//! Locating the viewer's page-turn arrows.
//!
//! The arrows only render while the pointer hovers over the margin, so the
//! locator hovers first, captures, then searches the outer strip of the
//! screen for a column with a strong vertical edge.

use image::RgbaImage;

use crate::automation::abort::CancelToken;
use crate::automation::config::NavigationConfig;
use crate::automation::detection::{GradientField, GrayPlane};
use crate::calibration::region::Region;
use crate::calibration::viewer::Screen;

/// Screen positions that turn the page when clicked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NavigationAnchors {
    pub next: Option<(i32, i32)>,
    pub previous: Option<(i32, i32)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Next,
    Previous,
}

impl Side {
    fn label(self) -> &'static str {
        match self {
            Side::Next => "next",
            Side::Previous => "previous",
        }
    }
}

/// Where to hover to reveal the arrow on `side`.
///
/// With a region: the middle of the margin beside it, at the region's
/// vertical center. Without one: near the screen edge at half height.
pub fn hover_point(
    side: Side,
    region: Option<&Region>,
    (width, height): (u32, u32),
    config: &NavigationConfig,
) -> (i32, i32) {
    match (side, region) {
        (Side::Next, Some(r)) => (
            (r.right + (width.saturating_sub(r.right)) / 2) as i32,
            ((r.top + r.bottom) / 2) as i32,
        ),
        (Side::Previous, Some(r)) => ((r.left / 2) as i32, ((r.top + r.bottom) / 2) as i32),
        (Side::Next, None) => (
            (width as f64 * config.fallback_hover_fraction) as i32,
            height as i32 / 2,
        ),
        (Side::Previous, None) => (
            (width as f64 * (1.0 - config.fallback_hover_fraction)) as i32,
            height as i32 / 2,
        ),
    }
}

/// Searches the outer strip on `side` for the arrow glyph.
///
/// The column with the largest summed horizontal gradient is accepted only
/// if it beats the mean column by `gradient_ratio`. The vertical anchor is
/// the mean row whose gradient in that column exceeds `gradient_ratio` times
/// the column mean.
pub fn find_arrow(frame: &RgbaImage, side: Side, config: &NavigationConfig) -> Option<(i32, i32)> {
    let plane = GrayPlane::from_rgba(frame);
    let (w, h) = (plane.width(), plane.height());
    let strip = (w as f64 * config.strip_fraction) as u32;

    let cols = match side {
        Side::Next => w.saturating_sub(strip)..w.saturating_sub(config.edge_inset),
        Side::Previous => config.edge_inset..strip,
    };
    let rows = (h as f64 * 0.2) as u32..(h as f64 * 0.8) as u32;

    let field = GradientField::horizontal(&plane, cols.clone(), rows.clone());
    if field.cols() == 0 || field.rows() == 0 {
        return None;
    }

    let sums = field.column_sums();
    let mean = sums.iter().sum::<f64>() / sums.len() as f64;
    let (peak_col, peak) = sums
        .iter()
        .enumerate()
        .fold((0, 0.0), |best, (i, &v)| if v > best.1 { (i, v) } else { best });

    if peak <= mean * config.gradient_ratio {
        return None;
    }

    let column = field.column(peak_col);
    let column_mean = column.iter().sum::<f64>() / column.len() as f64;
    let strong: Vec<usize> = column
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v > column_mean * config.gradient_ratio)
        .map(|(i, _)| i)
        .collect();
    if strong.is_empty() {
        return None;
    }
    let center_row = strong.iter().sum::<usize>() / strong.len();

    Some((
        (cols.start as usize + peak_col) as i32,
        (rows.start as usize + center_row) as i32,
    ))
}

fn locate_side<S: Screen>(
    screen: &mut S,
    side: Side,
    region: Option<&Region>,
    config: &NavigationConfig,
    cancel: &CancelToken,
) -> (i32, i32) {
    let hover = hover_point(side, region, screen.size(), config);
    screen.move_pointer(hover.0, hover.1);
    if !cancel.sleep(config.hover_settle()) {
        log::info!("Stopped, using {} hover position", side.label());
        return hover;
    }

    let found = screen
        .capture_frame()
        .and_then(|frame| find_arrow(&frame, side, config));

    match found {
        Some(point) => {
            log::info!("Found {} arrow at ({}, {})", side.label(), point.0, point.1);
            point
        }
        None => {
            log::info!(
                "No {} arrow found, using hover position ({}, {})",
                side.label(),
                hover.0,
                hover.1
            );
            hover
        }
    }
}

/// Finds click points for both page-turn directions.
///
/// Never fails: a side without a detectable arrow falls back to its hover
/// point. The pointer is parked at the screen center afterwards so it does
/// not keep the arrows visible inside captured frames. Cancellation cuts
/// the hover waits short and keeps the hover points.
pub fn locate_navigation<S: Screen>(
    screen: &mut S,
    region: Option<&Region>,
    config: &NavigationConfig,
    cancel: &CancelToken,
) -> NavigationAnchors {
    log::info!("Detecting navigation arrows...");

    let next = locate_side(screen, Side::Next, region, config, cancel);
    let previous = locate_side(screen, Side::Previous, region, config, cancel);

    let (w, h) = screen.size();
    screen.move_pointer(w as i32 / 2, h as i32 / 2);

    NavigationAnchors {
        next: Some(next),
        previous: Some(previous),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::viewer::testing::{ScriptedScreen, solid};
    use image::Rgba;

    fn fast_config() -> NavigationConfig {
        NavigationConfig {
            hover_settle_ms: 0,
            ..Default::default()
        }
    }

    /// Draws a gray vertical bar, standing in for an arrow glyph.
    fn draw_bar(img: &mut RgbaImage, xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) {
        for y in ys {
            for x in xs.clone() {
                img.put_pixel(x, y, Rgba([200, 200, 200, 255]));
            }
        }
    }

    #[test]
    fn test_hover_points_from_region() {
        let region = Region::new(200, 100, 800, 500).unwrap();
        let config = fast_config();
        assert_eq!(
            hover_point(Side::Next, Some(&region), (1000, 600), &config),
            (900, 300)
        );
        assert_eq!(
            hover_point(Side::Previous, Some(&region), (1000, 600), &config),
            (100, 300)
        );
    }

    #[test]
    fn test_hover_points_without_region() {
        let config = fast_config();
        assert_eq!(hover_point(Side::Next, None, (1000, 600), &config), (950, 300));
        assert_eq!(hover_point(Side::Previous, None, (1000, 600), &config), (50, 300));
    }

    #[test]
    fn test_find_arrow_on_uniform_frame() {
        let frame = solid(1000, 600, 0);
        assert_eq!(find_arrow(&frame, Side::Next, &fast_config()), None);
        assert_eq!(find_arrow(&frame, Side::Previous, &fast_config()), None);
    }

    #[test]
    fn test_find_arrow_locates_glyph() {
        let mut frame = solid(1000, 600, 0);
        draw_bar(&mut frame, 950..954, 280..320);

        let (x, y) = find_arrow(&frame, Side::Next, &fast_config()).unwrap();
        assert!((945..=955).contains(&x), "x = {}", x);
        assert!((295..=305).contains(&y), "y = {}", y);

        // Glyph on the right is invisible to the left-side search
        assert_eq!(find_arrow(&frame, Side::Previous, &fast_config()), None);
    }

    #[test]
    fn test_locate_falls_back_to_hover_points() {
        let mut screen = ScriptedScreen::new(vec![solid(1000, 600, 0)]);
        let region = Region::new(200, 100, 800, 500).unwrap();

        let anchors = locate_navigation(
            &mut screen,
            Some(&region),
            &fast_config(),
            &CancelToken::new(),
        );

        assert_eq!(anchors.next, Some((900, 300)));
        assert_eq!(anchors.previous, Some((100, 300)));
        assert_eq!(screen.moves.last(), Some(&(500, 300)));
        assert!(screen.clicks.is_empty());
    }

    #[test]
    fn test_locate_finds_hover_revealed_arrows() {
        let mut screen = ScriptedScreen::new(vec![solid(1000, 600, 0)]);
        // Arrows render only while the pointer is in the outer fifth
        screen.hover_overlay = Some(Box::new(|frame: &mut RgbaImage, (px, _py)| {
            if px > 800 {
                draw_bar(frame, 970..974, 200..240);
            } else if px < 200 {
                draw_bar(frame, 30..34, 200..240);
            }
        }));

        let anchors = locate_navigation(&mut screen, None, &fast_config(), &CancelToken::new());

        let (nx, ny) = anchors.next.unwrap();
        assert!((965..=975).contains(&nx), "next x = {}", nx);
        assert!((215..=225).contains(&ny), "next y = {}", ny);
        let (px, py) = anchors.previous.unwrap();
        assert!((25..=35).contains(&px), "previous x = {}", px);
        assert!((215..=225).contains(&py), "previous y = {}", py);
    }

    #[test]
    fn test_locate_without_frames_uses_hover_points() {
        let mut screen = ScriptedScreen::new(vec![solid(1000, 600, 0)]);
        screen.connected = false;
        let anchors = locate_navigation(&mut screen, None, &fast_config(), &CancelToken::new());
        assert_eq!(anchors.next, Some((950, 300)));
        assert_eq!(anchors.previous, Some((50, 300)));
    }

    #[test]
    fn test_locate_cancelled_keeps_hover_points() {
        let mut screen = ScriptedScreen::new(vec![solid(1000, 600, 0)]);
        screen.hover_overlay = Some(Box::new(|frame: &mut RgbaImage, (px, _py)| {
            if px > 800 {
                draw_bar(frame, 970..974, 200..240);
            }
        }));
        let config = NavigationConfig {
            hover_settle_ms: 5_000,
            ..Default::default()
        };
        let cancel = CancelToken::new();
        cancel.request();

        let start = std::time::Instant::now();
        let anchors = locate_navigation(&mut screen, None, &config, &cancel);

        assert!(start.elapsed() < std::time::Duration::from_secs(1));
        assert_eq!(anchors.next, Some((950, 300)));
        assert_eq!(anchors.previous, Some((50, 300)));
        assert_eq!(screen.moves.last(), Some(&(500, 300)));
    }
}
