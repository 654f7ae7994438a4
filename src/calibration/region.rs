//! Content region calibration.
//!
//! Finds the rectangle the document is rendered in. Two strategies:
//!
//! 1. Direct boundary detection on a single frame, when the margin color is
//!    distinguishable from the page color. Margins have near-zero column
//!    variance; the page does not.
//! 2. Consensus search over several pages, when margin and page share a
//!    color. Front matter is often narrower than body pages, so the search
//!    pages forward until the right ink edge repeats within a tolerance.
//!
//! The consensus search turns pages; it always turns back the same number
//! of pages before returning.

use image::RgbaImage;

use crate::automation::abort::CancelToken;
use crate::automation::config::CalibrationConfig;
use crate::automation::detection::{GrayPlane, column_variance, row_variance};
use crate::calibration::viewer::Viewer;
use crate::error::SessionError;

/// Axis-aligned rectangle in screen pixels; `right` and `bottom` are exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Region {
    /// Returns `None` unless `left < right` and `top < bottom`.
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Option<Self> {
        (left < right && top < bottom).then_some(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    /// Builds a region from signed coordinates, clamped to the screen.
    pub fn clamped(left: i64, top: i64, right: i64, bottom: i64, (w, h): (u32, u32)) -> Option<Self> {
        let clamp_x = |v: i64| v.clamp(0, w as i64) as u32;
        let clamp_y = |v: i64| v.clamp(0, h as i64) as u32;
        Self::new(clamp_x(left), clamp_y(top), clamp_x(right), clamp_y(bottom))
    }

    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}) {}x{}",
            self.left,
            self.top,
            self.right,
            self.bottom,
            self.width(),
            self.height()
        )
    }
}

/// Bounding box of visible ink on one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InkBounds {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

/// Points sampled for the margin color, 10px inside each corner.
fn corner_samples(plane: &GrayPlane) -> [f64; 4] {
    let (w, h) = (plane.width(), plane.height());
    let near = |v: u32| 10.min(v.saturating_sub(1));
    let far = |v: u32| v.saturating_sub(10).min(v.saturating_sub(1));
    [
        plane.get(near(w), near(h)),
        plane.get(far(w), near(h)),
        plane.get(near(w), far(h)),
        plane.get(far(w), far(h)),
    ]
}

fn margin_brightness(plane: &GrayPlane) -> f64 {
    corner_samples(plane).iter().sum::<f64>() / 4.0
}

/// True when the page background around the text is dark.
pub fn background_is_dark(plane: &GrayPlane) -> bool {
    margin_brightness(plane) < 128.0
}

/// True when the margin color is too close to the page center color for
/// direct boundary detection.
pub fn margin_matches_content(plane: &GrayPlane, min_contrast: f64) -> bool {
    let (cx, cy) = (plane.width() / 2, plane.height() / 2);
    let center = plane.mean_of(
        cx.saturating_sub(50)..cx + 50,
        cy.saturating_sub(50)..cy + 50,
    );
    (margin_brightness(plane) - center).abs() < min_contrast
}

/// First index scanning forward whose value exceeds `threshold`.
fn first_above(values: &[f64], range: std::ops::Range<usize>, threshold: f64) -> Option<usize> {
    range.into_iter().find(|&i| values[i] > threshold)
}

/// Last index scanning backward whose value exceeds `threshold`.
fn last_above(values: &[f64], range: std::ops::Range<usize>, threshold: f64) -> Option<usize> {
    range.into_iter().rev().find(|&i| values[i] > threshold)
}

/// Variance-based boundary detection on a single frame.
///
/// Column variance is measured over the middle half of the rows; any column
/// above 5% of the maximum variance is content. Rows are found the same way
/// inside the detected columns. The result is rejected when it is too small
/// to be a page.
pub fn detect_region_direct(plane: &GrayPlane, config: &CalibrationConfig) -> Option<Region> {
    let (w, h) = (plane.width() as usize, plane.height() as usize);
    if w == 0 || h == 0 {
        return None;
    }

    let col_var = column_variance(plane, (h / 4) as u32..(3 * h / 4) as u32);
    let col_max = col_var.iter().cloned().fold(0.0, f64::max);
    let col_threshold = col_max * config.variance_fraction;

    let left = first_above(&col_var, 0..w / 2, col_threshold).unwrap_or(0);
    let right = last_above(&col_var, w / 2 + 1..w, col_threshold)
        .map(|c| c + 1)
        .unwrap_or(w);

    let row_var = row_variance(plane, left as u32..right as u32);
    let row_max = row_var.iter().cloned().fold(0.0, f64::max);
    let row_threshold = row_max * config.variance_fraction;

    let top = first_above(&row_var, 0..h / 2, row_threshold).unwrap_or(0);
    let bottom = last_above(&row_var, h / 2 + 1..h, row_threshold)
        .map(|r| r + 1)
        .unwrap_or(h);

    log::debug!(
        "Direct detection: max variance {:.0}, bounds left={} right={} top={} bottom={}",
        col_max,
        left,
        right,
        top,
        bottom
    );

    let region = Region::new(left as u32, top as u32, right as u32, bottom as u32)?;
    let wide_enough = region.width() as f64 >= w as f64 * config.min_width_fraction;
    let tall_enough = region.height() as f64 >= h as f64 * config.min_height_fraction;
    (wide_enough && tall_enough).then_some(region)
}

/// Bounding box of ink using a per-pixel brightness test.
///
/// On a dark background any pixel brighter than 50 is ink; on a light
/// background any pixel darker than 200. The right edge only considers the
/// top and bottom 10% of rows, where running heads and page numbers sit.
pub fn find_text_bounds(plane: &GrayPlane) -> InkBounds {
    let (w, h) = (plane.width(), plane.height());
    let dark = background_is_dark(plane);
    let is_ink = |v: f64| if dark { v > 50.0 } else { v < 200.0 };

    let column_has_ink =
        |x: u32, rows: std::ops::Range<u32>| rows.into_iter().any(|y| is_ink(plane.get(x, y)));

    let top_section = (h as f64 * 0.1) as u32;
    let bottom_section = (h as f64 * 0.9) as u32;

    let left = (0..w).find(|&x| column_has_ink(x, 0..h)).unwrap_or(0);
    let right = (0..w)
        .rev()
        .find(|&x| column_has_ink(x, 0..top_section) || column_has_ink(x, bottom_section..h))
        .map(|x| x + 1)
        .unwrap_or(w);

    let row_has_ink = |y: u32| {
        plane.row(y)[left.min(right) as usize..right as usize]
            .iter()
            .any(|&v| is_ink(v))
    };
    let top = (0..h).find(|&y| row_has_ink(y)).unwrap_or(0);
    let bottom = (0..h)
        .rev()
        .find(|&y| row_has_ink(y))
        .map(|y| y + 1)
        .unwrap_or(h);

    InkBounds {
        left,
        top,
        right,
        bottom,
    }
}

/// Running state of the multi-page right edge consensus.
#[derive(Clone, Debug)]
pub struct ConsensusSearch {
    screen_size: (u32, u32),
    window: usize,
    tolerance: u32,
    full_width_fraction: f64,
    edges: Vec<u32>,
    full_width_pages: usize,
    min_left: Option<u32>,
    min_top: Option<u32>,
    max_bottom: Option<u32>,
}

impl ConsensusSearch {
    pub fn new(screen_size: (u32, u32), config: &CalibrationConfig) -> Self {
        Self {
            screen_size,
            window: config.consensus_window.max(1),
            tolerance: config.edge_tolerance,
            full_width_fraction: config.full_width_fraction,
            edges: Vec::new(),
            full_width_pages: 0,
            min_left: None,
            min_top: None,
            max_bottom: None,
        }
    }

    pub fn observations(&self) -> usize {
        self.edges.len()
    }

    /// Records one page; returns the stable right edge once the last
    /// `window` edges spread no more than the tolerance.
    pub fn observe(&mut self, bounds: InkBounds) -> Option<u32> {
        self.min_left = Some(self.min_left.map_or(bounds.left, |v| v.min(bounds.left)));
        self.min_top = Some(self.min_top.map_or(bounds.top, |v| v.min(bounds.top)));
        self.max_bottom = Some(self.max_bottom.map_or(bounds.bottom, |v| v.max(bounds.bottom)));

        self.edges.push(bounds.right);
        if bounds.right as f64 >= self.screen_size.0 as f64 * self.full_width_fraction {
            self.full_width_pages += 1;
        }

        if self.edges.len() < self.window {
            return None;
        }
        let recent = &self.edges[self.edges.len() - self.window..];
        let lo = *recent.iter().min()?;
        let hi = *recent.iter().max()?;
        (hi - lo <= self.tolerance).then_some(hi)
    }

    /// Right edge used when no consensus was reached.
    ///
    /// Mostly full-width pages mean the book has no visible margins; else
    /// the widest page observed wins; with nothing observed, a fixed share
    /// of the screen width.
    pub fn fallback_edge(&self, config: &CalibrationConfig) -> u32 {
        let width = self.screen_size.0;
        if !self.edges.is_empty()
            && self.full_width_pages as f64 >= self.edges.len() as f64 * config.full_width_majority
        {
            log::info!("Book uses the full screen width (no visible margins)");
            return width;
        }
        if let Some(&widest) = self.edges.iter().max() {
            log::info!("Using widest observed right edge: {}", widest);
            return widest;
        }
        let estimate = (width as f64 * config.fallback_width_fraction) as u32;
        log::warn!("No right edge observed, using estimate: {}", estimate);
        estimate
    }

    /// Final region: observed left/top/bottom and the chosen right edge,
    /// padded on every side and clamped to the screen.
    pub fn padded_region(&self, right_edge: u32, padding: u32, screen: (u32, u32)) -> Option<Region> {
        let pad = padding as i64;
        Region::clamped(
            self.min_left? as i64 - pad,
            self.min_top? as i64 - pad,
            right_edge as i64 + pad,
            self.max_bottom? as i64 + pad,
            screen,
        )
    }
}

/// Determines the content region of the viewer.
///
/// Leaves the viewer on the page it started on, on every outcome. A lost
/// frame is fatal; so is an empty frame or a region that cannot be formed
/// after both strategies.
pub fn calibrate_region<V: Viewer>(
    viewer: &mut V,
    config: &CalibrationConfig,
    cancel: &CancelToken,
) -> Result<Region, SessionError> {
    let plane = capture_plane(viewer)?;

    if !margin_matches_content(&plane, config.margin_contrast) {
        log::info!("Detecting content region from the current page...");
        if let Some(region) = detect_region_direct(&plane, config) {
            log::info!("Content region detected: {}", region);
            return Ok(region);
        }
        log::info!("Direct detection failed, switching to page search");
    }

    consensus_search(viewer, config, cancel)
}

/// Captures a frame as a gray plane. Frames without pixels cannot hold a
/// region.
fn capture_plane<V: Viewer>(viewer: &mut V) -> Result<GrayPlane, SessionError> {
    let frame = viewer
        .capture_frame()
        .ok_or(SessionError::FrameLost { pages_persisted: 0 })?;
    if frame.width() == 0 || frame.height() == 0 {
        log::warn!("Captured frame is empty");
        return Err(SessionError::RegionNotFound);
    }
    Ok(GrayPlane::from_rgba(&frame))
}

fn consensus_search<V: Viewer>(
    viewer: &mut V,
    config: &CalibrationConfig,
    cancel: &CancelToken,
) -> Result<Region, SessionError> {
    log::info!(
        "Searching for {} consecutive pages with the same right edge...",
        config.consensus_window
    );

    let mut advanced = 0u32;
    let result = search_pages(viewer, config, cancel, &mut advanced);
    return_to_start(viewer, advanced, config);

    let region = result?;
    log::info!("Content region: {}", region);
    Ok(region)
}

/// Pages forward until the right edge is stable, counting every advance in
/// `advanced` so the caller can turn back on any outcome.
fn search_pages<V: Viewer>(
    viewer: &mut V,
    config: &CalibrationConfig,
    cancel: &CancelToken,
    advanced: &mut u32,
) -> Result<Region, SessionError> {
    let mut search = ConsensusSearch::new(viewer.screen_size(), config);
    let mut stable_edge = None;

    for i in 0..config.max_pages {
        if !cancel.sleep(config.sample_delay()) {
            return Err(SessionError::Cancelled);
        }

        let bounds = find_text_bounds(&capture_plane(viewer)?);
        log::info!("  Page +{}: right edge = {}", i + 1, bounds.right);

        if let Some(edge) = search.observe(bounds) {
            log::info!("  --> Stable right edge found: {}", edge);
            stable_edge = Some(edge);
            break;
        }

        if !viewer.advance_page() {
            log::warn!("Page advance failed during calibration");
        }
        *advanced += 1;
        cancel.sleep(config.settle());
    }

    let right_edge = stable_edge.unwrap_or_else(|| search.fallback_edge(config));
    let screen = capture_size(viewer)?;
    search
        .padded_region(right_edge, config.padding, screen)
        .ok_or(SessionError::RegionNotFound)
}

/// Frame dimensions taken from a fresh capture.
fn capture_size<V: Viewer>(viewer: &mut V) -> Result<(u32, u32), SessionError> {
    viewer
        .capture_frame()
        .map(|frame: RgbaImage| frame.dimensions())
        .ok_or(SessionError::FrameLost { pages_persisted: 0 })
}

fn return_to_start<V: Viewer>(viewer: &mut V, pages: u32, config: &CalibrationConfig) {
    if pages == 0 {
        return;
    }
    log::info!("Navigating {} page(s) back...", pages);
    for _ in 0..pages {
        if !viewer.retreat_page() {
            log::warn!("Page retreat failed during calibration");
        }
        std::thread::sleep(config.settle());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::viewer::testing::{ScriptedViewer, solid};
    use image::Rgba;

    fn fast_config() -> CalibrationConfig {
        CalibrationConfig {
            sample_delay_ms: 0,
            settle_ms: 0,
            ..Default::default()
        }
    }

    fn bounds_with_right(right: u32) -> InkBounds {
        InkBounds {
            left: 100,
            top: 10,
            right,
            bottom: 490,
        }
    }

    /// White page with a black ink block from x=100 to `right`, rows 10..490.
    fn page_with_right_edge(right: u32) -> RgbaImage {
        let mut img = solid(1000, 500, 255);
        for y in 10..490 {
            for x in 100..right {
                img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        img
    }

    /// Black screen with a white page (300..700 × 50..550) carrying text lines.
    fn page_on_dark_margins() -> RgbaImage {
        let mut img = solid(1000, 600, 0);
        for y in 50..550 {
            for x in 300..700 {
                let ink = y % 20 < 3 && (320..680).contains(&x);
                let v = if ink { 0 } else { 255 };
                img.put_pixel(x, y, Rgba([v, v, v, 255]));
            }
        }
        img
    }

    #[test]
    fn test_region_invariants() {
        assert!(Region::new(0, 0, 10, 10).is_some());
        assert!(Region::new(10, 0, 10, 10).is_none());
        assert!(Region::new(0, 10, 10, 5).is_none());

        let clamped = Region::clamped(-20, -5, 1200, 700, (1000, 600)).unwrap();
        assert_eq!(clamped, Region::new(0, 0, 1000, 600).unwrap());
    }

    #[test]
    fn test_consensus_detects_first_stable_window() {
        let config = fast_config();
        let mut search = ConsensusSearch::new((1000, 500), &config);
        let edges = [300, 700, 702, 701, 703, 703];

        let mut found = None;
        for (i, &edge) in edges.iter().enumerate() {
            if let Some(stable) = search.observe(bounds_with_right(edge)) {
                found = Some((i + 1, stable));
                break;
            }
        }
        // 700, 702, 701 already spread only 2px
        assert_eq!(found, Some((4, 702)));
    }

    #[test]
    fn test_consensus_stable_on_fifth_observation() {
        let config = fast_config();
        let mut search = ConsensusSearch::new((1000, 500), &config);
        let results: Vec<Option<u32>> = [300, 500, 701, 703, 703]
            .iter()
            .map(|&edge| search.observe(bounds_with_right(edge)))
            .collect();
        assert_eq!(results, vec![None, None, None, None, Some(703)]);

        let region = search.padded_region(703, 20, (1000, 500)).unwrap();
        assert_eq!(region.right, 723);
        assert_eq!(region.left, 80);
        assert_eq!(region.top, 0);
        assert_eq!(region.bottom, 500);
    }

    #[test]
    fn test_fallback_full_width_majority() {
        let config = fast_config();
        let mut search = ConsensusSearch::new((1000, 500), &config);
        // Alternating widths never agree; 7 of 10 are full width
        for edge in [950, 400, 990, 600, 960, 980, 300, 1000, 940, 970] {
            assert_eq!(search.observe(bounds_with_right(edge)), None);
        }
        assert_eq!(search.observations(), 10);
        assert_eq!(search.fallback_edge(&config), 1000);
    }

    #[test]
    fn test_fallback_widest_edge_then_fraction() {
        let config = fast_config();
        let mut search = ConsensusSearch::new((1000, 500), &config);
        for edge in [300, 500, 700, 400] {
            search.observe(bounds_with_right(edge));
        }
        assert_eq!(search.fallback_edge(&config), 700);

        let empty = ConsensusSearch::new((1000, 500), &config);
        assert_eq!(empty.fallback_edge(&config), 600);
        assert!(empty.padded_region(600, 20, (1000, 500)).is_none());
    }

    #[test]
    fn test_find_text_bounds_light_background() {
        let plane = GrayPlane::from_rgba(&page_with_right_edge(640));
        assert!(!background_is_dark(&plane));
        let bounds = find_text_bounds(&plane);
        assert_eq!(
            bounds,
            InkBounds {
                left: 100,
                top: 10,
                right: 640,
                bottom: 490
            }
        );
    }

    #[test]
    fn test_find_text_bounds_dark_background() {
        let mut img = solid(400, 300, 0);
        for y in 20..280 {
            for x in 40..260 {
                img.put_pixel(x, y, Rgba([220, 220, 220, 255]));
            }
        }
        let plane = GrayPlane::from_rgba(&img);
        assert!(background_is_dark(&plane));
        let bounds = find_text_bounds(&plane);
        assert_eq!((bounds.left, bounds.right), (40, 260));
        assert_eq!((bounds.top, bounds.bottom), (20, 280));
    }

    #[test]
    fn test_direct_detection_on_dark_margins() {
        let plane = GrayPlane::from_rgba(&page_on_dark_margins());
        let config = fast_config();
        assert!(!margin_matches_content(&plane, config.margin_contrast));

        let region = detect_region_direct(&plane, &config).unwrap();
        assert!((296..=300).contains(&region.left), "left = {}", region.left);
        assert!((700..=704).contains(&region.right), "right = {}", region.right);
        assert!((46..=50).contains(&region.top), "top = {}", region.top);
        assert!((550..=554).contains(&region.bottom), "bottom = {}", region.bottom);
    }

    #[test]
    fn test_direct_detection_rejects_small_region() {
        // A 100x100 noisy patch on a black screen is too small to be a page
        let mut img = solid(1000, 600, 0);
        for y in 250..350 {
            for x in 450..550 {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                img.put_pixel(x, y, Rgba([v, v, v, 255]));
            }
        }
        let plane = GrayPlane::from_rgba(&img);
        assert!(detect_region_direct(&plane, &fast_config()).is_none());
    }

    #[test]
    fn test_calibrate_uses_direct_detection() {
        let mut viewer = ScriptedViewer::new(vec![page_on_dark_margins()]);
        let region = calibrate_region(&mut viewer, &fast_config(), &CancelToken::new()).unwrap();
        assert!((296..=300).contains(&region.left));
        assert_eq!(viewer.advances, 0);
        assert_eq!(viewer.retreats, 0);
    }

    #[test]
    fn test_calibrate_consensus_restores_position() {
        let pages = [300, 500, 701, 703, 703, 703]
            .iter()
            .map(|&edge| page_with_right_edge(edge))
            .collect();
        let mut viewer = ScriptedViewer::new(pages);

        let region = calibrate_region(&mut viewer, &fast_config(), &CancelToken::new()).unwrap();

        assert_eq!(region, Region::new(80, 0, 723, 500).unwrap());
        assert_eq!(viewer.advances, 4);
        assert_eq!(viewer.retreats, viewer.advances);
        assert_eq!(viewer.position, 0);
    }

    #[test]
    fn test_calibrate_without_consensus_uses_widest_edge() {
        let pages = [300, 500, 700, 400]
            .iter()
            .map(|&edge| page_with_right_edge(edge))
            .collect();
        let mut viewer = ScriptedViewer::new(pages);
        let config = CalibrationConfig {
            max_pages: 4,
            ..fast_config()
        };

        let region = calibrate_region(&mut viewer, &config, &CancelToken::new()).unwrap();

        assert_eq!(region.right, 720);
        assert_eq!(viewer.advances, 4);
        assert_eq!(viewer.retreats, 4);
    }

    #[test]
    fn test_calibrate_fails_without_frames() {
        let mut viewer = ScriptedViewer::new(vec![solid(100, 100, 255)]);
        viewer.lose_frame_after = Some(0);
        let result = calibrate_region(&mut viewer, &fast_config(), &CancelToken::new());
        assert_eq!(result, Err(SessionError::FrameLost { pages_persisted: 0 }));
    }

    #[test]
    fn test_calibrate_cancelled_returns_to_start() {
        let pages = [300, 500, 700]
            .iter()
            .map(|&edge| page_with_right_edge(edge))
            .collect();
        let mut viewer = ScriptedViewer::new(pages);
        let cancel = CancelToken::new();
        cancel.request();

        let result = calibrate_region(&mut viewer, &fast_config(), &cancel);

        assert_eq!(result, Err(SessionError::Cancelled));
        assert_eq!(viewer.retreats, viewer.advances);
    }

    #[test]
    fn test_calibrate_lost_frame_returns_to_start() {
        let pages = [300, 500, 700, 400, 900]
            .iter()
            .map(|&edge| page_with_right_edge(edge))
            .collect();
        let mut viewer = ScriptedViewer::new(pages);
        // One frame for the margin check, three search pages, then nothing
        viewer.lose_frame_after = Some(4);

        let result = calibrate_region(&mut viewer, &fast_config(), &CancelToken::new());

        assert_eq!(result, Err(SessionError::FrameLost { pages_persisted: 0 }));
        assert_eq!(viewer.advances, 3);
        assert_eq!(viewer.retreats, 3);
        assert_eq!(viewer.position, 0);
    }

    #[test]
    fn test_calibrate_lost_frame_after_search_returns_to_start() {
        let pages = [300, 500, 700, 400]
            .iter()
            .map(|&edge| page_with_right_edge(edge))
            .collect();
        let mut viewer = ScriptedViewer::new(pages);
        let config = CalibrationConfig {
            max_pages: 4,
            ..fast_config()
        };
        // Every search page is captured; the final size capture fails
        viewer.lose_frame_after = Some(5);

        let result = calibrate_region(&mut viewer, &config, &CancelToken::new());

        assert_eq!(result, Err(SessionError::FrameLost { pages_persisted: 0 }));
        assert_eq!(viewer.advances, 4);
        assert_eq!(viewer.retreats, 4);
        assert_eq!(viewer.position, 0);
    }

    #[test]
    fn test_calibrate_rejects_empty_frame() {
        let mut viewer = ScriptedViewer::new(vec![solid(0, 0, 255)]);
        let result = calibrate_region(&mut viewer, &fast_config(), &CancelToken::new());
        assert_eq!(result, Err(SessionError::RegionNotFound));
        assert_eq!(viewer.advances, 0);
    }
}
