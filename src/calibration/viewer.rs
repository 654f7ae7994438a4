//! Seams between the perceptual engine and the desktop.
//!
//! [`Screen`] is the raw surface: frames, pointer and a key press.
//! [`Viewer`] is the paginated reading surface built on top of it.

use image::RgbaImage;

use super::navigation::NavigationAnchors;

/// Screen surface the viewer is rendered on.
///
/// Every call is synchronous and complete on return. Failures are reported
/// through the return value, never by panicking.
pub trait Screen {
    /// Screen size in pixels.
    fn size(&self) -> (u32, u32);

    /// Captures the full screen; `None` means the frame source is gone.
    fn capture_frame(&mut self) -> Option<RgbaImage>;

    fn move_pointer(&mut self, x: i32, y: i32) -> bool;

    fn click(&mut self, x: i32, y: i32) -> bool;

    fn press_escape(&mut self) -> bool;
}

impl<S: Screen + ?Sized> Screen for &mut S {
    fn size(&self) -> (u32, u32) {
        (**self).size()
    }

    fn capture_frame(&mut self) -> Option<RgbaImage> {
        (**self).capture_frame()
    }

    fn move_pointer(&mut self, x: i32, y: i32) -> bool {
        (**self).move_pointer(x, y)
    }

    fn click(&mut self, x: i32, y: i32) -> bool {
        (**self).click(x, y)
    }

    fn press_escape(&mut self) -> bool {
        (**self).press_escape()
    }
}

/// A paginated document viewer.
pub trait Viewer {
    fn screen_size(&self) -> (u32, u32);

    fn capture_frame(&mut self) -> Option<RgbaImage>;

    /// Turns one page forward.
    fn advance_page(&mut self) -> bool;

    /// Turns one page back.
    fn retreat_page(&mut self) -> bool;
}

/// Decides where to click to turn pages.
///
/// Uses the located anchors when present, otherwise a click into the outer
/// 5% of the screen at half height.
#[derive(Clone, Debug, Default)]
pub struct PageNavigator {
    anchors: NavigationAnchors,
}

impl PageNavigator {
    pub fn new(anchors: NavigationAnchors) -> Self {
        Self { anchors }
    }

    pub fn anchors(&self) -> &NavigationAnchors {
        &self.anchors
    }

    pub fn next_point(&self, (width, height): (u32, u32)) -> (i32, i32) {
        self.anchors
            .next
            .unwrap_or(((width as f64 * 0.95) as i32, height as i32 / 2))
    }

    pub fn previous_point(&self, (width, height): (u32, u32)) -> (i32, i32) {
        self.anchors
            .previous
            .unwrap_or(((width as f64 * 0.05) as i32, height as i32 / 2))
    }
}

/// [`Viewer`] implemented by clicking navigation points on a [`Screen`].
pub struct DocumentViewer<S: Screen> {
    screen: S,
    navigator: PageNavigator,
}

impl<S: Screen> DocumentViewer<S> {
    /// Creates a viewer that turns pages with the heuristic margin clicks.
    pub fn new(screen: S) -> Self {
        Self {
            screen,
            navigator: PageNavigator::default(),
        }
    }

    /// Replaces the navigator with one built from located anchors.
    pub fn with_anchors(self, anchors: NavigationAnchors) -> Self {
        Self {
            screen: self.screen,
            navigator: PageNavigator::new(anchors),
        }
    }

    pub fn navigator(&self) -> &PageNavigator {
        &self.navigator
    }

    pub fn screen_mut(&mut self) -> &mut S {
        &mut self.screen
    }

    pub fn into_screen(self) -> S {
        self.screen
    }
}

impl<S: Screen> Viewer for DocumentViewer<S> {
    fn screen_size(&self) -> (u32, u32) {
        self.screen.size()
    }

    fn capture_frame(&mut self) -> Option<RgbaImage> {
        self.screen.capture_frame()
    }

    fn advance_page(&mut self) -> bool {
        let (x, y) = self.navigator.next_point(self.screen.size());
        self.screen.click(x, y)
    }

    fn retreat_page(&mut self) -> bool {
        let (x, y) = self.navigator.previous_point(self.screen.size());
        self.screen.click(x, y)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_heuristic_navigation_points() {
        let navigator = PageNavigator::default();
        assert_eq!(navigator.next_point((1000, 600)), (950, 300));
        assert_eq!(navigator.previous_point((1000, 600)), (50, 300));
    }

    #[test]
    fn test_anchors_override_heuristic() {
        let navigator = PageNavigator::new(NavigationAnchors {
            next: Some((980, 310)),
            previous: None,
        });
        assert_eq!(navigator.next_point((1000, 600)), (980, 310));
        assert_eq!(navigator.previous_point((1000, 600)), (50, 300));
    }

    #[test]
    fn test_document_viewer_clicks_navigation_points() {
        let pages = vec![solid(1000, 600, 0), solid(1000, 600, 100)];
        let mut viewer = DocumentViewer::new(ScriptedScreen::new(pages)).with_anchors(
            NavigationAnchors {
                next: Some((990, 250)),
                previous: Some((10, 250)),
            },
        );

        assert!(viewer.advance_page());
        assert!(viewer.retreat_page());

        let screen = viewer.into_screen();
        assert_eq!(screen.clicks, vec![(990, 250), (10, 250)]);
        assert_eq!(screen.position, 0);
    }
}
