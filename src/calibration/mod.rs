//! Calibration of the viewer layout.
//!
//! Determines where the document is rendered on screen and where to click
//! to turn pages, before any page is captured.

pub mod navigation;
pub mod region;
pub mod viewer;

pub use navigation::{NavigationAnchors, locate_navigation};
pub use region::{Region, calibrate_region};
pub use viewer::{DocumentViewer, PageNavigator, Screen, Viewer};
