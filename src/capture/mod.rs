//! Windows desktop backend.
//!
//! This module provides:
//! - Viewer window discovery and control (`find_viewer_window`)
//! - Primary monitor capture (`MonitorCapturer`)
//! - The desktop as a `Screen` (`DesktopScreen`)
//! - User stop signals (`KeyWatcher`, `install_console_handler`)

pub mod desktop;
pub mod screenshot;
pub mod watcher;
pub mod window;

pub use desktop::DesktopScreen;
pub use watcher::{KeyWatcher, install_console_handler};
pub use window::{activate_window, find_viewer_window, minimize_window, window_bounds};
