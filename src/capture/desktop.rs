//! The real desktop as a [`Screen`].

use anyhow::Result;
use image::RgbaImage;

use windows::Win32::Foundation::HWND;
use windows::Win32::UI::Input::KeyboardAndMouse::VK_ESCAPE;

use super::screenshot::MonitorCapturer;
use super::window::is_window_alive;
use crate::automation::input;
use crate::calibration::Screen;

/// Primary monitor with synthesized input, tied to the viewer window.
///
/// Frames stop once the viewer window is closed, which ends the session.
pub struct DesktopScreen {
    capturer: MonitorCapturer,
    viewer: HWND,
    size: (u32, u32),
}

impl DesktopScreen {
    pub fn new(viewer: HWND) -> Result<Self> {
        Ok(Self {
            capturer: MonitorCapturer::primary()?,
            viewer,
            size: input::screen_size(),
        })
    }
}

impl Screen for DesktopScreen {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn capture_frame(&mut self) -> Option<RgbaImage> {
        if !is_window_alive(self.viewer) {
            log::error!("Viewer window was closed");
            return None;
        }
        match self.capturer.capture() {
            Ok(img) => Some(img),
            Err(e) => {
                log::error!("Screen capture failed: {:#}", e);
                None
            }
        }
    }

    fn move_pointer(&mut self, x: i32, y: i32) -> bool {
        input::move_cursor(x, y)
            .inspect_err(|e| log::warn!("Pointer move failed: {}", e))
            .is_ok()
    }

    fn click(&mut self, x: i32, y: i32) -> bool {
        input::click_at(x, y)
            .inspect_err(|e| log::warn!("Click at ({}, {}) failed: {}", x, y, e))
            .is_ok()
    }

    fn press_escape(&mut self) -> bool {
        input::press_key(VK_ESCAPE)
            .inspect_err(|e| log::warn!("Escape key failed: {}", e))
            .is_ok()
    }
}
